//! Storage for the single active combat of each session.

use super::state::CombatState;
use crate::ids::SessionId;
use crate::persist::{self, PersistError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Load, save and delete the active combat of a session.
pub trait CombatStore: Send + Sync {
    /// The active combat, or `None` when there is none. A record that can
    /// no longer be decoded counts as absent.
    fn load(&self, session: SessionId) -> Result<Option<CombatState>, PersistError>;

    fn save(&self, state: &CombatState) -> Result<(), PersistError>;

    /// Returns whether a record existed.
    fn delete(&self, session: SessionId) -> Result<bool, PersistError>;
}

/// One JSON file per session under `<root>/combat/`.
#[derive(Debug, Clone)]
pub struct FileCombatStore {
    dir: PathBuf,
}

impl FileCombatStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("combat"),
        }
    }

    fn path(&self, session: SessionId) -> PathBuf {
        self.dir.join(format!("{session}_combat.json"))
    }
}

impl CombatStore for FileCombatStore {
    fn load(&self, session: SessionId) -> Result<Option<CombatState>, PersistError> {
        match persist::read_json(&self.path(session)) {
            Err(e) if e.is_malformed() => {
                warn!(%session, error = %e, "discarding unreadable combat record");
                Ok(None)
            }
            other => other,
        }
    }

    fn save(&self, state: &CombatState) -> Result<(), PersistError> {
        persist::write_json_atomic(&self.path(state.session_id), state)
    }

    fn delete(&self, session: SessionId) -> Result<bool, PersistError> {
        persist::remove_file(&self.path(session))
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCombatStore {
    combats: Mutex<HashMap<SessionId, CombatState>>,
}

impl MemoryCombatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CombatStore for MemoryCombatStore {
    fn load(&self, session: SessionId) -> Result<Option<CombatState>, PersistError> {
        let combats = self.combats.lock().map_err(|_| PersistError::Poisoned)?;
        Ok(combats.get(&session).cloned())
    }

    fn save(&self, state: &CombatState) -> Result<(), PersistError> {
        let mut combats = self.combats.lock().map_err(|_| PersistError::Poisoned)?;
        combats.insert(state.session_id, state.clone());
        Ok(())
    }

    fn delete(&self, session: SessionId) -> Result<bool, PersistError> {
        let mut combats = self.combats.lock().map_err(|_| PersistError::Poisoned)?;
        Ok(combats.remove(&session).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{Combatant, TurnEngine};
    use tempfile::TempDir;

    fn sample(session: SessionId) -> CombatState {
        TurnEngine::default()
            .start(
                session,
                vec![Combatant::player("Hero", 10, 3), Combatant::npc("Orc", 8, 5)],
                "cave",
            )
            .unwrap()
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = FileCombatStore::new(dir.path());
        let session = SessionId::new();

        assert!(store.load(session).unwrap().is_none());

        let state = sample(session);
        store.save(&state).unwrap();
        assert!(dir
            .path()
            .join("combat")
            .join(format!("{session}_combat.json"))
            .exists());
        assert_eq!(store.load(session).unwrap(), Some(state));

        assert!(store.delete(session).unwrap());
        assert!(store.load(session).unwrap().is_none());
        assert!(!store.delete(session).unwrap());
    }

    #[test]
    fn test_malformed_record_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileCombatStore::new(dir.path());
        let session = SessionId::new();
        std::fs::create_dir_all(dir.path().join("combat")).unwrap();
        std::fs::write(store.path(session), "{\"round\": \"one\"").unwrap();

        assert!(store.load(session).unwrap().is_none());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCombatStore::new();
        let session = SessionId::new();
        store.save(&sample(session)).unwrap();
        assert!(store.load(session).unwrap().is_some());
        assert!(store.load(SessionId::new()).unwrap().is_none());
        assert!(store.delete(session).unwrap());
    }
}
