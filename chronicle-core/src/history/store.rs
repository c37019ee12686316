//! Persistent storage for the full and model logs of each track.

use super::entry::{LogEntry, LogView, Track};
use crate::ids::SessionId;
use crate::persist::{self, PersistError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Ordered log storage keyed by (session, track, view).
///
/// Entries are never reordered. The full log only ever grows through
/// [`append`](LogStore::append), except for [`remove`](LogStore::remove).
pub trait LogStore: Send + Sync {
    /// The stored entries, empty if nothing was written yet.
    fn load(&self, session: SessionId, track: Track, view: LogView)
        -> Result<Vec<LogEntry>, PersistError>;

    fn append(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
        entries: &[LogEntry],
    ) -> Result<(), PersistError>;

    fn replace(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
        entries: &[LogEntry],
    ) -> Result<(), PersistError>;

    /// Remove one entry by index. Returns `None` if the index is out of range.
    fn remove(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
        index: usize,
    ) -> Result<Option<LogEntry>, PersistError> {
        let mut entries = self.load(session, track, view)?;
        if index >= entries.len() {
            return Ok(None);
        }
        let removed = entries.remove(index);
        self.replace(session, track, view, &entries)?;
        Ok(Some(removed))
    }
}

/// JSON files under `<root>/sessions/<id>/`.
#[derive(Debug, Clone)]
pub struct FileLogStore {
    root: PathBuf,
}

impl FileLogStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("sessions"),
        }
    }

    pub fn path(&self, session: SessionId, track: Track, view: LogView) -> PathBuf {
        let name = match view {
            LogView::Full => format!("history_{track}.json"),
            LogView::Model => format!("history_{track}_model.json"),
        };
        self.root.join(session.to_string()).join(name)
    }
}

impl LogStore for FileLogStore {
    fn load(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
    ) -> Result<Vec<LogEntry>, PersistError> {
        Ok(persist::read_json(&self.path(session, track, view))?.unwrap_or_default())
    }

    fn append(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
        entries: &[LogEntry],
    ) -> Result<(), PersistError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut stored = self.load(session, track, view)?;
        stored.extend_from_slice(entries);
        self.replace(session, track, view, &stored)
    }

    fn replace(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
        entries: &[LogEntry],
    ) -> Result<(), PersistError> {
        persist::write_json_atomic(&self.path(session, track, view), entries)
    }
}

type LogKey = (SessionId, Track, LogView);

/// In-memory logs for tests.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    logs: Mutex<HashMap<LogKey, Vec<LogEntry>>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn load(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
    ) -> Result<Vec<LogEntry>, PersistError> {
        let logs = self.logs.lock().map_err(|_| PersistError::Poisoned)?;
        Ok(logs.get(&(session, track, view)).cloned().unwrap_or_default())
    }

    fn append(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
        entries: &[LogEntry],
    ) -> Result<(), PersistError> {
        let mut logs = self.logs.lock().map_err(|_| PersistError::Poisoned)?;
        logs.entry((session, track, view))
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    fn replace(
        &self,
        session: SessionId,
        track: Track,
        view: LogView,
        entries: &[LogEntry],
    ) -> Result<(), PersistError> {
        let mut logs = self.logs.lock().map_err(|_| PersistError::Poisoned)?;
        logs.insert((session, track, view), entries.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exchange(n: usize) -> Vec<LogEntry> {
        vec![
            LogEntry::user_input(format!("action {n}")),
            LogEntry::model_text(format!("narration {n}")),
        ]
    }

    fn check_dual_tracks(store: &dyn LogStore) {
        let session = SessionId::new();
        store
            .append(session, Track::Narrative, LogView::Full, &exchange(1))
            .unwrap();
        store
            .append(session, Track::Narrative, LogView::Full, &exchange(2))
            .unwrap();
        store
            .replace(session, Track::Narrative, LogView::Model, &exchange(2))
            .unwrap();

        let full = store.load(session, Track::Narrative, LogView::Full).unwrap();
        assert_eq!(full.len(), 4);
        assert_eq!(full[0].display_text(), "action 1");
        assert_eq!(full[3].display_text(), "narration 2");

        let model = store.load(session, Track::Narrative, LogView::Model).unwrap();
        assert_eq!(model.len(), 2);

        store
            .replace(session, Track::Narrative, LogView::Model, &[])
            .unwrap();
        assert_eq!(
            store
                .load(session, Track::Narrative, LogView::Full)
                .unwrap()
                .len(),
            4
        );
        assert!(store
            .load(session, Track::Combat, LogView::Full)
            .unwrap()
            .is_empty());

        let removed = store
            .remove(session, Track::Narrative, LogView::Full, 1)
            .unwrap()
            .unwrap();
        assert_eq!(removed.display_text(), "narration 1");
        assert!(store
            .remove(session, Track::Narrative, LogView::Full, 3)
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .load(session, Track::Narrative, LogView::Full)
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn test_memory_store_tracks_are_independent() {
        check_dual_tracks(&MemoryLogStore::new());
    }

    #[test]
    fn test_file_store_tracks_are_independent() {
        let dir = TempDir::new().unwrap();
        check_dual_tracks(&FileLogStore::new(dir.path()));
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileLogStore::new(dir.path());
        let session = SessionId::new();
        store
            .append(session, Track::Combat, LogView::Model, &exchange(1))
            .unwrap();

        let expected = dir
            .path()
            .join("sessions")
            .join(session.to_string())
            .join("history_combat_model.json");
        assert!(expected.exists());
    }

    #[test]
    fn test_malformed_log_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileLogStore::new(dir.path());
        let session = SessionId::new();
        let path = store.path(session, Track::Narrative, LogView::Full);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[{\"kind\":").unwrap();

        let err = store
            .load(session, Track::Narrative, LogView::Full)
            .unwrap_err();
        assert!(err.is_malformed());
    }
}
