//! Storage for session records.

use super::record::{SessionRecord, SESSION_FORMAT_VERSION};
use crate::ids::SessionId;
use crate::persist::{self, PersistError};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub trait SessionStore: Send + Sync {
    fn load(&self, id: SessionId) -> Result<Option<SessionRecord>, PersistError>;

    fn save(&self, record: &SessionRecord) -> Result<(), PersistError>;

    /// Every readable record, oldest first.
    fn list(&self) -> Result<Vec<SessionRecord>, PersistError>;
}

/// `<root>/sessions/<id>/session.json`, next to the session's logs.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("sessions"),
        }
    }

    fn path(&self, id: SessionId) -> PathBuf {
        self.root.join(id.to_string()).join("session.json")
    }

    fn read(&self, path: &Path) -> Result<Option<SessionRecord>, PersistError> {
        let record: Option<SessionRecord> = persist::read_json(path)?;
        match record {
            Some(r) if r.version != SESSION_FORMAT_VERSION => Err(PersistError::VersionMismatch {
                path: path.to_path_buf(),
                expected: SESSION_FORMAT_VERSION,
                found: r.version,
            }),
            other => Ok(other),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, id: SessionId) -> Result<Option<SessionRecord>, PersistError> {
        self.read(&self.path(id))
    }

    fn save(&self, record: &SessionRecord) -> Result<(), PersistError> {
        persist::write_json_atomic(&self.path(record.id), record)
    }

    fn list(&self) -> Result<Vec<SessionRecord>, PersistError> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistError::io(&self.root, e)),
        };

        let mut records = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| PersistError::io(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let path = entry.path().join("session.json");
            match self.read(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) if e.is_malformed() => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable session");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: SessionId) -> Result<Option<SessionRecord>, PersistError> {
        let records = self.records.lock().map_err(|_| PersistError::Poisoned)?;
        Ok(records.get(&id).cloned())
    }

    fn save(&self, record: &SessionRecord) -> Result<(), PersistError> {
        let mut records = self.records.lock().map_err(|_| PersistError::Poisoned)?;
        records.insert(record.id, record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<SessionRecord>, PersistError> {
        let records = self.records.lock().map_err(|_| PersistError::Poisoned)?;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }
}
