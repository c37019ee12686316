//! Sessions: the persistent record and the dispatcher that plays exchanges.

mod combat;
mod dispatcher;
mod effects;
mod narrative;
mod record;
mod store;

pub use dispatcher::{GameStores, SessionDispatcher, TranscriptDelta};
pub use record::{CombatResult, ScenarioStatus, SessionRecord, SESSION_FORMAT_VERSION};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};

use crate::character::CharacterError;
use crate::combat::CombatError;
use crate::gm::CompletionError;
use crate::persist::PersistError;
use thiserror::Error;

/// Errors surfaced to callers of the dispatcher.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session, combat, character or log entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is not valid in the current state. Nothing changed.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The completion service failed. The exchange was not committed.
    #[error("External service failure: {0}")]
    ExternalService(#[from] CompletionError),

    /// Stored state exists but cannot be used.
    #[error("Malformed state: {0}")]
    MalformedState(#[source] PersistError),

    #[error("Storage error: {0}")]
    Storage(#[source] PersistError),
}

impl From<PersistError> for SessionError {
    fn from(e: PersistError) -> Self {
        if e.is_malformed() {
            SessionError::MalformedState(e)
        } else {
            SessionError::Storage(e)
        }
    }
}

impl From<CharacterError> for SessionError {
    fn from(e: CharacterError) -> Self {
        match e {
            CharacterError::NotFound(id) => SessionError::NotFound(format!("character {id}")),
            CharacterError::Persist(e) => e.into(),
        }
    }
}

impl From<CombatError> for SessionError {
    fn from(e: CombatError) -> Self {
        if e.is_not_found() {
            SessionError::NotFound(e.to_string())
        } else {
            SessionError::InvalidTransition(e.to_string())
        }
    }
}
