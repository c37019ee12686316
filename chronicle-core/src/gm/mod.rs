//! The game master: the completion service seam and its Claude backend.

mod agent;
mod outcome;
pub mod prompts;
pub mod tools;

pub use agent::ClaudeGameMaster;
pub use outcome::{
    CombatEvent, CombatReport, CombatSeed, CombatantOutcome, Rewards, ScenarioEnd,
    ScenarioOutcome, SeedParticipant, TurnOutcome, TurnReport,
};
pub use tools::{parse_tool_call, GameTools};

use crate::actions::ActionResolver;
use crate::history::{LogEntry, Track};
use crate::ids::{CharacterId, SessionId};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion service error: {0}")]
    Service(String),

    #[error("Completion service returned no content")]
    Empty,
}

impl From<claude::Error> for CompletionError {
    fn from(e: claude::Error) -> Self {
        CompletionError::Service(e.to_string())
    }
}

/// Who an exchange is for. Tool side effects are applied to this session
/// and character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub character_id: CharacterId,
    pub track: Track,
}

/// One exchange to run.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    /// The model log of the track, possibly compacted.
    pub history: Vec<LogEntry>,
    pub context: ToolContext,
}

/// What an exchange produced.
#[derive(Debug, Clone)]
pub struct Completion {
    pub outcome: TurnOutcome,
    /// Entries produced by this exchange, starting with the player's message.
    pub new_entries: Vec<LogEntry>,
    /// The history the service was given followed by `new_entries`. This
    /// becomes the next model log.
    pub all_entries: Vec<LogEntry>,
}

impl Completion {
    /// Assemble a completion from the request history and this exchange.
    pub fn new(outcome: TurnOutcome, history: Vec<LogEntry>, new_entries: Vec<LogEntry>) -> Self {
        let mut all_entries = history;
        all_entries.extend(new_entries.iter().cloned());
        Self {
            outcome,
            new_entries,
            all_entries,
        }
    }
}

/// The external language model, seen as a black box.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run one exchange. Tool calls are resolved through `actions`.
    async fn complete(
        &self,
        request: CompletionRequest,
        actions: &ActionResolver,
    ) -> Result<Completion, CompletionError>;

    /// Summarize `transcript` following `instruction`.
    async fn summarize(&self, instruction: &str, transcript: &str)
        -> Result<String, CompletionError>;
}
