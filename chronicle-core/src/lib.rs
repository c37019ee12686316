//! Session engine for role-playing games run by a language model.
//!
//! This crate provides:
//! - A session dispatcher that switches between narrative and combat modes
//! - Dual-track conversation logs with token-budget compaction
//! - A deterministic, seedable combat turn engine
//! - File-backed and in-memory persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle_core::{ClaudeGameMaster, GameConfig, GameStores, SessionDispatcher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig::from_env();
//!     let gm = ClaudeGameMaster::from_env()?.with_config(&config);
//!     let dispatcher =
//!         SessionDispatcher::new(GameStores::file(&config.data_dir), Arc::new(gm), &config);
//!
//!     let session = dispatcher.start_session(character_id, "goblin-caves").await?;
//!     let delta = dispatcher.dispatch(session.id, "I look around the cave").await?;
//!     for entry in &delta.new_entries {
//!         println!("{}", entry.display_text());
//!     }
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod character;
pub mod combat;
pub mod config;
pub mod dice;
pub mod gm;
pub mod history;
pub mod ids;
pub mod persist;
pub mod session;
pub mod testing;

// Primary public API
pub use actions::{Action, ActionError, ActionResolver, Resolution};
pub use character::{
    CharacterError, CharacterService, CharacterSheet, FileCharacterStore, MemoryCharacterStore,
};
pub use combat::{CombatError, CombatState, Combatant, CombatantKind, EndReason, TurnEngine};
pub use config::GameConfig;
pub use gm::{ClaudeGameMaster, CompletionError, CompletionService, TurnOutcome};
pub use history::{HistorySummarizer, LogEntry, LogView, Track};
pub use ids::{CharacterId, CombatId, CombatantId, SessionId};
pub use session::{
    GameStores, ScenarioStatus, SessionDispatcher, SessionError, SessionRecord, TranscriptDelta,
};
pub use testing::{MockGameMaster, ScriptedTurn, TestHarness};
