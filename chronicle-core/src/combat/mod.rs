//! Turn-based combat: data model, rules and persistence.

mod engine;
mod state;
mod store;

pub use engine::{AttackOutcome, DamageRoll, HealthChange, TurnEngine};
pub use state::{CombatState, CombatStatus, Combatant, CombatantKind, EndReason};
pub use store::{CombatStore, FileCombatStore, MemoryCombatStore};

use crate::ids::CombatId;
use thiserror::Error;

/// Errors from combat operations. The state is unchanged when one is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CombatError {
    #[error("Combat has no combatants")]
    NoCombatants,

    #[error("Combat {0} has already ended")]
    AlreadyEnded(CombatId),

    #[error("Unknown combatant: {0}")]
    UnknownCombatant(String),

    #[error("{0} is down")]
    CombatantDown(String),
}

impl CombatError {
    /// Whether the error names something that does not exist, as opposed to
    /// an operation that is not allowed right now.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CombatError::UnknownCombatant(_))
    }
}
