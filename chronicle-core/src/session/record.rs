//! The persistent record of one game session.

use crate::combat::EndReason;
use crate::gm::ScenarioOutcome;
use crate::history::Track;
use crate::ids::{CharacterId, CombatId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format version written into every session record.
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Where the scenario stands. Anything but `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    #[default]
    Active,
    Success,
    Failure,
    Death,
}

impl ScenarioStatus {
    pub fn is_terminal(&self) -> bool {
        *self != ScenarioStatus::Active
    }
}

impl From<ScenarioOutcome> for ScenarioStatus {
    fn from(outcome: ScenarioOutcome) -> Self {
        match outcome {
            ScenarioOutcome::Success => ScenarioStatus::Success,
            ScenarioOutcome::Failure => ScenarioStatus::Failure,
            ScenarioOutcome::Death => ScenarioStatus::Death,
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioStatus::Active => write!(f, "active"),
            ScenarioStatus::Success => write!(f, "success"),
            ScenarioStatus::Failure => write!(f, "failure"),
            ScenarioStatus::Death => write!(f, "death"),
        }
    }
}

/// What survives of a combat once it is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatResult {
    pub combat_id: CombatId,
    pub summary: String,
    pub winners: Vec<String>,
    pub end_reason: EndReason,
    pub xp_awarded: u32,
    pub gold_awarded: i64,
    pub ended_at: DateTime<Utc>,
}

/// One play-through of a scenario by a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub version: u32,
    pub id: SessionId,
    pub character_id: CharacterId,
    pub scenario_id: String,

    /// Also selects the log track an exchange uses.
    pub mode: Track,

    /// Set exactly while `mode` is combat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_combat_id: Option<CombatId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_combat_result: Option<CombatResult>,

    pub scenario_status: ScenarioStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(character_id: CharacterId, scenario_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: SESSION_FORMAT_VERSION,
            id: SessionId::new(),
            character_id,
            scenario_id: scenario_id.into(),
            mode: Track::Narrative,
            active_combat_id: None,
            last_combat_result: None,
            scenario_status: ScenarioStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn in_combat(&self) -> bool {
        self.mode == Track::Combat
    }

    pub fn enter_combat(&mut self, combat_id: CombatId) {
        self.mode = Track::Combat;
        self.active_combat_id = Some(combat_id);
    }

    pub fn leave_combat(&mut self, result: CombatResult) {
        self.mode = Track::Narrative;
        self.active_combat_id = None;
        self.last_combat_result = Some(result);
    }

    /// Drop back to narrative without a combat result.
    pub fn abandon_combat(&mut self) {
        self.mode = Track::Narrative;
        self.active_combat_id = None;
    }

    /// Move to a terminal status. Returns `false` if the scenario had
    /// already ended, in which case nothing changes.
    pub fn conclude(&mut self, status: ScenarioStatus) -> bool {
        if self.scenario_status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.scenario_status = status;
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_active_narrative() {
        let record = SessionRecord::new(CharacterId::new(), "goblin-caves");
        assert_eq!(record.mode, Track::Narrative);
        assert_eq!(record.scenario_status, ScenarioStatus::Active);
        assert_eq!(record.version, SESSION_FORMAT_VERSION);
        assert!(record.active_combat_id.is_none());
    }

    #[test]
    fn test_combat_transitions_keep_id_in_step_with_mode() {
        let mut record = SessionRecord::new(CharacterId::new(), "goblin-caves");
        let combat = CombatId::new();
        record.enter_combat(combat);
        assert!(record.in_combat());
        assert_eq!(record.active_combat_id, Some(combat));

        record.leave_combat(CombatResult {
            combat_id: combat,
            summary: "The goblins flee.".into(),
            winners: vec!["Mira".into()],
            end_reason: EndReason::Victory,
            xp_awarded: 50,
            gold_awarded: 3,
            ended_at: Utc::now(),
        });
        assert!(!record.in_combat());
        assert!(record.active_combat_id.is_none());
        assert_eq!(
            record.last_combat_result.as_ref().map(|r| r.combat_id),
            Some(combat)
        );
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut record = SessionRecord::new(CharacterId::new(), "goblin-caves");
        assert!(!record.conclude(ScenarioStatus::Active));
        assert!(record.conclude(ScenarioStatus::Death));
        assert!(!record.conclude(ScenarioStatus::Success));
        assert_eq!(record.scenario_status, ScenarioStatus::Death);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ScenarioStatus::Death).unwrap(),
            "\"death\""
        );
        assert_eq!(
            ScenarioStatus::from(ScenarioOutcome::Failure),
            ScenarioStatus::Failure
        );
    }
}
