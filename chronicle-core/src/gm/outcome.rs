//! Tagged results of one exchange with the completion service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What an exchange produced. Every handler must match all variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TurnOutcome {
    /// Ordinary narration.
    Continue { text: String },
    /// A fight breaks out.
    CombatSeed(CombatSeed),
    /// A combat turn was played and the fight goes on.
    CombatTurnContinue(TurnReport),
    /// The fight is over.
    CombatTurnEnd(CombatReport),
    /// The scenario reached a conclusion.
    ScenarioEnd(ScenarioEnd),
}

impl TurnOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        TurnOutcome::Continue { text: text.into() }
    }

    /// Decode a tagged value. Anything unrecognised becomes
    /// [`TurnOutcome::Continue`] carrying `raw_text`.
    pub fn from_value(value: Value, raw_text: &str) -> Self {
        serde_json::from_value(value).unwrap_or_else(|_| Self::text(raw_text))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Continue { .. } => "continue",
            TurnOutcome::CombatSeed(_) => "combat-seed",
            TurnOutcome::CombatTurnContinue(_) => "combat-turn-continue",
            TurnOutcome::CombatTurnEnd(_) => "combat-turn-end",
            TurnOutcome::ScenarioEnd(_) => "scenario-end",
        }
    }
}

/// One NPC named when combat starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedParticipant {
    pub name: String,
    pub hp: u32,

    /// Fixed initiative. Rolled as `1d20 + initiative_bonus` when absent.
    #[serde(default)]
    pub initiative: Option<i32>,
    #[serde(default)]
    pub initiative_bonus: i32,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub defense_bonus: i32,
}

impl SeedParticipant {
    pub fn new(name: impl Into<String>, hp: u32) -> Self {
        Self {
            name: name.into(),
            hp,
            initiative: None,
            initiative_bonus: 0,
            attack_bonus: 0,
            defense_bonus: 0,
        }
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = Some(initiative);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSeed {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub participants: Vec<SeedParticipant>,
}

/// How one combatant fared during a turn, as reported by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantOutcome {
    pub name: String,
    #[serde(default)]
    pub hp_change: i32,
    #[serde(default)]
    pub status_effects: Vec<String>,
    #[serde(default)]
    pub is_dead: bool,
}

/// Side effects reported alongside a combat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombatEvent {
    Damage { target: String, amount: u32 },
    Healing { target: String, amount: u32 },
    Inventory { item: String, quantity: i32 },
    Xp { amount: u32 },
    Gold { amount: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    pub summary: String,
    #[serde(default)]
    pub outcomes: Vec<CombatantOutcome>,
    #[serde(default)]
    pub events: Vec<CombatEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatReport {
    pub summary: String,
    #[serde(default)]
    pub winners: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<CombatantOutcome>,
    #[serde(default)]
    pub events: Vec<CombatEvent>,
}

impl CombatReport {
    /// Total experience from `xp` events.
    pub fn xp_awarded(&self) -> u32 {
        self.events
            .iter()
            .filter_map(|e| match e {
                CombatEvent::Xp { amount } => Some(*amount),
                _ => None,
            })
            .fold(0, u32::saturating_add)
    }

    /// Net gold from `gold` events.
    pub fn gold_awarded(&self) -> i64 {
        self.events
            .iter()
            .filter_map(|e| match e {
                CombatEvent::Gold { amount } => Some(i64::from(*amount)),
                _ => None,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioOutcome {
    Success,
    Failure,
    Death,
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioOutcome::Success => write!(f, "success"),
            ScenarioOutcome::Failure => write!(f, "failure"),
            ScenarioOutcome::Death => write!(f, "death"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewards {
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioEnd {
    pub outcome: ScenarioOutcome,
    pub summary: String,
    #[serde(default)]
    pub rewards: Option<Rewards>,
}
