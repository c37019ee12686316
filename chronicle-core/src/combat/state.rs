//! Combat data model: combatants and the per-session combat record.

use crate::ids::{CharacterId, CombatId, CombatantId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::CombatError;

/// Which side a combatant fights on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatantKind {
    Player,
    Npc,
}

impl fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombatantKind::Player => write!(f, "player"),
            CombatantKind::Npc => write!(f, "npc"),
        }
    }
}

/// One participant in a combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub kind: CombatantKind,
    pub current_hp: u32,
    pub max_hp: u32,
    pub initiative: i32,

    /// Added to this combatant's attack draw.
    #[serde(default)]
    pub attack_bonus: i32,

    /// Added to this combatant's defense draw.
    #[serde(default)]
    pub defense_bonus: i32,

    /// Character sheet backing a player combatant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<CharacterId>,
}

impl Combatant {
    /// A combatant at full health.
    pub fn new(name: impl Into<String>, kind: CombatantKind, max_hp: u32, initiative: i32) -> Self {
        Self {
            id: CombatantId::new(),
            name: name.into(),
            kind,
            current_hp: max_hp,
            max_hp,
            initiative,
            attack_bonus: 0,
            defense_bonus: 0,
            character_id: None,
        }
    }

    pub fn player(name: impl Into<String>, max_hp: u32, initiative: i32) -> Self {
        Self::new(name, CombatantKind::Player, max_hp, initiative)
    }

    pub fn npc(name: impl Into<String>, max_hp: u32, initiative: i32) -> Self {
        Self::new(name, CombatantKind::Npc, max_hp, initiative)
    }

    /// Start below full health. Clamped to the maximum.
    pub fn with_current_hp(mut self, hp: u32) -> Self {
        self.current_hp = hp.min(self.max_hp);
        self
    }

    pub fn with_bonuses(mut self, attack: i32, defense: i32) -> Self {
        self.attack_bonus = attack;
        self.defense_bonus = defense;
        self
    }

    pub fn for_character(mut self, character_id: CharacterId) -> Self {
        self.character_id = Some(character_id);
        self
    }

    pub fn is_alive(&self) -> bool {
        self.current_hp > 0
    }

    /// Subtract hit points, never going below zero. Returns the amount
    /// actually removed.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let before = self.current_hp;
        self.current_hp = before.saturating_sub(amount);
        before - self.current_hp
    }

    /// Restore hit points, never exceeding the maximum. Returns the amount
    /// actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let before = self.current_hp;
        self.current_hp = before.saturating_add(amount).min(self.max_hp);
        self.current_hp - before
    }

    /// Narrative description of current health.
    pub fn condition(&self) -> &'static str {
        if self.current_hp == 0 {
            "down"
        } else if self.current_hp == self.max_hp {
            "uninjured"
        } else {
            let ratio = self.current_hp as f32 / self.max_hp as f32;
            if ratio > 0.75 {
                "lightly wounded"
            } else if ratio > 0.5 {
                "bloodied"
            } else if ratio > 0.25 {
                "badly wounded"
            } else {
                "near death"
            }
        }
    }
}

/// Lifecycle of a combat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatStatus {
    Ongoing,
    Ended,
}

/// Why a combat ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// No NPC is left standing.
    Victory,
    /// No player is left standing.
    Defeat,
    /// Both sides fell together, or the outcome was called even.
    Draw,
    /// Ended from outside the rules, e.g. "fled".
    Manual(String),
}

impl EndReason {
    /// Interpret a free-form reason from a tool call.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "victory" => EndReason::Victory,
            "defeat" => EndReason::Defeat,
            "draw" => EndReason::Draw,
            other => EndReason::Manual(other.to_string()),
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Victory => write!(f, "victory"),
            EndReason::Defeat => write!(f, "defeat"),
            EndReason::Draw => write!(f, "draw"),
            EndReason::Manual(reason) => write!(f, "{reason}"),
        }
    }
}

/// The active combat of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatState {
    pub id: CombatId,
    pub session_id: SessionId,

    /// Combatants in initiative order. Fixed for the whole combat.
    pub combatants: Vec<Combatant>,

    /// Index into `combatants`.
    pub current_turn: usize,

    /// Starts at 1.
    pub round: u32,

    pub status: CombatStatus,

    /// Append-only narration of what happened.
    pub log: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,

    /// Where the fight takes place, as described when it started.
    #[serde(default)]
    pub location: String,
}

impl CombatState {
    pub fn is_ongoing(&self) -> bool {
        self.status == CombatStatus::Ongoing
    }

    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.combatants.get(self.current_turn)
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn combatant_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.id == id)
    }

    /// Look a combatant up by id or by case-insensitive name.
    pub fn resolve(&self, key: &str) -> Result<CombatantId, CombatError> {
        let key = key.trim();
        self.combatants
            .iter()
            .find(|c| c.id.to_string() == key)
            .or_else(|| {
                self.combatants
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(key))
            })
            .map(|c| c.id)
            .ok_or_else(|| CombatError::UnknownCombatant(key.to_string()))
    }

    /// The player-side combatant, if any.
    pub fn player(&self) -> Option<&Combatant> {
        self.combatants
            .iter()
            .find(|c| c.kind == CombatantKind::Player)
    }

    pub fn alive(&self, kind: CombatantKind) -> impl Iterator<Item = &Combatant> {
        self.combatants
            .iter()
            .filter(move |c| c.kind == kind && c.is_alive())
    }

    /// Append a narrated event, prefixed with the round number.
    pub fn add_log(&mut self, entry: impl AsRef<str>) {
        self.log.push(format!("Round {} - {}", self.round, entry.as_ref()));
    }

    /// Compact status block for prompts and the status tool.
    pub fn describe(&self) -> String {
        let mut out = format!("Round {}", self.round);
        if let Some(current) = self.current_combatant() {
            out.push_str(&format!(", {}'s turn", current.name));
        }
        out.push_str("\nInitiative order:\n");
        for (i, c) in self.combatants.iter().enumerate() {
            let marker = if i == self.current_turn { ">" } else { " " };
            out.push_str(&format!(
                "{marker} {}. {} [{}] (init {}) HP {}/{} - {}\n",
                i + 1,
                c.name,
                c.kind,
                c.initiative,
                c.current_hp,
                c.max_hp,
                c.condition()
            ));
        }
        out
    }
}
