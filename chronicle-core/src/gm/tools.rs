//! Game tools exposed to the model.
//!
//! Each tool call is parsed into an [`Action`] that the
//! [`ActionResolver`](crate::actions::ActionResolver) resolves.

use crate::actions::Action;
use crate::history::Track;
use claude::Tool;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Tool definitions offered to the game master.
pub struct GameTools;

impl GameTools {
    /// The tools available on a track.
    pub fn for_track(track: Track) -> Vec<Tool> {
        match track {
            Track::Narrative => Self::narrative(),
            Track::Combat => Self::combat(),
        }
    }

    pub fn narrative() -> Vec<Tool> {
        vec![
            Self::start_combat(),
            Self::damage_character(),
            Self::heal_character(),
            Self::grant_xp(),
            Self::add_gold(),
            Self::add_item(),
            Self::remove_item(),
            Self::skill_check(),
            Self::end_scenario(),
        ]
    }

    pub fn combat() -> Vec<Tool> {
        vec![
            Self::execute_attack(),
            Self::apply_direct_damage(),
            Self::heal_combatant(),
            Self::end_turn(),
            Self::check_combat_end(),
            Self::end_combat(),
            Self::get_combat_status(),
            Self::skill_check(),
            Self::report_turn(),
            Self::conclude_combat(),
        ]
    }

    fn start_combat() -> Tool {
        Tool {
            name: "start_combat".to_string(),
            description: "Start a combat encounter when a fight breaks out. The player character joins automatically; list only the opponents. Ends your turn: describe the scene before calling it.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "Where the fight takes place"
                    },
                    "description": {
                        "type": "string",
                        "description": "How the fight begins"
                    },
                    "participants": {
                        "type": "array",
                        "description": "The opponents",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "hp": { "type": "integer", "minimum": 1 },
                                "initiative": {
                                    "type": "integer",
                                    "description": "Fixed initiative; rolled when omitted"
                                },
                                "initiative_bonus": { "type": "integer" },
                                "attack_bonus": { "type": "integer" },
                                "defense_bonus": { "type": "integer" }
                            },
                            "required": ["name", "hp"]
                        }
                    }
                },
                "required": ["location", "participants"]
            }),
        }
    }

    fn damage_character() -> Tool {
        Tool {
            name: "damage_character".to_string(),
            description: "Deal damage to the player character outside of combat, e.g. from a trap or a fall.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "amount": { "type": "integer", "minimum": 1 },
                    "source": { "type": "string", "description": "What caused the damage" }
                },
                "required": ["amount"]
            }),
        }
    }

    fn heal_character() -> Tool {
        Tool {
            name: "heal_character".to_string(),
            description: "Restore hit points to the player character outside of combat.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "amount": { "type": "integer", "minimum": 1 },
                    "source": { "type": "string", "description": "Potion, rest, spell..." }
                },
                "required": ["amount"]
            }),
        }
    }

    fn grant_xp() -> Tool {
        Tool {
            name: "grant_xp".to_string(),
            description: "Award experience points to the player character.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "amount": { "type": "integer", "minimum": 1 },
                    "reason": { "type": "string" }
                },
                "required": ["amount"]
            }),
        }
    }

    fn add_gold() -> Tool {
        Tool {
            name: "add_gold".to_string(),
            description: "Give gold to the player character, or take it away with a negative amount.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "amount": { "type": "integer" },
                    "reason": { "type": "string" }
                },
                "required": ["amount"]
            }),
        }
    }

    fn add_item() -> Tool {
        Tool {
            name: "add_item".to_string(),
            description: "Put an item in the player character's inventory when they find, buy or receive it.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item": { "type": "string", "description": "Item name, e.g. 'rope' or 'healing potion'" },
                    "quantity": { "type": "integer", "minimum": 1, "maximum": 100, "default": 1 }
                },
                "required": ["item"]
            }),
        }
    }

    fn remove_item() -> Tool {
        Tool {
            name: "remove_item".to_string(),
            description: "Take an item out of the player character's inventory when it is used up, sold, lost or given away.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item": { "type": "string" },
                    "quantity": { "type": "integer", "minimum": 1, "maximum": 100, "default": 1 }
                },
                "required": ["item"]
            }),
        }
    }

    fn skill_check() -> Tool {
        Tool {
            name: "skill_check".to_string(),
            description: "Test one of the player character's skills. Rolls 1d100; the test succeeds when the roll is at most the skill level minus the difficulty. Untrained skills count as level 10.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "skill": { "type": "string", "description": "Skill name, e.g. 'stealth'" },
                    "difficulty": {
                        "type": "integer",
                        "description": "0 for routine, 20 for hard, 40 for heroic; negative makes it easier"
                    }
                },
                "required": ["skill"]
            }),
        }
    }

    fn end_scenario() -> Tool {
        Tool {
            name: "end_scenario".to_string(),
            description: "End the scenario when its goal is reached, definitively failed, or the character dies. Ends your turn.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "outcome": {
                        "type": "string",
                        "enum": ["success", "failure", "death"]
                    },
                    "summary": { "type": "string", "description": "Epilogue for the player" },
                    "rewards": {
                        "type": "object",
                        "properties": {
                            "xp": { "type": "integer", "minimum": 0 },
                            "gold": { "type": "integer", "minimum": 0 },
                            "items": { "type": "array", "items": { "type": "string" } }
                        }
                    }
                },
                "required": ["outcome", "summary"]
            }),
        }
    }

    fn execute_attack() -> Tool {
        Tool {
            name: "execute_attack".to_string(),
            description: "Resolve an attack between two combatants. The attack draw must beat the defense draw; on a hit the damage dice are rolled.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "attacker": { "type": "string", "description": "Attacker name" },
                    "target": { "type": "string", "description": "Target name" },
                    "damage": {
                        "type": "string",
                        "description": "Damage dice such as '1d8' or '2d6+1'. Defaults to 1d6"
                    },
                    "damage_modifier": { "type": "integer", "description": "Added to the damage roll" }
                },
                "required": ["attacker", "target"]
            }),
        }
    }

    fn apply_direct_damage() -> Tool {
        Tool {
            name: "apply_direct_damage".to_string(),
            description: "Damage a combatant without an attack roll, e.g. a trap or an area effect.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target": { "type": "string" },
                    "amount": { "type": "integer", "minimum": 0 },
                    "source": { "type": "string" }
                },
                "required": ["target", "amount"]
            }),
        }
    }

    fn heal_combatant() -> Tool {
        Tool {
            name: "heal_combatant".to_string(),
            description: "Restore hit points to a combatant, capped at their maximum.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target": { "type": "string" },
                    "amount": { "type": "integer", "minimum": 0 },
                    "source": { "type": "string" }
                },
                "required": ["target", "amount"]
            }),
        }
    }

    fn end_turn() -> Tool {
        Tool {
            name: "end_turn".to_string(),
            description: "Advance to the next combatant in initiative order.".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    fn check_combat_end() -> Tool {
        Tool {
            name: "check_combat_end".to_string(),
            description: "Check whether one side has been defeated.".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    fn end_combat() -> Tool {
        Tool {
            name: "end_combat".to_string(),
            description: "Force the combat to end, e.g. when the player flees or the enemies surrender.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "victory, defeat, draw, or a short reason such as 'fled'"
                    }
                },
                "required": ["reason"]
            }),
        }
    }

    fn get_combat_status() -> Tool {
        Tool {
            name: "get_combat_status".to_string(),
            description: "Show the round, whose turn it is and every combatant's hit points.".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    fn report_turn() -> Tool {
        Tool {
            name: "report_turn".to_string(),
            description: "Report the turn once it is resolved and the fight goes on. Ends your turn.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "outcomes": outcome_schema(),
                    "events": event_schema()
                },
                "required": ["summary"]
            }),
        }
    }

    fn conclude_combat() -> Tool {
        Tool {
            name: "conclude_combat".to_string(),
            description: "Report the end of the fight with winners, rewards and a closing summary. Ends your turn and returns to the story.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "winners": { "type": "array", "items": { "type": "string" } },
                    "outcomes": outcome_schema(),
                    "events": event_schema()
                },
                "required": ["summary", "winners"]
            }),
        }
    }
}

fn outcome_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "hp_change": { "type": "integer" },
                "status_effects": { "type": "array", "items": { "type": "string" } },
                "is_dead": { "type": "boolean" }
            },
            "required": ["name"]
        }
    })
}

fn event_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["damage", "healing", "inventory", "xp", "gold"]
                },
                "target": { "type": "string" },
                "amount": { "type": "integer" },
                "item": { "type": "string" },
                "quantity": { "type": "integer" }
            },
            "required": ["kind"]
        }
    })
}

/// Parse a tool call into an action. `None` means the tool is unknown or
/// its input is malformed.
pub fn parse_tool_call(name: &str, input: &Value) -> Option<Action> {
    match name {
        "start_combat" => Some(Action::StartCombat(decode(input)?)),
        "damage_character" => Some(Action::DamageCharacter {
            amount: positive(input, "amount")?,
            source: text_or(input, "source", "an unknown source"),
        }),
        "heal_character" => Some(Action::HealCharacter {
            amount: positive(input, "amount")?,
            source: text_or(input, "source", "rest"),
        }),
        "grant_xp" => Some(Action::GrantXp {
            amount: positive(input, "amount")?,
            reason: text_or(input, "reason", "their deeds"),
        }),
        "add_gold" => Some(Action::AddGold {
            amount: i32::try_from(input["amount"].as_i64()?).ok()?,
            reason: text_or(input, "reason", "unspecified"),
        }),
        "add_item" => Some(Action::AddItem {
            item: input["item"].as_str()?.to_string(),
            quantity: quantity(input)?,
        }),
        "remove_item" => Some(Action::RemoveItem {
            item: input["item"].as_str()?.to_string(),
            quantity: quantity(input)?,
        }),
        "skill_check" => Some(Action::SkillCheck {
            skill: input["skill"].as_str()?.to_string(),
            difficulty: match input.get("difficulty") {
                None | Some(Value::Null) => 0,
                Some(d) => i32::try_from(d.as_i64()?).ok()?,
            },
        }),
        "end_scenario" => Some(Action::EndScenario(decode(input)?)),
        "execute_attack" => Some(Action::ExecuteAttack {
            attacker: input["attacker"].as_str()?.to_string(),
            target: input["target"].as_str()?.to_string(),
            damage: input["damage"].as_str().map(str::to_string),
            damage_modifier: input["damage_modifier"]
                .as_i64()
                .and_then(|m| i32::try_from(m).ok())
                .unwrap_or(0),
        }),
        "apply_direct_damage" => Some(Action::ApplyDirectDamage {
            target: input["target"].as_str()?.to_string(),
            amount: amount(input, "amount")?,
            source: text_or(input, "source", "an unknown source"),
        }),
        "heal_combatant" => Some(Action::HealCombatant {
            target: input["target"].as_str()?.to_string(),
            amount: amount(input, "amount")?,
            source: text_or(input, "source", "healing"),
        }),
        "end_turn" => Some(Action::EndTurn),
        "check_combat_end" => Some(Action::CheckCombatEnd),
        "end_combat" => Some(Action::EndCombat {
            reason: input["reason"].as_str()?.to_string(),
        }),
        "get_combat_status" => Some(Action::GetCombatStatus),
        "report_turn" => Some(Action::ReportTurn(decode(input)?)),
        "conclude_combat" => Some(Action::ConcludeCombat(decode(input)?)),
        _ => None,
    }
}

fn decode<T: DeserializeOwned>(input: &Value) -> Option<T> {
    serde_json::from_value(input.clone()).ok()
}

fn amount(input: &Value, key: &str) -> Option<u32> {
    u32::try_from(input[key].as_u64()?).ok()
}

fn positive(input: &Value, key: &str) -> Option<u32> {
    amount(input, key).filter(|&n| n > 0)
}

/// `quantity`, defaulting to 1 when absent.
fn quantity(input: &Value) -> Option<u32> {
    match input.get("quantity") {
        None | Some(Value::Null) => Some(1),
        Some(_) => positive(input, "quantity"),
    }
}

fn text_or(input: &Value, key: &str, default: &str) -> String {
    input[key].as_str().unwrap_or(default).to_string()
}
