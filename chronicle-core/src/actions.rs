//! Game actions requested by the game master and their resolution.
//!
//! The completion service never touches state directly. It turns each tool
//! call into an [`Action`], and the [`ActionResolver`] applies it through the
//! combat engine, the combat store and the character service. Output
//! actions also carry the [`TurnOutcome`] that ends the exchange.

use crate::character::{CharacterError, CharacterService};
use crate::combat::{
    CombatError, CombatState, CombatStore, Combatant, CombatantKind, DamageRoll, EndReason,
    TurnEngine,
};
use crate::dice::{DiceError, DiceExpression, DieType};
use crate::gm::{
    CombatReport, CombatSeed, ScenarioEnd, SeedParticipant, ToolContext, TurnOutcome, TurnReport,
};
use crate::persist::PersistError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Default damage for an attack that names no dice.
const DEFAULT_DAMAGE: &str = "1d6";

/// Most copies of one item a single action may add or remove.
pub const MAX_ITEM_QUANTITY: u32 = 100;

/// Errors from resolving an action. They are reported back to the game
/// master as failed tool results.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("No combat is active")]
    NoActiveCombat,

    #[error("A combat is already active")]
    CombatAlreadyActive,

    #[error("Invalid action: {0}")]
    Invalid(String),

    #[error(transparent)]
    Combat(#[from] CombatError),

    #[error(transparent)]
    Character(#[from] CharacterError),

    #[error(transparent)]
    Dice(#[from] DiceError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Something the game master wants to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // Narrative
    StartCombat(CombatSeed),
    DamageCharacter { amount: u32, source: String },
    HealCharacter { amount: u32, source: String },
    GrantXp { amount: u32, reason: String },
    AddGold { amount: i32, reason: String },
    AddItem { item: String, quantity: u32 },
    RemoveItem { item: String, quantity: u32 },
    EndScenario(ScenarioEnd),

    // Both tracks
    SkillCheck { skill: String, difficulty: i32 },

    // Combat
    ExecuteAttack {
        attacker: String,
        target: String,
        damage: Option<String>,
        damage_modifier: i32,
    },
    ApplyDirectDamage {
        target: String,
        amount: u32,
        source: String,
    },
    HealCombatant {
        target: String,
        amount: u32,
        source: String,
    },
    EndTurn,
    CheckCombatEnd,
    EndCombat { reason: String },
    GetCombatStatus,
    ReportTurn(TurnReport),
    ConcludeCombat(CombatReport),
}

impl Action {
    /// Whether resolving this action decides the exchange's outcome.
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            Action::StartCombat(_)
                | Action::EndScenario(_)
                | Action::ReportTurn(_)
                | Action::ConcludeCombat(_)
        )
    }
}

/// The result of resolving one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Text returned to the game master.
    pub message: String,
    pub outcome: Option<TurnOutcome>,
}

impl Resolution {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            outcome: None,
        }
    }

    pub fn with_outcome(mut self, outcome: TurnOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// Applies actions to combat and character state.
pub struct ActionResolver {
    combats: Arc<dyn CombatStore>,
    characters: Arc<dyn CharacterService>,
    engine: TurnEngine,
    rng: Mutex<StdRng>,
}

impl ActionResolver {
    pub fn new(
        combats: Arc<dyn CombatStore>,
        characters: Arc<dyn CharacterService>,
        engine: TurnEngine,
    ) -> Self {
        Self {
            combats,
            characters,
            engine,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Make every draw repeatable.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn engine(&self) -> &TurnEngine {
        &self.engine
    }

    /// Resolve one action for the session in `ctx`.
    pub fn resolve(&self, ctx: &ToolContext, action: Action) -> Result<Resolution, ActionError> {
        debug!(session = %ctx.session_id, ?action, "resolving action");
        match action {
            Action::StartCombat(seed) => self.start_combat(ctx, seed),
            Action::DamageCharacter { amount, source } => {
                let sheet = self.characters.apply_damage(ctx.character_id, amount)?;
                Ok(Resolution::new(format!(
                    "{} takes {amount} damage from {source}. HP {}/{}",
                    sheet.name, sheet.current_hp, sheet.max_hp
                )))
            }
            Action::HealCharacter { amount, source } => {
                let sheet = self.characters.apply_heal(ctx.character_id, amount)?;
                Ok(Resolution::new(format!(
                    "{} is healed by {source}. HP {}/{}",
                    sheet.name, sheet.current_hp, sheet.max_hp
                )))
            }
            Action::GrantXp { amount, reason } => {
                let sheet = self.characters.apply_xp(ctx.character_id, amount)?;
                Ok(Resolution::new(format!(
                    "{} gains {amount} XP for {reason}. Total {}",
                    sheet.name, sheet.xp
                )))
            }
            Action::AddGold { amount, reason } => {
                let sheet = self
                    .characters
                    .apply_gold(ctx.character_id, i64::from(amount))?;
                Ok(Resolution::new(format!(
                    "Gold changed by {amount} ({reason}). {} now has {} gold",
                    sheet.name, sheet.gold
                )))
            }
            Action::AddItem { item, quantity } => {
                let quantity = item_quantity(&item, quantity)?;
                let sheet = self.characters.add_item(ctx.character_id, &item, quantity)?;
                Ok(Resolution::new(format!(
                    "Added {quantity} x {item}. {} now carries {}",
                    sheet.name,
                    sheet.item_count(&item)
                )))
            }
            Action::RemoveItem { item, quantity } => {
                let quantity = item_quantity(&item, quantity)?;
                let sheet = self.characters.sheet(ctx.character_id)?;
                if sheet.item_count(&item) == 0 {
                    return Err(ActionError::Invalid(format!(
                        "{} carries no {item}",
                        sheet.name
                    )));
                }
                let (sheet, removed) =
                    self.characters
                        .remove_item(ctx.character_id, &item, quantity)?;
                Ok(Resolution::new(format!(
                    "Removed {removed} x {item}. {} now carries {}",
                    sheet.name,
                    sheet.item_count(&item)
                )))
            }
            Action::SkillCheck { skill, difficulty } => {
                let sheet = self.characters.sheet(ctx.character_id)?;
                let level = sheet.skill_level(&skill);
                let target = i64::from(level) - i64::from(difficulty);
                let roll = {
                    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                    DieType::D100.roll(&mut *rng)
                };
                let success = i64::from(roll) <= target;
                debug!(session = %ctx.session_id, %skill, roll, target, success, "skill check");
                Ok(Resolution::new(format!(
                    "{} tests {skill} (skill {level}, difficulty {difficulty}): rolled {roll} against {target}, {}",
                    sheet.name,
                    if success { "success" } else { "failure" }
                )))
            }
            Action::EndScenario(end) => Ok(Resolution::new(format!(
                "Scenario concluded: {}",
                end.outcome
            ))
            .with_outcome(TurnOutcome::ScenarioEnd(end))),

            Action::ExecuteAttack {
                attacker,
                target,
                damage,
                damage_modifier,
            } => {
                let expr = DiceExpression::parse(damage.as_deref().unwrap_or(DEFAULT_DAMAGE))?;
                self.with_combat(ctx, |state, engine, rng| {
                    let attacker = state.resolve(&attacker)?;
                    let target = state.resolve(&target)?;
                    let roll = DamageRoll::rolled(&expr, damage_modifier, rng);
                    let outcome = engine.attack(state, attacker, target, roll, rng)?;
                    Ok(with_end_hint(outcome.describe(), outcome.combat_over.as_ref()))
                })
            }
            Action::ApplyDirectDamage {
                target,
                amount,
                source,
            } => self.with_combat(ctx, |state, engine, _| {
                let target = state.resolve(&target)?;
                let change = engine.apply_direct_damage(state, target, amount, &source)?;
                let text = format!(
                    "{} takes {} damage from {source}, {}/{} HP",
                    change.target, change.amount, change.current_hp, change.max_hp
                );
                Ok(with_end_hint(text, change.combat_over.as_ref()))
            }),
            Action::HealCombatant {
                target,
                amount,
                source,
            } => self.with_combat(ctx, |state, engine, _| {
                let target = state.resolve(&target)?;
                let change = engine.heal(state, target, amount, &source)?;
                Ok(format!(
                    "{} recovers {} HP from {source}, {}/{} HP",
                    change.target, change.amount, change.current_hp, change.max_hp
                ))
            }),
            Action::EndTurn => self.with_combat(ctx, |state, engine, _| {
                let next = engine.end_turn(state)?.name.clone();
                Ok(format!("Round {}: it is now {next}'s turn", state.round))
            }),
            Action::CheckCombatEnd => {
                let state = self.active_combat(ctx)?;
                Ok(Resolution::new(match TurnEngine::check_end(&state.combatants) {
                    Some(reason) => format!("Combat is over: {reason}"),
                    None => "Combat continues".to_string(),
                }))
            }
            Action::EndCombat { reason } => self.with_combat(ctx, |state, engine, _| {
                let reason = EndReason::from_label(&reason);
                engine.end_combat(state, reason.clone())?;
                Ok(format!("Combat ended: {reason}"))
            }),
            Action::GetCombatStatus => Ok(Resolution::new(self.active_combat(ctx)?.describe())),
            Action::ReportTurn(report) => {
                self.active_combat(ctx)?;
                Ok(Resolution::new("Turn recorded")
                    .with_outcome(TurnOutcome::CombatTurnContinue(report)))
            }
            Action::ConcludeCombat(report) => {
                self.active_combat(ctx)?;
                Ok(Resolution::new("Combat concluded")
                    .with_outcome(TurnOutcome::CombatTurnEnd(report)))
            }
        }
    }

    fn start_combat(&self, ctx: &ToolContext, seed: CombatSeed) -> Result<Resolution, ActionError> {
        if seed.participants.is_empty() {
            return Err(ActionError::Invalid(
                "start_combat needs at least one participant".to_string(),
            ));
        }
        if self
            .combats
            .load(ctx.session_id)?
            .is_some_and(|c| c.is_ongoing())
        {
            return Err(ActionError::CombatAlreadyActive);
        }

        let sheet = self.characters.sheet(ctx.character_id)?;
        let state = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let player_init = DieType::D20.roll(&mut *rng) as i32 + sheet.initiative_bonus;

            let mut combatants = vec![Combatant::player(&sheet.name, sheet.max_hp, player_init)
                .with_current_hp(sheet.current_hp)
                .with_bonuses(sheet.attack_bonus, sheet.defense_bonus)
                .for_character(sheet.id)];
            combatants.extend(
                seed.participants
                    .iter()
                    .map(|p| npc_from_seed(p, DieType::D20.roll(&mut *rng) as i32)),
            );
            self.engine
                .start(ctx.session_id, combatants, seed.location.clone())?
        };
        self.combats.save(&state)?;
        info!(session = %ctx.session_id, combat = %state.id, "combat created");

        Ok(Resolution::new(format!("Combat started.\n{}", state.describe()))
            .with_outcome(TurnOutcome::CombatSeed(seed)))
    }

    fn active_combat(&self, ctx: &ToolContext) -> Result<CombatState, ActionError> {
        self.combats
            .load(ctx.session_id)?
            .filter(CombatState::is_ongoing)
            .ok_or(ActionError::NoActiveCombat)
    }

    /// Run `op` on the active combat and save the result. Nothing is saved
    /// when `op` fails.
    fn with_combat<F>(&self, ctx: &ToolContext, op: F) -> Result<Resolution, ActionError>
    where
        F: FnOnce(&mut CombatState, &TurnEngine, &mut StdRng) -> Result<String, CombatError>,
    {
        let mut state = self.active_combat(ctx)?;
        let message = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut state, &self.engine, &mut *rng)?
        };
        self.combats.save(&state)?;
        Ok(Resolution::new(message))
    }
}

fn item_quantity(item: &str, quantity: u32) -> Result<u32, ActionError> {
    if item.trim().is_empty() {
        return Err(ActionError::Invalid("item name is empty".to_string()));
    }
    if quantity == 0 || quantity > MAX_ITEM_QUANTITY {
        return Err(ActionError::Invalid(format!(
            "quantity must be between 1 and {MAX_ITEM_QUANTITY}, got {quantity}"
        )));
    }
    Ok(quantity)
}

fn npc_from_seed(p: &SeedParticipant, rolled: i32) -> Combatant {
    let initiative = p.initiative.unwrap_or(rolled + p.initiative_bonus);
    Combatant::new(&p.name, CombatantKind::Npc, p.hp.max(1), initiative)
        .with_bonuses(p.attack_bonus, p.defense_bonus)
}

fn with_end_hint(mut text: String, over: Option<&EndReason>) -> String {
    if let Some(reason) = over {
        text.push_str(&format!(
            ". Combat is over ({reason}); conclude it with conclude_combat"
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterSheet, MemoryCharacterStore};
    use crate::combat::MemoryCombatStore;
    use crate::history::Track;
    use crate::ids::SessionId;

    struct Fixture {
        resolver: ActionResolver,
        combats: Arc<MemoryCombatStore>,
        characters: Arc<MemoryCharacterStore>,
        ctx: ToolContext,
    }

    fn fixture() -> Fixture {
        let combats = Arc::new(MemoryCombatStore::new());
        let characters = Arc::new(MemoryCharacterStore::new());
        let sheet = CharacterSheet::new("Mira", 20).with_bonuses(2, 1, 3);
        characters.create(&sheet).unwrap();
        let resolver = ActionResolver::new(combats.clone(), characters.clone(), TurnEngine::default())
            .with_seed(11);
        let ctx = ToolContext {
            session_id: SessionId::new(),
            character_id: sheet.id,
            track: Track::Narrative,
        };
        Fixture {
            resolver,
            combats,
            characters,
            ctx,
        }
    }

    fn seed() -> CombatSeed {
        CombatSeed {
            location: "ruined chapel".into(),
            description: "Ghouls rise from the crypt".into(),
            participants: vec![
                SeedParticipant::new("Ghoul", 9).with_initiative(30),
                SeedParticipant::new("Ghast", 12).with_initiative(-10),
            ],
        }
    }

    #[test]
    fn test_start_combat_creates_state() {
        let f = fixture();
        let resolution = f
            .resolver
            .resolve(&f.ctx, Action::StartCombat(seed()))
            .unwrap();
        assert!(matches!(resolution.outcome, Some(TurnOutcome::CombatSeed(_))));

        let state = f.combats.load(f.ctx.session_id).unwrap().unwrap();
        assert_eq!(state.combatants.len(), 3);
        assert_eq!(state.combatants[0].name, "Ghoul");
        assert_eq!(state.combatants[1].name, "Mira");
        assert_eq!(state.combatants[1].character_id, Some(f.ctx.character_id));
        assert_eq!(state.combatants[2].name, "Ghast");

        let err = f
            .resolver
            .resolve(&f.ctx, Action::StartCombat(seed()))
            .unwrap_err();
        assert!(matches!(err, ActionError::CombatAlreadyActive));
    }

    #[test]
    fn test_combat_actions_require_combat() {
        let f = fixture();
        let err = f.resolver.resolve(&f.ctx, Action::EndTurn).unwrap_err();
        assert!(matches!(err, ActionError::NoActiveCombat));
    }

    #[test]
    fn test_failed_action_leaves_state_unchanged() {
        let f = fixture();
        f.resolver
            .resolve(&f.ctx, Action::StartCombat(seed()))
            .unwrap();
        let before = f.combats.load(f.ctx.session_id).unwrap();

        let err = f
            .resolver
            .resolve(
                &f.ctx,
                Action::ExecuteAttack {
                    attacker: "Mira".into(),
                    target: "Dragon".into(),
                    damage: None,
                    damage_modifier: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ActionError::Combat(CombatError::UnknownCombatant(_))));
        assert_eq!(f.combats.load(f.ctx.session_id).unwrap(), before);
    }

    #[test]
    fn test_direct_damage_reports_end() {
        let f = fixture();
        f.resolver
            .resolve(&f.ctx, Action::StartCombat(seed()))
            .unwrap();
        for target in ["Ghoul", "Ghast"] {
            f.resolver
                .resolve(
                    &f.ctx,
                    Action::ApplyDirectDamage {
                        target: target.into(),
                        amount: 99,
                        source: "holy fire".into(),
                    },
                )
                .unwrap();
        }
        let check = f
            .resolver
            .resolve(&f.ctx, Action::CheckCombatEnd)
            .unwrap();
        assert_eq!(check.message, "Combat is over: victory");
    }

    #[test]
    fn test_end_turn_and_end_combat() {
        let f = fixture();
        f.resolver
            .resolve(&f.ctx, Action::StartCombat(seed()))
            .unwrap();
        let next = f.resolver.resolve(&f.ctx, Action::EndTurn).unwrap();
        assert_eq!(next.message, "Round 1: it is now Mira's turn");

        f.resolver
            .resolve(
                &f.ctx,
                Action::EndCombat {
                    reason: "fled".into(),
                },
            )
            .unwrap();
        let state = f.combats.load(f.ctx.session_id).unwrap().unwrap();
        assert_eq!(state.end_reason, Some(EndReason::Manual("fled".into())));
        assert!(matches!(
            f.resolver.resolve(&f.ctx, Action::GetCombatStatus),
            Err(ActionError::NoActiveCombat)
        ));
    }

    #[test]
    fn test_narrative_actions_hit_character_sheet() {
        let f = fixture();
        f.resolver
            .resolve(
                &f.ctx,
                Action::DamageCharacter {
                    amount: 8,
                    source: "a falling beam".into(),
                },
            )
            .unwrap();
        f.resolver
            .resolve(
                &f.ctx,
                Action::AddGold {
                    amount: 15,
                    reason: "loot".into(),
                },
            )
            .unwrap();
        let sheet = f.characters.sheet(f.ctx.character_id).unwrap();
        assert_eq!(sheet.current_hp, 12);
        assert_eq!(sheet.gold, 15);
    }

    #[test]
    fn test_inventory_actions() {
        let f = fixture();
        let added = f
            .resolver
            .resolve(
                &f.ctx,
                Action::AddItem {
                    item: "torch".into(),
                    quantity: 3,
                },
            )
            .unwrap();
        assert_eq!(added.message, "Added 3 x torch. Mira now carries 3");

        let removed = f
            .resolver
            .resolve(
                &f.ctx,
                Action::RemoveItem {
                    item: "torch".into(),
                    quantity: 5,
                },
            )
            .unwrap();
        assert_eq!(removed.message, "Removed 3 x torch. Mira now carries 0");

        let err = f
            .resolver
            .resolve(
                &f.ctx,
                Action::RemoveItem {
                    item: "torch".into(),
                    quantity: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ActionError::Invalid(_)));

        for quantity in [0, MAX_ITEM_QUANTITY + 1] {
            let err = f
                .resolver
                .resolve(
                    &f.ctx,
                    Action::AddItem {
                        item: "arrow".into(),
                        quantity,
                    },
                )
                .unwrap_err();
            assert!(matches!(err, ActionError::Invalid(_)));
        }
        assert!(f
            .characters
            .sheet(f.ctx.character_id)
            .unwrap()
            .inventory
            .is_empty());
    }

    #[test]
    fn test_skill_check_compares_d100_to_skill_minus_difficulty() {
        let f = fixture();
        f.characters
            .update(f.ctx.character_id, &mut |c: &mut CharacterSheet| {
                c.skills.insert("stealth".into(), 100);
            })
            .unwrap();

        for _ in 0..50 {
            let sure = f
                .resolver
                .resolve(
                    &f.ctx,
                    Action::SkillCheck {
                        skill: "Stealth".into(),
                        difficulty: 0,
                    },
                )
                .unwrap();
            assert!(sure.message.ends_with("against 100, success"), "{}", sure.message);

            let hopeless = f
                .resolver
                .resolve(
                    &f.ctx,
                    Action::SkillCheck {
                        skill: "stealth".into(),
                        difficulty: 100,
                    },
                )
                .unwrap();
            assert!(hopeless.message.ends_with("against 0, failure"));
        }

        let untrained = f
            .resolver
            .resolve(
                &f.ctx,
                Action::SkillCheck {
                    skill: "juggling".into(),
                    difficulty: 0,
                },
            )
            .unwrap();
        assert!(untrained.message.contains("(skill 10, difficulty 0)"));
        assert!(untrained.outcome.is_none());
    }

    #[test]
    fn test_bad_damage_notation() {
        let f = fixture();
        f.resolver
            .resolve(&f.ctx, Action::StartCombat(seed()))
            .unwrap();
        let err = f
            .resolver
            .resolve(
                &f.ctx,
                Action::ExecuteAttack {
                    attacker: "Mira".into(),
                    target: "Ghoul".into(),
                    damage: Some("2d7".into()),
                    damage_modifier: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ActionError::Dice(DiceError::InvalidDieSize(7))));

        let before = f.combats.load(f.ctx.session_id).unwrap();
        let err = f
            .resolver
            .resolve(
                &f.ctx,
                Action::ExecuteAttack {
                    attacker: "Mira".into(),
                    target: "Ghoul".into(),
                    damage: Some("1000000000d100".into()),
                    damage_modifier: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ActionError::Dice(DiceError::InvalidNotation(_))));
        assert_eq!(f.combats.load(f.ctx.session_id).unwrap(), before);
    }
}
