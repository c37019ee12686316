//! Combat rules: initiative, turn cycle, attacks, damage and end detection.
//!
//! The engine holds no combat of its own. Every operation takes the
//! [`CombatState`] it acts on, validates first and mutates only once the
//! operation is known to succeed.

use super::state::{CombatState, CombatStatus, Combatant, CombatantKind, EndReason};
use super::CombatError;
use crate::dice::{DiceExpression, RollGranularity};
use crate::ids::{CombatId, CombatantId, SessionId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Damage dealt by a successful attack: a base amount and a signed modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageRoll {
    pub base: i32,
    pub modifier: i32,
}

impl DamageRoll {
    pub fn new(base: i32, modifier: i32) -> Self {
        Self { base, modifier }
    }

    /// Roll a dice expression for the base amount.
    pub fn rolled<R: Rng>(expr: &DiceExpression, modifier: i32, rng: &mut R) -> Self {
        Self::new(expr.roll(rng).total, modifier)
    }
}

/// What one attack did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub attacker: String,
    pub target: String,
    pub attack_roll: i32,
    pub defense_roll: i32,
    pub hit: bool,
    /// Hit points actually removed.
    pub damage: u32,
    pub target_hp: u32,
    pub target_down: bool,
    /// End condition reached as a result of this attack, if any.
    pub combat_over: Option<EndReason>,
}

impl AttackOutcome {
    pub fn describe(&self) -> String {
        if self.hit {
            let mut text = format!(
                "{} hits {} ({} vs {}) for {} damage, {} HP left",
                self.attacker,
                self.target,
                self.attack_roll,
                self.defense_roll,
                self.damage,
                self.target_hp
            );
            if self.target_down {
                text.push_str(&format!(". {} is down", self.target));
            }
            text
        } else {
            format!(
                "{} misses {} ({} vs {})",
                self.attacker, self.target, self.attack_roll, self.defense_roll
            )
        }
    }
}

/// Result of direct damage or healing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthChange {
    pub target: String,
    /// Hit points actually removed or restored.
    pub amount: u32,
    pub current_hp: u32,
    pub max_hp: u32,
    pub combat_over: Option<EndReason>,
}

/// Stateless combat rules, parameterised by the draw granularity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnEngine {
    granularity: RollGranularity,
}

impl TurnEngine {
    pub fn new(granularity: RollGranularity) -> Self {
        Self { granularity }
    }

    pub fn granularity(&self) -> RollGranularity {
        self.granularity
    }

    /// Sort descending by initiative. Ties keep their submission order.
    pub fn order_by_initiative(combatants: &mut [Combatant]) {
        combatants.sort_by(|a, b| b.initiative.cmp(&a.initiative));
    }

    /// Begin a combat. The initiative order is fixed here for the whole fight.
    pub fn start(
        &self,
        session_id: SessionId,
        mut combatants: Vec<Combatant>,
        location: impl Into<String>,
    ) -> Result<CombatState, CombatError> {
        if combatants.is_empty() {
            return Err(CombatError::NoCombatants);
        }
        Self::order_by_initiative(&mut combatants);

        let mut state = CombatState {
            id: CombatId::new(),
            session_id,
            combatants,
            current_turn: 0,
            round: 1,
            status: CombatStatus::Ongoing,
            log: Vec::new(),
            end_reason: None,
            location: location.into(),
        };

        let order = state
            .combatants
            .iter()
            .map(|c| format!("{} ({})", c.name, c.initiative))
            .collect::<Vec<_>>()
            .join(", ");
        state.add_log(format!("Combat begins. Initiative order: {order}"));
        debug!(combat = %state.id, session = %session_id, "combat started");
        Ok(state)
    }

    /// Advance to the next combatant, wrapping to the top of the order and
    /// incrementing the round. Returns the combatant whose turn it now is.
    pub fn end_turn<'a>(&self, state: &'a mut CombatState) -> Result<&'a Combatant, CombatError> {
        ensure_ongoing(state)?;
        let count = state.combatants.len();
        if count == 0 {
            return Err(CombatError::NoCombatants);
        }

        state.current_turn = (state.current_turn + 1) % count;
        if state.current_turn == 0 {
            state.round += 1;
        }

        let name = state.combatants[state.current_turn].name.clone();
        state.add_log(format!("{name}'s turn"));
        Ok(&state.combatants[state.current_turn])
    }

    /// One bounded draw at the configured granularity.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> i32 {
        self.granularity.die().roll(rng) as i32
    }

    /// An attack lands only if it strictly beats the defense.
    pub fn resolve_attack(attack: i32, defense: i32) -> bool {
        attack > defense
    }

    /// Base plus modifier, never negative.
    pub fn calculate_damage(base: i32, modifier: i32) -> u32 {
        base.saturating_add(modifier).max(0) as u32
    }

    /// Resolve one attack between two living combatants.
    pub fn attack<R: Rng>(
        &self,
        state: &mut CombatState,
        attacker_id: CombatantId,
        target_id: CombatantId,
        damage: DamageRoll,
        rng: &mut R,
    ) -> Result<AttackOutcome, CombatError> {
        ensure_ongoing(state)?;
        let attacker = living(state, attacker_id)?.clone();
        let target_bonus = living(state, target_id)?.defense_bonus;

        let attack_roll = self.draw(rng) + attacker.attack_bonus;
        let defense_roll = self.draw(rng) + target_bonus;
        let hit = Self::resolve_attack(attack_roll, defense_roll);

        let target = state
            .combatant_mut(target_id)
            .ok_or_else(|| CombatError::UnknownCombatant(target_id.to_string()))?;
        let dealt = if hit {
            target.take_damage(Self::calculate_damage(damage.base, damage.modifier))
        } else {
            0
        };

        let mut outcome = AttackOutcome {
            attacker: attacker.name,
            target: target.name.clone(),
            attack_roll,
            defense_roll,
            hit,
            damage: dealt,
            target_hp: target.current_hp,
            target_down: !target.is_alive(),
            combat_over: None,
        };
        outcome.combat_over = Self::check_end(&state.combatants);
        state.add_log(outcome.describe());
        Ok(outcome)
    }

    /// Damage that bypasses the attack roll, e.g. a trap.
    pub fn apply_direct_damage(
        &self,
        state: &mut CombatState,
        target_id: CombatantId,
        amount: u32,
        source: &str,
    ) -> Result<HealthChange, CombatError> {
        ensure_ongoing(state)?;
        let target = state
            .combatant_mut(target_id)
            .ok_or_else(|| CombatError::UnknownCombatant(target_id.to_string()))?;
        let dealt = target.take_damage(amount);
        let mut change = HealthChange {
            target: target.name.clone(),
            amount: dealt,
            current_hp: target.current_hp,
            max_hp: target.max_hp,
            combat_over: None,
        };
        change.combat_over = Self::check_end(&state.combatants);
        state.add_log(format!(
            "{} takes {dealt} damage from {source}, {} HP left",
            change.target, change.current_hp
        ));
        Ok(change)
    }

    /// Restore hit points, capped at the maximum.
    pub fn heal(
        &self,
        state: &mut CombatState,
        target_id: CombatantId,
        amount: u32,
        source: &str,
    ) -> Result<HealthChange, CombatError> {
        ensure_ongoing(state)?;
        let target = state
            .combatant_mut(target_id)
            .ok_or_else(|| CombatError::UnknownCombatant(target_id.to_string()))?;
        let restored = target.heal(amount);
        let mut change = HealthChange {
            target: target.name.clone(),
            amount: restored,
            current_hp: target.current_hp,
            max_hp: target.max_hp,
            combat_over: None,
        };
        change.combat_over = Self::check_end(&state.combatants);
        state.add_log(format!(
            "{} recovers {restored} HP from {source}, now {}/{}",
            change.target, change.current_hp, change.max_hp
        ));
        Ok(change)
    }

    /// Pure end-of-combat predicate over the combatant list.
    pub fn check_end(combatants: &[Combatant]) -> Option<EndReason> {
        let side_up = |kind: CombatantKind| {
            combatants
                .iter()
                .any(|c| c.kind == kind && c.is_alive())
        };
        match (side_up(CombatantKind::Player), side_up(CombatantKind::Npc)) {
            (true, true) => None,
            (true, false) => Some(EndReason::Victory),
            (false, true) => Some(EndReason::Defeat),
            (false, false) => Some(EndReason::Draw),
        }
    }

    /// Mark the combat ended. Deleting the stored record is the caller's job.
    pub fn end_combat(&self, state: &mut CombatState, reason: EndReason) -> Result<(), CombatError> {
        ensure_ongoing(state)?;
        state.add_log(format!("Combat ends: {reason}"));
        state.status = CombatStatus::Ended;
        debug!(combat = %state.id, %reason, "combat ended");
        state.end_reason = Some(reason);
        Ok(())
    }
}

fn ensure_ongoing(state: &CombatState) -> Result<(), CombatError> {
    if state.is_ongoing() {
        Ok(())
    } else {
        Err(CombatError::AlreadyEnded(state.id))
    }
}

fn living(state: &CombatState, id: CombatantId) -> Result<&Combatant, CombatError> {
    let combatant = state
        .combatant(id)
        .ok_or_else(|| CombatError::UnknownCombatant(id.to_string()))?;
    if combatant.is_alive() {
        Ok(combatant)
    } else {
        Err(CombatError::CombatantDown(combatant.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn skirmish() -> CombatState {
        TurnEngine::default()
            .start(
                SessionId::new(),
                vec![
                    Combatant::player("Hero", 20, 12),
                    Combatant::npc("Goblin", 7, 15),
                    Combatant::npc("Wolf", 11, 12),
                ],
                "forest road",
            )
            .unwrap()
    }

    #[test]
    fn test_start_orders_by_initiative_stably() {
        let state = skirmish();
        let names: Vec<_> = state.combatants.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Goblin", "Hero", "Wolf"]);
        assert_eq!(state.round, 1);
        assert_eq!(state.current_turn, 0);
        assert!(state.log[0].starts_with("Round 1 - Combat begins"));
    }

    #[test]
    fn test_start_without_combatants() {
        let err = TurnEngine::default()
            .start(SessionId::new(), vec![], "nowhere")
            .unwrap_err();
        assert_eq!(err, CombatError::NoCombatants);
    }

    #[test]
    fn test_end_turn_wraps_and_counts_rounds() {
        let engine = TurnEngine::default();
        let mut state = skirmish();

        assert_eq!(engine.end_turn(&mut state).unwrap().name, "Hero");
        assert_eq!(engine.end_turn(&mut state).unwrap().name, "Wolf");
        assert_eq!(state.round, 1);
        assert_eq!(engine.end_turn(&mut state).unwrap().name, "Goblin");
        assert_eq!(state.round, 2);
        assert_eq!(state.current_turn, 0);
    }

    #[test]
    fn test_end_turn_with_no_combatants() {
        let engine = TurnEngine::default();
        let mut state = skirmish();
        state.combatants.clear();
        assert_eq!(engine.end_turn(&mut state), Err(CombatError::NoCombatants));
        assert_eq!(state.round, 1);
    }

    #[test]
    fn test_calculate_damage_never_negative() {
        assert_eq!(TurnEngine::calculate_damage(5, 2), 7);
        assert_eq!(TurnEngine::calculate_damage(3, -5), 0);
        assert_eq!(TurnEngine::calculate_damage(-4, 0), 0);
        assert_eq!(TurnEngine::calculate_damage(i32::MAX, 1), i32::MAX as u32);
    }

    #[test]
    fn test_resolve_attack_requires_strictly_greater() {
        assert!(TurnEngine::resolve_attack(11, 10));
        assert!(!TurnEngine::resolve_attack(10, 10));
        assert!(!TurnEngine::resolve_attack(2, 19));
    }

    #[test]
    fn test_attack_stays_within_rules() {
        let engine = TurnEngine::new(RollGranularity::D20);
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = skirmish();
        let hero = state.resolve("hero").unwrap();
        let goblin = state.resolve("Goblin").unwrap();

        let outcome = engine
            .attack(&mut state, hero, goblin, DamageRoll::new(4, 1), &mut rng)
            .unwrap();
        assert!((1..=20).contains(&outcome.attack_roll));
        assert!((1..=20).contains(&outcome.defense_roll));
        assert_eq!(outcome.hit, outcome.attack_roll > outcome.defense_roll);
        let expected_hp = if outcome.hit { 2 } else { 7 };
        assert_eq!(state.combatant(goblin).unwrap().current_hp, expected_hp);
        assert_eq!(state.log.len(), 2);
    }

    #[test]
    fn test_attack_bonus_guarantees_hit() {
        let engine = TurnEngine::default();
        let mut rng = StdRng::seed_from_u64(9);
        let mut state = engine
            .start(
                SessionId::new(),
                vec![
                    Combatant::player("Hero", 20, 10).with_bonuses(100, 0),
                    Combatant::npc("Orc", 10, 5),
                ],
                "",
            )
            .unwrap();
        let hero = state.resolve("Hero").unwrap();
        let orc = state.resolve("Orc").unwrap();

        let outcome = engine
            .attack(&mut state, hero, orc, DamageRoll::new(30, 0), &mut rng)
            .unwrap();
        assert!(outcome.hit);
        assert_eq!(outcome.damage, 10);
        assert!(outcome.target_down);
        assert_eq!(outcome.combat_over, Some(EndReason::Victory));
    }

    #[test]
    fn test_attack_on_downed_target_is_rejected() {
        let engine = TurnEngine::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = skirmish();
        let hero = state.resolve("Hero").unwrap();
        let goblin = state.resolve("Goblin").unwrap();
        engine
            .apply_direct_damage(&mut state, goblin, 100, "falling rocks")
            .unwrap();

        let before = state.clone();
        let err = engine
            .attack(&mut state, hero, goblin, DamageRoll::new(1, 0), &mut rng)
            .unwrap_err();
        assert_eq!(err, CombatError::CombatantDown("Goblin".into()));
        assert_eq!(state, before);
    }

    #[test]
    fn test_direct_damage_and_heal() {
        let engine = TurnEngine::default();
        let mut state = skirmish();
        let hero = state.resolve("Hero").unwrap();

        let hit = engine.apply_direct_damage(&mut state, hero, 25, "trap").unwrap();
        assert_eq!(hit.amount, 20);
        assert_eq!(hit.current_hp, 0);
        assert_eq!(hit.combat_over, Some(EndReason::Defeat));

        let healed = engine.heal(&mut state, hero, 50, "potion").unwrap();
        assert_eq!(healed.amount, 20);
        assert_eq!(healed.current_hp, 20);
        assert_eq!(healed.combat_over, None);
    }

    #[test]
    fn test_check_end() {
        let hero = Combatant::player("Hero", 10, 0);
        let dead_orc = Combatant::npc("Orc", 10, 0).with_current_hp(0);
        let orc = Combatant::npc("Orc", 10, 0);
        let dead_hero = Combatant::player("Hero", 10, 0).with_current_hp(0);

        assert_eq!(
            TurnEngine::check_end(&[hero.clone(), dead_orc.clone()]),
            Some(EndReason::Victory)
        );
        assert_eq!(
            TurnEngine::check_end(&[dead_hero.clone(), orc.clone()]),
            Some(EndReason::Defeat)
        );
        assert_eq!(
            TurnEngine::check_end(&[dead_hero, dead_orc]),
            Some(EndReason::Draw)
        );
        assert_eq!(TurnEngine::check_end(&[hero, orc]), None);
    }

    #[test]
    fn test_end_combat_twice_is_rejected() {
        let engine = TurnEngine::default();
        let mut state = skirmish();
        engine
            .end_combat(&mut state, EndReason::Manual("fled".into()))
            .unwrap();
        assert_eq!(state.status, CombatStatus::Ended);
        assert_eq!(state.end_reason, Some(EndReason::Manual("fled".into())));

        let err = engine.end_combat(&mut state, EndReason::Draw).unwrap_err();
        assert_eq!(err, CombatError::AlreadyEnded(state.id));
        assert!(engine.end_turn(&mut state).is_err());
    }

    #[test]
    fn test_unknown_combatant() {
        let state = skirmish();
        let err = state.resolve("Dragon").unwrap_err();
        assert!(err.is_not_found());
    }
}
