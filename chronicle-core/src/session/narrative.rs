//! Narrative-mode handling of an exchange's outcome.

use super::dispatcher::GameStores;
use super::effects::Effects;
use super::record::{ScenarioStatus, SessionRecord};
use super::SessionError;
use crate::gm::{ScenarioEnd, ScenarioOutcome, TurnOutcome};
use tracing::{info, warn};

/// Apply a narrative exchange's outcome to the session record. Character
/// writes go into `effects`.
pub(super) fn apply_outcome(
    stores: &GameStores,
    record: &mut SessionRecord,
    outcome: &TurnOutcome,
    effects: &mut Effects,
) -> Result<(), SessionError> {
    match outcome {
        TurnOutcome::Continue { .. } => {}
        TurnOutcome::CombatSeed(seed) => match stores.combats.load(record.id)? {
            Some(state) if state.is_ongoing() => {
                info!(
                    session = %record.id,
                    combat = %state.id,
                    location = %seed.location,
                    combatants = state.combatants.len(),
                    "entering combat"
                );
                record.enter_combat(state.id);
            }
            _ => warn!(
                session = %record.id,
                "combat seed without a stored combat, staying in narrative"
            ),
        },
        TurnOutcome::CombatTurnContinue(_) | TurnOutcome::CombatTurnEnd(_) => warn!(
            session = %record.id,
            outcome = outcome.label(),
            "combat report outside combat ignored"
        ),
        TurnOutcome::ScenarioEnd(end) => conclude_scenario(record, end, effects),
    }
    Ok(())
}

/// Record the scenario's end. A success pays out its rewards.
pub(super) fn conclude_scenario(
    record: &mut SessionRecord,
    end: &ScenarioEnd,
    effects: &mut Effects,
) {
    if !record.conclude(end.outcome.into()) {
        info!(
            session = %record.id,
            status = %record.scenario_status,
            "scenario already concluded"
        );
        return;
    }
    info!(session = %record.id, outcome = %end.outcome, "scenario concluded");

    let Some(rewards) = end.rewards.as_ref() else {
        return;
    };
    if end.outcome != ScenarioOutcome::Success {
        return;
    }
    effects.xp = effects.xp.saturating_add(rewards.xp);
    effects.gold = effects.gold.saturating_add(i64::from(rewards.gold));
    effects
        .items
        .extend(rewards.items.iter().map(|item| (item.clone(), 1)));
}

/// A character at zero hit points ends the scenario in death. Runs after
/// every exchange, whatever the exchange did.
pub(super) fn check_death(stores: &GameStores, record: &mut SessionRecord) {
    match stores.characters.current_hit_points(record.character_id) {
        Ok(0) => {
            if record.conclude(ScenarioStatus::Death) {
                info!(
                    session = %record.id,
                    character = %record.character_id,
                    "player character has died"
                );
            }
        }
        Ok(_) => {}
        Err(e) => warn!(session = %record.id, error = %e, "death check failed"),
    }
}
