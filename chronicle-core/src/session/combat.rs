//! Combat-mode handling of an exchange's outcome.

use super::dispatcher::GameStores;
use super::effects::Effects;
use super::narrative;
use super::record::{CombatResult, SessionRecord};
use super::SessionError;
use crate::combat::{CombatState, CombatantKind, EndReason, TurnEngine};
use crate::gm::{CombatEvent, CombatReport, TurnOutcome};
use chrono::Utc;
use tracing::{debug, warn};

/// Apply a combat exchange's outcome. The combat is finished when the game
/// master concludes it, when the engine has already ended it, or when the
/// scenario itself ends.
pub(super) fn apply_outcome(
    stores: &GameStores,
    engine: &TurnEngine,
    record: &mut SessionRecord,
    outcome: &TurnOutcome,
    effects: &mut Effects,
) -> Result<(), SessionError> {
    let state = stores.combats.load(record.id)?;

    let report = match outcome {
        TurnOutcome::CombatTurnEnd(report) => Some(report),
        TurnOutcome::ScenarioEnd(end) => {
            narrative::conclude_scenario(record, end, effects);
            None
        }
        TurnOutcome::CombatSeed(_) => {
            warn!(session = %record.id, "combat seed during combat ignored");
            None
        }
        TurnOutcome::Continue { .. } | TurnOutcome::CombatTurnContinue(_) => None,
    };

    let finished = matches!(
        outcome,
        TurnOutcome::CombatTurnEnd(_) | TurnOutcome::ScenarioEnd(_)
    ) || state.as_ref().map_or(true, |s| !s.is_ongoing());

    if finished {
        finish_combat(engine, record, state, report, effects)?;
    }
    Ok(())
}

/// Close out a combat: end it if it is still running, queue the player's
/// hit points, the report's rewards and loot, and the deletion of the
/// stored combat, then return the session to narrative.
pub(super) fn finish_combat(
    engine: &TurnEngine,
    record: &mut SessionRecord,
    state: Option<CombatState>,
    report: Option<&CombatReport>,
    effects: &mut Effects,
) -> Result<(), SessionError> {
    let Some(mut state) = state else {
        warn!(session = %record.id, "combat already gone, leaving combat mode");
        record.abandon_combat();
        return Ok(());
    };

    if state.is_ongoing() {
        let reason = TurnEngine::check_end(&state.combatants)
            .unwrap_or_else(|| EndReason::Manual("concluded".to_string()));
        engine.end_combat(&mut state, reason)?;
    }
    let end_reason = state
        .end_reason
        .clone()
        .unwrap_or_else(|| EndReason::Manual("concluded".to_string()));

    if let Some(player) = state
        .combatants
        .iter()
        .find(|c| c.character_id == Some(record.character_id))
        .or_else(|| state.player())
    {
        effects.player_hp = Some(player.current_hp);
    }

    let (summary, winners, xp, gold) = match report {
        Some(report) => {
            effects.items.extend(report.events.iter().filter_map(|event| match event {
                CombatEvent::Inventory { item, quantity } if *quantity != 0 => {
                    Some((item.clone(), *quantity))
                }
                _ => None,
            }));
            (
                report.summary.clone(),
                report.winners.clone(),
                report.xp_awarded(),
                report.gold_awarded(),
            )
        }
        None => (
            format!("Combat ended: {end_reason}"),
            survivors(&state, &end_reason),
            0,
            0,
        ),
    };
    effects.xp = effects.xp.saturating_add(xp);
    effects.gold = effects.gold.saturating_add(gold);
    effects.close_combat = Some(state.id);

    debug!(
        session = %record.id,
        combat = %state.id,
        reason = %end_reason,
        rounds = state.round,
        "combat finishing"
    );
    record.leave_combat(CombatResult {
        combat_id: state.id,
        summary,
        winners,
        end_reason,
        xp_awarded: xp,
        gold_awarded: gold,
        ended_at: Utc::now(),
    });
    Ok(())
}

/// The side left standing, when the combat did not say who won.
fn survivors(state: &CombatState, reason: &EndReason) -> Vec<String> {
    let side = match reason {
        EndReason::Victory => CombatantKind::Player,
        EndReason::Defeat => CombatantKind::Npc,
        EndReason::Draw | EndReason::Manual(_) => return Vec::new(),
    };
    state.alive(side).map(|c| c.name.clone()).collect()
}
