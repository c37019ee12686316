//! System prompts for the two tracks.

use crate::character::CharacterSheet;
use crate::combat::CombatState;

/// Game master instructions plus the scenario and the player character.
pub fn narrative_prompt(scenario_id: &str, character: &CharacterSheet) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/narrative.txt"));

    prompt.push_str("\n## Scenario\n");
    prompt.push_str(scenario_id);
    prompt.push('\n');

    prompt.push_str("\n## Player Character\n");
    prompt.push_str(&character.summary());
    prompt.push('\n');
    prompt
}

/// Combat instructions plus the current state of the fight.
pub fn combat_prompt(state: &CombatState) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/combat.txt"));

    if !state.location.is_empty() {
        prompt.push_str("\n## Location\n");
        prompt.push_str(&state.location);
        prompt.push('\n');
    }

    prompt.push_str("\n## Combat Status\n");
    prompt.push_str(&state.describe());

    if let Some(current) = state.current_combatant() {
        prompt.push_str(&format!("\nIt is {}'s turn.\n", current.name));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{Combatant, TurnEngine};
    use crate::ids::SessionId;

    #[test]
    fn test_narrative_prompt_mentions_scenario_and_character() {
        let sheet = CharacterSheet::new("Mira", 14);
        let prompt = narrative_prompt("lost-mine", &sheet);
        assert!(prompt.contains("start_combat"));
        assert!(prompt.contains("## Scenario\nlost-mine"));
        assert!(prompt.contains("Mira (level 1), HP 14/14"));
    }

    #[test]
    fn test_combat_prompt_lists_initiative() {
        let state = TurnEngine::default()
            .start(
                SessionId::new(),
                vec![Combatant::player("Mira", 14, 8), Combatant::npc("Bandit", 9, 12)],
                "crossroads",
            )
            .unwrap();
        let prompt = combat_prompt(&state);
        assert!(prompt.contains("crossroads"));
        assert!(prompt.contains("1. Bandit [npc] (init 12) HP 9/9"));
        assert!(prompt.contains("It is Bandit's turn."));
    }
}
