//! Store writes an exchange has decided on but not yet made.
//!
//! Handlers only change the session record in memory and collect their
//! character and combat writes here. The dispatcher applies them after the
//! exchange's logs are written, so a failed log write leaves the combat and
//! the character sheet as they were.

use super::dispatcher::GameStores;
use super::record::SessionRecord;
use super::SessionError;
use crate::actions::MAX_ITEM_QUANTITY;
use crate::ids::CombatId;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(super) struct Effects {
    /// Hit points the character sheet should end up with.
    pub player_hp: Option<u32>,
    pub xp: u32,
    pub gold: i64,
    /// Item names with a signed quantity. Negative removes.
    pub items: Vec<(String, i32)>,
    /// The stored combat to delete, if it is still the session's combat.
    pub close_combat: Option<CombatId>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Make the writes. Closing the combat must succeed; character updates
    /// are logged and skipped when they fail.
    pub fn apply(self, stores: &GameStores, record: &SessionRecord) -> Result<(), SessionError> {
        if self.is_empty() {
            return Ok(());
        }

        if let Some(combat_id) = self.close_combat {
            match stores.combats.load(record.id)? {
                Some(state) if state.id == combat_id => {
                    stores.combats.delete(record.id)?;
                    info!(session = %record.id, combat = %combat_id, "combat closed");
                }
                _ => debug!(
                    session = %record.id,
                    combat = %combat_id,
                    "combat already replaced or removed"
                ),
            }
        }

        let characters = &stores.characters;
        let character = record.character_id;

        if let Some(target) = self.player_hp {
            let synced = characters.current_hit_points(character).and_then(|hp| {
                if target < hp {
                    characters.apply_damage(character, hp - target).map(|_| ())
                } else if target > hp {
                    characters.apply_heal(character, target - hp).map(|_| ())
                } else {
                    Ok(())
                }
            });
            if let Err(e) = synced {
                warn!(session = %record.id, error = %e, "failed to sync player hit points");
            }
        }

        if self.xp > 0 {
            if let Err(e) = characters.apply_xp(character, self.xp) {
                warn!(session = %record.id, error = %e, "failed to award XP");
            }
        }
        if self.gold != 0 {
            if let Err(e) = characters.apply_gold(character, self.gold) {
                warn!(session = %record.id, error = %e, "failed to award gold");
            }
        }

        for (item, quantity) in &self.items {
            let count = quantity.unsigned_abs().min(MAX_ITEM_QUANTITY);
            let changed = if *quantity > 0 {
                characters.add_item(character, item, count).map(|_| ())
            } else {
                characters.remove_item(character, item, count).map(|_| ())
            };
            if let Err(e) = changed {
                warn!(session = %record.id, item = %item, error = %e, "failed to update inventory");
            }
        }

        debug!(
            session = %record.id,
            xp = self.xp,
            gold = self.gold,
            items = self.items.len(),
            "exchange effects applied"
        );
        Ok(())
    }
}
