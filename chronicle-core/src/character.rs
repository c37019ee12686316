//! Character sheets and the service that mutates them.
//!
//! The game core only needs hit points for the death check and a handful
//! of mutation entry points for tool side effects.

use crate::ids::CharacterId;
use crate::persist::{self, PersistError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Skill level used for a skill the character has never trained.
pub const UNTRAINED_SKILL: u32 = 10;

/// Errors from character operations.
#[derive(Debug, Error)]
pub enum CharacterError {
    #[error("Character not found: {0}")]
    NotFound(CharacterId),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// A persistent player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub id: CharacterId,
    pub name: String,
    pub level: u32,
    pub max_hp: u32,

    /// Can reach zero but never goes below.
    pub current_hp: u32,

    pub xp: u32,
    pub gold: u32,

    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub defense_bonus: i32,
    #[serde(default)]
    pub initiative_bonus: i32,

    #[serde(default)]
    pub inventory: Vec<String>,

    /// Skill levels on a 0-100 scale, keyed by lowercase skill name.
    #[serde(default)]
    pub skills: BTreeMap<String, u32>,
}

impl CharacterSheet {
    pub fn new(name: impl Into<String>, max_hp: u32) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            level: 1,
            max_hp,
            current_hp: max_hp,
            xp: 0,
            gold: 0,
            attack_bonus: 0,
            defense_bonus: 0,
            initiative_bonus: 0,
            inventory: Vec::new(),
            skills: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: CharacterId) -> Self {
        self.id = id;
        self
    }

    pub fn with_bonuses(mut self, attack: i32, defense: i32, initiative: i32) -> Self {
        self.attack_bonus = attack;
        self.defense_bonus = defense;
        self.initiative_bonus = initiative;
        self
    }

    pub fn with_skill(mut self, skill: &str, level: u32) -> Self {
        self.skills.insert(skill.trim().to_lowercase(), level.min(100));
        self
    }

    pub fn skill_level(&self, skill: &str) -> u32 {
        self.skills
            .get(&skill.trim().to_lowercase())
            .copied()
            .unwrap_or(UNTRAINED_SKILL)
    }

    /// How many of `item` the character carries.
    pub fn item_count(&self, item: &str) -> usize {
        self.inventory.iter().filter(|i| *i == item).count()
    }

    /// One line for prompts.
    pub fn summary(&self) -> String {
        format!(
            "{} (level {}), HP {}/{}, XP {}, gold {}{}{}",
            self.name,
            self.level,
            self.current_hp,
            self.max_hp,
            self.xp,
            self.gold,
            if self.inventory.is_empty() {
                String::new()
            } else {
                format!(", carrying: {}", self.inventory.join(", "))
            },
            if self.skills.is_empty() {
                String::new()
            } else {
                let skills: Vec<String> = self
                    .skills
                    .iter()
                    .map(|(name, level)| format!("{name} {level}"))
                    .collect();
                format!(", skills: {}", skills.join(", "))
            }
        )
    }
}

/// Read and mutate character sheets.
///
/// Implementors provide [`sheet`](Self::sheet), [`create`](Self::create) and
/// [`update`](Self::update); the game operations are built on top of them.
pub trait CharacterService: Send + Sync {
    fn sheet(&self, id: CharacterId) -> Result<CharacterSheet, CharacterError>;

    fn create(&self, sheet: &CharacterSheet) -> Result<(), CharacterError>;

    /// Apply `change` to the stored sheet and return the result.
    fn update(
        &self,
        id: CharacterId,
        change: &mut dyn FnMut(&mut CharacterSheet),
    ) -> Result<CharacterSheet, CharacterError>;

    fn exists(&self, id: CharacterId) -> Result<bool, CharacterError> {
        match self.sheet(id) {
            Ok(_) => Ok(true),
            Err(CharacterError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn current_hit_points(&self, id: CharacterId) -> Result<u32, CharacterError> {
        Ok(self.sheet(id)?.current_hp)
    }

    fn apply_damage(&self, id: CharacterId, amount: u32) -> Result<CharacterSheet, CharacterError> {
        self.update(id, &mut |c: &mut CharacterSheet| {
            c.current_hp = c.current_hp.saturating_sub(amount)
        })
    }

    fn apply_heal(&self, id: CharacterId, amount: u32) -> Result<CharacterSheet, CharacterError> {
        self.update(id, &mut |c: &mut CharacterSheet| {
            c.current_hp = c.current_hp.saturating_add(amount).min(c.max_hp)
        })
    }

    fn apply_xp(&self, id: CharacterId, amount: u32) -> Result<CharacterSheet, CharacterError> {
        self.update(id, &mut |c: &mut CharacterSheet| c.xp = c.xp.saturating_add(amount))
    }

    fn add_item(
        &self,
        id: CharacterId,
        item: &str,
        quantity: u32,
    ) -> Result<CharacterSheet, CharacterError> {
        self.update(id, &mut |c: &mut CharacterSheet| {
            c.inventory
                .extend(std::iter::repeat(item.to_string()).take(quantity as usize))
        })
    }

    /// Remove up to `quantity` copies of `item`. Returns the sheet and how
    /// many were actually removed.
    fn remove_item(
        &self,
        id: CharacterId,
        item: &str,
        quantity: u32,
    ) -> Result<(CharacterSheet, u32), CharacterError> {
        let mut removed = 0u32;
        let sheet = self.update(id, &mut |c: &mut CharacterSheet| {
            c.inventory.retain(|i| {
                if removed < quantity && i == item {
                    removed += 1;
                    false
                } else {
                    true
                }
            })
        })?;
        Ok((sheet, removed))
    }

    /// Add or spend gold. Spending never goes below zero.
    fn apply_gold(&self, id: CharacterId, delta: i64) -> Result<CharacterSheet, CharacterError> {
        self.update(id, &mut |c: &mut CharacterSheet| {
            c.gold = i64::from(c.gold)
                .saturating_add(delta)
                .clamp(0, i64::from(u32::MAX)) as u32
        })
    }
}

/// One JSON file per character under `<root>/characters/`.
#[derive(Debug, Clone)]
pub struct FileCharacterStore {
    dir: PathBuf,
}

impl FileCharacterStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("characters"),
        }
    }

    fn path(&self, id: CharacterId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl CharacterService for FileCharacterStore {
    fn sheet(&self, id: CharacterId) -> Result<CharacterSheet, CharacterError> {
        persist::read_json(&self.path(id))?.ok_or(CharacterError::NotFound(id))
    }

    fn create(&self, sheet: &CharacterSheet) -> Result<(), CharacterError> {
        Ok(persist::write_json_atomic(&self.path(sheet.id), sheet)?)
    }

    fn update(
        &self,
        id: CharacterId,
        change: &mut dyn FnMut(&mut CharacterSheet),
    ) -> Result<CharacterSheet, CharacterError> {
        let mut sheet = self.sheet(id)?;
        change(&mut sheet);
        persist::write_json_atomic(&self.path(id), &sheet)?;
        Ok(sheet)
    }
}

/// In-memory characters for tests.
#[derive(Debug, Default)]
pub struct MemoryCharacterStore {
    sheets: Mutex<HashMap<CharacterId, CharacterSheet>>,
}

impl MemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CharacterService for MemoryCharacterStore {
    fn sheet(&self, id: CharacterId) -> Result<CharacterSheet, CharacterError> {
        let sheets = self.sheets.lock().map_err(|_| PersistError::Poisoned)?;
        sheets.get(&id).cloned().ok_or(CharacterError::NotFound(id))
    }

    fn create(&self, sheet: &CharacterSheet) -> Result<(), CharacterError> {
        let mut sheets = self.sheets.lock().map_err(|_| PersistError::Poisoned)?;
        sheets.insert(sheet.id, sheet.clone());
        Ok(())
    }

    fn update(
        &self,
        id: CharacterId,
        change: &mut dyn FnMut(&mut CharacterSheet),
    ) -> Result<CharacterSheet, CharacterError> {
        let mut sheets = self.sheets.lock().map_err(|_| PersistError::Poisoned)?;
        let sheet = sheets.get_mut(&id).ok_or(CharacterError::NotFound(id))?;
        change(sheet);
        Ok(sheet.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(service: &dyn CharacterService) {
        let sheet = CharacterSheet::new("Mira", 12);
        let id = sheet.id;
        service.create(&sheet).unwrap();

        assert_eq!(service.apply_damage(id, 5).unwrap().current_hp, 7);
        assert_eq!(service.apply_damage(id, 50).unwrap().current_hp, 0);
        assert_eq!(service.current_hit_points(id).unwrap(), 0);
        assert_eq!(service.apply_heal(id, 100).unwrap().current_hp, 12);
        assert_eq!(service.apply_xp(id, 150).unwrap().xp, 150);
        assert_eq!(service.apply_gold(id, 20).unwrap().gold, 20);
        assert_eq!(service.apply_gold(id, -50).unwrap().gold, 0);

        let missing = CharacterId::new();
        assert!(matches!(
            service.apply_xp(missing, 1),
            Err(CharacterError::NotFound(m)) if m == missing
        ));
        assert!(!service.exists(missing).unwrap());
        assert!(service.exists(id).unwrap());

        assert_eq!(service.add_item(id, "torch", 3).unwrap().item_count("torch"), 3);
        service.add_item(id, "rope", 1).unwrap();
        let (sheet, removed) = service.remove_item(id, "torch", 2).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(sheet.inventory, vec!["torch".to_string(), "rope".to_string()]);
        let (sheet, removed) = service.remove_item(id, "rope", 5).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(sheet.item_count("rope"), 0);
    }

    #[test]
    fn test_skill_levels() {
        let sheet = CharacterSheet::new("Mira", 12)
            .with_skill("Stealth", 65)
            .with_skill("lore", 250);
        assert_eq!(sheet.skill_level("stealth"), 65);
        assert_eq!(sheet.skill_level(" STEALTH "), 65);
        assert_eq!(sheet.skill_level("lore"), 100);
        assert_eq!(sheet.skill_level("swimming"), UNTRAINED_SKILL);
    }

    #[test]
    fn test_memory_service() {
        exercise(&MemoryCharacterStore::new());
    }

    #[test]
    fn test_file_service() {
        let dir = TempDir::new().unwrap();
        let store = FileCharacterStore::new(dir.path());
        exercise(&store);
    }

    #[test]
    fn test_summary_lists_inventory() {
        let mut sheet = CharacterSheet::new("Mira", 12);
        assert_eq!(sheet.summary(), "Mira (level 1), HP 12/12, XP 0, gold 0");
        sheet.inventory.push("rope".into());
        assert!(sheet.summary().ends_with("carrying: rope"));
        let sheet = sheet.with_skill("Stealth", 40);
        assert!(sheet.summary().ends_with("carrying: rope, skills: stealth 40"));
    }
}
