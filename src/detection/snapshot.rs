//! Player Snapshot Types
//!
//! One snapshot is one push of current player/weapon state from the external
//! game-state collaborator. The engine never derives categories from weapon
//! names at snapshot time; ids resolve through the [`WeaponTable`] built
//! once at configuration load.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Weapon categories, closed set.
///
/// Only [`WeaponCategory::Primary`] weapons are eligible for compensation;
/// sidearms, melee, grenades, and the bomb are explicitly excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponCategory {
    /// Automatic/burst primary weapons
    Primary,
    /// Sidearms
    Secondary,
    /// Melee weapons
    Melee,
    /// Grenades and utility throwables
    Grenade,
    /// The bomb
    Bomb,
    /// Anything the table does not know
    Unknown,
}

/// State of the actively-held weapon within a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponSnapshot {
    /// Collaborator-side weapon id (e.g. `weapon_ak47`)
    pub id: String,

    /// Whether this weapon is the actively-held one
    pub is_active: bool,

    /// Rounds currently chambered
    pub ammo_clip: u32,
}

/// One push of player state from the game-state collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Whether the player is alive
    pub is_alive: bool,

    /// Actively-held weapon, if any
    pub active_weapon: Option<WeaponSnapshot>,
}

/// Resolution of a weapon id: its category and the pattern profile it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponRef {
    /// Pattern profile name in the [`crate::pattern::ProfileStore`]
    pub pattern: String,

    /// Closed category
    pub category: WeaponCategory,
}

/// Weapon id → (category, pattern) table, resolved once at configuration
/// load from the explicit alias lists on each profile entry.
#[derive(Debug, Default)]
pub struct WeaponTable {
    entries: HashMap<String, WeaponRef>,
}

impl WeaponTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an id mapping. Later registrations win.
    pub fn register(&mut self, id: impl Into<String>, pattern: impl Into<String>, category: WeaponCategory) {
        self.entries.insert(
            id.into(),
            WeaponRef {
                pattern: pattern.into(),
                category,
            },
        );
    }

    /// Resolve a weapon id
    pub fn resolve(&self, id: &str) -> Option<&WeaponRef> {
        self.entries.get(id)
    }

    /// Number of registered ids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_resolves_registered_ids() {
        let mut table = WeaponTable::new();
        table.register("weapon_ak47", "ak47", WeaponCategory::Primary);
        table.register("weapon_knife", "knife", WeaponCategory::Melee);

        let ak = table.resolve("weapon_ak47").unwrap();
        assert_eq!(ak.pattern, "ak47");
        assert_eq!(ak.category, WeaponCategory::Primary);

        assert_eq!(
            table.resolve("weapon_knife").unwrap().category,
            WeaponCategory::Melee
        );
        assert!(table.resolve("weapon_hegrenade").is_none());
    }

    #[test]
    fn later_registration_wins() {
        let mut table = WeaponTable::new();
        table.register("weapon_m4a1", "m4a4", WeaponCategory::Primary);
        table.register("weapon_m4a1", "m4a1", WeaponCategory::Primary);

        assert_eq!(table.resolve("weapon_m4a1").unwrap().pattern, "m4a1");
    }
}
