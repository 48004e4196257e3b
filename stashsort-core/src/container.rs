//! Container kinds and their fixed dimensions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of every stash-like container.
pub const STASH_WIDTH: u32 = 12;
/// Height of every stash-like container.
pub const STASH_HEIGHT: u32 = 20;
pub const BAG_WIDTH: u32 = 10;
pub const BAG_HEIGHT: u32 = 5;

/// An inventory region, identified by the game's inventory id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ContainerKind {
    None,
    Chest,
    Bag,
    Equipment,
    Storage,
    PurchasedStorage(u8),
    SharedStash,
    SharedStashSeasonal,
    GearSet(u8),
    Other(u32),
}

impl ContainerKind {
    pub fn id(self) -> u32 {
        match self {
            ContainerKind::None => 0,
            ContainerKind::Chest => 1,
            ContainerKind::Bag => 2,
            ContainerKind::Equipment => 3,
            ContainerKind::Storage => 4,
            ContainerKind::PurchasedStorage(n) => 5 + n as u32,
            ContainerKind::SharedStash => 20,
            ContainerKind::SharedStashSeasonal => 30,
            ContainerKind::GearSet(n) => 100 + n as u32,
            ContainerKind::Other(id) => id,
        }
    }

    pub fn from_id(id: u32) -> Self {
        match id {
            0 => ContainerKind::None,
            1 => ContainerKind::Chest,
            2 => ContainerKind::Bag,
            3 => ContainerKind::Equipment,
            4 => ContainerKind::Storage,
            5..=9 => ContainerKind::PurchasedStorage((id - 5) as u8),
            20 => ContainerKind::SharedStash,
            30 => ContainerKind::SharedStashSeasonal,
            100..=102 => ContainerKind::GearSet((id - 100) as u8),
            other => ContainerKind::Other(other),
        }
    }

    /// Stash-like containers share the 12x20 layout.
    pub fn is_stash(self) -> bool {
        matches!(
            self,
            ContainerKind::Storage
                | ContainerKind::PurchasedStorage(_)
                | ContainerKind::SharedStash
                | ContainerKind::SharedStashSeasonal
        )
    }

    /// Grid dimensions `(width, height)`, or `None` for containers without a
    /// rectangular grid.
    pub fn dimensions(self) -> Option<(u32, u32)> {
        if self.is_stash() {
            Some((STASH_WIDTH, STASH_HEIGHT))
        } else if self == ContainerKind::Bag {
            Some((BAG_WIDTH, BAG_HEIGHT))
        } else {
            None
        }
    }

    /// Whether the sort engine may rearrange this container.
    pub fn is_sortable(self) -> bool {
        self.dimensions().is_some()
    }

    pub fn name(self) -> String {
        match self {
            ContainerKind::None => "none".to_string(),
            ContainerKind::Chest => "chest".to_string(),
            ContainerKind::Bag => "bag".to_string(),
            ContainerKind::Equipment => "equipment".to_string(),
            ContainerKind::Storage => "storage".to_string(),
            ContainerKind::PurchasedStorage(n) => format!("purchased_storage_{}", n),
            ContainerKind::SharedStash => "shared_stash".to_string(),
            ContainerKind::SharedStashSeasonal => "shared_stash_seasonal".to_string(),
            ContainerKind::GearSet(n) => format!("gear_set_{}", n),
            ContainerKind::Other(id) => format!("inventory_{}", id),
        }
    }

    /// Parses a container from its name or numeric id.
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(id) = s.parse::<u32>() {
            return Some(Self::from_id(id));
        }
        let lower = s.to_ascii_lowercase().replace('-', "_");
        let kind = match lower.as_str() {
            "none" => ContainerKind::None,
            "chest" => ContainerKind::Chest,
            "bag" | "inventory" => ContainerKind::Bag,
            "equipment" => ContainerKind::Equipment,
            "storage" | "stash" => ContainerKind::Storage,
            "shared_stash" | "shared" => ContainerKind::SharedStash,
            "shared_stash_seasonal" | "seasonal" => ContainerKind::SharedStashSeasonal,
            other => {
                if let Some(n) = other.strip_prefix("purchased_storage_") {
                    let n: u8 = n.parse().ok().filter(|n| *n <= 4)?;
                    ContainerKind::PurchasedStorage(n)
                } else if let Some(n) = other.strip_prefix("gear_set_") {
                    let n: u8 = n.parse().ok().filter(|n| *n <= 2)?;
                    ContainerKind::GearSet(n)
                } else {
                    return None;
                }
            }
        };
        Some(kind)
    }
}

impl From<u32> for ContainerKind {
    fn from(id: u32) -> Self {
        Self::from_id(id)
    }
}

impl From<ContainerKind> for u32 {
    fn from(kind: ContainerKind) -> Self {
        kind.id()
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

/// A named slot on the equipment screen, in equipment-screen cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquipmentSlot {
    pub slot_id: u32,
    pub name: &'static str,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

const fn slot(slot_id: u32, name: &'static str, x: u32, y: u32, width: u32, height: u32) -> EquipmentSlot {
    EquipmentSlot {
        slot_id,
        name,
        x,
        y,
        width,
        height,
    }
}

/// Equipment is a fixed slot map rather than a uniform grid.
pub const EQUIPMENT_SLOTS: &[EquipmentSlot] = &[
    slot(0, "primary_weapon", 0, 0, 2, 4),
    slot(1, "secondary_weapon", 8, 0, 2, 4),
    slot(2, "head", 3, 0, 2, 2),
    slot(3, "chest", 3, 2, 4, 3),
    slot(4, "legs", 3, 5, 4, 3),
    slot(5, "foot", 4, 8, 2, 2),
    slot(6, "hands", 2, 5, 2, 2),
    slot(7, "necklace", 5, 0, 2, 2),
    slot(8, "ring_left", 2, 3, 1, 1),
    slot(9, "ring_right", 7, 3, 1, 1),
    slot(10, "back", 6, 5, 2, 2),
    slot(20, "utility_1", 0, 5, 1, 1),
    slot(21, "utility_2", 1, 5, 1, 1),
    slot(22, "utility_3", 0, 6, 1, 1),
    slot(23, "utility_4", 1, 6, 1, 1),
    slot(24, "utility_5", 0, 7, 1, 1),
    slot(25, "utility_6", 1, 7, 1, 1),
    slot(26, "utility_7", 8, 5, 1, 1),
    slot(27, "utility_8", 9, 5, 1, 1),
    slot(28, "utility_9", 8, 6, 1, 1),
    slot(29, "utility_10", 9, 6, 1, 1),
    slot(30, "utility_11", 8, 7, 1, 1),
    slot(31, "utility_12", 9, 7, 1, 1),
];

/// Looks up an equipment slot by the slot id the server reports.
pub fn equipment_slot(slot_id: u32) -> Option<&'static EquipmentSlot> {
    EQUIPMENT_SLOTS.iter().find(|s| s.slot_id == slot_id)
}
