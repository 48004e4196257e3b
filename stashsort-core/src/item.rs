//! Item records and grid geometry.

use crate::container::ContainerKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of one item instance (the server's unique item id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(pub u64);

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rarity tier, 0..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Rarity {
    #[default]
    None,
    Poor,
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Unique,
    Artifact,
}

impl Rarity {
    pub const ALL: [Rarity; 9] = [
        Rarity::None,
        Rarity::Poor,
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
        Rarity::Unique,
        Rarity::Artifact,
    ];

    /// Converts a tier number; anything above 8 saturates to `Artifact`.
    pub fn from_tier(tier: u8) -> Self {
        Self::ALL[(tier as usize).min(8)]
    }

    pub fn tier(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Rarity::None => "None",
            Rarity::Poor => "Poor",
            Rarity::Common => "Common",
            Rarity::Uncommon => "Uncommon",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
            Rarity::Unique => "Unique",
            Rarity::Artifact => "Artifact",
        }
    }

    /// Parses a tier from its number or (case-insensitive) name.
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(tier) = s.parse::<u8>() {
            return (tier <= 8).then(|| Self::from_tier(tier));
        }
        let lower = s.to_ascii_lowercase();
        if lower == "legend" {
            return Some(Rarity::Legendary);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(&lower))
    }
}

impl From<u8> for Rarity {
    fn from(tier: u8) -> Self {
        Self::from_tier(tier)
    }
}

impl From<Rarity> for u8 {
    fn from(rarity: Rarity) -> Self {
        rarity.tier()
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Top-left anchor of an item, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Converts a linear slot index for a grid of the given width.
    pub fn from_slot(slot: u32, grid_width: u32) -> Self {
        let width = grid_width.max(1);
        Self {
            x: slot % width,
            y: slot / width,
        }
    }

    pub fn to_slot(self, grid_width: u32) -> u32 {
        self.y * grid_width + self.x
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Width and height of an item, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub width: u32,
    pub height: u32,
}

impl Footprint {
    pub const UNIT: Footprint = Footprint {
        width: 1,
        height: 1,
    };

    /// Creates a footprint; zero dimensions are raised to one.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn area(self) -> u32 {
        self.width * self.height
    }

    pub fn at(self, pos: Position) -> Rect {
        Rect {
            x: pos.x,
            y: pos.y,
            width: self.width,
            height: self.height,
        }
    }
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn anchor(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True if the two rectangles share at least one cell.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() <= other.x
            || other.right() <= self.x
            || self.bottom() <= other.y
            || other.bottom() <= self.y)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// True if the rectangle lies entirely within a `width` x `height` grid.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.bottom()).flat_map(move |y| (self.x..self.right()).map(move |x| (x, y)))
    }
}

/// One decoded item as the snapshot builder produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub key: ItemKey,
    /// Design id without the `DesignDataItem:Id_Item_` prefix.
    pub item_type_id: String,
    pub display_name: String,
    pub rarity: Rarity,
    pub width: u32,
    pub height: u32,
    /// Linear slot index within the owning container.
    pub slot_index: u32,
    pub stack_count: u32,
    pub container: ContainerKind,
}

impl ItemRecord {
    pub fn footprint(&self) -> Footprint {
        Footprint::new(self.width, self.height)
    }

    pub fn position(&self, grid_width: u32) -> Position {
        Position::from_slot(self.slot_index, grid_width)
    }
}

impl fmt::Display for ItemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}] slot {}",
            self.key,
            self.rarity,
            self.display_name,
            self.footprint(),
            self.slot_index
        )
    }
}
