//! Item metadata: display names, rarity and inventory footprint.

use crate::error::StorageError;
use serde::Deserialize;
use stashsort_core::Rarity;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Prefix the server puts in front of every item design id.
pub const DESIGN_PREFIX: &str = "DesignDataItem:Id_Item_";

/// Strips [`DESIGN_PREFIX`] if present.
pub fn strip_design_prefix(item_id: &str) -> &str {
    item_id.strip_prefix(DESIGN_PREFIX).unwrap_or(item_id)
}

/// Splits a type id into its base name and numeric suffix:
/// `BloodsapBlade_5001` -> (`BloodsapBlade`, Some(`5001`)).
fn split_suffix(type_id: &str) -> (&str, Option<&str>) {
    match type_id.rsplit_once('_') {
        Some((base, suffix)) if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) => {
            (base, Some(suffix))
        }
        _ => (type_id, None),
    }
}

/// Rarity encoded in the first digit of the numeric suffix, 0 without one.
pub fn rarity_from_type_id(type_id: &str) -> Rarity {
    split_suffix(type_id)
        .1
        .and_then(|s| s.bytes().next())
        .map(|d| Rarity::from_tier(d - b'0'))
        .unwrap_or(Rarity::None)
}

/// What the catalog knows about an item type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub type_id: String,
    pub name: String,
    pub rarity: Rarity,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RarityField {
    Tier(u8),
    Name(String),
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    rarity: Option<RarityField>,
    #[serde(default = "one", alias = "width")]
    inventory_width: u32,
    #[serde(default = "one", alias = "height")]
    inventory_height: u32,
}

fn one() -> u32 {
    1
}

/// Item metadata keyed by type id (design id without prefix).
#[derive(Debug, Default)]
pub struct ItemCatalog {
    entries: HashMap<String, ItemDescriptor>,
}

impl ItemCatalog {
    /// An empty catalog: every item resolves through the fallback rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads a catalog from a JSON object of `type_id -> entry`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data = fs::read(path.as_ref())?;
        let catalog = Self::from_json(&data)?;
        tracing::info!(
            "Loaded item catalog from {} ({} entries)",
            path.as_ref().display(),
            catalog.len()
        );
        Ok(catalog)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, StorageError> {
        let raw: HashMap<String, CatalogEntry> = serde_json::from_slice(data)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            let type_id = strip_design_prefix(&key).to_string();
            let rarity = match entry.rarity {
                Some(RarityField::Tier(t)) if t <= 8 => Rarity::from_tier(t),
                Some(RarityField::Name(ref n)) => Rarity::parse(n).ok_or_else(|| {
                    StorageError::Catalog(format!("{}: unknown rarity '{}'", type_id, n))
                })?,
                Some(RarityField::Tier(t)) => {
                    return Err(StorageError::Catalog(format!(
                        "{}: rarity tier {} out of range",
                        type_id, t
                    )))
                }
                None => rarity_from_type_id(&type_id),
            };
            if entry.inventory_width == 0 || entry.inventory_height == 0 {
                return Err(StorageError::Catalog(format!("{}: zero-sized footprint", type_id)));
            }
            let name = entry
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| split_suffix(&type_id).0.to_string());
            entries.insert(
                type_id.clone(),
                ItemDescriptor {
                    type_id,
                    name,
                    rarity,
                    width: entry.inventory_width,
                    height: entry.inventory_height,
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves an item id (with or without design prefix).
    ///
    /// Exact type ids win; otherwise an entry for the base name supplies the
    /// footprint while rarity still comes from the suffix. Unknown items are
    /// 1x1 and named after their base name.
    pub fn describe(&self, item_id: &str) -> ItemDescriptor {
        let type_id = strip_design_prefix(item_id);
        if let Some(entry) = self.entries.get(type_id) {
            return entry.clone();
        }

        let (base, _) = split_suffix(type_id);
        let rarity = rarity_from_type_id(type_id);
        match self.entries.get(base) {
            Some(entry) => ItemDescriptor {
                type_id: type_id.to_string(),
                rarity,
                ..entry.clone()
            },
            None => ItemDescriptor {
                type_id: type_id.to_string(),
                name: base.to_string(),
                rarity,
                width: 1,
                height: 1,
            },
        }
    }
}
