//! Item priority for the sort engine.

use crate::error::CoreError;
use crate::item::ItemRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A field items can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Height,
    Width,
    Area,
    Name,
    Rarity,
    StackCount,
    TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

/// One comparator key, written `field:asc` or `field:desc` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: Direction,
}

impl SortKey {
    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }

    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    fn compare(&self, a: &ItemRecord, b: &ItemRecord) -> Ordering {
        let ord = match self.field {
            SortField::Height => a.height.cmp(&b.height),
            SortField::Width => a.width.cmp(&b.width),
            SortField::Area => a.footprint().area().cmp(&b.footprint().area()),
            SortField::Name => a.display_name.cmp(&b.display_name),
            SortField::Rarity => a.rarity.cmp(&b.rarity),
            SortField::StackCount => a.stack_count.cmp(&b.stack_count),
            SortField::TypeId => a.item_type_id.cmp(&b.item_type_id),
        };
        match self.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

impl FromStr for SortKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, dir) = match s.split_once(':') {
            Some((f, d)) => (f.trim(), d.trim()),
            None => (s.trim(), "desc"),
        };
        let field = match field.to_ascii_lowercase().as_str() {
            "height" => SortField::Height,
            "width" => SortField::Width,
            "area" => SortField::Area,
            "name" => SortField::Name,
            "rarity" => SortField::Rarity,
            "stack_count" | "count" => SortField::StackCount,
            "type_id" | "type" => SortField::TypeId,
            other => return Err(CoreError::InvalidSortOrder(format!("unknown field '{}'", other))),
        };
        let direction = match dir.to_ascii_lowercase().as_str() {
            "asc" => Direction::Asc,
            "desc" => Direction::Desc,
            other => {
                return Err(CoreError::InvalidSortOrder(format!(
                    "unknown direction '{}'",
                    other
                )))
            }
        };
        Ok(Self { field, direction })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = match self.field {
            SortField::Height => "height",
            SortField::Width => "width",
            SortField::Area => "area",
            SortField::Name => "name",
            SortField::Rarity => "rarity",
            SortField::StackCount => "stack_count",
            SortField::TypeId => "type_id",
        };
        let dir = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        write!(f, "{}:{}", field, dir)
    }
}

/// Multi-key comparator. Items that compare `Less` are packed first.
///
/// After the configured keys, ties fall back to the original slot index and
/// then the item key, so the order is total and independent of input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    keys: Vec<SortKey>,
}

impl SortOrder {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    /// Parses a list such as `["height:desc", "width:desc", "name"]`.
    pub fn parse<S: AsRef<str>>(keys: &[S]) -> Result<Self, CoreError> {
        let keys = keys
            .iter()
            .map(|k| k.as_ref().parse())
            .collect::<Result<Vec<SortKey>, _>>()?;
        if keys.is_empty() {
            return Err(CoreError::InvalidSortOrder("no sort keys".to_string()));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn compare(&self, a: &ItemRecord, b: &ItemRecord) -> Ordering {
        self.keys
            .iter()
            .map(|k| k.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.slot_index.cmp(&b.slot_index))
            .then_with(|| a.key.cmp(&b.key))
    }

    /// Returns the records in packing order.
    pub fn queue<'a>(&self, records: impl IntoIterator<Item = &'a ItemRecord>) -> Vec<&'a ItemRecord> {
        let mut queue: Vec<&ItemRecord> = records.into_iter().collect();
        queue.sort_by(|a, b| self.compare(a, b));
        queue
    }
}

impl Default for SortOrder {
    /// Tallest first, then widest, then name descending, then rarity
    /// descending.
    fn default() -> Self {
        Self::new(vec![
            SortKey::desc(SortField::Height),
            SortKey::desc(SortField::Width),
            SortKey::desc(SortField::Name),
            SortKey::desc(SortField::Rarity),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerKind;
    use crate::item::{ItemKey, Rarity};

    fn record(key: u64, name: &str, w: u32, h: u32, rarity: u8, slot: u32) -> ItemRecord {
        ItemRecord {
            key: ItemKey(key),
            item_type_id: name.to_string(),
            display_name: name.to_string(),
            rarity: Rarity::from_tier(rarity),
            width: w,
            height: h,
            slot_index: slot,
            stack_count: 1,
            container: ContainerKind::Storage,
        }
    }

    fn names(order: &SortOrder, items: &[ItemRecord]) -> Vec<u64> {
        order.queue(items).iter().map(|r| r.key.0).collect()
    }

    #[test]
    fn test_default_order() {
        let items = vec![
            record(1, "Gem", 1, 1, 3, 0),
            record(2, "Axe", 2, 2, 2, 1),
            record(3, "Pole", 1, 4, 1, 2),
            record(4, "Bow", 2, 4, 1, 3),
            record(5, "Gem", 1, 1, 5, 4),
            record(6, "Ale", 1, 1, 5, 5),
        ];
        assert_eq!(names(&SortOrder::default(), &items), vec![4, 3, 2, 5, 1, 6]);
    }

    #[test]
    fn test_full_tie_broken_by_slot_then_key() {
        let items = vec![
            record(9, "Gem", 1, 1, 3, 7),
            record(8, "Gem", 1, 1, 3, 7),
            record(7, "Gem", 1, 1, 3, 2),
        ];
        assert_eq!(names(&SortOrder::default(), &items), vec![7, 8, 9]);
    }

    #[test]
    fn test_parse_order() {
        let order = SortOrder::parse(&["rarity:desc", "name:asc", "area"]).unwrap();
        assert_eq!(order.keys().len(), 3);
        assert_eq!(order.keys()[2], SortKey::desc(SortField::Area));
        assert_eq!(order.keys()[1].to_string(), "name:asc");

        assert!(SortOrder::parse(&["colour"]).is_err());
        assert!(SortOrder::parse(&["name:sideways"]).is_err());
        assert!(SortOrder::parse::<&str>(&[]).is_err());
    }

    #[test]
    fn test_rarity_first_order() {
        let order = SortOrder::parse(&["rarity:desc", "name:asc"]).unwrap();
        let items = vec![
            record(1, "Gem", 1, 1, 3, 0),
            record(2, "Axe", 2, 2, 8, 1),
            record(3, "Ale", 1, 1, 3, 2),
        ];
        assert_eq!(names(&order, &items), vec![2, 3, 1]);
    }
}
