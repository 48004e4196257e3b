//! Text rendering of containers.

use colored::{ColoredString, Colorize};
use stashsort_core::{equipment_slot, ContainerKind, ItemRecord, Rarity, StorageGrid};

fn paint(text: &str, rarity: Rarity) -> ColoredString {
    match rarity {
        Rarity::None => text.normal(),
        Rarity::Poor => text.bright_black(),
        Rarity::Common => text.white(),
        Rarity::Uncommon => text.green(),
        Rarity::Rare => text.blue(),
        Rarity::Epic => text.magenta(),
        Rarity::Legendary => text.yellow(),
        Rarity::Unique => text.bright_yellow().bold(),
        Rarity::Artifact => text.red().bold(),
    }
}

/// Two characters per cell: the first letters of an item's name on its
/// anchor cell, `##` on the rest of its footprint, `.` when empty.
pub fn grid(grid: &StorageGrid) -> String {
    let mut out = String::from("   ");
    for x in 0..grid.width() {
        out.push_str(&format!("{:>2}", x % 100));
    }
    out.push('\n');

    for y in 0..grid.height() {
        out.push_str(&format!("{:>2} ", y));
        for x in 0..grid.width() {
            let cell = grid
                .occupant(x, y)
                .and_then(|key| grid.get(key))
                .map(|item| {
                    let text: String = if item.pos.x == x && item.pos.y == y {
                        format!("{:<2.2}", item.record.display_name)
                    } else {
                        "##".to_string()
                    };
                    paint(&text, item.record.rarity).to_string()
                })
                .unwrap_or_else(|| " .".dimmed().to_string());
            out.push_str(&cell);
        }
        out.push('\n');
    }

    let spill: Vec<_> = grid
        .items()
        .filter(|i| !i.rect().fits_within(grid.width(), grid.height()))
        .collect();
    for item in spill {
        out.push_str(&format!(
            "{} {} extends past the grid at {}\n",
            "!".red(),
            item.record,
            item.pos
        ));
    }
    out.trim_end().to_string()
}

/// One line per item, named by equipment slot where one applies.
pub fn slot_list(kind: ContainerKind, items: &[ItemRecord]) -> String {
    let mut out = String::new();
    for item in items {
        let slot = match kind {
            ContainerKind::Equipment => equipment_slot(item.slot_index)
                .map(|s| s.name.to_string())
                .unwrap_or_else(|| format!("slot {}", item.slot_index)),
            _ => format!("slot {}", item.slot_index),
        };
        out.push_str(&format!(
            "{:>18}  {} [{}x{}] x{}\n",
            slot.dimmed(),
            paint(&item.display_name, item.rarity),
            item.width,
            item.height,
            item.stack_count
        ));
    }
    out.trim_end().to_string()
}

pub fn legend() -> String {
    Rarity::ALL
        .iter()
        .skip(1)
        .map(|r| paint(r.name(), *r).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashsort_core::{ItemKey, Position};

    fn record(key: u64, name: &str, w: u32, h: u32) -> ItemRecord {
        ItemRecord {
            key: ItemKey(key),
            item_type_id: name.to_string(),
            display_name: name.to_string(),
            rarity: Rarity::Rare,
            width: w,
            height: h,
            slot_index: 0,
            stack_count: 1,
            container: ContainerKind::Bag,
        }
    }

    #[test]
    fn test_grid_marks_anchor_and_footprint() {
        colored::control::set_override(false);
        let mut bag = StorageGrid::new(ContainerKind::Bag).unwrap();
        bag.place(record(1, "Shield", 2, 2), Position::new(1, 0))
            .unwrap();

        let text = grid(&bag);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[1].starts_with(" 0  .Sh##"));
        assert!(lines[2].starts_with(" 1  .####"));
        assert!(lines[3].starts_with(" 2  . ."));
    }

    #[test]
    fn test_equipment_slot_names() {
        colored::control::set_override(false);
        let mut helmet = record(1, "Helm", 2, 2);
        helmet.container = ContainerKind::Equipment;
        helmet.slot_index = 2;
        let text = slot_list(ContainerKind::Equipment, &[helmet]);
        assert!(text.contains("head"));
        assert!(text.contains("Helm [2x2] x1"));
    }
}
