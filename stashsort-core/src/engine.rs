//! Greedy shelf-packing sort engine.
//!
//! Items are popped in priority order and packed row by row from the top-left
//! of the destination grid. Anything in the way is displaced first, either
//! elsewhere in the destination or into the overflow grid. Every move is sent
//! to the actuator before the model is updated, and nothing is rolled back on
//! failure or cancellation.

use crate::actuator::{Actuator, Location};
use crate::cancel::CancellationToken;
use crate::error::{GridError, SortFailure};
use crate::grid::StorageGrid;
use crate::item::{Footprint, ItemKey, Position, Rect};
use crate::order::SortOrder;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Why a placement was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    /// Moving an item out of the way of another item's target.
    Displace,
    /// Moving an item to its packed position.
    Place,
}

/// One move, in the order it was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementOp {
    pub item: ItemKey,
    pub name: String,
    pub kind: PlacementKind,
    /// For displacements, the item whose target was being cleared.
    pub making_room_for: Option<ItemKey>,
    pub from: Location,
    pub to: Location,
    pub footprint: Footprint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortStatus {
    Completed,
    Cancelled,
    Failed(SortFailure),
}

/// Outcome of a sort, including the moves applied before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortReport {
    pub status: SortStatus,
    pub placements: Vec<PlacementOp>,
    /// Items in the order they were popped from the queue.
    pub sequence: Vec<ItemKey>,
    /// Items already at their target that needed no move.
    pub unchanged: usize,
}

impl SortReport {
    fn new() -> Self {
        Self {
            status: SortStatus::Completed,
            placements: Vec::new(),
            sequence: Vec::new(),
            unchanged: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SortStatus::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == SortStatus::Cancelled
    }

    pub fn failure(&self) -> Option<&SortFailure> {
        match &self.status {
            SortStatus::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn displacements(&self) -> usize {
        self.placements
            .iter()
            .filter(|p| p.kind == PlacementKind::Displace)
            .count()
    }
}

/// Control flow inside one sort run.
enum Stop {
    Cancelled,
    Failed(SortFailure),
}

impl From<SortFailure> for Stop {
    fn from(f: SortFailure) -> Self {
        Stop::Failed(f)
    }
}

/// Shelf cursor over the destination grid.
#[derive(Debug, Default)]
struct Cursor {
    x: u32,
    y: u32,
    row_height: u32,
}

/// Packs a destination grid using an overflow grid for displaced items.
#[derive(Debug, Clone, Default)]
pub struct SortEngine {
    order: SortOrder,
}

impl SortEngine {
    pub fn new(order: SortOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &SortOrder {
        &self.order
    }

    /// Sorts `dest` in place, driving `actuator` for every move.
    ///
    /// Blocks until the queue is drained, a failure occurs, or `cancel` is
    /// observed at a poll point.
    pub fn sort(
        &self,
        dest: &mut StorageGrid,
        mut overflow: Option<&mut StorageGrid>,
        actuator: &mut dyn Actuator,
        cancel: &CancellationToken,
    ) -> SortReport {
        let mut report = SortReport::new();
        let queue: Vec<ItemKey> = self
            .order
            .queue(dest.items().map(|i| &i.record))
            .into_iter()
            .map(|r| r.key)
            .collect();

        info!(
            "sorting {} ({} items, overflow {})",
            dest.kind(),
            queue.len(),
            overflow
                .as_ref()
                .map(|o| o.kind().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        if let Err(e) = actuator.ensure_target() {
            warn!("sort target unavailable: {}", e);
            report.status = SortStatus::Failed(e.into());
            return report;
        }

        let mut cursor = Cursor::default();
        for key in queue {
            let step = self.step(
                key,
                &mut cursor,
                dest,
                overflow.as_deref_mut(),
                actuator,
                cancel,
                &mut report,
            );
            match step {
                Ok(()) => {}
                Err(Stop::Cancelled) => {
                    info!("sort cancelled after {} moves", report.placements.len());
                    report.status = SortStatus::Cancelled;
                    return report;
                }
                Err(Stop::Failed(failure)) => {
                    warn!(
                        "sort failed after {} moves: {}",
                        report.placements.len(),
                        failure
                    );
                    report.status = SortStatus::Failed(failure);
                    return report;
                }
            }
        }

        info!(
            "sort complete: {} moves ({} displacements), {} unchanged",
            report.placements.len(),
            report.displacements(),
            report.unchanged
        );
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &self,
        key: ItemKey,
        cursor: &mut Cursor,
        dest: &mut StorageGrid,
        mut overflow: Option<&mut StorageGrid>,
        actuator: &mut dyn Actuator,
        cancel: &CancellationToken,
        report: &mut SortReport,
    ) -> Result<(), Stop> {
        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        report.sequence.push(key);

        // The item may have been displaced into the overflow grid earlier.
        let (record, from, in_dest) = match dest.get(key) {
            Some(item) => (item.record.clone(), Location::new(dest.kind(), item.pos), true),
            None => match overflow.as_deref().and_then(|o| o.get(key).map(|i| (o.kind(), i))) {
                Some((kind, item)) => (item.record.clone(), Location::new(kind, item.pos), false),
                None => return Err(SortFailure::Grid(GridError::UnknownItem(key)).into()),
            },
        };
        let current = from.pos;
        let footprint = record.footprint();

        if cursor.x + footprint.width > dest.width() {
            cursor.y += cursor.row_height;
            cursor.x = 0;
            cursor.row_height = 0;
        }
        if footprint.width > dest.width() || cursor.y + footprint.height > dest.height() {
            return Err(SortFailure::OutOfSpace {
                item: key,
                width: footprint.width,
                height: footprint.height,
                row: cursor.y,
            }
            .into());
        }

        let target = Position::new(cursor.x, cursor.y);
        let target_rect = footprint.at(target);
        let at_target = in_dest && current == target;

        if at_target && dest.owns_footprint(key) {
            debug!("{} already at {}", record, target);
            report.unchanged += 1;
        } else {
            let mut avoid = vec![target_rect];
            if in_dest {
                avoid.push(footprint.at(current));
            }

            for (x, y) in target_rect.cells() {
                if cancel.is_cancelled() {
                    return Err(Stop::Cancelled);
                }
                match dest.occupant(x, y) {
                    Some(blocker) if blocker != key => {
                        self.displace(
                            key,
                            blocker,
                            dest,
                            overflow.as_deref_mut(),
                            &avoid,
                            actuator,
                            report,
                        )?;
                    }
                    _ => {}
                }
            }

            if cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }

            if at_target {
                // Physically in place already; reclaim cells held by overlapping input.
                dest.claim(key).map_err(SortFailure::from)?;
                report.unchanged += 1;
            } else {
                let to = Location::new(dest.kind(), target);
                actuator
                    .move_item(from, to, footprint)
                    .map_err(SortFailure::from)?;

                if in_dest {
                    dest.relocate(key, target).map_err(SortFailure::from)?;
                } else if let Some(o) = overflow.as_deref_mut() {
                    let record = o.remove(key).map_err(SortFailure::from)?;
                    dest.place(record, target).map_err(SortFailure::from)?;
                }
                debug!("placed {} {} -> {}", record.display_name, from, to);
                report.placements.push(PlacementOp {
                    item: key,
                    name: record.display_name.clone(),
                    kind: PlacementKind::Place,
                    making_room_for: None,
                    from,
                    to,
                    footprint,
                });
            }
        }

        cursor.x += footprint.width;
        cursor.row_height = cursor.row_height.max(footprint.height);

        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        Ok(())
    }

    /// Moves `blocker` out of the way of `item`.
    #[allow(clippy::too_many_arguments)]
    fn displace(
        &self,
        item: ItemKey,
        blocker: ItemKey,
        dest: &mut StorageGrid,
        overflow: Option<&mut StorageGrid>,
        avoid: &[Rect],
        actuator: &mut dyn Actuator,
        report: &mut SortReport,
    ) -> Result<(), Stop> {
        let (name, footprint, from_pos) = match dest.get(blocker) {
            Some(b) => (b.record.display_name.clone(), b.record.footprint(), b.pos),
            None => return Err(SortFailure::Grid(GridError::UnknownItem(blocker)).into()),
        };
        let from = Location::new(dest.kind(), from_pos);

        if let Some(pos) = dest.find_empty_slot_avoiding(footprint, avoid) {
            let to = Location::new(dest.kind(), pos);
            actuator.move_item(from, to, footprint).map_err(SortFailure::from)?;
            dest.relocate(blocker, pos).map_err(SortFailure::from)?;
            debug!("displaced {} {} -> {}", name, from, to);
            report.placements.push(PlacementOp {
                item: blocker,
                name,
                kind: PlacementKind::Displace,
                making_room_for: Some(item),
                from,
                to,
                footprint,
            });
            return Ok(());
        }

        let Some(overflow) = overflow else {
            return Err(SortFailure::NoDisplacementSpace { item, blocker }.into());
        };
        let Some(pos) = overflow.find_empty_slot(footprint) else {
            return Err(SortFailure::NoDisplacementSpace { item, blocker }.into());
        };

        let to = Location::new(overflow.kind(), pos);
        actuator.move_item(from, to, footprint).map_err(SortFailure::from)?;
        let record = dest.remove(blocker).map_err(SortFailure::from)?;
        overflow.place(record, pos).map_err(SortFailure::from)?;
        debug!("displaced {} {} -> {} (overflow)", name, from, to);
        report.placements.push(PlacementOp {
            item: blocker,
            name,
            kind: PlacementKind::Displace,
            making_room_for: Some(item),
            from,
            to,
            footprint,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::DryRunActuator;
    use crate::container::ContainerKind;
    use crate::error::ActuatorError;
    use crate::item::{ItemRecord, Rarity};
    use proptest::prelude::*;

    fn record(key: u64, name: &str, w: u32, h: u32, slot: u32) -> ItemRecord {
        ItemRecord {
            key: ItemKey(key),
            item_type_id: name.to_string(),
            display_name: name.to_string(),
            rarity: Rarity::Common,
            width: w,
            height: h,
            slot_index: slot,
            stack_count: 1,
            container: ContainerKind::Storage,
        }
    }

    fn stash(items: Vec<ItemRecord>) -> StorageGrid {
        StorageGrid::load(ContainerKind::Storage, items).unwrap()
    }

    fn bag() -> StorageGrid {
        StorageGrid::new(ContainerKind::Bag).unwrap()
    }

    /// Cancels the token when the n-th move is made.
    struct CancelAfter {
        moves: usize,
        after: usize,
        token: CancellationToken,
    }

    impl Actuator for CancelAfter {
        fn move_item(&mut self, _: Location, _: Location, _: Footprint) -> Result<(), ActuatorError> {
            self.moves += 1;
            if self.moves == self.after {
                self.token.cancel();
            }
            Ok(())
        }
    }

    struct NoWindow;

    impl Actuator for NoWindow {
        fn ensure_target(&mut self) -> Result<(), ActuatorError> {
            Err(ActuatorError::TargetUnavailable("game window not found".into()))
        }

        fn move_item(&mut self, _: Location, _: Location, _: Footprint) -> Result<(), ActuatorError> {
            panic!("no moves expected")
        }
    }

    #[test]
    fn test_overlapping_input_displaces_bottom_right() {
        let mut dest = stash(vec![record(1, "Axe", 2, 2, 0), record(2, "Gem", 1, 1, 0)]);
        let mut overflow = bag();
        let mut actuator = DryRunActuator::default();

        let report = SortEngine::default().sort(
            &mut dest,
            Some(&mut overflow),
            &mut actuator,
            &CancellationToken::new(),
        );

        assert!(report.is_completed());
        assert_eq!(report.sequence, vec![ItemKey(1), ItemKey(2)]);
        let first = &report.placements[0];
        assert_eq!(first.item, ItemKey(2));
        assert_eq!(first.kind, PlacementKind::Displace);
        assert_eq!(first.to.pos, Position::new(11, 19));
        assert!(report.placements.iter().all(|p| p.item != ItemKey(1)));

        assert_eq!(dest.get(ItemKey(1)).unwrap().pos, Position::new(0, 0));
        assert_eq!(dest.get(ItemKey(2)).unwrap().pos, Position::new(2, 0));
        assert!(dest.is_consistent());
        assert_eq!(actuator.drags().len(), report.placements.len());
    }

    #[test]
    fn test_item_too_large_for_grid() {
        let mut dest = StorageGrid::with_size(ContainerKind::Storage, 1, 1);
        dest.load_records(vec![record(1, "Axe", 2, 2, 0)]).unwrap();
        let mut actuator = DryRunActuator::default();

        let report = SortEngine::default().sort(&mut dest, None, &mut actuator, &CancellationToken::new());

        assert!(matches!(
            report.failure(),
            Some(SortFailure::OutOfSpace { item: ItemKey(1), .. })
        ));
        assert!(report.placements.is_empty());
        assert!(actuator.drags().is_empty());
    }

    #[test]
    fn test_cancel_after_first_placement() {
        let mut dest = stash(vec![
            record(1, "Axe", 1, 1, 239),
            record(2, "Bow", 1, 1, 238),
            record(3, "Cap", 1, 1, 237),
        ]);
        let token = CancellationToken::new();
        let mut actuator = CancelAfter {
            moves: 0,
            after: 1,
            token: token.clone(),
        };

        let report = SortEngine::default().sort(&mut dest, Some(&mut bag()), &mut actuator, &token);

        assert!(report.is_cancelled());
        assert_eq!(report.placements.len(), 1);
        assert_eq!(report.placements[0].to.pos, Position::new(0, 0));
        assert_eq!(actuator.moves, 1);
    }

    #[test]
    fn test_cancel_before_start() {
        let mut dest = stash(vec![record(1, "Axe", 1, 1, 5)]);
        let token = CancellationToken::new();
        token.cancel();
        let report = SortEngine::default().sort(&mut dest, None, &mut DryRunActuator::default(), &token);
        assert!(report.is_cancelled());
        assert!(report.placements.is_empty());
    }

    #[test]
    fn test_already_sorted_is_noop() {
        let mut dest = stash(vec![
            record(1, "Bow", 2, 4, 0),
            record(2, "Axe", 2, 2, 2),
            record(3, "Gem", 1, 1, 4),
        ]);
        let mut actuator = DryRunActuator::default();
        let report = SortEngine::default().sort(&mut dest, None, &mut actuator, &CancellationToken::new());

        assert!(report.is_completed());
        assert!(report.placements.is_empty());
        assert_eq!(report.unchanged, 3);
    }

    #[test]
    fn test_target_unavailable() {
        let mut dest = stash(vec![record(1, "Axe", 1, 1, 5)]);
        let report = SortEngine::default().sort(&mut dest, None, &mut NoWindow, &CancellationToken::new());
        assert!(matches!(
            report.failure(),
            Some(SortFailure::TargetUnavailable(_))
        ));
    }

    #[test]
    fn test_displacement_into_overflow() {
        // 2x1 grid: Axe (1x1) sits where Bow (2x1) must go, and the only
        // other cell is covered by Bow itself.
        let mut dest = StorageGrid::with_size(ContainerKind::Storage, 2, 2);
        dest.load_records(vec![record(1, "Bow", 2, 1, 2), record(2, "Axe", 1, 1, 0)])
            .unwrap();
        let mut overflow = bag();
        let mut actuator = DryRunActuator::default();

        let report = SortEngine::default().sort(
            &mut dest,
            Some(&mut overflow),
            &mut actuator,
            &CancellationToken::new(),
        );

        assert!(report.is_completed(), "{:?}", report.status);
        let displaced = &report.placements[0];
        assert_eq!(displaced.item, ItemKey(2));
        assert_eq!(displaced.to.container, ContainerKind::Bag);
        // Axe comes back from the bag to the second row.
        let last = report.placements.last().unwrap();
        assert_eq!(last.item, ItemKey(2));
        assert_eq!(last.from.container, ContainerKind::Bag);
        assert_eq!(last.to, Location::new(ContainerKind::Storage, Position::new(0, 1)));
        assert!(overflow.is_empty());
        assert!(dest.is_consistent());
    }

    #[test]
    fn test_no_displacement_space() {
        let mut dest = StorageGrid::with_size(ContainerKind::Storage, 2, 2);
        dest.load_records(vec![record(1, "Bow", 2, 1, 2), record(2, "Axe", 1, 1, 0)])
            .unwrap();
        let mut full = StorageGrid::with_size(ContainerKind::Bag, 1, 1);
        full.place(record(9, "Rock", 1, 1, 0), Position::new(0, 0)).unwrap();

        let report = SortEngine::default().sort(
            &mut dest,
            Some(&mut full),
            &mut DryRunActuator::default(),
            &CancellationToken::new(),
        );
        assert_eq!(
            report.failure(),
            Some(&SortFailure::NoDisplacementSpace {
                item: ItemKey(1),
                blocker: ItemKey(2)
            })
        );
        assert!(report.placements.is_empty());
    }

    fn arb_items() -> impl Strategy<Value = Vec<(u32, u32, u32)>> {
        proptest::collection::vec((1u32..=3, 1u32..=3, 0u32..240), 1..20)
    }

    proptest! {
        #[test]
        fn test_sorted_grid_is_packed(specs in arb_items()) {
            let items: Vec<ItemRecord> = specs
                .iter()
                .enumerate()
                .map(|(i, (w, h, slot))| record(i as u64 + 1, &format!("I{}", i % 4), *w, *h, *slot))
                .collect();
            let mut dest = stash(items);
            let mut overflow = bag();
            let mut actuator = DryRunActuator::default();

            let report = SortEngine::default().sort(
                &mut dest,
                Some(&mut overflow),
                &mut actuator,
                &CancellationToken::new(),
            );

            prop_assert!(report.failure().map_or(true, |f| f.is_space_error()));

            // A displaced item never lands on the item it made room for,
            // neither where it stood nor where it was going.
            for (i, d) in report.placements.iter().enumerate() {
                let (Some(owner), ContainerKind::Storage) = (d.making_room_for, d.to.container) else {
                    continue;
                };
                let moved = d.footprint.at(d.to.pos);
                if let Some(place) = report.placements[i..]
                    .iter()
                    .find(|p| p.item == owner && p.kind == PlacementKind::Place)
                {
                    prop_assert!(!moved.intersects(&place.footprint.at(place.to.pos)));
                    if place.from.container == ContainerKind::Storage {
                        prop_assert!(!moved.intersects(&place.footprint.at(place.from.pos)));
                    }
                }
            }

            if report.is_completed() {
                prop_assert!(dest.is_consistent());
                prop_assert!(overflow.is_empty());
                prop_assert_eq!(dest.len(), specs.len());

                let mut seen = Vec::new();
                for y in 0..dest.height() {
                    for x in 0..dest.width() {
                        if let Some(k) = dest.occupant(x, y) {
                            if !seen.contains(&k) {
                                seen.push(k);
                            }
                        }
                    }
                }
                prop_assert_eq!(seen, report.sequence.clone());
            }
        }
    }
}
