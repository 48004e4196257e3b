//! Spatial model of one container.
//!
//! The grid owns its items by key in an ordered map and stamps their keys into
//! a flat cell array. An item occupies exactly the rectangle anchored at its
//! top-left position.

use crate::container::ContainerKind;
use crate::error::GridError;
use crate::item::{Footprint, ItemKey, ItemRecord, Position, Rect};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// An item held by a grid together with its current anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridItem {
    pub record: ItemRecord,
    pub pos: Position,
}

impl GridItem {
    pub fn rect(&self) -> Rect {
        self.record.footprint().at(self.pos)
    }
}

/// Occupancy grid for one container.
#[derive(Debug, Clone)]
pub struct StorageGrid {
    kind: ContainerKind,
    width: u32,
    height: u32,
    cells: Vec<Option<ItemKey>>,
    items: BTreeMap<ItemKey, GridItem>,
}

impl StorageGrid {
    /// Creates an empty grid with the container's fixed dimensions.
    pub fn new(kind: ContainerKind) -> Result<Self, GridError> {
        let (width, height) = kind.dimensions().ok_or(GridError::NotAGrid { kind })?;
        Ok(Self::with_size(kind, width, height))
    }

    /// Creates an empty grid with explicit dimensions.
    pub fn with_size(kind: ContainerKind, width: u32, height: u32) -> Self {
        Self {
            kind,
            width,
            height,
            cells: vec![None; (width * height) as usize],
            items: BTreeMap::new(),
        }
    }

    /// Builds a grid from a captured snapshot.
    ///
    /// Loading is lenient: the capture reflects whatever the server reported,
    /// so items that leave the grid are kept with only their in-bounds cells
    /// stamped, and later items take over cells shared with earlier ones.
    pub fn load(
        kind: ContainerKind,
        records: impl IntoIterator<Item = ItemRecord>,
    ) -> Result<Self, GridError> {
        let mut grid = Self::new(kind)?;
        grid.load_records(records)?;
        Ok(grid)
    }

    /// Lenient load into an existing (usually empty) grid.
    pub fn load_records(
        &mut self,
        records: impl IntoIterator<Item = ItemRecord>,
    ) -> Result<(), GridError> {
        for record in records {
            let key = record.key;
            if self.items.contains_key(&key) {
                return Err(GridError::DuplicateItem(key));
            }
            let pos = record.position(self.width);
            let rect = record.footprint().at(pos);
            if !rect.fits_within(self.width, self.height) {
                warn!(item = %record, grid = %self.kind, "item extends past grid bounds");
            }
            self.items.insert(key, GridItem { record, pos });
            self.stamp(rect, key);
        }
        Ok(())
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: ItemKey) -> Option<&GridItem> {
        self.items.get(&key)
    }

    pub fn contains(&self, key: ItemKey) -> bool {
        self.items.contains_key(&key)
    }

    /// Items ordered by key.
    pub fn items(&self) -> impl Iterator<Item = &GridItem> {
        self.items.values()
    }

    /// The item stamped into cell `(x, y)`, if any.
    pub fn occupant(&self, x: u32, y: u32) -> Option<ItemKey> {
        self.index(x, y).and_then(|i| self.cells[i])
    }

    /// Number of empty cells.
    pub fn free_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    /// True if the item is fully in bounds and stamped into all of its cells.
    pub fn owns_footprint(&self, key: ItemKey) -> bool {
        let Some(item) = self.items.get(&key) else {
            return false;
        };
        let rect = item.rect();
        rect.fits_within(self.width, self.height)
            && rect.cells().all(|(x, y)| self.occupant(x, y) == Some(key))
    }

    /// Checks that `rect` is in bounds and holds no item other than `ignore`.
    pub fn is_region_free(&self, rect: Rect, ignore: Option<ItemKey>) -> bool {
        rect.fits_within(self.width, self.height)
            && rect.cells().all(|(x, y)| match self.occupant(x, y) {
                None => true,
                Some(k) => Some(k) == ignore,
            })
    }

    /// Places a new item at `pos`. Bounds and overlap are enforced.
    pub fn place(&mut self, mut record: ItemRecord, pos: Position) -> Result<(), GridError> {
        let key = record.key;
        if self.items.contains_key(&key) {
            return Err(GridError::DuplicateItem(key));
        }
        let rect = record.footprint().at(pos);
        self.check_region(key, rect)?;

        record.container = self.kind;
        record.slot_index = pos.to_slot(self.width);
        self.items.insert(key, GridItem { record, pos });
        self.stamp(rect, key);
        debug!(item = %key, grid = %self.kind, %pos, "placed");
        Ok(())
    }

    /// Removes an item, clearing only the cells it still owns.
    pub fn remove(&mut self, key: ItemKey) -> Result<ItemRecord, GridError> {
        let item = self.items.remove(&key).ok_or(GridError::UnknownItem(key))?;
        for (x, y) in item.rect().cells() {
            if let Some(i) = self.index(x, y) {
                if self.cells[i] == Some(key) {
                    self.cells[i] = None;
                }
            }
        }
        Ok(item.record)
    }

    /// Moves an item already in this grid to `pos`.
    ///
    /// The destination may overlap the item's own cells but no other item.
    pub fn relocate(&mut self, key: ItemKey, pos: Position) -> Result<(), GridError> {
        let footprint = self
            .items
            .get(&key)
            .map(|i| i.record.footprint())
            .ok_or(GridError::UnknownItem(key))?;
        self.check_region(key, footprint.at(pos))?;

        let record = self.remove(key)?;
        self.place(record, pos)
    }

    /// Re-stamps an item over its full footprint at its current position.
    ///
    /// Used when an item is already where it belongs but loaded over an
    /// overlapping neighbour. Fails if another item still holds one of the
    /// cells.
    pub fn claim(&mut self, key: ItemKey) -> Result<(), GridError> {
        let rect = self
            .items
            .get(&key)
            .map(GridItem::rect)
            .ok_or(GridError::UnknownItem(key))?;
        self.check_region(key, rect)?;
        self.stamp(rect, key);
        Ok(())
    }

    /// Finds an anchor whose footprint is entirely empty.
    ///
    /// Anchors are scanned in descending row-major order, bottom-right first,
    /// so temporary placements land away from the top-left region being
    /// packed.
    pub fn find_empty_slot(&self, footprint: Footprint) -> Option<Position> {
        self.find_empty_slot_avoiding(footprint, &[])
    }

    /// Like [`find_empty_slot`](Self::find_empty_slot) but also skips anchors
    /// whose rectangle intersects any of `avoid`.
    pub fn find_empty_slot_avoiding(&self, footprint: Footprint, avoid: &[Rect]) -> Option<Position> {
        if footprint.width > self.width || footprint.height > self.height {
            return None;
        }
        for y in (0..=self.height - footprint.height).rev() {
            for x in (0..=self.width - footprint.width).rev() {
                let rect = footprint.at(Position::new(x, y));
                if avoid.iter().any(|a| a.intersects(&rect)) {
                    continue;
                }
                if rect.cells().all(|(cx, cy)| self.occupant(cx, cy).is_none()) {
                    return Some(rect.anchor());
                }
            }
        }
        None
    }

    /// Checks the structural invariants: every stamped cell belongs to an
    /// item whose rectangle covers it, and no two items overlap in bounds.
    pub fn is_consistent(&self) -> bool {
        for y in 0..self.height {
            for x in 0..self.width {
                if let Some(key) = self.occupant(x, y) {
                    match self.items.get(&key) {
                        Some(item) if item.rect().contains(x, y) => {}
                        _ => return false,
                    }
                }
            }
        }
        self.items.keys().all(|k| self.owns_footprint(*k))
    }

    fn check_region(&self, key: ItemKey, rect: Rect) -> Result<(), GridError> {
        if !rect.fits_within(self.width, self.height) {
            return Err(GridError::OutOfBounds {
                item: key,
                pos: rect.anchor(),
                width: self.width,
                height: self.height,
            });
        }
        for (x, y) in rect.cells() {
            if let Some(other) = self.occupant(x, y) {
                if other != key {
                    return Err(GridError::Overlap {
                        item: key,
                        other,
                        pos: Position::new(x, y),
                    });
                }
            }
        }
        Ok(())
    }

    fn stamp(&mut self, rect: Rect, key: ItemKey) {
        for (x, y) in rect.cells() {
            if let Some(i) = self.index(x, y) {
                self.cells[i] = Some(key);
            }
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }
}
