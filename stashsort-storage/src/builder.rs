//! Inventory snapshot builder.
//!
//! Turns a decoded character-detail message into per-container item records
//! with resolved grid slots. Building is a pure function of the message and
//! the catalog: the same message always yields the same mapping.

use crate::catalog::{strip_design_prefix, ItemCatalog};
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use stashsort_core::{ContainerKind, ItemKey, ItemRecord, Position, StorageGrid};
use stashsort_protocol::{CharacterDataBase, ItemInfo};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Everything captured about one character, grouped by container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub character_id: u64,
    pub nickname: String,
    pub class: String,
    pub level: u32,
    pub containers: BTreeMap<ContainerKind, Vec<ItemRecord>>,
}

impl CharacterSnapshot {
    /// Items of one container, ordered by slot.
    pub fn container(&self, kind: ContainerKind) -> Option<&[ItemRecord]> {
        self.containers.get(&kind).map(Vec::as_slice)
    }

    pub fn item_count(&self) -> usize {
        self.containers.values().map(Vec::len).sum()
    }

    /// Builds a fresh grid for a container. Containers the capture did not
    /// mention are empty.
    pub fn grid(&self, kind: ContainerKind) -> Result<StorageGrid, StorageError> {
        let records = self.container(kind).unwrap_or_default().iter().cloned();
        Ok(StorageGrid::load(kind, records)?)
    }
}

/// Builds [`CharacterSnapshot`]s from decoded messages.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    catalog: Arc<ItemCatalog>,
}

impl SnapshotBuilder {
    pub fn new(catalog: Arc<ItemCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn build(&self, data: &CharacterDataBase) -> CharacterSnapshot {
        CharacterSnapshot {
            character_id: data.character_id,
            nickname: data.display_name(),
            class: data.character_class.clone(),
            level: data.level,
            containers: self.build_containers(data),
        }
    }

    /// Groups every item of the message by container and resolves slots.
    ///
    /// Storage containers come first, then carried items grouped by their own
    /// inventory id. Items with an explicit slot keep it; the rest take the
    /// lowest free slot, in message order.
    pub fn build_containers(
        &self,
        data: &CharacterDataBase,
    ) -> BTreeMap<ContainerKind, Vec<ItemRecord>> {
        let mut grouped: Vec<(ContainerKind, Vec<&ItemInfo>)> = Vec::new();
        let sources = data
            .storage_infos
            .iter()
            .flat_map(|s| s.items.iter().map(move |i| (s.inventory_id, i)))
            .chain(data.item_list.iter().map(|i| (i.inventory_id, i)));
        for (inventory_id, item) in sources {
            let kind = ContainerKind::from_id(inventory_id);
            match grouped.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, items)) => items.push(item),
                None => grouped.push((kind, vec![item])),
            }
        }

        let mut keys = KeyAllocator::default();
        grouped
            .into_iter()
            .map(|(kind, items)| (kind, self.assign_slots(kind, &items, &mut keys)))
            .collect()
    }

    fn assign_slots(
        &self,
        kind: ContainerKind,
        items: &[&ItemInfo],
        keys: &mut KeyAllocator,
    ) -> Vec<ItemRecord> {
        let mut slots = SlotMap::new(kind);
        let mut records: Vec<ItemRecord> = items
            .iter()
            .map(|info| self.record(info, kind, 0, keys.allocate(info.item_unique_id)))
            .collect();

        for (record, info) in records.iter_mut().zip(items) {
            if let Some(slot) = info.slot_id {
                record.slot_index = slot;
                slots.occupy(record);
            }
        }
        for (record, info) in records.iter_mut().zip(items) {
            if info.slot_id.is_none() {
                record.slot_index = slots.first_free(record);
                slots.occupy(record);
                tracing::debug!(
                    "Assigned {} to slot {} of {}",
                    record.key,
                    record.slot_index,
                    kind
                );
            }
        }

        records.sort_by_key(|r| (r.slot_index, r.key));
        records
    }

    /// Resolves one item against the catalog.
    pub fn record(&self, info: &ItemInfo, kind: ContainerKind, slot: u32, key: ItemKey) -> ItemRecord {
        let desc = self.catalog.describe(&info.item_id);
        ItemRecord {
            key,
            item_type_id: strip_design_prefix(&info.item_id).to_string(),
            display_name: desc.name,
            rarity: desc.rarity,
            width: desc.width,
            height: desc.height,
            slot_index: slot,
            stack_count: info.item_count.max(1),
            container: kind,
        }
    }
}

/// Hands out item keys, replacing missing or repeated server ids with
/// synthetic ones counted down from `u64::MAX`.
#[derive(Default)]
struct KeyAllocator {
    seen: HashSet<u64>,
    synthetic: u64,
}

impl KeyAllocator {
    fn allocate(&mut self, unique_id: u64) -> ItemKey {
        if unique_id != 0 && self.seen.insert(unique_id) {
            return ItemKey(unique_id);
        }
        loop {
            let candidate = u64::MAX - self.synthetic;
            self.synthetic += 1;
            if self.seen.insert(candidate) {
                tracing::debug!(
                    "Item id {} missing or repeated, using synthetic key {}",
                    unique_id,
                    candidate
                );
                return ItemKey(candidate);
            }
        }
    }
}

/// Slot occupancy while assigning. Grid containers track covered cells;
/// others (equipment) track slot ids.
enum SlotMap {
    Grid {
        width: u32,
        height: u32,
        cells: Vec<bool>,
    },
    Slots(BTreeSet<u32>),
}

impl SlotMap {
    fn new(kind: ContainerKind) -> Self {
        match kind.dimensions() {
            Some((width, height)) => SlotMap::Grid {
                width,
                height,
                cells: vec![false; (width * height) as usize],
            },
            None => SlotMap::Slots(BTreeSet::new()),
        }
    }

    fn occupy(&mut self, record: &ItemRecord) {
        match self {
            SlotMap::Grid {
                width,
                height,
                cells,
            } => {
                let rect = record.footprint().at(record.position(*width));
                for (x, y) in rect.cells() {
                    if x < *width && y < *height {
                        cells[(y * *width + x) as usize] = true;
                    }
                }
            }
            SlotMap::Slots(taken) => {
                taken.insert(record.slot_index);
            }
        }
    }

    /// Lowest slot whose footprint is in bounds and free; failing that the
    /// lowest free cell; failing that the first slot past the grid.
    fn first_free(&self, record: &ItemRecord) -> u32 {
        match self {
            SlotMap::Grid {
                width,
                height,
                cells,
            } => {
                let total = width * height;
                let free = |slot: u32| {
                    let rect = record.footprint().at(Position::from_slot(slot, *width));
                    rect.fits_within(*width, *height)
                        && rect.cells().all(|(x, y)| !cells[(y * *width + x) as usize])
                };
                (0..total)
                    .find(|&slot| free(slot))
                    .or_else(|| (0..total).find(|&slot| !cells[slot as usize]))
                    .unwrap_or(total)
            }
            SlotMap::Slots(taken) => (0..).find(|s| !taken.contains(s)).unwrap_or(u32::MAX),
        }
    }
}
