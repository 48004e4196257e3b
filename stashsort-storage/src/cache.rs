//! Single-flight snapshot cache.
//!
//! Readers clone an `Arc` of the current character map and never observe a
//! partially rebuilt one. Writers (full rebuilds and per-character refreshes)
//! are serialised by a mutex and publish by swapping the `Arc`.

use crate::builder::{CharacterSnapshot, SnapshotBuilder};
use crate::error::StorageError;
use crate::store::{Persisted, SnapshotStore};
use parking_lot::{Mutex, RwLock};
use stashsort_core::{ContainerKind, ItemRecord};
use stashsort_protocol::{CharacterDataBase, Message};
use std::collections::HashMap;
use std::sync::Arc;

type SnapshotMap = HashMap<u64, Arc<CharacterSnapshot>>;

pub struct SnapshotCache {
    store: Arc<SnapshotStore>,
    builder: SnapshotBuilder,
    snapshots: RwLock<Arc<SnapshotMap>>,
    active: RwLock<Option<u64>>,
    rebuild: Mutex<()>,
}

impl SnapshotCache {
    pub fn new(store: Arc<SnapshotStore>, builder: SnapshotBuilder) -> Self {
        Self {
            store,
            builder,
            snapshots: RwLock::new(Arc::new(HashMap::new())),
            active: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn builder(&self) -> &SnapshotBuilder {
        &self.builder
    }

    /// Rebuilds the whole cache from the store.
    ///
    /// Unreadable character files are skipped with a warning. If no active
    /// character is set (or it vanished) the most recently saved one becomes
    /// active.
    pub fn rebuild_all(&self) -> Result<usize, StorageError> {
        let _guard = self.rebuild.lock();

        let mut map = SnapshotMap::new();
        for id in self.store.list_characters()? {
            match self.store.load_character(id) {
                Ok(data) => {
                    map.insert(id, Arc::new(self.builder.build(&data)));
                }
                Err(e) => tracing::warn!("Skipping character {}: {}", id, e),
            }
        }
        let count = map.len();

        let latest = self
            .store
            .latest_character()?
            .filter(|id| map.contains_key(id))
            .or_else(|| map.keys().max().copied());
        {
            let mut active = self.active.write();
            if active.map_or(true, |id| !map.contains_key(&id)) {
                *active = latest;
            }
        }
        *self.snapshots.write() = Arc::new(map);

        tracing::info!("Snapshot cache rebuilt with {} characters", count);
        Ok(count)
    }

    /// Reloads one character from the store.
    pub fn refresh_character(&self, character_id: u64) -> Result<Arc<CharacterSnapshot>, StorageError> {
        let data = self.store.load_character(character_id)?;
        Ok(self.insert(&data))
    }

    /// Builds and publishes a snapshot from a decoded character detail.
    pub fn insert(&self, data: &CharacterDataBase) -> Arc<CharacterSnapshot> {
        let _guard = self.rebuild.lock();
        let snapshot = Arc::new(self.builder.build(data));

        let mut map = SnapshotMap::clone(&self.snapshots.read());
        map.insert(snapshot.character_id, snapshot.clone());
        *self.snapshots.write() = Arc::new(map);

        tracing::debug!(
            "Refreshed character {} ({} items)",
            snapshot.character_id,
            snapshot.item_count()
        );
        snapshot
    }

    /// Persists a decoded message and, for character detail, refreshes that
    /// character and makes it the active one.
    pub fn ingest(&self, message: &Message) -> Result<Persisted, StorageError> {
        let persisted = self.store.persist(message)?;
        if let Message::CharacterInfo(info) = message {
            if let Some(data) = info.character() {
                self.insert(data);
                *self.active.write() = Some(data.character_id);
                tracing::info!("Active character is now {}", data.character_id);
            }
        }
        Ok(persisted)
    }

    /// Cached character ids, ascending.
    pub fn characters(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.snapshots.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn active(&self) -> Option<u64> {
        *self.active.read()
    }

    pub fn set_active(&self, character_id: u64) -> Result<(), StorageError> {
        if !self.snapshots.read().contains_key(&character_id) {
            return Err(StorageError::CharacterNotFound(character_id));
        }
        *self.active.write() = Some(character_id);
        Ok(())
    }

    pub fn character(&self, character_id: u64) -> Result<Arc<CharacterSnapshot>, StorageError> {
        self.snapshots
            .read()
            .get(&character_id)
            .cloned()
            .ok_or(StorageError::CharacterNotFound(character_id))
    }

    /// Items of one container of one character.
    pub fn snapshot(
        &self,
        character_id: u64,
        container: ContainerKind,
    ) -> Result<Vec<ItemRecord>, StorageError> {
        let character = self.character(character_id)?;
        character
            .container(container)
            .map(<[ItemRecord]>::to_vec)
            .ok_or(StorageError::ContainerNotFound {
                character: character_id,
                container,
            })
    }

    /// Items of one container of the active character.
    pub fn get_snapshot(&self, container: ContainerKind) -> Result<Vec<ItemRecord>, StorageError> {
        let character_id = self.active().ok_or(StorageError::NoActiveCharacter)?;
        self.snapshot(character_id, container)
    }
}
