//! Host-facing entry points.
//!
//! [`StashService`] ties the snapshot cache, the capture session and the sort
//! engine together. Captured character detail flows from the capture worker
//! into the cache; sorts read immutable snapshots from the cache and build
//! private grids from them.

use crate::config::Config;
use crate::error::ServiceError;
use parking_lot::Mutex;
use stashsort_capture::{
    default_backend, CaptureBackend, CaptureSession, CaptureStatus, MessageSink, StopOutcome,
};
use stashsort_core::{
    Actuator, CancellationToken, ContainerKind, DryRunActuator, ItemRecord, SortEngine,
    SortReport, SortStatus, StorageGrid,
};
use stashsort_storage::{
    CharacterSnapshot, ItemCatalog, SnapshotBuilder, SnapshotCache, SnapshotStore, StorageError,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// A sort running on its own thread.
pub struct SortHandle {
    token: CancellationToken,
    handle: JoinHandle<Result<SortReport, ServiceError>>,
}

impl SortHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Requests cancellation. The sort stops at its next poll point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the sort to stop.
    pub fn join(self) -> Result<SortReport, ServiceError> {
        self.handle
            .join()
            .map_err(|_| ServiceError::WorkerPanicked)?
    }
}

/// The in-flight sort's token, cleared when the sort ends.
struct SortSlot {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Drop for SortSlot {
    fn drop(&mut self) {
        *self.current.lock() = None;
    }
}

/// Snapshot, sort and capture entry points.
pub struct StashService {
    config: Config,
    cache: Arc<SnapshotCache>,
    capture: CaptureSession,
    engine: SortEngine,
    overflow: ContainerKind,
    actuator: Mutex<Box<dyn Actuator>>,
    current_sort: Arc<Mutex<Option<CancellationToken>>>,
}

impl StashService {
    /// Opens the snapshot store, loads every persisted character and prepares
    /// a stopped capture session. Capture is not started here; see
    /// [`StashService::should_auto_start`].
    pub fn new(
        config: Config,
        backend: Arc<dyn CaptureBackend>,
        actuator: Box<dyn Actuator>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let engine = SortEngine::new(config.sort.order()?);
        let overflow = config.sort.overflow_kind()?;

        let catalog = match &config.storage.catalog {
            Some(path) => ItemCatalog::load(path)?,
            None => ItemCatalog::empty(),
        };
        let store = Arc::new(SnapshotStore::open(&config.storage.data_dir)?);
        let cache = Arc::new(SnapshotCache::new(
            store,
            SnapshotBuilder::new(Arc::new(catalog)),
        ));
        let loaded = cache.rebuild_all()?;
        info!(
            "Loaded {} character snapshot(s) from {}",
            loaded,
            config.storage.data_dir.display()
        );

        let sink_cache = cache.clone();
        let sink: MessageSink = Arc::new(move |message| {
            if let Err(e) = sink_cache.ingest(&message) {
                error!("Failed to store {}: {}", message.command().name(), e);
            }
        });
        let capture = CaptureSession::new(config.session_config(), backend, sink);

        Ok(Self {
            config,
            cache,
            capture,
            engine,
            overflow,
            actuator: Mutex::new(actuator),
            current_sort: Arc::new(Mutex::new(None)),
        })
    }

    /// Uses the build's default capture backend. Moves are only logged; a
    /// pointer driver is plugged in through [`StashService::new`].
    pub fn open(config: Config) -> Result<Self, ServiceError> {
        let backend = default_backend(config.capture.snaplen, config.capture.read_timeout());
        let actuator = Box::new(DryRunActuator::new(config.screen.clone()));
        Self::new(config, backend, actuator)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn overflow(&self) -> ContainerKind {
        self.overflow
    }

    // --- snapshots ---

    pub fn characters(&self) -> Vec<u64> {
        self.cache.characters()
    }

    pub fn active_character(&self) -> Option<u64> {
        self.cache.active()
    }

    pub fn set_active_character(&self, character_id: u64) -> Result<(), ServiceError> {
        Ok(self.cache.set_active(character_id)?)
    }

    /// Items of `container` for the active character.
    pub fn get_snapshot(&self, container: ContainerKind) -> Result<Vec<ItemRecord>, ServiceError> {
        Ok(self.cache.get_snapshot(container)?)
    }

    pub fn snapshot(
        &self,
        character_id: u64,
        container: ContainerKind,
    ) -> Result<Vec<ItemRecord>, ServiceError> {
        Ok(self.cache.snapshot(character_id, container)?)
    }

    // --- sorting ---

    /// Sorts `container` of `character` (the active character when `None`),
    /// blocking until the sort completes, fails or observes `cancel`.
    pub fn sort(
        &self,
        character: Option<u64>,
        container: ContainerKind,
        cancel: &CancellationToken,
    ) -> Result<SortReport, ServiceError> {
        let slot = self.begin_sort(cancel)?;
        let result = self.run_sort(character, container, cancel);
        drop(slot);
        result
    }

    /// Starts a sort on a worker thread.
    ///
    /// A second sort is refused while one is running.
    pub fn spawn_sort(
        self: &Arc<Self>,
        character: Option<u64>,
        container: ContainerKind,
    ) -> Result<SortHandle, ServiceError> {
        let token = CancellationToken::new();
        let slot = self.begin_sort(&token)?;
        let service = Arc::clone(self);
        let cancel = token.clone();
        let handle = std::thread::Builder::new()
            .name("stashsort-sort".to_string())
            .spawn(move || {
                let result = service.run_sort(character, container, &cancel);
                drop(slot);
                result
            })?;
        Ok(SortHandle { token, handle })
    }

    /// Signals the running sort, if any. Returns whether one was running.
    pub fn cancel_sort(&self) -> bool {
        match self.current_sort.lock().as_ref() {
            Some(token) => {
                info!("Cancelling running sort");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_sorting(&self) -> bool {
        self.current_sort.lock().is_some()
    }

    /// Computes the moves a sort would make without driving the actuator.
    /// Returns the report and the destination grid as it would end up.
    pub fn plan(
        &self,
        character: Option<u64>,
        container: ContainerKind,
    ) -> Result<(SortReport, StorageGrid), ServiceError> {
        let (mut dest, mut overflow) = self.sort_grids(character, container)?;
        let mut actuator = DryRunActuator::new(self.config.screen.clone());
        let report = self.engine.sort(
            &mut dest,
            Some(&mut overflow),
            &mut actuator,
            &CancellationToken::new(),
        );
        Ok((report, dest))
    }

    fn begin_sort(&self, token: &CancellationToken) -> Result<SortSlot, ServiceError> {
        let mut current = self.current_sort.lock();
        if current.is_some() {
            return Err(ServiceError::SortInProgress);
        }
        *current = Some(token.clone());
        Ok(SortSlot {
            current: self.current_sort.clone(),
        })
    }

    fn run_sort(
        &self,
        character: Option<u64>,
        container: ContainerKind,
        cancel: &CancellationToken,
    ) -> Result<SortReport, ServiceError> {
        let (mut dest, mut overflow) = self.sort_grids(character, container)?;
        let mut actuator = self.actuator.lock();
        let report = self
            .engine
            .sort(&mut dest, Some(&mut overflow), actuator.as_mut(), cancel);

        match &report.status {
            SortStatus::Completed => info!(
                "Sorted {}: {} move(s), {} unchanged",
                container,
                report.placements.len(),
                report.unchanged
            ),
            SortStatus::Cancelled => info!(
                "Sort of {} cancelled after {} move(s)",
                container,
                report.placements.len()
            ),
            SortStatus::Failed(failure) => warn!(
                "Sort of {} stopped after {} move(s): {}",
                container,
                report.placements.len(),
                failure
            ),
        }
        Ok(report)
    }

    /// Fresh destination and overflow grids from one snapshot.
    fn sort_grids(
        &self,
        character: Option<u64>,
        container: ContainerKind,
    ) -> Result<(StorageGrid, StorageGrid), ServiceError> {
        if !container.is_sortable() {
            return Err(ServiceError::NotSortable(container));
        }
        if container == self.overflow {
            return Err(ServiceError::OverflowIsDestination(container));
        }
        let snapshot = self.resolve(character)?;
        if snapshot.container(container).is_none() {
            return Err(StorageError::ContainerNotFound {
                character: snapshot.character_id,
                container,
            }
            .into());
        }
        let dest = snapshot.grid(container)?;
        let overflow = snapshot.grid(self.overflow)?;
        Ok((dest, overflow))
    }

    fn resolve(&self, character: Option<u64>) -> Result<Arc<CharacterSnapshot>, ServiceError> {
        let id = match character {
            Some(id) => id,
            None => self.cache.active().ok_or(StorageError::NoActiveCharacter)?,
        };
        Ok(self.cache.character(id)?)
    }

    // --- capture ---

    /// Whether the previous run ended while capturing.
    pub fn should_auto_start(&self) -> bool {
        self.capture.should_auto_start()
    }

    pub fn start_capture(&self) -> Result<(), ServiceError> {
        Ok(self.capture.start()?)
    }

    pub fn stop_capture(&self) -> Result<StopOutcome, ServiceError> {
        Ok(self.capture.stop()?)
    }

    pub fn restart_capture(&self) -> Result<(), ServiceError> {
        Ok(self.capture.restart()?)
    }

    pub fn capture_state(&self) -> CaptureStatus {
        self.capture.status()
    }
}
