//! Capture session lifecycle.
//!
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. One worker thread
//! pumps packets through the decode pipeline while running. `start` and
//! `stop` are serialised and persist the running flag so the next launch can
//! resume.

use crate::backend::{CaptureBackend, CaptureFilter, CaptureMode, PacketSource, SourceCloser};
use crate::error::CaptureError;
use crate::pipeline::{MessageSink, Pipeline, PipelineStats};
use crate::state::{CaptureState, StateFile};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use stashsort_protocol::ReassemblyConfig;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const JOIN_POLL: Duration = Duration::from_millis(10);
const STATS_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub interface: String,
    /// Inclusive range of game server source ports.
    pub port_range: (u16, u16),
    pub state_file: PathBuf,
    /// Successive join waits when stopping; teardown is forced after the last.
    pub stop_timeouts: Vec<Duration>,
    pub reassembly: ReassemblyConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interface: "Ethernet".to_string(),
            port_range: (20200, 20300),
            state_file: PathBuf::from("capture_state.json"),
            stop_timeouts: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(6),
            ],
            reassembly: ReassemblyConfig::default(),
        }
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyStopped,
    /// The worker exited within the timeouts.
    Joined,
    /// The worker was abandoned and its pipeline state discarded.
    ForcedTeardown,
}

/// Snapshot of the session for callers.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub state: SessionState,
    pub running: bool,
    pub interface: String,
    pub port_range: (u16, u16),
    pub mode: Option<CaptureMode>,
    pub started_at: Option<DateTime<Utc>>,
    pub packets_seen: u64,
    pub frames_decoded: u64,
    pub frames_discarded: u64,
    pub messages_decoded: u64,
    pub last_error: Option<String>,
}

struct RunStatus {
    state: SessionState,
    generation: u64,
    mode: Option<CaptureMode>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    pipeline: Option<Arc<Mutex<Pipeline>>>,
    last_stats: PipelineStats,
}

struct Worker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    closer: Option<SourceCloser>,
}

/// Owns the capture worker and the persisted running flag.
pub struct CaptureSession {
    config: SessionConfig,
    backend: Arc<dyn CaptureBackend>,
    sink: MessageSink,
    state_file: StateFile,
    resume: bool,
    control: Mutex<Option<Worker>>,
    status: Arc<RwLock<RunStatus>>,
}

impl CaptureSession {
    /// Creates a stopped session and reads the previous run's state.
    pub fn new(config: SessionConfig, backend: Arc<dyn CaptureBackend>, sink: MessageSink) -> Self {
        let state_file = StateFile::new(config.state_file.clone());
        let resume = state_file.load().map(|s| s.running).unwrap_or(false);
        if resume {
            info!("Previous session was capturing; capture will resume when requested");
        }
        Self {
            config,
            backend,
            sink,
            state_file,
            resume,
            control: Mutex::new(None),
            status: Arc::new(RwLock::new(RunStatus {
                state: SessionState::Stopped,
                generation: 0,
                mode: None,
                started_at: None,
                last_error: None,
                pipeline: None,
                last_stats: PipelineStats::default(),
            })),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the previous process ended while capturing.
    pub fn should_auto_start(&self) -> bool {
        self.resume
    }

    pub fn state(&self) -> SessionState {
        self.status.read().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Starts capturing. A no-op while already running.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut control = self.control.lock();
        if matches!(self.state(), SessionState::Running | SessionState::Starting) {
            info!("Capture already running, ignoring start request");
            return Ok(());
        }
        Self::reap(&mut control);

        self.status.write().state = SessionState::Starting;
        self.persist(true);

        match self.launch() {
            Ok(worker) => {
                *control = Some(worker);
                info!(
                    "Capture started on {} (ports {}-{})",
                    self.config.interface, self.config.port_range.0, self.config.port_range.1
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to start capture: {}", e);
                {
                    let mut status = self.status.write();
                    status.state = SessionState::Stopped;
                    status.mode = None;
                    status.last_error = Some(e.to_string());
                }
                self.persist(false);
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<Worker, CaptureError> {
        let interface = &self.config.interface;
        let local_ip = self.backend.local_ipv4(interface)?;
        let filter = CaptureFilter::new(local_ip, self.config.port_range);
        let expression = filter.expression();

        let (source, mode) = match self.backend.open(interface, Some(&expression)) {
            Ok(source) => (source, CaptureMode::Kernel),
            Err(e) => {
                warn!(
                    "Kernel filter failed ({}), falling back to user-space filtering",
                    e
                );
                (self.backend.open(interface, None)?, CaptureMode::UserSpace)
            }
        };

        let mut pipeline = Pipeline::new(self.config.reassembly.clone(), self.sink.clone());
        if mode == CaptureMode::UserSpace {
            pipeline = pipeline.with_filter(filter);
        }
        let pipeline = Arc::new(Mutex::new(pipeline));
        let stop = Arc::new(AtomicBool::new(false));
        let closer = source.closer();

        let generation = {
            let mut status = self.status.write();
            status.generation += 1;
            status.generation
        };
        let handle = {
            let pipeline = pipeline.clone();
            let stop = stop.clone();
            let status = self.status.clone();
            thread::Builder::new()
                .name("stashsort-capture".to_string())
                .spawn(move || run_worker(source, pipeline, stop, status, generation))?
        };

        let mut status = self.status.write();
        status.state = SessionState::Running;
        status.mode = Some(mode);
        status.started_at = Some(Utc::now());
        status.last_error = None;
        status.pipeline = Some(pipeline);
        Ok(Worker {
            handle,
            stop,
            closer,
        })
    }

    /// Stops capturing. A no-op while already stopped.
    pub fn stop(&self) -> Result<StopOutcome, CaptureError> {
        let mut control = self.control.lock();
        if self.state() == SessionState::Stopped {
            Self::reap(&mut control);
            info!("Capture already stopped, ignoring stop request");
            return Ok(StopOutcome::AlreadyStopped);
        }

        self.status.write().state = SessionState::Stopping;
        let worker = control.take();
        if let Some(worker) = &worker {
            worker.stop.store(true, Ordering::SeqCst);
        }
        self.persist(false);

        let outcome = match worker {
            Some(worker) => self.join_worker(worker),
            None => StopOutcome::Joined,
        };

        let mut status = self.status.write();
        if let Some(pipeline) = status.pipeline.take() {
            if let Some(pipeline) = pipeline.try_lock_for(STATS_LOCK_TIMEOUT) {
                status.last_stats = pipeline.stats();
            }
        }
        status.state = SessionState::Stopped;
        status.mode = None;
        status.started_at = None;
        info!("Capture stopped");
        Ok(outcome)
    }

    /// Stops, then starts again.
    pub fn restart(&self) -> Result<(), CaptureError> {
        self.stop()?;
        self.start()
    }

    fn join_worker(&self, worker: Worker) -> StopOutcome {
        for (attempt, timeout) in self.config.stop_timeouts.iter().enumerate() {
            let deadline = Instant::now() + *timeout;
            while !worker.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }
            if worker.handle.is_finished() {
                if worker.handle.join().is_err() {
                    error!("Capture worker panicked");
                }
                return StopOutcome::Joined;
            }
            warn!(
                "Capture worker still running after {:?} (attempt {})",
                timeout,
                attempt + 1
            );
        }

        error!("Capture worker did not stop, forcing teardown");
        match &worker.closer {
            Some(close) => close(),
            None => warn!("Capture source cannot be interrupted; it closes when its read returns"),
        }
        let pipeline = self.status.read().pipeline.clone();
        if let Some(pipeline) = pipeline {
            match pipeline.try_lock_for(STATS_LOCK_TIMEOUT) {
                Some(mut pipeline) => pipeline.reset(),
                None => warn!("Capture pipeline busy, abandoning it"),
            }
        }
        // The detached worker drops anything it still reads; its stop flag
        // stays set.
        drop(worker.handle);
        StopOutcome::ForcedTeardown
    }

    /// Joins a worker that already exited on its own.
    fn reap(control: &mut Option<Worker>) {
        if control.as_ref().map_or(false, |w| w.handle.is_finished()) {
            if let Some(worker) = control.take() {
                let _ = worker.handle.join();
            }
        }
    }

    fn persist(&self, running: bool) {
        let state = CaptureState::new(running, &self.config.interface, self.config.port_range);
        if let Err(e) = self.state_file.save(&state) {
            error!(
                "Failed to save capture state to {}: {}",
                self.state_file.path().display(),
                e
            );
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let (pipeline, last) = {
            let status = self.status.read();
            (status.pipeline.clone(), status.last_stats.clone())
        };
        pipeline
            .and_then(|p| p.try_lock_for(STATS_LOCK_TIMEOUT).map(|p| p.stats()))
            .unwrap_or(last)
    }

    pub fn status(&self) -> CaptureStatus {
        let stats = self.stats();
        let status = self.status.read();
        CaptureStatus {
            state: status.state,
            running: status.state == SessionState::Running,
            interface: self.config.interface.clone(),
            port_range: self.config.port_range,
            mode: status.mode,
            started_at: status.started_at,
            packets_seen: stats.packets_seen,
            frames_decoded: stats.frames_decoded(),
            frames_discarded: stats.frames_discarded(),
            messages_decoded: stats.messages_decoded,
            last_error: status.last_error.clone(),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(worker) = self.control.get_mut().take() {
            worker.stop.store(true, Ordering::SeqCst);
            if let Some(close) = &worker.closer {
                close();
            }
        }
    }
}

fn run_worker(
    mut source: Box<dyn PacketSource>,
    pipeline: Arc<Mutex<Pipeline>>,
    stop: Arc<AtomicBool>,
    status: Arc<RwLock<RunStatus>>,
    generation: u64,
) {
    info!("Capture worker started");
    let mut failure = None;
    while !stop.load(Ordering::SeqCst) {
        match source.next_packet() {
            Ok(Some(packet)) => {
                // Checked under the lock: teardown resets the pipeline while
                // holding it, after raising the flag.
                let mut pipeline = pipeline.lock();
                if stop.load(Ordering::SeqCst) {
                    debug!("Dropping packet read after stop");
                    break;
                }
                pipeline.handle_packet(&packet);
            }
            Ok(None) => {}
            Err(_) if stop.load(Ordering::SeqCst) => break,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(source);

    match failure {
        Some(e) => {
            error!("Capture worker stopped: {}", e);
            let mut status = status.write();
            if status.generation == generation && status.state == SessionState::Running {
                status.state = SessionState::Stopped;
                status.mode = None;
                status.started_at = None;
                status.last_error = Some(e.to_string());
                if let Some(pipeline) = status.pipeline.take() {
                    status.last_stats = pipeline.lock().stats();
                }
            }
        }
        None => info!("Capture worker exited"),
    }
}
