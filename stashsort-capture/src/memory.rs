//! In-memory capture backend that replays scripted packets.

use crate::backend::{CaptureBackend, PacketSource, SourceCloser};
use crate::error::CaptureError;
use crate::packet::RawPacket;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Script {
    queue: VecDeque<RawPacket>,
    stall: Option<Duration>,
    read_error: Option<String>,
}

/// Backend whose packets are pushed by the caller.
///
/// Every source opened from it drains the same queue. It can be told to
/// reject kernel filters, to fail opening altogether, to stall reads (a
/// driver that ignores the stop flag) or to fail the next read. Stalled reads
/// end early when the source is closed, unless closing is disabled.
pub struct MemoryBackend {
    local_ip: Option<Ipv4Addr>,
    poll: Duration,
    script: Arc<Mutex<Script>>,
    reject_filter: AtomicBool,
    fail_open: AtomicBool,
    closable: Arc<AtomicBool>,
    opens: Mutex<Vec<Option<String>>>,
    closes: Arc<Mutex<usize>>,
}

impl MemoryBackend {
    pub fn new(local_ip: Ipv4Addr) -> Self {
        Self {
            local_ip: Some(local_ip),
            poll: Duration::from_millis(5),
            script: Arc::new(Mutex::new(Script::default())),
            reject_filter: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            closable: Arc::new(AtomicBool::new(true)),
            opens: Mutex::new(Vec::new()),
            closes: Arc::new(Mutex::new(0)),
        }
    }

    /// A backend whose interface has no IPv4 address.
    pub fn without_address() -> Self {
        Self {
            local_ip: None,
            ..Self::new(Ipv4Addr::UNSPECIFIED)
        }
    }

    pub fn push(&self, packet: RawPacket) {
        self.script.lock().queue.push_back(packet);
    }

    pub fn pending(&self) -> usize {
        self.script.lock().queue.len()
    }

    pub fn reject_filter(&self, reject: bool) {
        self.reject_filter.store(reject, Ordering::SeqCst);
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes every read block for `stall` before returning.
    pub fn stall(&self, stall: Option<Duration>) {
        self.script.lock().stall = stall;
    }

    /// Makes the next read fail.
    pub fn fail_next_read(&self, message: &str) {
        self.script.lock().read_error = Some(message.to_string());
    }

    /// Whether opened sources hand out a closer.
    pub fn closable(&self, closable: bool) {
        self.closable.store(closable, Ordering::SeqCst);
    }

    /// How many sources were closed through their closer.
    pub fn closes(&self) -> usize {
        *self.closes.lock()
    }

    /// The filter argument of every successful open, in order.
    pub fn opens(&self) -> Vec<Option<String>> {
        self.opens.lock().clone()
    }
}

impl CaptureBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn local_ipv4(&self, interface: &str) -> Result<Ipv4Addr, CaptureError> {
        self.local_ip
            .ok_or_else(|| CaptureError::NoIpv4Address(interface.to_string()))
    }

    fn open(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> Result<Box<dyn PacketSource>, CaptureError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::InterfaceNotFound(interface.to_string()));
        }
        if filter.is_some() && self.reject_filter.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied(
                "kernel filter needs elevated privileges".to_string(),
            ));
        }
        self.opens.lock().push(filter.map(str::to_string));
        Ok(Box::new(MemorySource {
            script: self.script.clone(),
            poll: self.poll,
            closed: Arc::new(AtomicBool::new(false)),
            closable: self.closable.load(Ordering::SeqCst),
            closes: self.closes.clone(),
        }))
    }
}

struct MemorySource {
    script: Arc<Mutex<Script>>,
    poll: Duration,
    closed: Arc<AtomicBool>,
    closable: bool,
    closes: Arc<Mutex<usize>>,
}

impl PacketSource for MemorySource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>, CaptureError> {
        let stall = self.script.lock().stall;
        if let Some(stall) = stall {
            let deadline = Instant::now() + stall;
            while Instant::now() < deadline && !self.closed.load(Ordering::SeqCst) {
                thread::sleep(self.poll);
            }
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::Closed);
        }

        let mut script = self.script.lock();
        if let Some(message) = script.read_error.take() {
            return Err(CaptureError::Backend(message));
        }
        match script.queue.pop_front() {
            Some(packet) => Ok(Some(packet)),
            None => {
                drop(script);
                thread::sleep(self.poll);
                Ok(None)
            }
        }
    }

    fn closer(&self) -> Option<SourceCloser> {
        if !self.closable {
            return None;
        }
        let closed = self.closed.clone();
        let closes = self.closes.clone();
        Some(Arc::new(move || {
            if !closed.swap(true, Ordering::SeqCst) {
                *closes.lock() += 1;
            }
        }))
    }
}
