//! Capture backend abstraction.
//!
//! A backend resolves the local address of an interface and opens packet
//! sources on it, optionally with a kernel filter. The session only depends on
//! these traits; the libpcap backend lives behind the `pcap` feature.

use crate::error::CaptureError;
use crate::packet::{RawPacket, TcpSegment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Interrupts a source from another thread. A read blocked in the source
/// returns promptly and every later read fails.
pub type SourceCloser = Arc<dyn Fn() + Send + Sync>;

/// A source of captured packets.
pub trait PacketSource: Send {
    /// Returns the next packet, or `Ok(None)` when the read timeout expired
    /// without one. Callers poll their stop flag between calls.
    fn next_packet(&mut self) -> Result<Option<RawPacket>, CaptureError>;

    /// A handle that closes this source while a read is blocked, if the
    /// source supports one.
    fn closer(&self) -> Option<SourceCloser> {
        None
    }
}

/// Opens packet sources.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn local_ipv4(&self, interface: &str) -> Result<Ipv4Addr, CaptureError>;

    /// Opens `interface`. With `filter` set the kernel applies it; without,
    /// every packet on the interface is delivered.
    fn open(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> Result<Box<dyn PacketSource>, CaptureError>;
}

/// How packets are being selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// The kernel filter does the selection.
    Kernel,
    /// Unfiltered capture; [`CaptureFilter::matches`] runs per packet.
    UserSpace,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Kernel => write!(f, "kernel"),
            CaptureMode::UserSpace => write!(f, "user_space"),
        }
    }
}

/// Selects game-server-to-client TCP traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFilter {
    pub local_ip: Ipv4Addr,
    pub port_low: u16,
    pub port_high: u16,
}

impl CaptureFilter {
    pub fn new(local_ip: Ipv4Addr, port_range: (u16, u16)) -> Self {
        Self {
            local_ip,
            port_low: port_range.0,
            port_high: port_range.1,
        }
    }

    /// The equivalent BPF expression.
    pub fn expression(&self) -> String {
        format!(
            "tcp and dst host {} and src portrange {}-{}",
            self.local_ip, self.port_low, self.port_high
        )
    }

    /// User-space form of [`Self::expression`].
    pub fn matches(&self, segment: &TcpSegment) -> bool {
        *segment.key.dst.ip() == self.local_ip
            && (self.port_low..=self.port_high).contains(&segment.key.src.port())
    }
}

/// Backend used when the crate is built without a capture library.
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl CaptureBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn local_ipv4(&self, _interface: &str) -> Result<Ipv4Addr, CaptureError> {
        Err(CaptureError::BackendUnavailable(
            "built without the pcap feature".to_string(),
        ))
    }

    fn open(
        &self,
        _interface: &str,
        _filter: Option<&str>,
    ) -> Result<Box<dyn PacketSource>, CaptureError> {
        Err(CaptureError::BackendUnavailable(
            "built without the pcap feature".to_string(),
        ))
    }
}

/// The best backend this build has.
pub fn default_backend(snaplen: i32, read_timeout: Duration) -> Arc<dyn CaptureBackend> {
    #[cfg(feature = "pcap")]
    {
        Arc::new(crate::pcap_backend::PcapBackend::new(snaplen, read_timeout))
    }
    #[cfg(not(feature = "pcap"))]
    {
        let _ = (snaplen, read_timeout);
        Arc::new(UnavailableBackend)
    }
}
