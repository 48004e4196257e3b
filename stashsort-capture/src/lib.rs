//! # stashsort-capture
//!
//! Passive capture of the game's lobby traffic.
//!
//! This crate provides:
//! - Link-layer parsing of captured packets down to TCP segments
//! - The capture backend traits, the BPF expression and its user-space form
//! - The decode pipeline (reassembly, routing, message sink)
//! - The persisted capture state and the capture session lifecycle

pub mod backend;
pub mod error;
pub mod memory;
pub mod packet;
#[cfg(feature = "pcap")]
pub mod pcap_backend;
pub mod pipeline;
pub mod session;
pub mod state;

pub use backend::{
    default_backend, CaptureBackend, CaptureFilter, CaptureMode, PacketSource, SourceCloser,
    UnavailableBackend,
};
pub use error::CaptureError;
pub use memory::MemoryBackend;
pub use packet::{parse_packet, LinkType, RawPacket, TcpFlags, TcpSegment};
#[cfg(feature = "pcap")]
pub use pcap_backend::PcapBackend;
pub use pipeline::{MessageSink, Pipeline, PipelineStats};
pub use session::{CaptureSession, CaptureStatus, SessionConfig, SessionState, StopOutcome};
pub use state::{CaptureState, StateFile};
