//! # stashsort-protocol
//!
//! Wire protocol implementation for the game client's lobby traffic.
//!
//! This crate provides:
//! - The 8-byte little-endian frame header and its validation limits
//! - Per-stream reassembly of captured TCP payload into complete frames
//! - The known command enumeration and Protocol-Buffers message schemas
//! - A command-keyed router that decodes bodies and dispatches to handlers

pub mod command;
pub mod error;
pub mod frame;
pub mod message;
pub mod reassembly;
pub mod router;

pub use command::{CommandSet, PacketCommand};
pub use error::ProtocolError;
pub use frame::{Frame, FrameHeader, HeaderLimits, HEADER_SIZE};
pub use message::{
    CharacterDataBase, CharacterInfoResponse, CharacterListResponse, CharacterSummary, ItemInfo,
    ItemProperty, Nickname, StorageInfo,
};
pub use reassembly::{
    DecodeEvent, Reassembler, ReassemblyConfig, ReassemblyMode, ReassemblyStats, StreamKey,
};
pub use router::{Dispatch, Message, MessageRouter};

/// Smallest valid frame: a bare header with an empty body.
pub const MIN_FRAME_LEN: u32 = HEADER_SIZE as u32;

/// Largest frame accepted by default (2 MiB).
pub const MAX_FRAME_LEN: u32 = 2 * 1024 * 1024;

/// Reassembly buffer cap per stream (1 MiB). Exceeding it resets the stream.
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Reserved header values observed on the wire.
pub const DEFAULT_RESERVED_VALUES: [u16; 2] = [0, 256];
