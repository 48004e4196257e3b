//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors raised while validating headers, reassembling
/// streams, or decoding message bodies.
///
/// None of these are fatal to a capture session: the reassembler turns them
/// into discard events and the router turns decode failures into `None`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too short: {length} bytes (min {min})")]
    FrameTooShort { length: u32, min: u32 },

    #[error("frame too large: {length} bytes (max {max})")]
    FrameTooLarge { length: u32, max: u32 },

    #[error("invalid reserved header value: {0:#06x}")]
    InvalidReserved(u16),

    #[error("unknown command code: {0}")]
    UnknownCommand(u16),

    #[error("reassembly buffer overflow: {size} bytes (max {max})")]
    BufferOverflow { size: usize, max: usize },

    #[error("incomplete frame: need {needed} more bytes")]
    IncompleteFrame { needed: usize },

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns whether the error came from the 8-byte header rather than the
    /// buffer or the body.
    pub fn is_header_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooShort { .. }
                | ProtocolError::FrameTooLarge { .. }
                | ProtocolError::InvalidReserved(_)
                | ProtocolError::UnknownCommand(_)
        )
    }

    /// Short stable label used for discard counters and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::FrameTooShort { .. } => "too_short",
            ProtocolError::FrameTooLarge { .. } => "too_large",
            ProtocolError::InvalidReserved(_) => "invalid_reserved",
            ProtocolError::UnknownCommand(_) => "unknown_command",
            ProtocolError::BufferOverflow { .. } => "buffer_overflow",
            ProtocolError::IncompleteFrame { .. } => "incomplete",
            ProtocolError::Decode(_) => "decode",
            ProtocolError::Json(_) => "json",
        }
    }
}
