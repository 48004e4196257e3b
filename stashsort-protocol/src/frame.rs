//! Binary frame format.
//!
//! Frame layout (8 bytes header + body), all fields little-endian:
//!
//! ```text
//! +--------------+--------------+------------+------------------------+
//! | total_length | command_code |  reserved  | body                   |
//! |   4 bytes    |   2 bytes    |  2 bytes   | total_length - 8 bytes |
//! +--------------+--------------+------------+------------------------+
//! ```
//!
//! `total_length` counts the whole frame, header included. The body is a
//! Protocol-Buffers message whose schema is selected by `command_code`.

use crate::command::CommandSet;
use crate::error::ProtocolError;
use crate::{DEFAULT_RESERVED_VALUES, MAX_FRAME_LEN, MIN_FRAME_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed frame header in bytes (4+2+2 = 8).
pub const HEADER_SIZE: usize = 8;

/// Bounds a header must satisfy before its length is trusted.
///
/// The exact windows accepted by the game have varied between client
/// versions, so they are configuration rather than constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLimits {
    /// Minimum `total_length`, inclusive.
    pub min_length: u32,
    /// Maximum `total_length`, inclusive.
    pub max_length: u32,
    /// Accepted values of the reserved field.
    pub reserved_values: Vec<u16>,
    /// Recognised command codes.
    pub commands: CommandSet,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self {
            min_length: MIN_FRAME_LEN,
            max_length: MAX_FRAME_LEN,
            reserved_values: DEFAULT_RESERVED_VALUES.to_vec(),
            commands: CommandSet::known(),
        }
    }
}

impl HeaderLimits {
    pub fn with_length_range(mut self, min: u32, max: u32) -> Self {
        self.min_length = min.max(MIN_FRAME_LEN);
        self.max_length = max;
        self
    }

    pub fn with_reserved_values(mut self, values: Vec<u16>) -> Self {
        self.reserved_values = values;
        self
    }

    pub fn with_commands(mut self, commands: CommandSet) -> Self {
        self.commands = commands;
        self
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub total_length: u32,
    pub command_code: u16,
    pub reserved: u16,
}

impl FrameHeader {
    /// Parses a header from the first 8 bytes of `buf` without consuming.
    ///
    /// Returns `None` if fewer than 8 bytes are available.
    pub fn peek(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut cursor = &buf[..HEADER_SIZE];
        Some(Self {
            total_length: cursor.get_u32_le(),
            command_code: cursor.get_u16_le(),
            reserved: cursor.get_u16_le(),
        })
    }

    /// Checks the header against the configured limits.
    pub fn validate(&self, limits: &HeaderLimits) -> Result<(), ProtocolError> {
        if self.total_length < limits.min_length {
            return Err(ProtocolError::FrameTooShort {
                length: self.total_length,
                min: limits.min_length,
            });
        }
        if self.total_length > limits.max_length {
            return Err(ProtocolError::FrameTooLarge {
                length: self.total_length,
                max: limits.max_length,
            });
        }
        if !limits.reserved_values.contains(&self.reserved) {
            return Err(ProtocolError::InvalidReserved(self.reserved));
        }
        if !limits.commands.contains(self.command_code) {
            return Err(ProtocolError::UnknownCommand(self.command_code));
        }
        Ok(())
    }

    /// Body length implied by `total_length`.
    pub fn body_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(HEADER_SIZE)
    }
}

/// A complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command code selecting the body schema.
    pub command_code: u16,
    /// Reserved header field, carried through for diagnostics.
    pub reserved: u16,
    /// Protocol-Buffers encoded body.
    pub body: Bytes,
}

impl Frame {
    pub fn new(command_code: u16, body: Bytes) -> Self {
        Self {
            command_code,
            reserved: 0,
            body,
        }
    }

    pub fn with_reserved(mut self, reserved: u16) -> Self {
        self.reserved = reserved;
        self
    }

    /// Total on-wire length including the header.
    pub fn total_length(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let total = self.total_length();
        if total > u32::MAX as usize {
            return Err(ProtocolError::FrameTooLarge {
                length: u32::MAX,
                max: MAX_FRAME_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(total as u32);
        buf.put_u16_le(self.command_code);
        buf.put_u16_le(self.reserved);
        buf.put_slice(&self.body);
        Ok(buf)
    }

    /// Decodes one frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` and consumes its bytes if a complete, valid
    /// frame is present, `Ok(None)` if more data is needed, or `Err` if the
    /// header is invalid (nothing is consumed in that case).
    pub fn decode(buf: &mut BytesMut, limits: &HeaderLimits) -> Result<Option<Self>, ProtocolError> {
        let header = match FrameHeader::peek(buf) {
            Some(header) => header,
            None => return Ok(None),
        };
        header.validate(limits)?;

        let total = header.total_length as usize;
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame = buf.split_to(total);
        frame.advance(HEADER_SIZE);

        Ok(Some(Self {
            command_code: header.command_code,
            reserved: header.reserved,
            body: frame.freeze(),
        }))
    }
}
