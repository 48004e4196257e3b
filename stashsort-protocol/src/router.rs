//! Command-keyed message decoding and handler dispatch.

use crate::command::{CommandSet, PacketCommand};
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{CharacterInfoResponse, CharacterListResponse};
use prost::Message as _;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    CharacterList(CharacterListResponse),
    CharacterInfo(CharacterInfoResponse),
}

impl Message {
    pub fn command(&self) -> PacketCommand {
        match self {
            Message::CharacterList(_) => PacketCommand::AccountCharacterListRes,
            Message::CharacterInfo(_) => PacketCommand::LobbyCharacterInfoRes,
        }
    }

    /// Decodes `body` with the schema registered for `command`.
    pub fn decode(command: PacketCommand, body: &[u8]) -> Result<Self, ProtocolError> {
        Ok(match command {
            PacketCommand::AccountCharacterListRes => {
                Message::CharacterList(CharacterListResponse::decode(body)?)
            }
            PacketCommand::LobbyCharacterInfoRes => {
                Message::CharacterInfo(CharacterInfoResponse::decode(body)?)
            }
        })
    }

    /// Serializes the message to the JSON form used on disk.
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self {
            Message::CharacterList(m) => serde_json::to_vec_pretty(m)?,
            Message::CharacterInfo(m) => serde_json::to_vec_pretty(m)?,
        };
        Ok(bytes)
    }
}

/// What a handler receives for each routed frame.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch<'a> {
    pub command_code: u16,
    pub body: &'a [u8],
    /// Decoded message, if the command has a schema and the body decoded.
    pub message: Option<&'a Message>,
}

type Handler = Box<dyn Fn(Dispatch<'_>) + Send + Sync>;

/// Maps command codes to schemas and optional handlers.
pub struct MessageRouter {
    schemas: HashMap<u16, PacketCommand>,
    recognised: CommandSet,
    handlers: HashMap<u16, Handler>,
}

impl MessageRouter {
    /// Creates a router with every known schema and the given recognised set.
    pub fn new(recognised: CommandSet) -> Self {
        let schemas = PacketCommand::ALL.iter().map(|c| (c.code(), *c)).collect();
        Self {
            schemas,
            recognised,
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `command_code`, replacing any previous one.
    pub fn register<F>(&mut self, command_code: u16, handler: F)
    where
        F: Fn(Dispatch<'_>) + Send + Sync + 'static,
    {
        if self.handlers.insert(command_code, Box::new(handler)).is_some() {
            debug!(command = command_code, "replaced message handler");
        }
    }

    pub fn unregister(&mut self, command_code: u16) -> bool {
        self.handlers.remove(&command_code).is_some()
    }

    pub fn has_schema(&self, command_code: u16) -> bool {
        self.schemas.contains_key(&command_code)
    }

    pub fn has_handler(&self, command_code: u16) -> bool {
        self.handlers.contains_key(&command_code)
    }

    /// Decodes a body. Failures are logged and yield `None`.
    pub fn decode(&self, command_code: u16, body: &[u8]) -> Option<Message> {
        let Some(command) = self.schemas.get(&command_code) else {
            if self.recognised.contains(command_code) {
                debug!(command = command_code, len = body.len(), "recognised command without schema");
            } else {
                warn!(command = command_code, len = body.len(), "unknown command");
            }
            return None;
        };

        match Message::decode(*command, body) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(command = %command, len = body.len(), error = %e, "malformed message body");
                None
            }
        }
    }

    /// Decodes a frame and invokes its handler, if any.
    pub fn dispatch(&self, frame: &Frame) -> Option<Message> {
        let message = self.decode(frame.command_code, &frame.body);
        if let Some(handler) = self.handlers.get(&frame.command_code) {
            handler(Dispatch {
                command_code: frame.command_code,
                body: &frame.body,
                message: message.as_ref(),
            });
        }
        message
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(CommandSet::known())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CharacterDataBase, CharacterSummary};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn info_frame(character_id: u64) -> Frame {
        let msg = CharacterInfoResponse {
            result: 1,
            character_data_base: Some(CharacterDataBase {
                character_id,
                ..Default::default()
            }),
        };
        Frame::new(44, Bytes::from(msg.encode_to_vec()))
    }

    #[test]
    fn test_decode_known_command() {
        let router = MessageRouter::default();
        let frame = info_frame(12);
        match router.decode(44, &frame.body) {
            Some(Message::CharacterInfo(info)) => {
                assert_eq!(info.character().unwrap().character_id, 12)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_character_list() {
        let msg = CharacterListResponse {
            result: 1,
            total_character_count: 2,
            character_list: vec![
                CharacterSummary {
                    character_id: 1,
                    ..Default::default()
                },
                CharacterSummary {
                    character_id: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let router = MessageRouter::default();
        let decoded = router.decode(18, &msg.encode_to_vec()).unwrap();
        assert_eq!(decoded.command(), PacketCommand::AccountCharacterListRes);
        assert_eq!(decoded, Message::CharacterList(msg));
    }

    #[test]
    fn test_malformed_body_is_none() {
        let router = MessageRouter::default();
        // Field 2 declared as length-delimited with a length past the end.
        assert!(router.decode(44, &[0x12, 0x7f, 0x01]).is_none());
    }

    #[test]
    fn test_unknown_command_is_none() {
        let router = MessageRouter::new(CommandSet::known().with_extra([500]));
        assert!(router.decode(500, b"anything").is_none());
        assert!(router.decode(501, b"anything").is_none());
        assert!(!router.has_schema(500));
    }

    #[test]
    fn test_handler_runs_without_schema() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut router = MessageRouter::new(CommandSet::known().with_extra([500]));
        let sink = seen.clone();
        router.register(500, move |d| {
            sink.lock().push((d.command_code, d.body.len(), d.message.is_some()));
        });

        let out = router.dispatch(&Frame::new(500, Bytes::from_static(b"abc")));
        assert!(out.is_none());
        assert_eq!(*seen.lock(), vec![(500, 3, false)]);
    }

    #[test]
    fn test_handler_receives_decoded_message() {
        let seen = Arc::new(Mutex::new(None));
        let mut router = MessageRouter::default();
        let sink = seen.clone();
        router.register(44, move |d| {
            if let Some(Message::CharacterInfo(info)) = d.message {
                *sink.lock() = info.character().map(|c| c.character_id);
            }
        });
        assert!(router.has_handler(44));

        router.dispatch(&info_frame(99));
        assert_eq!(*seen.lock(), Some(99));

        assert!(router.unregister(44));
        assert!(!router.has_handler(44));
    }
}
