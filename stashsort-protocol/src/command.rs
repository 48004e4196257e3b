//! Command codes shared with the game server.

use std::collections::BTreeSet;
use std::fmt;

/// Command codes this crate has schemas for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum PacketCommand {
    /// Account character list (lobby character select screen).
    AccountCharacterListRes = 18,
    /// Full character detail including stash and bag contents.
    LobbyCharacterInfoRes = 44,
}

impl PacketCommand {
    /// Every command with a registered schema.
    pub const ALL: [PacketCommand; 2] = [
        PacketCommand::AccountCharacterListRes,
        PacketCommand::LobbyCharacterInfoRes,
    ];

    /// Looks up a command by its wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            18 => Some(PacketCommand::AccountCharacterListRes),
            44 => Some(PacketCommand::LobbyCharacterInfoRes),
            _ => None,
        }
    }

    /// Returns the wire code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Returns the server-side enumeration name.
    pub fn name(self) -> &'static str {
        match self {
            PacketCommand::AccountCharacterListRes => "S2C_ACCOUNT_CHARACTER_LIST_RES",
            PacketCommand::LobbyCharacterInfoRes => "S2C_LOBBY_CHARACTER_INFO_RES",
        }
    }
}

impl fmt::Display for PacketCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// The set of command codes accepted by header validation.
///
/// Always contains [`PacketCommand::ALL`]; extra codes can be added so that
/// frames for commands without a schema are still reassembled (and then
/// logged and ignored by the router).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    codes: BTreeSet<u16>,
}

impl CommandSet {
    /// Creates the default set of known commands.
    pub fn known() -> Self {
        Self {
            codes: PacketCommand::ALL.iter().map(|c| c.code()).collect(),
        }
    }

    /// Adds extra recognised codes.
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = u16>) -> Self {
        self.codes.extend(extra);
        self
    }

    pub fn contains(&self, code: u16) -> bool {
        self.codes.contains(&code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.codes.iter().copied()
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::known()
    }
}
