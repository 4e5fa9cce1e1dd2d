//! # Transport boundary
//!
//! The chat server protocol itself lives behind the [`Transport`] trait, an
//! RPC-like surface of connect/login/join/send primitives. Requests return a
//! [`CommandId`] immediately (`0` means the request was rejected locally);
//! outcomes arrive later as [`TransportEvent`]s on the bounded channel that
//! the session hands to [`TransportFactory::create`].
//!
//! ```text
//!  Session worker ──requests──▶ Box<dyn Transport> ──▶ server
//!        ▲                                              │
//!        └──────── mpsc::Receiver<TransportEvent> ◀─────┘
//! ```
//!
//! A transport instance belongs to exactly one session. The session drops it
//! on teardown; a new session asks the factory for a fresh one.

pub mod sim;

use std::fmt;
use tokio::sync::mpsc;

pub type UserId = i32;
pub type ChannelId = i32;
/// Identifier of an issued request; `0` means rejected.
pub type CommandId = i32;

/// Protocol limit for a single string field, including the terminator.
pub const TT_STRLEN: usize = 512;
/// Largest number of characters carried by one text fragment.
pub const MAX_FRAGMENT_CHARS: usize = TT_STRLEN - 1;
/// Capacity of the per-session event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Message class of a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Private message between two users.
    User,
    Channel,
    Broadcast,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            MessageKind::User => "private",
            MessageKind::Channel => "channel",
            MessageKind::Broadcast => "broadcast",
        }
    }
}

/// One wire-level text fragment, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub kind: MessageKind,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub channel_id: ChannelId,
    pub text: String,
    /// More fragments of the same logical message follow.
    pub more: bool,
}

impl TextMessage {
    /// Destination id used for reassembly and dispatch: the channel for
    /// channel messages, zero otherwise.
    pub fn destination(&self) -> ChannelId {
        match self.kind {
            MessageKind::Channel => self.channel_id,
            _ => 0,
        }
    }
}

/// Snapshot of a user as the server last described it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    pub user_id: UserId,
    pub nickname: String,
    pub username: String,
    /// `0` when the user is not in any channel.
    pub channel_id: ChannelId,
    pub status_msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel_id: ChannelId,
    /// `0` for the root channel.
    pub parent_id: ChannelId,
    pub name: String,
}

/// Permission bitmask granted to an account by the server.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UserRights(pub u32);

impl UserRights {
    pub const NONE: UserRights = UserRights(0x0000_0000);
    pub const MULTI_LOGIN: UserRights = UserRights(0x0000_0001);
    pub const VIEW_ALL_USERS: UserRights = UserRights(0x0000_0002);
    pub const CREATE_TEMPORARY_CHANNEL: UserRights = UserRights(0x0000_0004);
    pub const MODIFY_CHANNELS: UserRights = UserRights(0x0000_0008);
    pub const TEXTMESSAGE_BROADCAST: UserRights = UserRights(0x0000_0010);
    pub const KICK_USERS: UserRights = UserRights(0x0000_0020);
    pub const BAN_USERS: UserRights = UserRights(0x0000_0040);
    pub const MOVE_USERS: UserRights = UserRights(0x0000_0080);
    pub const OPERATOR_ENABLE: UserRights = UserRights(0x0000_0100);
    pub const UPLOAD_FILES: UserRights = UserRights(0x0000_0200);
    pub const DOWNLOAD_FILES: UserRights = UserRights(0x0000_0400);
    pub const UPDATE_SERVERPROPERTIES: UserRights = UserRights(0x0000_0800);
    pub const TRANSMIT_VOICE: UserRights = UserRights(0x0000_1000);
    pub const TEXTMESSAGE_USER: UserRights = UserRights(0x0010_0000);
    pub const TEXTMESSAGE_CHANNEL: UserRights = UserRights(0x0020_0000);

    /// Flag names in bit order, used by the `rights` command.
    pub const NAMED: &'static [(&'static str, UserRights)] = &[
        ("MULTI_LOGIN", Self::MULTI_LOGIN),
        ("VIEW_ALL_USERS", Self::VIEW_ALL_USERS),
        ("CREATE_TEMPORARY_CHANNEL", Self::CREATE_TEMPORARY_CHANNEL),
        ("MODIFY_CHANNELS", Self::MODIFY_CHANNELS),
        ("TEXTMESSAGE_BROADCAST", Self::TEXTMESSAGE_BROADCAST),
        ("KICK_USERS", Self::KICK_USERS),
        ("BAN_USERS", Self::BAN_USERS),
        ("MOVE_USERS", Self::MOVE_USERS),
        ("OPERATOR_ENABLE", Self::OPERATOR_ENABLE),
        ("UPLOAD_FILES", Self::UPLOAD_FILES),
        ("DOWNLOAD_FILES", Self::DOWNLOAD_FILES),
        ("UPDATE_SERVERPROPERTIES", Self::UPDATE_SERVERPROPERTIES),
        ("TRANSMIT_VOICE", Self::TRANSMIT_VOICE),
        ("TEXTMESSAGE_USER", Self::TEXTMESSAGE_USER),
        ("TEXTMESSAGE_CHANNEL", Self::TEXTMESSAGE_CHANNEL),
    ];

    pub fn contains(self, other: UserRights) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, bit)| self.contains(*bit))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl std::ops::BitOr for UserRights {
    type Output = UserRights;
    fn bitor(self, rhs: UserRights) -> UserRights {
        UserRights(self.0 | rhs.0)
    }
}

impl fmt::Debug for UserRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserRights({:#010x})", self.0)
    }
}

/// Server error codes the bot reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorCode {
    InvalidAccount,
    ServerBanned,
    AlreadyLoggedIn,
    ChannelNotFound,
    IncorrectChannelPassword,
    ChannelBanned,
    MaxChannelUsersExceeded,
    NotAuthorized,
    Other(i32),
}

impl ClientErrorCode {
    /// Login errors that retrying cannot fix.
    pub fn is_fatal_login(self) -> bool {
        matches!(
            self,
            ClientErrorCode::InvalidAccount
                | ClientErrorCode::ServerBanned
                | ClientErrorCode::AlreadyLoggedIn
        )
    }

    pub fn describe(self) -> String {
        match self {
            ClientErrorCode::InvalidAccount => "invalid username or password".to_string(),
            ClientErrorCode::ServerBanned => "banned from server".to_string(),
            ClientErrorCode::AlreadyLoggedIn => "already logged in".to_string(),
            ClientErrorCode::ChannelNotFound => "channel not found".to_string(),
            ClientErrorCode::IncorrectChannelPassword => "incorrect channel password".to_string(),
            ClientErrorCode::ChannelBanned => "banned from channel".to_string(),
            ClientErrorCode::MaxChannelUsersExceeded => "channel is full".to_string(),
            ClientErrorCode::NotAuthorized => "not authorized".to_string(),
            ClientErrorCode::Other(code) => format!("error code {}", code),
        }
    }
}

/// Which event classes the server should deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subscription(pub u32);

impl Subscription {
    pub const USER_MSG: Subscription = Subscription(0x0000_0001);
    pub const CHANNEL_MSG: Subscription = Subscription(0x0000_0002);
    pub const BROADCAST_MSG: Subscription = Subscription(0x0000_0004);

    pub fn all_text() -> Subscription {
        Subscription(Self::USER_MSG.0 | Self::CHANNEL_MSG.0 | Self::BROADCAST_MSG.0)
    }
}

/// Everything the transport reports back to the session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectSuccess,
    ConnectFailed,
    ConnectionLost,
    /// A previously issued request failed.
    CmdError {
        cmd_id: CommandId,
        error: ClientErrorCode,
        message: String,
    },
    MyselfLoggedIn {
        user_id: UserId,
        rights: UserRights,
    },
    MyselfLoggedOut,
    /// The bot was removed from a channel (`0` when kicked from the server).
    MyselfKicked {
        channel_id: ChannelId,
        by: Option<UserInfo>,
    },
    UserLoggedIn(UserInfo),
    UserLoggedOut(UserInfo),
    UserUpdate(UserInfo),
    UserJoinedChannel(UserInfo),
    UserLeftChannel {
        channel_id: ChannelId,
        user: UserInfo,
    },
    TextMessage(TextMessage),
}

/// The SDK surface a session drives. Calls never block on the network.
pub trait Transport: Send {
    /// Start connecting; `false` when the attempt could not even be started.
    fn connect(&mut self, host: &str, tcp_port: u16, udp_port: u16) -> bool;
    fn disconnect(&mut self);
    fn login(&mut self, nickname: &str, username: &str, password: &str, client_name: &str)
        -> CommandId;
    fn logout(&mut self) -> CommandId;
    fn subscribe(&mut self, mask: Subscription) -> CommandId;
    fn join_channel(&mut self, channel_id: ChannelId, password: &str) -> CommandId;
    fn send_text(&mut self, msg: &TextMessage) -> CommandId;
    fn change_nickname(&mut self, nickname: &str) -> CommandId;
    fn change_status(&mut self, status: &str) -> CommandId;

    fn server_users(&self) -> Vec<UserInfo>;
    fn channel_users(&self, channel_id: ChannelId) -> Vec<UserInfo>;
    fn server_channels(&self) -> Vec<ChannelInfo>;
    fn user(&self, user_id: UserId) -> Option<UserInfo>;
    fn channel_path(&self, channel_id: ChannelId) -> Option<String>;
    fn channel_id_from_path(&self, path: &str) -> Option<ChannelId>;
    fn root_channel_id(&self) -> Option<ChannelId>;
    fn server_name(&self) -> Option<String> {
        None
    }

    fn kick_user(&mut self, user_id: UserId, channel_id: ChannelId) -> CommandId;
    fn move_user(&mut self, user_id: UserId, channel_id: ChannelId) -> CommandId;
    fn ban_user(&mut self, user_id: UserId) -> CommandId;
    fn unban_user(&mut self, username: &str) -> CommandId;
}

/// Produces one transport per session attempt.
pub trait TransportFactory: Send + Sync {
    fn create(&self, events: mpsc::Sender<TransportEvent>) -> Box<dyn Transport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rights_contains_and_names() {
        let r = UserRights::KICK_USERS | UserRights::TEXTMESSAGE_CHANNEL;
        assert!(r.contains(UserRights::KICK_USERS));
        assert!(!r.contains(UserRights::BAN_USERS));
        assert!(!r.contains(UserRights::NONE));
        assert_eq!(r.names(), vec!["KICK_USERS", "TEXTMESSAGE_CHANNEL"]);
    }

    #[test]
    fn fatal_login_classification() {
        assert!(ClientErrorCode::InvalidAccount.is_fatal_login());
        assert!(ClientErrorCode::ServerBanned.is_fatal_login());
        assert!(ClientErrorCode::AlreadyLoggedIn.is_fatal_login());
        assert!(!ClientErrorCode::ChannelNotFound.is_fatal_login());
        assert!(!ClientErrorCode::Other(42).is_fatal_login());
    }
}
