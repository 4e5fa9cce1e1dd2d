//! In-process simulated chat server.
//!
//! [`SimServer`] implements [`TransportFactory`] and models just enough of a
//! server for the bot to run end to end: a channel tree with paths, logged-in
//! users, a permission mask for the bot, and configurable failures on
//! connect, login, join and send. Every outbound fragment and administrative
//! operation is recorded so callers can inspect what the bot did.
//!
//! The binary uses it when no native transport is linked; tests use it
//! everywhere.

use super::{
    ChannelId, ChannelInfo, ClientErrorCode, CommandId, MessageKind, Subscription, TextMessage,
    Transport, TransportEvent, TransportFactory, UserId, UserInfo, UserRights,
};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const ROOT_CHANNEL_ID: ChannelId = 1;

/// Administrative operation issued by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOp {
    Kick { user_id: UserId, channel_id: ChannelId },
    Move { user_id: UserId, channel_id: ChannelId },
    Ban { user_id: UserId },
    Unban { username: String },
}

#[derive(Debug)]
struct SimWorld {
    channels: BTreeMap<ChannelId, ChannelInfo>,
    users: BTreeMap<UserId, UserInfo>,
    banned: HashSet<String>,
    bot_user_id: Option<UserId>,
    bot_rights: UserRights,
    next_user_id: UserId,
    next_channel_id: ChannelId,
    next_cmd_id: CommandId,
    connect_ok: bool,
    login_error: Option<ClientErrorCode>,
    join_errors: HashMap<ChannelId, ClientErrorCode>,
    reject_sends_after: Option<usize>,
    reject_admin_ops: bool,
    sent: Vec<TextMessage>,
    ops: Vec<AdminOp>,
    subscriptions: Subscription,
    connect_attempts: Vec<Instant>,
    live: Option<(u64, mpsc::Sender<TransportEvent>)>,
    generation: u64,
    server_name: String,
}

impl SimWorld {
    fn next_cmd(&mut self) -> CommandId {
        let id = self.next_cmd_id;
        self.next_cmd_id += 1;
        id
    }

    fn emit(&self, event: TransportEvent) {
        match &self.live {
            Some((_, tx)) => {
                if let Err(e) = tx.try_send(event) {
                    warn!("sim: dropping event, queue unavailable: {}", e);
                }
            }
            None => debug!("sim: no live connection for event {:?}", event),
        }
    }

    fn path_of(&self, channel_id: ChannelId) -> Option<String> {
        let mut names = Vec::new();
        let mut cur = self.channels.get(&channel_id)?;
        while cur.parent_id != 0 {
            names.push(cur.name.clone());
            cur = self.channels.get(&cur.parent_id)?;
        }
        if names.is_empty() {
            return Some("/".to_string());
        }
        names.reverse();
        Some(format!("/{}/", names.join("/")))
    }

    fn id_of_path(&self, path: &str) -> Option<ChannelId> {
        let wanted = normalize_path(path);
        self.channels
            .keys()
            .copied()
            .find(|id| self.path_of(*id).map(|p| normalize_path(&p)) == Some(wanted.clone()))
    }

    fn bot_info(&self) -> Option<UserInfo> {
        self.bot_user_id.and_then(|id| self.users.get(&id).cloned())
    }

    fn drop_bot(&mut self) {
        if let Some(id) = self.bot_user_id.take() {
            self.users.remove(&id);
        }
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed.to_lowercase())
}

/// Shared handle to the simulated world; cheap to clone.
#[derive(Debug, Clone)]
pub struct SimServer {
    world: Arc<Mutex<SimWorld>>,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    pub fn new() -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(
            ROOT_CHANNEL_ID,
            ChannelInfo {
                channel_id: ROOT_CHANNEL_ID,
                parent_id: 0,
                name: String::new(),
            },
        );
        let world = SimWorld {
            channels,
            users: BTreeMap::new(),
            banned: HashSet::new(),
            bot_user_id: None,
            bot_rights: UserRights::TEXTMESSAGE_USER
                | UserRights::TEXTMESSAGE_CHANNEL
                | UserRights::TEXTMESSAGE_BROADCAST
                | UserRights::KICK_USERS
                | UserRights::BAN_USERS
                | UserRights::MOVE_USERS
                | UserRights::VIEW_ALL_USERS,
            next_user_id: 100,
            next_channel_id: ROOT_CHANNEL_ID + 1,
            next_cmd_id: 1,
            connect_ok: true,
            login_error: None,
            join_errors: HashMap::new(),
            reject_sends_after: None,
            reject_admin_ops: false,
            sent: Vec::new(),
            ops: Vec::new(),
            subscriptions: Subscription::default(),
            connect_attempts: Vec::new(),
            live: None,
            generation: 0,
            server_name: "Simulated Server".to_string(),
        };
        Self {
            world: Arc::new(Mutex::new(world)),
        }
    }

    fn world(&self) -> MutexGuard<'_, SimWorld> {
        self.world.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a channel under `parent_id` and return its id.
    pub fn add_channel(&self, parent_id: ChannelId, name: &str) -> ChannelId {
        let mut w = self.world();
        let id = w.next_channel_id;
        w.next_channel_id += 1;
        w.channels.insert(
            id,
            ChannelInfo {
                channel_id: id,
                parent_id,
                name: name.to_string(),
            },
        );
        id
    }

    /// Log a user in (and into `channel_id` unless it is `0`), notifying
    /// the connected bot.
    pub fn add_user(&self, nickname: &str, username: &str, channel_id: ChannelId) -> UserId {
        let mut w = self.world();
        let id = w.next_user_id;
        w.next_user_id += 1;
        let info = UserInfo {
            user_id: id,
            nickname: nickname.to_string(),
            username: username.to_string(),
            channel_id,
            status_msg: String::new(),
        };
        w.users.insert(id, info.clone());
        w.emit(TransportEvent::UserLoggedIn(info.clone()));
        if channel_id != 0 {
            w.emit(TransportEvent::UserJoinedChannel(info));
        }
        id
    }

    pub fn remove_user(&self, user_id: UserId) {
        let mut w = self.world();
        if let Some(info) = w.users.remove(&user_id) {
            if info.channel_id != 0 {
                w.emit(TransportEvent::UserLeftChannel {
                    channel_id: info.channel_id,
                    user: info.clone(),
                });
            }
            w.emit(TransportEvent::UserLoggedOut(info));
        }
    }

    pub fn rename_user(&self, user_id: UserId, nickname: &str) {
        let mut w = self.world();
        if let Some(info) = w.users.get_mut(&user_id) {
            info.nickname = nickname.to_string();
            let snapshot = info.clone();
            w.emit(TransportEvent::UserUpdate(snapshot));
        }
    }

    pub fn set_bot_rights(&self, rights: UserRights) {
        self.world().bot_rights = rights;
    }

    pub fn set_connect_ok(&self, ok: bool) {
        self.world().connect_ok = ok;
    }

    pub fn set_login_error(&self, error: Option<ClientErrorCode>) {
        self.world().login_error = error;
    }

    pub fn set_join_error(&self, channel_id: ChannelId, error: Option<ClientErrorCode>) {
        let mut w = self.world();
        match error {
            Some(e) => {
                w.join_errors.insert(channel_id, e);
            }
            None => {
                w.join_errors.remove(&channel_id);
            }
        }
    }

    /// Make `send_text` return `0` once `n` fragments have been accepted.
    pub fn reject_sends_after(&self, n: Option<usize>) {
        self.world().reject_sends_after = n;
    }

    /// Make kick, move, ban and unban return `0` without effect.
    pub fn reject_admin_ops(&self, reject: bool) {
        self.world().reject_admin_ops = reject;
    }

    pub fn set_server_name(&self, name: &str) {
        self.world().server_name = name.to_string();
    }

    /// Deliver an arbitrary event to the connected bot.
    pub fn emit(&self, event: TransportEvent) {
        self.world().emit(event);
    }

    /// Deliver one complete private message to the bot.
    pub fn say_private(&self, from: UserId, text: &str) {
        let w = self.world();
        let to = w.bot_user_id.unwrap_or(0);
        let channel_id = w.users.get(&from).map(|u| u.channel_id).unwrap_or(0);
        w.emit(TransportEvent::TextMessage(TextMessage {
            kind: MessageKind::User,
            from_user_id: from,
            to_user_id: to,
            channel_id,
            text: text.to_string(),
            more: false,
        }));
    }

    /// Deliver one complete channel message.
    pub fn say_channel(&self, from: UserId, channel_id: ChannelId, text: &str) {
        self.world().emit(TransportEvent::TextMessage(TextMessage {
            kind: MessageKind::Channel,
            from_user_id: from,
            to_user_id: 0,
            channel_id,
            text: text.to_string(),
            more: false,
        }));
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self) {
        let mut w = self.world();
        w.drop_bot();
        w.emit(TransportEvent::ConnectionLost);
        w.live = None;
    }

    pub fn sent(&self) -> Vec<TextMessage> {
        self.world().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<TextMessage> {
        std::mem::take(&mut self.world().sent)
    }

    /// Texts of the private messages sent to `user_id`, fragments included.
    pub fn private_texts_to(&self, user_id: UserId) -> Vec<String> {
        self.world()
            .sent
            .iter()
            .filter(|m| m.kind == MessageKind::User && m.to_user_id == user_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn channel_texts(&self, channel_id: ChannelId) -> Vec<String> {
        self.world()
            .sent
            .iter()
            .filter(|m| m.kind == MessageKind::Channel && m.channel_id == channel_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn admin_ops(&self) -> Vec<AdminOp> {
        self.world().ops.clone()
    }

    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.world().connect_attempts.clone()
    }

    pub fn bot_user_id(&self) -> Option<UserId> {
        self.world().bot_user_id
    }

    pub fn bot_info(&self) -> Option<UserInfo> {
        self.world().bot_info()
    }

    pub fn subscriptions(&self) -> Subscription {
        self.world().subscriptions
    }

    pub fn is_banned(&self, username: &str) -> bool {
        self.world().banned.contains(&username.to_lowercase())
    }
}

impl TransportFactory for SimServer {
    fn create(&self, events: mpsc::Sender<TransportEvent>) -> Box<dyn Transport> {
        let mut w = self.world();
        w.generation += 1;
        let generation = w.generation;
        w.live = Some((generation, events));
        Box::new(SimTransport {
            world: self.world.clone(),
            generation,
        })
    }
}

/// One connection to a [`SimServer`].
#[derive(Debug)]
pub struct SimTransport {
    world: Arc<Mutex<SimWorld>>,
    generation: u64,
}

impl SimTransport {
    fn world(&self) -> MutexGuard<'_, SimWorld> {
        self.world.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        let mut w = self.world();
        if matches!(w.live, Some((g, _)) if g == self.generation) {
            w.live = None;
            w.drop_bot();
        }
    }
}

impl Transport for SimTransport {
    fn connect(&mut self, _host: &str, _tcp_port: u16, _udp_port: u16) -> bool {
        let mut w = self.world();
        w.connect_attempts.push(Instant::now());
        if w.connect_ok {
            w.emit(TransportEvent::ConnectSuccess);
        } else {
            w.emit(TransportEvent::ConnectFailed);
        }
        true
    }

    fn disconnect(&mut self) {
        let mut w = self.world();
        w.drop_bot();
    }

    fn login(
        &mut self,
        nickname: &str,
        username: &str,
        _password: &str,
        _client_name: &str,
    ) -> CommandId {
        let mut w = self.world();
        let cmd_id = w.next_cmd();
        if let Some(error) = w.login_error {
            w.emit(TransportEvent::CmdError {
                cmd_id,
                error,
                message: error.describe(),
            });
            return cmd_id;
        }
        if w.banned.contains(&username.to_lowercase()) {
            w.emit(TransportEvent::CmdError {
                cmd_id,
                error: ClientErrorCode::ServerBanned,
                message: ClientErrorCode::ServerBanned.describe(),
            });
            return cmd_id;
        }
        let user_id = w.next_user_id;
        w.next_user_id += 1;
        w.users.insert(
            user_id,
            UserInfo {
                user_id,
                nickname: nickname.to_string(),
                username: username.to_string(),
                channel_id: 0,
                status_msg: String::new(),
            },
        );
        w.bot_user_id = Some(user_id);
        let rights = w.bot_rights;
        w.emit(TransportEvent::MyselfLoggedIn { user_id, rights });
        cmd_id
    }

    fn logout(&mut self) -> CommandId {
        let mut w = self.world();
        let cmd_id = w.next_cmd();
        w.drop_bot();
        w.emit(TransportEvent::MyselfLoggedOut);
        cmd_id
    }

    fn subscribe(&mut self, mask: Subscription) -> CommandId {
        let mut w = self.world();
        w.subscriptions = Subscription(w.subscriptions.0 | mask.0);
        w.next_cmd()
    }

    fn join_channel(&mut self, channel_id: ChannelId, _password: &str) -> CommandId {
        let mut w = self.world();
        let cmd_id = w.next_cmd();
        let error = if let Some(e) = w.join_errors.get(&channel_id) {
            Some(*e)
        } else if !w.channels.contains_key(&channel_id) {
            Some(ClientErrorCode::ChannelNotFound)
        } else {
            None
        };
        if let Some(error) = error {
            w.emit(TransportEvent::CmdError {
                cmd_id,
                error,
                message: error.describe(),
            });
            return cmd_id;
        }
        let Some(bot_id) = w.bot_user_id else {
            return 0;
        };
        let previous = w.users.get(&bot_id).map(|u| u.channel_id).unwrap_or(0);
        if previous != 0 && previous != channel_id {
            if let Some(info) = w.users.get(&bot_id).cloned() {
                w.emit(TransportEvent::UserLeftChannel {
                    channel_id: previous,
                    user: info,
                });
            }
        }
        if let Some(info) = w.users.get_mut(&bot_id) {
            info.channel_id = channel_id;
        }
        if let Some(info) = w.bot_info() {
            w.emit(TransportEvent::UserJoinedChannel(info));
        }
        cmd_id
    }

    fn send_text(&mut self, msg: &TextMessage) -> CommandId {
        let mut w = self.world();
        if let Some(limit) = w.reject_sends_after {
            if w.sent.len() >= limit {
                return 0;
            }
        }
        w.sent.push(msg.clone());
        w.next_cmd()
    }

    fn change_nickname(&mut self, nickname: &str) -> CommandId {
        let mut w = self.world();
        let cmd_id = w.next_cmd();
        if let Some(id) = w.bot_user_id {
            if let Some(info) = w.users.get_mut(&id) {
                info.nickname = nickname.to_string();
            }
            if let Some(info) = w.bot_info() {
                w.emit(TransportEvent::UserUpdate(info));
            }
        }
        cmd_id
    }

    fn change_status(&mut self, status: &str) -> CommandId {
        let mut w = self.world();
        let cmd_id = w.next_cmd();
        if let Some(id) = w.bot_user_id {
            if let Some(info) = w.users.get_mut(&id) {
                info.status_msg = status.to_string();
            }
        }
        cmd_id
    }

    fn server_users(&self) -> Vec<UserInfo> {
        self.world().users.values().cloned().collect()
    }

    fn channel_users(&self, channel_id: ChannelId) -> Vec<UserInfo> {
        self.world()
            .users
            .values()
            .filter(|u| u.channel_id == channel_id)
            .cloned()
            .collect()
    }

    fn server_channels(&self) -> Vec<ChannelInfo> {
        self.world().channels.values().cloned().collect()
    }

    fn user(&self, user_id: UserId) -> Option<UserInfo> {
        self.world().users.get(&user_id).cloned()
    }

    fn channel_path(&self, channel_id: ChannelId) -> Option<String> {
        self.world().path_of(channel_id)
    }

    fn channel_id_from_path(&self, path: &str) -> Option<ChannelId> {
        self.world().id_of_path(path)
    }

    fn root_channel_id(&self) -> Option<ChannelId> {
        Some(ROOT_CHANNEL_ID)
    }

    fn server_name(&self) -> Option<String> {
        Some(self.world().server_name.clone())
    }

    fn kick_user(&mut self, user_id: UserId, channel_id: ChannelId) -> CommandId {
        let mut w = self.world();
        if w.reject_admin_ops {
            return 0;
        }
        let cmd_id = w.next_cmd();
        w.ops.push(AdminOp::Kick {
            user_id,
            channel_id,
        });
        let kicked = match w.users.get_mut(&user_id) {
            Some(info) if info.channel_id == channel_id && channel_id != 0 => {
                info.channel_id = 0;
                Some(info.clone())
            }
            _ => None,
        };
        if let Some(user) = kicked {
            w.emit(TransportEvent::UserLeftChannel { channel_id, user });
        }
        cmd_id
    }

    fn move_user(&mut self, user_id: UserId, channel_id: ChannelId) -> CommandId {
        let mut w = self.world();
        if w.reject_admin_ops {
            return 0;
        }
        let cmd_id = w.next_cmd();
        w.ops.push(AdminOp::Move {
            user_id,
            channel_id,
        });
        if let Some(info) = w.users.get_mut(&user_id) {
            info.channel_id = channel_id;
        }
        cmd_id
    }

    fn ban_user(&mut self, user_id: UserId) -> CommandId {
        let mut w = self.world();
        if w.reject_admin_ops {
            return 0;
        }
        let cmd_id = w.next_cmd();
        w.ops.push(AdminOp::Ban { user_id });
        if let Some(username) = w.users.get(&user_id).map(|u| u.username.to_lowercase()) {
            w.banned.insert(username);
        }
        cmd_id
    }

    fn unban_user(&mut self, username: &str) -> CommandId {
        let mut w = self.world();
        if w.reject_admin_ops {
            return 0;
        }
        let cmd_id = w.next_cmd();
        w.ops.push(AdminOp::Unban {
            username: username.to_string(),
        });
        w.banned.remove(&username.to_lowercase());
        cmd_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_paths_resolve_both_ways() {
        let sim = SimServer::new();
        let lobby = sim.add_channel(ROOT_CHANNEL_ID, "Lobby");
        let games = sim.add_channel(lobby, "Games");
        let (tx, _rx) = mpsc::channel(16);
        let t = sim.create(tx);
        assert_eq!(t.channel_path(ROOT_CHANNEL_ID).as_deref(), Some("/"));
        assert_eq!(t.channel_path(games).as_deref(), Some("/Lobby/Games/"));
        assert_eq!(t.channel_id_from_path("/lobby/games"), Some(games));
        assert_eq!(t.channel_id_from_path("/Lobby/"), Some(lobby));
        assert_eq!(t.channel_id_from_path("/"), Some(ROOT_CHANNEL_ID));
        assert_eq!(t.channel_id_from_path("/missing/"), None);
    }

    #[test]
    fn login_then_join_emits_events_in_order() {
        let sim = SimServer::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut t = sim.create(tx);
        assert!(t.connect("localhost", 1, 1));
        t.login("bot", "bot", "", "test");
        let bot = sim.bot_user_id().unwrap();
        t.join_channel(ROOT_CHANNEL_ID, "");
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::ConnectSuccess);
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::MyselfLoggedIn { user_id, .. } if user_id == bot
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransportEvent::UserJoinedChannel(u) if u.user_id == bot && u.channel_id == ROOT_CHANNEL_ID
        ));
    }

    #[test]
    fn dropping_transport_clears_live_link() {
        let sim = SimServer::new();
        let (tx, mut rx) = mpsc::channel(16);
        let t = sim.create(tx);
        drop(t);
        sim.add_user("alice", "alice", ROOT_CHANNEL_ID);
        assert!(rx.try_recv().is_err());
    }
}
