//! One connect → login → join → run lifecycle.
//!
//! A [`Session`] owns its transport and is driven by a single worker task.
//! Transport events arrive on a bounded queue; sends, stop and restart
//! requests from other tasks arrive on an unbounded request queue through a
//! cloneable [`SessionHandle`]. Both are processed serially, so the transport
//! is only ever touched from the worker.
//!
//! Teardown happens exactly once: the transport lives in an `Option` that is
//! taken on the first stop, loss or failure. Events that arrive after that are
//! dropped.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::dispatch::{self, Inbound};
use super::history::ConversationKey;
use super::outbound::{self, Destination};
use super::reassembly::FragmentReassembler;
use super::state::SessionState;
use super::Shared;
use crate::config::WelcomeMode;
use crate::logutil::escape_log;
use crate::metrics;
use crate::services::CompletionRequest;
use crate::transport::{
    ChannelId, ClientErrorCode, CommandId, MessageKind, Subscription, TextMessage, Transport,
    TransportEvent, TransportFactory, UserId, UserInfo, UserRights, EVENT_QUEUE_CAPACITY,
};

/// Upper bound on one wait of the worker loop.
pub const PUMP_WAIT: Duration = Duration::from_millis(100);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Work handed to the session worker from other tasks.
#[derive(Debug)]
pub enum SessionRequest {
    Send {
        dest: Destination,
        text: String,
        ack: Option<oneshot::Sender<bool>>,
    },
    Stop {
        restart: bool,
    },
}

/// Why a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Explicit stop; `restart` asks the controller for a new session now.
    Stopped { restart: bool },
    /// Login failed in a way retrying cannot fix.
    Fatal(ClientErrorCode),
    ConnectFailed,
    ConnectionLost,
}

impl SessionEnd {
    pub fn is_intentional(self) -> bool {
        matches!(self, SessionEnd::Stopped { .. } | SessionEnd::Fatal(_))
    }
}

pub(crate) fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable access to a running session from other tasks.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    state: Arc<Mutex<SessionState>>,
    requests: mpsc::UnboundedSender<SessionRequest>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run `f` under the session lock.
    ///
    /// Command handlers already hold this lock and must use their
    /// `CommandContext` instead.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = lock_state(&self.state);
        f(&mut guard)
    }

    pub fn is_logged_in(&self) -> bool {
        self.with_state(|s| s.is_logged_in())
    }

    /// Queue a send; `false` once the worker is gone.
    pub fn send(&self, dest: Destination, text: impl Into<String>) -> bool {
        self.requests
            .send(SessionRequest::Send {
                dest,
                text: text.into(),
                ack: None,
            })
            .is_ok()
    }

    /// Queue a send and wait for the worker to report whether it went out.
    pub async fn send_confirmed(&self, dest: Destination, text: impl Into<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        let queued = self
            .requests
            .send(SessionRequest::Send {
                dest,
                text: text.into(),
                ack: Some(tx),
            })
            .is_ok();
        queued && rx.await.unwrap_or(false)
    }

    /// Ask the worker to stop. The stop is marked intentional when the worker
    /// processes it.
    pub fn request_stop(&self, restart: bool) -> bool {
        self.requests.send(SessionRequest::Stop { restart }).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    /// Run `work` on the current runtime and post its result to `dest`
    /// through the worker. `false` when there is no runtime to spawn on.
    pub fn spawn_reply<F>(&self, dest: Destination, work: F) -> bool
    where
        F: Future<Output = String> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(_) => {
                warn!("no async runtime; dropping deferred reply to {:?}", dest);
                return false;
            }
        };
        let handle = self.clone();
        runtime.spawn(async move {
            let text = work.await;
            if !handle.send(dest, text) {
                debug!("session {} gone before deferred reply", handle.id);
            }
        });
        true
    }
}

pub struct Session {
    id: u64,
    shared: Arc<Shared>,
    state: Arc<Mutex<SessionState>>,
    transport: Option<Box<dyn Transport>>,
    reassembler: FragmentReassembler,
    events: mpsc::Receiver<TransportEvent>,
    requests: mpsc::UnboundedReceiver<SessionRequest>,
    handle: SessionHandle,
    started: bool,
    end: Option<SessionEnd>,
}

impl Session {
    pub fn new(factory: &dyn TransportFactory, shared: Arc<Shared>) -> Self {
        let (event_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (request_tx, requests) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SessionState::new(&shared.config.read())));
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let transport = factory.create(event_tx);
        let handle = SessionHandle {
            id,
            state: state.clone(),
            requests: request_tx,
        };
        Self {
            id,
            shared,
            state,
            transport: Some(transport),
            reassembler: FragmentReassembler::new(),
            events,
            requests,
            handle,
            started: false,
            end: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.end
    }

    /// Register as the live session and start connecting.
    pub fn start(&mut self) -> bool {
        if self.started {
            return self.end.is_none();
        }
        self.started = true;
        metrics::inc_sessions_started();
        self.shared.live.set(self.handle.clone());

        let (host, tcp_port, udp_port) = {
            let config = self.shared.config.read();
            (
                config.connection.host.clone(),
                config.connection.tcp_port,
                config.connection.udp_port,
            )
        };
        info!("session {}: connecting to {}:{}", self.id, host, tcp_port);
        let started = {
            let mut state = lock_state(&self.state);
            state.begin_connecting();
            match self.transport.as_deref_mut() {
                Some(transport) => transport.connect(&host, tcp_port, udp_port),
                None => false,
            }
        };
        if !started {
            warn!("session {}: connect could not be started", self.id);
            self.finish(SessionEnd::ConnectFailed, false);
        }
        started
    }

    /// Handle everything already queued without waiting. Returns the number
    /// of items processed.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while self.end.is_none() {
            if let Ok(event) = self.events.try_recv() {
                self.handle_event(event);
            } else if let Ok(request) = self.requests.try_recv() {
                self.handle_request(request);
            } else {
                break;
            }
            processed += 1;
        }
        processed
    }

    /// Worker loop: runs until the session ends, then reports why.
    pub async fn run(mut self) -> SessionEnd {
        self.start();
        let mut pump = tokio::time::interval(PUMP_WAIT);
        pump.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while self.end.is_none() {
            tokio::select! {
                Some(event) = self.events.recv() => self.handle_event(event),
                Some(request) = self.requests.recv() => self.handle_request(request),
                _ = pump.tick() => self.housekeeping(),
            }
        }
        let end = self.end.unwrap_or(SessionEnd::ConnectionLost);
        info!("session {} finished: {:?}", self.id, end);
        end
    }

    fn housekeeping(&mut self) {
        if self.end.is_none() && self.shared.control.is_shutting_down() {
            info!("session {}: shutdown requested", self.id);
            self.stop(false);
        }
    }

    pub fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::Send { dest, text, ack } => {
                let sent = self.send(dest, &text);
                if let Some(ack) = ack {
                    let _ = ack.send(sent);
                }
            }
            SessionRequest::Stop { restart } => self.stop(restart),
        }
    }

    fn send(&mut self, dest: Destination, text: &str) -> bool {
        let Some(transport) = self.transport.as_deref_mut() else {
            return false;
        };
        let mut state = lock_state(&self.state);
        match outbound::send_text(&mut state, transport, dest, text) {
            Ok(_) => true,
            Err(e) => {
                debug!("session {}: queued send to {:?} failed: {}", self.id, dest, e);
                false
            }
        }
    }

    fn stop(&mut self, restart: bool) {
        if self.transport.is_none() {
            return;
        }
        info!(
            "session {}: {} requested",
            self.id,
            if restart { "restart" } else { "stop" }
        );
        lock_state(&self.state).mark_intentional_stop();
        self.finish(SessionEnd::Stopped { restart }, true);
    }

    /// Release the transport (once) and record why the session ended.
    fn finish(&mut self, end: SessionEnd, graceful: bool) {
        if let Some(mut transport) = self.transport.take() {
            let mut state = lock_state(&self.state);
            if graceful && state.is_logged_in() {
                transport.logout();
            }
            transport.disconnect();
            state.on_disconnected();
            drop(state);
            drop(transport);
        }
        self.reassembler.clear();
        self.shared.live.clear(self.id);
        if self.end.is_none() {
            self.end = Some(end);
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.transport.is_none() {
            debug!("session {}: ignoring late event {:?}", self.id, event);
            return;
        }
        match event {
            TransportEvent::ConnectSuccess => self.on_connect_success(),
            TransportEvent::ConnectFailed => {
                warn!("session {}: connection failed", self.id);
                self.finish(SessionEnd::ConnectFailed, false);
            }
            TransportEvent::ConnectionLost => {
                let intentional = lock_state(&self.state).is_intentional_stop();
                warn!("session {}: connection lost", self.id);
                let end = if intentional {
                    SessionEnd::Stopped { restart: false }
                } else {
                    SessionEnd::ConnectionLost
                };
                self.finish(end, false);
            }
            TransportEvent::CmdError {
                cmd_id,
                error,
                message,
            } => self.on_cmd_error(cmd_id, error, &message),
            TransportEvent::MyselfLoggedIn { user_id, rights } => self.on_logged_in(user_id, rights),
            TransportEvent::MyselfLoggedOut => {
                info!("session {}: logged out by server", self.id);
                lock_state(&self.state).on_logged_out();
            }
            TransportEvent::MyselfKicked { channel_id, by } => self.on_kicked(channel_id, by),
            TransportEvent::UserLoggedIn(user) => self.on_user_logged_in(user),
            TransportEvent::UserLoggedOut(user) => self.on_user_logged_out(user),
            TransportEvent::UserUpdate(user) => self.on_user_update(user),
            TransportEvent::UserJoinedChannel(user) => self.on_user_joined(user),
            TransportEvent::UserLeftChannel { channel_id, user } => {
                self.on_user_left(channel_id, user)
            }
            TransportEvent::TextMessage(msg) => self.on_text_message(msg),
        }
    }

    fn on_connect_success(&mut self) {
        let (password, client_name) = {
            let config = self.shared.config.read();
            (config.connection.password.clone(), config.bot.client_name.clone())
        };
        let Some(transport) = self.transport.as_deref_mut() else {
            return;
        };
        let login_sent = {
            let mut state = lock_state(&self.state);
            state.on_connected();
            let nickname = state.identity.nickname.clone();
            let username = state.identity.username.clone();
            info!("session {}: connected, logging in as '{}'", self.id, username);
            let cmd_id = transport.login(&nickname, &username, &password, &client_name);
            state.on_login_requested(cmd_id);
            cmd_id != 0
        };
        if !login_sent {
            warn!("session {}: login request rejected", self.id);
            self.finish(SessionEnd::ConnectionLost, false);
        }
    }

    fn on_cmd_error(&mut self, cmd_id: CommandId, error: ClientErrorCode, message: &str) {
        let is_login = cmd_id != 0 && cmd_id == lock_state(&self.state).login_cmd_id;
        if is_login && error.is_fatal_login() {
            error!(
                "session {}: login failed: {} ({}); not reconnecting",
                self.id,
                error.describe(),
                escape_log(message)
            );
            lock_state(&self.state).mark_intentional_stop();
            self.finish(SessionEnd::Fatal(error), false);
            return;
        }
        if is_login {
            warn!("session {}: login failed: {}; will retry", self.id, error.describe());
            self.finish(SessionEnd::ConnectionLost, false);
            return;
        }
        let Some(transport) = self.transport.as_deref_mut() else {
            return;
        };
        let mut state = lock_state(&self.state);
        if cmd_id != 0 && cmd_id == state.join_cmd_id {
            warn!("session {}: join failed: {}", self.id, error.describe());
            state.join_cmd_id = 0;
            if let Some(admin) = state.join_requested_by.take() {
                let text = format!("Failed to join channel: {}.", error.describe());
                let _ = outbound::send_text(&mut state, transport, Destination::User(admin), &text);
            }
        } else {
            debug!(
                "session {}: command {} failed: {}",
                self.id,
                cmd_id,
                error.describe()
            );
        }
    }

    fn on_logged_in(&mut self, user_id: UserId, rights: UserRights) {
        let config = self.shared.config.snapshot();
        let Some(transport) = self.transport.as_deref_mut() else {
            return;
        };
        let mut state = lock_state(&self.state);
        state.directory.rebuild(transport.server_users());
        state.on_logged_in(user_id, rights, &config.bot);

        if transport.subscribe(Subscription::all_text()) == 0 {
            warn!("session {}: subscription request rejected", self.id);
        }
        let status = state.identity.status_text.clone();
        if !status.is_empty() && transport.change_status(&status) == 0 {
            warn!("session {}: status update rejected", self.id);
        }

        let path = state.target_channel_path.clone();
        let (target, password) = match transport.channel_id_from_path(&path) {
            Some(id) => (Some(id), state.channel_password.clone()),
            None => {
                warn!(
                    "session {}: channel '{}' not found, using root",
                    self.id,
                    escape_log(&path)
                );
                (transport.root_channel_id(), String::new())
            }
        };
        match target {
            Some(channel_id) => {
                state.target_channel_id = Some(channel_id);
                let cmd_id = transport.join_channel(channel_id, &password);
                if cmd_id == 0 {
                    warn!("session {}: join request rejected", self.id);
                }
                state.join_cmd_id = cmd_id;
            }
            None => warn!("session {}: no channel to join", self.id),
        }
    }

    fn on_kicked(&mut self, channel_id: ChannelId, by: Option<UserInfo>) {
        let by = by
            .map(|u| escape_log(&u.nickname))
            .unwrap_or_else(|| "server".to_string());
        if channel_id == 0 {
            warn!("session {}: kicked from server by {}", self.id, by);
            self.finish(SessionEnd::ConnectionLost, false);
            return;
        }
        warn!("session {}: kicked from channel {} by {}", self.id, channel_id, by);
        lock_state(&self.state).on_left(channel_id);
    }

    fn record_presence(&self, user_id: UserId, nick: &str, action: &str) {
        if let Err(e) = self.shared.presence.record_seen(user_id, nick, action) {
            warn!("failed to record presence for {}: {}", user_id, e);
        }
    }

    fn is_self(&self, user_id: UserId) -> bool {
        lock_state(&self.state).identity.user_id == user_id
    }

    fn on_user_logged_in(&mut self, user: UserInfo) {
        if self.is_self(user.user_id) {
            return;
        }
        let admin = self.shared.config.read().bot.is_admin_username(&user.username);
        {
            let mut state = lock_state(&self.state);
            state.directory.upsert(user.clone());
            state.set_admin(user.user_id, admin);
        }
        self.record_presence(user.user_id, &user.nickname, "logged in");
    }

    fn on_user_logged_out(&mut self, user: UserInfo) {
        if self.is_self(user.user_id) {
            return;
        }
        {
            let mut state = lock_state(&self.state);
            state.directory.remove(user.user_id);
            state.set_admin(user.user_id, false);
        }
        self.record_presence(user.user_id, &user.nickname, "logged out");
    }

    fn on_user_update(&mut self, user: UserInfo) {
        let admin = self.shared.config.read().bot.is_admin_username(&user.username);
        let renamed = {
            let mut state = lock_state(&self.state);
            if user.user_id == state.identity.user_id {
                state.identity.nickname = user.nickname.clone();
                state.directory.upsert(user);
                return;
            }
            let previous = state.directory.upsert(user.clone());
            state.set_admin(user.user_id, admin);
            matches!(previous, Some(p) if p.nickname != user.nickname)
        };
        if renamed {
            let action = format!("changed nickname to {}", user.nickname);
            self.record_presence(user.user_id, &user.nickname, &action);
        }
    }

    fn on_user_joined(&mut self, user: UserInfo) {
        let announce_in = {
            let mut state = lock_state(&self.state);
            if user.user_id == state.identity.user_id {
                state.on_joined(user.channel_id);
                state.directory.upsert(user.clone());
                info!("session {}: joined channel {}", self.id, user.channel_id);
                return;
            }
            state.directory.upsert(user.clone());
            let primary = state.primary_channel();
            (state.toggles.join_leave_announcements && primary == Some(user.channel_id))
                .then_some((user.channel_id, state.welcome_mode))
        };
        self.record_presence(user.user_id, &user.nickname, "joined a channel");
        if let Some((channel_id, mode)) = announce_in {
            self.announce_join(channel_id, &user.nickname, mode);
        }
    }

    fn announce_join(&mut self, channel_id: ChannelId, nick: &str, mode: WelcomeMode) {
        let template = format!("Welcome, {}!", nick);
        let settings = self.shared.config.read().ai.clone();
        if mode == WelcomeMode::Ai && settings.is_configured() {
            let services = self.shared.services.clone();
            let request = CompletionRequest {
                settings,
                history: Vec::new(),
                prompt: format!(
                    "Write a short, friendly one-line welcome for a user named {} who just joined the channel.",
                    nick
                ),
            };
            let spawned = self.handle.spawn_reply(Destination::Channel(channel_id), async move {
                match services.complete(request).await {
                    Ok(text) => text,
                    Err(e) => {
                        debug!("AI welcome failed, using template: {}", e);
                        template
                    }
                }
            });
            if spawned {
                return;
            }
        }
        self.send(Destination::Channel(channel_id), &format!("Welcome, {}!", nick));
    }

    fn on_user_left(&mut self, channel_id: ChannelId, user: UserInfo) {
        let announce = {
            let mut state = lock_state(&self.state);
            if user.user_id == state.identity.user_id {
                state.on_left(channel_id);
                info!("session {}: left channel {}", self.id, channel_id);
                return;
            }
            let primary = state.primary_channel();
            let mut snapshot = user.clone();
            if snapshot.channel_id == channel_id {
                snapshot.channel_id = 0;
            }
            state.directory.upsert(snapshot);
            state.toggles.join_leave_announcements && primary == Some(channel_id)
        };
        self.record_presence(user.user_id, &user.nickname, "left a channel");
        if announce {
            self.send(
                Destination::Channel(channel_id),
                &format!("Goodbye, {}.", user.nickname),
            );
        }
    }

    fn on_text_message(&mut self, msg: TextMessage) {
        let sender = msg.from_user_id;
        {
            let state = lock_state(&self.state);
            if !state.is_logged_in() || sender == state.identity.user_id {
                return;
            }
        }
        let Some(text) = self.reassembler.push_message(&msg) else {
            return;
        };
        metrics::inc_messages_reassembled();

        let Some(transport) = self.transport.as_deref_mut() else {
            return;
        };
        let mut state = lock_state(&self.state);
        let nick = state
            .directory
            .nickname(sender)
            .map(str::to_string)
            .or_else(|| transport.user(sender).map(|u| u.nickname))
            .unwrap_or_else(|| format!("UserID_{}", sender));
        debug!(
            "{} message from {} ({}): {}",
            msg.kind.label(),
            escape_log(&nick),
            sender,
            escape_log(&text)
        );

        if msg.kind != MessageKind::Broadcast {
            if let Err(e) = self.shared.presence.record_seen(sender, &nick, "sent a message") {
                warn!("failed to record presence for {}: {}", sender, e);
            }
            match self.shared.presence.clear_afk(sender) {
                Ok(Some(_)) => {
                    info!("{} is no longer AFK", escape_log(&nick));
                    let _ = outbound::send_text(
                        &mut state,
                        transport,
                        Destination::User(sender),
                        "Welcome back! Your AFK status has been removed.",
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("failed to clear AFK for {}: {}", sender, e),
            }
        }

        let inbound = Inbound {
            kind: msg.kind,
            sender_id: sender,
            sender_nick: &nick,
            channel_id: msg.channel_id,
            text: &text,
        };
        let outcome = dispatch::dispatch(&mut state, transport, &self.shared, &self.handle, &inbound);
        debug!("dispatch outcome for {}: {:?}", sender, outcome);

        if state.toggles.context_history {
            let key = match msg.kind {
                MessageKind::User => Some(ConversationKey::Private(sender)),
                MessageKind::Channel => Some(ConversationKey::Channel(msg.channel_id)),
                MessageKind::Broadcast => None,
            };
            if let Some(key) = key {
                state.history.add(key, &text, false);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transport.is_some() {
            self.finish(SessionEnd::Stopped { restart: false }, false);
        }
    }
}
