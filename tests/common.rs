//! Test utilities & fixtures.
//! Builds a logged-in session against the in-process server with temporary
//! stores, and stub services that answer instantly.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use talkbot::bot::{Session, Shared};
use talkbot::config::{AiConfig, Config, ConfigStore};
use talkbot::services::{CompletionRequest, ExternalServices, ServiceError};
use talkbot::storage::reminders::ReminderStore;
use talkbot::storage::PresenceStore;
use talkbot::transport::sim::{SimServer, ROOT_CHANNEL_ID};
use talkbot::transport::{ChannelId, MessageKind, UserId};

pub const ADMIN_USERNAME: &str = "boss";

/// Services that never leave the process. Completion prompts are recorded.
#[derive(Default)]
pub struct StubServices {
    pub prompts: Mutex<Vec<CompletionRequest>>,
}

#[async_trait]
impl ExternalServices for StubServices {
    async fn weather(&self, location: &str) -> Result<String, ServiceError> {
        if location.eq_ignore_ascii_case("nowhere") {
            return Err(ServiceError::BadInput(format!("Location '{}' not found.", location)));
        }
        Ok(format!("{}: Sunny 21°C", location))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        let answer = format!("You asked: {}", request.prompt);
        self.prompts.lock().unwrap().push(request);
        Ok(answer)
    }

    async fn list_models(&self, _settings: &AiConfig) -> Result<Vec<String>, ServiceError> {
        Ok(vec!["small".to_string(), "large".to_string()])
    }

    async fn time_for(&self, location: &str) -> Result<String, ServiceError> {
        Ok(format!("Current time in {}: 12:00", location))
    }

    async fn news(&self, _topic: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("News service"))
    }

    async fn shorten(&self, url: &str) -> Result<String, ServiceError> {
        Ok(format!("https://sho.rt/{}", url.len()))
    }
}

/// Config with one admin account, a `/Lobby/` start channel and a fixed
/// 5 second reconnect delay.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.connection.username = "talkbot".to_string();
    config.connection.nickname = "TalkBot".to_string();
    config.bot.admin_usernames = vec![ADMIN_USERNAME.to_string()];
    config.bot.initial_channel_path = "/Lobby/".to_string();
    config.bot.reconnect_delay_min = 5;
    config.bot.reconnect_delay_max = 5;
    config
}

pub fn shared_with(config: Config, services: Arc<dyn ExternalServices>) -> Arc<Shared> {
    shared_with_store(ConfigStore::ephemeral(config), services)
}

pub fn shared_with_store(store: ConfigStore, services: Arc<dyn ExternalServices>) -> Arc<Shared> {
    Shared::new(
        Arc::new(store),
        PresenceStore::temporary().expect("presence store"),
        ReminderStore::temporary().expect("reminder store"),
        services,
    )
}

/// Server with a `/Lobby/` channel and a `/Lobby/Games/` subchannel.
pub fn sim_server() -> (SimServer, ChannelId, ChannelId) {
    let sim = SimServer::new();
    let lobby = sim.add_channel(ROOT_CHANNEL_ID, "Lobby");
    let games = sim.add_channel(lobby, "Games");
    (sim, lobby, games)
}

/// A session driven synchronously with [`Harness::pump`].
pub struct Harness {
    pub sim: SimServer,
    pub shared: Arc<Shared>,
    pub services: Arc<StubServices>,
    pub session: Session,
    pub lobby: ChannelId,
    pub games: ChannelId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let (sim, lobby, games) = sim_server();
        Self::on_server(sim, lobby, games, config)
    }

    pub fn on_server(sim: SimServer, lobby: ChannelId, games: ChannelId, config: Config) -> Self {
        Self::on_store(sim, lobby, games, ConfigStore::ephemeral(config))
    }

    pub fn on_store(sim: SimServer, lobby: ChannelId, games: ChannelId, store: ConfigStore) -> Self {
        let services = Arc::new(StubServices::default());
        let shared = shared_with_store(store, services.clone());
        let mut session = Session::new(&sim, shared.clone());
        assert!(session.start());
        session.process_pending();
        Self {
            sim,
            shared,
            services,
            session,
            lobby,
            games,
        }
    }

    pub fn pump(&mut self) -> usize {
        self.session.process_pending()
    }

    /// Let spawned service calls finish, then handle their replies.
    pub async fn settle(&mut self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        self.pump();
    }

    pub fn user(&mut self, nick: &str) -> UserId {
        let id = self.sim.add_user(nick, &nick.to_lowercase(), self.lobby);
        self.pump();
        id
    }

    pub fn admin(&mut self) -> UserId {
        let id = self.sim.add_user("Boss", ADMIN_USERNAME, self.lobby);
        self.pump();
        id
    }

    pub fn pm(&mut self, from: UserId, text: &str) {
        self.sim.say_private(from, text);
        self.pump();
    }

    pub fn say(&mut self, from: UserId, text: &str) {
        self.sim.say_channel(from, self.lobby, text);
        self.pump();
    }

    /// Complete private messages to `user_id`, fragments joined.
    pub fn pms_to(&self, user_id: UserId) -> Vec<String> {
        messages(&self.sim, |kind, to, _| kind == MessageKind::User && to == user_id)
    }

    pub fn last_pm(&self, user_id: UserId) -> String {
        self.pms_to(user_id).pop().unwrap_or_default()
    }

    pub fn channel_msgs(&self, channel_id: ChannelId) -> Vec<String> {
        messages(&self.sim, |kind, _, ch| kind == MessageKind::Channel && ch == channel_id)
    }

    pub fn clear(&self) {
        self.sim.take_sent();
    }
}

/// Rebuild whole messages from sent fragments using the `more` flag.
pub fn messages(
    sim: &SimServer,
    wanted: impl Fn(MessageKind, UserId, ChannelId) -> bool,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut partial = String::new();
    for msg in sim.sent() {
        if !wanted(msg.kind, msg.to_user_id, msg.channel_id) {
            continue;
        }
        partial.push_str(&msg.text);
        if !msg.more {
            out.push(std::mem::take(&mut partial));
        }
    }
    out
}
