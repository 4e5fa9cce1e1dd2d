//! Authoritative mutable record of one session.
//!
//! A [`SessionState`] is created per connection attempt and thrown away with
//! its session. It lives behind a single mutex (see
//! [`SessionHandle`](super::session::SessionHandle)); every method here is
//! one atomic read or mutation under that lock.
//!
//! ```text
//! Disconnected ─▶ Connecting ─▶ Connected ─▶ Authenticating ─▶ LoggedIn
//!      ▲                                                         │  ▲
//!      └──────────────── connection lost / stop ─────────────────┘  │
//!                                             joined/left channel ──┘
//! ```
//!
//! Channel membership is tracked beside `LoggedIn` rather than as its own
//! status: during a move the bot can briefly be in two channels.

use super::directory::UserDirectory;
use super::features::{apply_debug_logging, Feature, FeatureToggles, ToggleError};
use super::filter::WordFilter;
use super::history::ContextHistory;
use super::polls::PollBook;
use crate::config::{BotConfig, Config, WelcomeMode};
use crate::transport::{ChannelId, CommandId, UserId, UserRights};
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    LoggedIn,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Authenticating => "Authenticating",
            ConnectionStatus::LoggedIn => "Logged in",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub nickname: String,
    pub username: String,
    pub status_text: String,
}

/// Result of toggling a verb in the blocked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockChange {
    Blocked,
    Unblocked,
}

#[derive(Debug)]
pub struct SessionState {
    status: ConnectionStatus,
    pub identity: Identity,
    rights: UserRights,
    occupied: BTreeSet<ChannelId>,
    pub target_channel_path: String,
    pub target_channel_id: Option<ChannelId>,
    pub channel_password: String,
    admin_ids: HashSet<UserId>,
    blocked: BTreeSet<String>,
    warnings: HashMap<UserId, u32>,
    pub toggles: FeatureToggles,
    pub welcome_mode: WelcomeMode,
    filter_words: WordFilter,
    pub directory: UserDirectory,
    pub history: ContextHistory,
    pub polls: PollBook,
    intentional_stop: bool,
    pub login_cmd_id: CommandId,
    pub join_cmd_id: CommandId,
    /// Admin who asked for the pending join, told about failures.
    pub join_requested_by: Option<UserId>,
    logged_in_at: Option<Instant>,
}

impl SessionState {
    pub fn new(config: &Config) -> Self {
        let bot = &config.bot;
        let filter_words = WordFilter::new(&bot.filtered_words);
        Self {
            status: ConnectionStatus::Disconnected,
            identity: Identity {
                nickname: config.connection.nickname.clone(),
                username: config.connection.username.clone(),
                status_text: bot.status_message.clone(),
                ..Identity::default()
            },
            rights: UserRights::NONE,
            occupied: BTreeSet::new(),
            target_channel_path: bot.initial_channel_path.clone(),
            target_channel_id: None,
            channel_password: config.connection.channel_password.clone(),
            admin_ids: HashSet::new(),
            blocked: BTreeSet::new(),
            warnings: HashMap::new(),
            toggles: FeatureToggles::from_defaults(
                &bot.features,
                bot.context_history_enabled,
                bot.debug_logging_enabled,
                !filter_words.is_empty(),
            ),
            welcome_mode: bot.features.welcome_mode,
            filter_words,
            directory: UserDirectory::new(),
            history: ContextHistory::new(bot.context_history_retention_minutes),
            polls: PollBook::new(),
            intentional_stop: false,
            login_cmd_id: 0,
            join_cmd_id: 0,
            join_requested_by: None,
            logged_in_at: None,
        }
    }

    // --- connection status ---

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn begin_connecting(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    pub fn on_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
    }

    pub fn on_login_requested(&mut self, cmd_id: CommandId) {
        self.status = ConnectionStatus::Authenticating;
        self.login_cmd_id = cmd_id;
    }

    /// Capture identity and rights from the login response and rebuild the
    /// derived admin set from `directory` (already refreshed by the caller).
    pub fn on_logged_in(&mut self, user_id: UserId, rights: UserRights, bot: &BotConfig) {
        self.status = ConnectionStatus::LoggedIn;
        self.identity.user_id = user_id;
        self.rights = rights;
        self.logged_in_at = Some(Instant::now());
        self.rebuild_admins(bot);
        info!(
            "logged in as '{}' (id {}) rights {:?}",
            self.identity.nickname, user_id, rights
        );
    }

    /// Back to `Connected` after the server logged us out.
    pub fn on_logged_out(&mut self) {
        if self.status == ConnectionStatus::LoggedIn {
            self.status = ConnectionStatus::Connected;
        }
        self.occupied.clear();
        self.admin_ids.clear();
        self.directory.clear();
        self.logged_in_at = None;
    }

    /// Connection loss or stop. Clears everything tied to the server.
    /// Returns whether the stop had been marked intentional.
    pub fn on_disconnected(&mut self) -> bool {
        self.status = ConnectionStatus::Disconnected;
        self.occupied.clear();
        self.admin_ids.clear();
        self.warnings.clear();
        self.directory.clear();
        self.rights = UserRights::NONE;
        self.logged_in_at = None;
        self.join_requested_by = None;
        self.intentional_stop
    }

    pub fn is_logged_in(&self) -> bool {
        self.status == ConnectionStatus::LoggedIn
    }

    pub fn uptime_secs(&self) -> Option<u64> {
        self.logged_in_at.map(|t| t.elapsed().as_secs())
    }

    pub fn rights(&self) -> UserRights {
        self.rights
    }

    pub fn has_right(&self, right: UserRights) -> bool {
        self.rights.contains(right)
    }

    // --- stop intent ---

    pub fn mark_intentional_stop(&mut self) {
        self.intentional_stop = true;
    }

    pub fn is_intentional_stop(&self) -> bool {
        self.intentional_stop
    }

    // --- channels ---

    pub fn on_joined(&mut self, channel_id: ChannelId) {
        self.occupied.insert(channel_id);
        if self.join_cmd_id != 0 && Some(channel_id) == self.target_channel_id {
            self.join_cmd_id = 0;
            self.join_requested_by = None;
        }
    }

    pub fn on_left(&mut self, channel_id: ChannelId) {
        self.occupied.remove(&channel_id);
    }

    pub fn in_channel(&self, channel_id: ChannelId) -> bool {
        self.occupied.contains(&channel_id)
    }

    pub fn occupied_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.occupied.iter().copied()
    }

    /// True when the bot sits in the channel it was configured to join.
    pub fn is_primary_located(&self) -> bool {
        self.target_channel_id
            .map(|id| self.occupied.contains(&id))
            .unwrap_or(false)
    }

    /// Channel that outbound channel commands default to.
    pub fn primary_channel(&self) -> Option<ChannelId> {
        if self.is_primary_located() {
            return self.target_channel_id;
        }
        self.occupied.iter().next().copied()
    }

    // --- admins ---

    pub fn rebuild_admins(&mut self, bot: &BotConfig) {
        let mut ids = self.directory.admin_ids(bot);
        if self.identity.user_id != 0 && bot.is_admin_username(&self.identity.username) {
            ids.insert(self.identity.user_id);
        }
        debug!("admin set rebuilt: {} id(s)", ids.len());
        self.admin_ids = ids;
    }

    pub fn set_admin(&mut self, user_id: UserId, admin: bool) {
        if admin {
            self.admin_ids.insert(user_id);
        } else {
            self.admin_ids.remove(&user_id);
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn admin_count(&self) -> usize {
        self.admin_ids.len()
    }

    // --- blocked verbs ---

    pub fn is_blocked(&self, verb: &str) -> bool {
        self.blocked.contains(verb)
    }

    pub fn toggle_block(&mut self, verb: &str) -> BlockChange {
        if self.blocked.remove(verb) {
            BlockChange::Unblocked
        } else {
            self.blocked.insert(verb.to_string());
            BlockChange::Blocked
        }
    }

    pub fn blocked_verbs(&self) -> impl Iterator<Item = &str> {
        self.blocked.iter().map(String::as_str)
    }

    // --- word filter ---

    pub fn filter_words(&self) -> impl Iterator<Item = &str> {
        self.filter_words.words()
    }

    pub fn filter_word_list(&self) -> Vec<String> {
        self.filter_words.words().map(str::to_string).collect()
    }

    /// Add a word and switch the filter on.
    pub fn add_filter_word(&mut self, word: &str) -> bool {
        let added = self.filter_words.insert(word);
        self.toggles.word_filter = !self.filter_words.is_empty();
        added
    }

    /// Remove a word; the filter switches off when the list becomes empty.
    pub fn remove_filter_word(&mut self, word: &str) -> bool {
        let removed = self.filter_words.remove(word);
        if self.filter_words.is_empty() {
            self.toggles.word_filter = false;
        }
        removed
    }

    /// Forbidden word in `text`, if filtering is on.
    pub fn filter_match(&self, text: &str) -> Option<String> {
        if !self.toggles.word_filter {
            return None;
        }
        self.filter_words.find(text).map(str::to_string)
    }

    pub fn add_warning(&mut self, user_id: UserId) -> u32 {
        let count = self.warnings.entry(user_id).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset_warnings(&mut self, user_id: UserId) {
        self.warnings.insert(user_id, 0);
    }

    pub fn warnings(&self, user_id: UserId) -> u32 {
        self.warnings.get(&user_id).copied().unwrap_or(0)
    }

    // --- toggles ---

    pub fn is_locked(&self) -> bool {
        self.toggles.lock
    }

    /// Flip a feature and return its new value.
    pub fn toggle_feature(&mut self, feature: Feature) -> Result<bool, ToggleError> {
        let next = !self.toggles.get(feature);
        self.set_feature(feature, next)?;
        Ok(next)
    }

    pub fn set_feature(&mut self, feature: Feature, on: bool) -> Result<(), ToggleError> {
        if feature == Feature::WordFilter && on && self.filter_words.is_empty() {
            return Err(ToggleError::EmptyFilter);
        }
        self.toggles.set(feature, on);
        match feature {
            Feature::DebugLogging => apply_debug_logging(on),
            Feature::ContextHistory if !on => self.history.clear(),
            _ => {}
        }
        info!("feature {} is now {}", feature.key(), if on { "on" } else { "off" });
        Ok(())
    }

    pub fn toggle_welcome_mode(&mut self) -> WelcomeMode {
        self.welcome_mode = match self.welcome_mode {
            WelcomeMode::Template => WelcomeMode::Ai,
            WelcomeMode::Ai => WelcomeMode::Template,
        };
        self.welcome_mode
    }
}
