//! # Configuration Management Module
//!
//! Structured settings for the bot, loaded once at startup and persisted again
//! whenever a runtime admin command changes something (AI key, initial channel
//! path, filter list, retention).
//!
//! ## Configuration Structure
//!
//! - [`ConnectionConfig`] - server address and credentials
//! - [`BotConfig`] - behaviour: admins, reconnect bounds, feature defaults, word filter
//! - [`AiConfig`] - completion provider settings
//! - [`WeatherConfig`] - OpenWeatherMap settings
//! - [`StorageConfig`] - location of the presence and reminder databases
//! - [`LoggingConfig`] - log level and optional log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use talkbot::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("Server: {}:{}", config.connection.host, config.connection.tcp_port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [connection]
//! host = "chat.example.org"
//! tcp_port = 10333
//! udp_port = 10333
//! username = "bot"
//! password = "secret"
//! nickname = "TalkBot"
//!
//! [bot]
//! admin_usernames = ["alice"]
//! reconnect_delay_min = 5
//! reconnect_delay_max = 15
//! filtered_words = ["badword"]
//! ```
//!
//! Every key has a default, so a partial file is valid.

use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub tcp_port: u16,
    #[serde(default = "default_port")]
    pub udp_port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// Password for `initial_channel_path`, if the channel has one.
    #[serde(default)]
    pub channel_password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    10333
}

fn default_username() -> String {
    "guest".to_string()
}

fn default_nickname() -> String {
    "TalkBot".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            tcp_port: default_port(),
            udp_port: default_port(),
            username: default_username(),
            password: String::new(),
            nickname: default_nickname(),
            channel_password: String::new(),
        }
    }
}

/// How join announcements are phrased.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WelcomeMode {
    #[default]
    Template,
    Ai,
}

impl WelcomeMode {
    pub fn label(self) -> &'static str {
        match self {
            WelcomeMode::Template => "Template",
            WelcomeMode::Ai => "AI",
        }
    }
}

/// Initial values of the per-session feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureDefaults {
    #[serde(default = "default_true")]
    pub join_leave_announcements: bool,
    #[serde(default = "default_true")]
    pub channel_messages: bool,
    #[serde(default = "default_true")]
    pub broadcast: bool,
    #[serde(default)]
    pub ai_pm: bool,
    #[serde(default)]
    pub ai_channel: bool,
    #[serde(default)]
    pub word_filter: bool,
    #[serde(default)]
    pub welcome_mode: WelcomeMode,
}

fn default_true() -> bool {
    true
}

impl Default for FeatureDefaults {
    fn default() -> Self {
        Self {
            join_leave_announcements: true,
            channel_messages: true,
            broadcast: true,
            ai_pm: false,
            ai_channel: false,
            word_filter: false,
            welcome_mode: WelcomeMode::Template,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_channel_path")]
    pub initial_channel_path: String,
    /// Account usernames whose sessions get admin rights (case-insensitive).
    #[serde(default)]
    pub admin_usernames: Vec<String>,
    #[serde(default)]
    pub status_message: String,
    /// Reconnect backoff lower bound, seconds.
    #[serde(default = "default_reconnect_min")]
    pub reconnect_delay_min: u64,
    /// Reconnect backoff upper bound, seconds.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_delay_max: u64,
    #[serde(default)]
    pub filtered_words: Vec<String>,
    #[serde(default = "default_retention")]
    pub context_history_retention_minutes: u64,
    #[serde(default = "default_true")]
    pub context_history_enabled: bool,
    #[serde(default)]
    pub debug_logging_enabled: bool,
    #[serde(default)]
    pub features: FeatureDefaults,
}

fn default_client_name() -> String {
    format!("TalkBot v{}", env!("CARGO_PKG_VERSION"))
}

fn default_channel_path() -> String {
    "/".to_string()
}

fn default_reconnect_min() -> u64 {
    5
}

fn default_reconnect_max() -> u64 {
    15
}

fn default_retention() -> u64 {
    60
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            initial_channel_path: default_channel_path(),
            admin_usernames: Vec::new(),
            status_message: String::new(),
            reconnect_delay_min: default_reconnect_min(),
            reconnect_delay_max: default_reconnect_max(),
            filtered_words: Vec::new(),
            context_history_retention_minutes: default_retention(),
            context_history_enabled: true,
            debug_logging_enabled: false,
            features: FeatureDefaults::default(),
        }
    }
}

impl BotConfig {
    pub fn is_admin_username(&self, username: &str) -> bool {
        self.admin_usernames
            .iter()
            .any(|a| a.trim().eq_ignore_ascii_case(username.trim()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_instruction")]
    pub system_instruction: String,
    /// Completion endpoint; empty means no provider is wired.
    #[serde(default)]
    pub endpoint: String,
}

fn default_ai_model() -> String {
    "default".to_string()
}

fn default_instruction() -> String {
    "You are a helpful assistant.".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_ai_model(),
            system_instruction: default_instruction(),
            endpoint: String::new(),
        }
    }
}

impl AiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherConfig {
    /// OpenWeatherMap API key
    #[serde(default)]
    pub api_key: String,
    /// `metric` or `imperial`
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_minutes: u32,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    #[serde(default)]
    pub enabled: bool,
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_cache_ttl() -> u32 {
    10
}

fn default_timeout() -> u32 {
    5
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            units: default_units(),
            cache_ttl_minutes: default_cache_ttl(),
            timeout_seconds: default_timeout(),
            // Disabled by default until an API key is provided
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn presence_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("presence")
    }

    pub fn reminders_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("reminders")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    pub file: Option<String>,
    /// Separate file receiving only the `security` log target.
    pub security_file: Option<String>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: Some("talkbot.log".to_string()),
            security_file: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        Self::from_toml(&content).map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    /// Parse and normalize a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Blocking save, used from the session worker where runtime admin
    /// commands change settings.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;
        std::fs::write(path, content)
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Repair values that would otherwise be rejected later.
    ///
    /// An inverted reconnect range is swapped instead of failing the load.
    pub fn normalize(&mut self) {
        if self.bot.reconnect_delay_min > self.bot.reconnect_delay_max {
            warn!(
                "reconnect_delay_min ({}) > reconnect_delay_max ({}); swapping",
                self.bot.reconnect_delay_min, self.bot.reconnect_delay_max
            );
            std::mem::swap(
                &mut self.bot.reconnect_delay_min,
                &mut self.bot.reconnect_delay_max,
            );
        }
        let mut words: Vec<String> = self
            .bot
            .filtered_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        words.sort();
        words.dedup();
        self.bot.filtered_words = words;
        if self.bot.initial_channel_path.trim().is_empty() {
            self.bot.initial_channel_path = default_channel_path();
        }
    }
}

/// Shared owner of the live configuration.
///
/// Sessions come and go; the store outlives them and is the only thing a new
/// session inherits from the previous one. When built with a path, every
/// [`ConfigStore::update`] writes the file back.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    inner: RwLock<Config>,
}

impl ConfigStore {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self {
            path,
            inner: RwLock::new(config),
        }
    }

    /// In-memory store, never persisted.
    pub fn ephemeral(config: Config) -> Self {
        Self::new(config, None)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Config> {
        // Config writers never panic while holding the lock; recover anyway.
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Config {
        self.read().clone()
    }

    /// Apply a mutation and persist the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut Config) -> R) -> Result<R> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let out = f(&mut guard);
        if let Some(path) = &self.path {
            guard.save(path)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_gets_defaults() {
        let cfg = Config::from_toml("[connection]\nhost = \"chat.example.org\"\n").unwrap();
        assert_eq!(cfg.connection.host, "chat.example.org");
        assert_eq!(cfg.connection.tcp_port, 10333);
        assert_eq!(cfg.bot.reconnect_delay_min, 5);
        assert_eq!(cfg.bot.reconnect_delay_max, 15);
        assert_eq!(cfg.bot.initial_channel_path, "/");
        assert!(cfg.bot.features.channel_messages);
    }

    #[test]
    fn inverted_reconnect_range_is_swapped() {
        let cfg =
            Config::from_toml("[bot]\nreconnect_delay_min = 30\nreconnect_delay_max = 2\n").unwrap();
        assert_eq!(cfg.bot.reconnect_delay_min, 2);
        assert_eq!(cfg.bot.reconnect_delay_max, 30);
    }

    #[test]
    fn filtered_words_are_normalized() {
        let cfg = Config::from_toml("[bot]\nfiltered_words = [\" Bad \", \"bad\", \"\", \"Worse\"]\n")
            .unwrap();
        assert_eq!(cfg.bot.filtered_words, vec!["bad", "worse"]);
    }

    #[test]
    fn admin_usernames_match_case_insensitively() {
        let mut cfg = Config::default();
        cfg.bot.admin_usernames = vec!["Alice".into()];
        assert!(cfg.bot.is_admin_username("alice"));
        assert!(!cfg.bot.is_admin_username("bob"));
    }

    #[test]
    fn store_update_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let store = ConfigStore::new(Config::default(), Some(path.clone()));
        store
            .update(|c| c.bot.initial_channel_path = "/lobby/".into())
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let reloaded = Config::from_toml(&text).unwrap();
        assert_eq!(reloaded.bot.initial_channel_path, "/lobby/");
        assert_eq!(store.read().bot.initial_channel_path, "/lobby/");
    }
}
