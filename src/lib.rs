//! # TalkBot - resilient chat-server bot client
//!
//! TalkBot keeps a persistent session against a stateful chat server,
//! reassembles fragmented messages, and runs them through an
//! authorization-aware command layer while a reconnect loop rebuilds the
//! session whenever the connection drops.
//!
//! ## Features
//!
//! - **Session lifecycle**: connect, login, join and run, with random backoff
//!   reconnects and a clean distinction between intentional stops and losses.
//! - **Command dispatch**: lock, block and admin policy driven by a single
//!   registration table, plus a whole-word channel filter with warnings.
//! - **Moderation**: kick, move, ban and unban through the transport, logged on
//!   the `security` target.
//! - **Presence and reminders**: last-seen and AFK records plus durable
//!   reminders in sled, delivered through whichever session is live.
//! - **Services**: weather, AI completions and time lookups run off the
//!   session worker and post their replies back through it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use talkbot::bot::{Controller, Shared};
//! use talkbot::config::{Config, ConfigStore};
//! use talkbot::services::ServiceHub;
//! use talkbot::storage::{reminders::ReminderStore, PresenceStore};
//! use talkbot::transport::sim::SimServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let presence = PresenceStore::open(config.storage.presence_path())?;
//!     let reminders = ReminderStore::open(config.storage.reminders_path())?;
//!     let services = Arc::new(ServiceHub::new(&config));
//!     let shared = Shared::new(
//!         Arc::new(ConfigStore::ephemeral(config)),
//!         presence,
//!         reminders,
//!         services,
//!     );
//!     let exit = Controller::new(Arc::new(SimServer::new()), shared).run().await;
//!     println!("controller finished: {:?}", exit);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`transport`] - the chat server boundary and an in-process simulator
//! - [`bot`] - session, reassembly, dispatch, commands and the controller
//! - [`services`] - external request/response services
//! - [`storage`] - presence and reminder stores
//! - [`config`] - configuration loading and persistence
//! - [`console`] - operator shell
//! - [`validation`] - input checks for user supplied values

pub mod bot;
pub mod config;
pub mod console;
pub mod logutil;
pub mod metrics;
pub mod services;
pub mod storage;
pub mod transport;
pub mod validation;
