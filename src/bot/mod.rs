//! # Bot core
//!
//! Everything between the transport event stream and outbound sends:
//!
//! ```text
//!  transport events ─▶ reassembly ─▶ dispatch ─▶ commands ─▶ outbound ─▶ transport
//!          ▲                                                               │
//!          └──────────────── session worker (one per attempt) ◀────────────┘
//!                                    ▲
//!                              controller (reconnect loop)
//! ```
//!
//! [`Shared`] holds what outlives a single session: configuration, the
//! persistent stores, external services, the control channel and the
//! live-session registry. A [`session::Session`] owns its transport and its
//! [`state::SessionState`]; the [`controller::Controller`] builds a fresh one
//! for every connection attempt.

pub mod commands;
pub mod controller;
pub mod directory;
pub mod dispatch;
pub mod features;
pub mod filter;
pub mod history;
pub mod outbound;
pub mod polls;
pub mod reassembly;
pub mod reminders;
pub mod session;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use crate::config::ConfigStore;
use crate::services::ExternalServices;
use crate::storage::reminders::ReminderStore;
use crate::storage::PresenceStore;

pub use commands::{CommandContext, CommandRegistry, Invocation};
pub use controller::{ControlHandle, Controller, ControllerExit, LiveSession, ReconnectPolicy};
pub use outbound::{Destination, SendError};
pub use session::{Session, SessionEnd, SessionHandle, SessionRequest};
pub use state::{ConnectionStatus, SessionState};

/// Process-lifetime context shared by every session.
pub struct Shared {
    pub config: Arc<ConfigStore>,
    pub presence: PresenceStore,
    pub reminders: ReminderStore,
    pub services: Arc<dyn ExternalServices>,
    pub control: ControlHandle,
    pub live: LiveSession,
    pub registry: CommandRegistry,
    pub started_at: Instant,
}

impl Shared {
    pub fn new(
        config: Arc<ConfigStore>,
        presence: PresenceStore,
        reminders: ReminderStore,
        services: Arc<dyn ExternalServices>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            presence,
            reminders,
            services,
            control: ControlHandle::new(),
            live: LiveSession::default(),
            registry: CommandRegistry::builtin(),
            started_at: Instant::now(),
        })
    }
}
