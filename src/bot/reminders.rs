//! Fires durable reminder jobs through whatever session is live.
//!
//! Jobs hold only a user id and text. At fire time the scheduler looks up
//! the current session in the [`LiveSession`](super::LiveSession) registry;
//! if there is none, or delivery fails, the job stays in the store and is
//! retried on the next tick until [`MISFIRE_GRACE`] has passed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::time::MissedTickBehavior;

use super::controller::shutdown_signal;
use super::outbound::Destination;
use super::Shared;
use crate::storage::reminders::ReminderJob;

pub const TICK: Duration = Duration::from_secs(1);
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an undeliverable job is kept past its fire time.
pub const MISFIRE_GRACE: Duration = Duration::from_secs(3600);

pub struct ReminderScheduler {
    shared: Arc<Shared>,
}

impl ReminderScheduler {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Tick until shutdown.
    pub async fn run(self) {
        let mut shutdown = self.shared.control.subscribe_shutdown();
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        match self.shared.reminders.len() {
            0 => debug!("reminder scheduler started"),
            n => info!("reminder scheduler started with {} pending job(s)", n),
        }
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.fire_due(Utc::now()).await;
                }
                _ = shutdown_signal(&mut shutdown) => break,
            }
        }
        debug!("reminder scheduler stopped");
    }

    /// Deliver every job due at `now`. Returns how many were delivered.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let due = match self.shared.reminders.due(now) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("failed to read reminder jobs: {}", e);
                return 0;
            }
        };
        let mut delivered = 0;
        for job in due {
            if self.deliver(&job).await {
                delivered += 1;
                self.remove(&job);
            } else if (now - job.fire_at)
                .to_std()
                .map_or(false, |late| late > MISFIRE_GRACE)
            {
                warn!(
                    "dropping reminder {} for user {}: undeliverable since {}",
                    job.id, job.user_id, job.fire_at
                );
                self.remove(&job);
            }
        }
        delivered
    }

    async fn deliver(&self, job: &ReminderJob) -> bool {
        let Some(session) = self.shared.live.current() else {
            debug!("reminder {} waiting for a live session", job.id);
            return false;
        };
        if !session.is_logged_in() {
            return false;
        }
        let text = format!("[Reminder] {}", job.message);
        let send = session.send_confirmed(Destination::User(job.user_id), text);
        match tokio::time::timeout(DELIVERY_TIMEOUT, send).await {
            Ok(true) => {
                info!("reminder {} delivered to user {}", job.id, job.user_id);
                true
            }
            Ok(false) => false,
            Err(_) => {
                warn!("reminder {} delivery timed out", job.id);
                false
            }
        }
    }

    fn remove(&self, job: &ReminderJob) {
        if let Err(e) = self.shared.reminders.remove(job.id) {
            warn!("failed to remove reminder {}: {}", job.id, e);
        }
    }
}
