//! Reconnect controller.
//!
//! Owns the outer retry loop: build a session, run it to completion, and
//! decide from its [`SessionEnd`] whether to stop, restart at once, or sleep a
//! random backoff first. Only one session runs at a time; before a new one is
//! built the previous worker must have exited (or been aborted after
//! [`SESSION_EXIT_TIMEOUT`]).
//!
//! ```text
//!        ┌────────────── restart ───────────────┐
//!        ▼                                      │
//!   Session::run ──▶ Stopped{restart} ──────────┤
//!        │         ──▶ Stopped / Fatal ──▶ exit │
//!        └─▶ ConnectFailed / ConnectionLost ──▶ backoff [min, max] ──┘
//! ```
//!
//! Shutdown and restart requests from signal handlers, the console or admin
//! commands go through [`ControlHandle`]; none of them touch the transport.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{error, info, warn};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::session::{Session, SessionEnd, SessionHandle};
use super::Shared;
use crate::config::BotConfig;
use crate::metrics;
use crate::transport::{ClientErrorCode, TransportFactory};

/// How long a stopping session may take to finish before it is aborted.
pub const SESSION_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Inclusive backoff range between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub min: Duration,
    pub max: Duration,
}

impl ReconnectPolicy {
    /// An inverted range is swapped rather than rejected.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    pub fn from_config(bot: &BotConfig) -> Self {
        Self::new(
            Duration::from_secs(bot.reconnect_delay_min),
            Duration::from_secs(bot.reconnect_delay_max),
        )
    }

    /// A delay drawn uniformly from `[min, max]`.
    pub fn delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Process-wide registry of the session currently alive, if any.
///
/// Reminder delivery and the console resolve the session through this at the
/// moment they need it instead of holding on to one.
#[derive(Debug, Clone, Default)]
pub struct LiveSession(Arc<RwLock<Option<SessionHandle>>>);

impl LiveSession {
    pub fn set(&self, handle: SessionHandle) {
        let mut slot = self.0.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(handle);
    }

    /// Clear the slot if it still holds session `id`.
    pub fn clear(&self, id: u64) {
        let mut slot = self.0.write().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().map(SessionHandle::id) == Some(id) {
            *slot = None;
        }
    }

    pub fn current(&self) -> Option<SessionHandle> {
        self.0.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Stop and restart requests for the controller.
///
/// Shutdown is a latch; restart requests are counted so that each one is
/// seen exactly once.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    restart_tx: Arc<watch::Sender<u64>>,
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlHandle {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (restart_tx, _) = watch::channel(0u64);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            restart_tx: Arc::new(restart_tx),
        }
    }

    /// Intentional shutdown; the controller will not reconnect.
    pub fn request_shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("shutdown requested");
        }
    }

    /// Stop the running session and start a fresh one without backoff.
    pub fn request_restart(&self) {
        self.restart_tx.send_modify(|n| *n = n.wrapping_add(1));
        info!("restart requested");
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn subscribe_restarts(&self) -> watch::Receiver<u64> {
        self.restart_tx.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerExit {
    Shutdown,
    Fatal(ClientErrorCode),
}

pub struct Controller {
    factory: Arc<dyn TransportFactory>,
    shared: Arc<Shared>,
}

impl Controller {
    pub fn new(factory: Arc<dyn TransportFactory>, shared: Arc<Shared>) -> Self {
        Self { factory, shared }
    }

    pub async fn run(self) -> ControllerExit {
        let control = self.shared.control.clone();
        let mut shutdown_rx = control.subscribe_shutdown();
        let mut restarts = control.subscribe_restarts();

        let exit = loop {
            if control.is_shutting_down() {
                break ControllerExit::Shutdown;
            }
            // Restarts requested from here on belong to the new session.
            restarts.borrow_and_update();
            let session = Session::new(self.factory.as_ref(), self.shared.clone());
            let handle = session.handle();
            info!("starting session {}", handle.id());
            let mut task = tokio::spawn(session.run());

            let end = tokio::select! {
                joined = &mut task => match joined {
                    Ok(end) => end,
                    Err(e) => {
                        error!("session {} worker failed: {}", handle.id(), e);
                        SessionEnd::ConnectionLost
                    }
                },
                _ = shutdown_signal(&mut shutdown_rx) => {
                    handle.request_stop(false);
                    await_exit(&mut task, handle.id(), SessionEnd::Stopped { restart: false }).await
                }
                _ = restarts.changed() => {
                    handle.request_stop(true);
                    await_exit(&mut task, handle.id(), SessionEnd::Stopped { restart: true }).await
                }
            };

            match end {
                SessionEnd::Stopped { restart: true } if !control.is_shutting_down() => {
                    info!("session {} stopped for restart", handle.id());
                }
                SessionEnd::Stopped { .. } => break ControllerExit::Shutdown,
                SessionEnd::Fatal(code) => {
                    error!("fatal login error: {}; giving up", code.describe());
                    break ControllerExit::Fatal(code);
                }
                SessionEnd::ConnectFailed | SessionEnd::ConnectionLost => {
                    if control.is_shutting_down() {
                        break ControllerExit::Shutdown;
                    }
                    let policy = ReconnectPolicy::from_config(&self.shared.config.read().bot);
                    let delay = policy.delay();
                    metrics::inc_reconnect_attempts();
                    warn!(
                        "session {} ended ({:?}); reconnecting in {:.1}s",
                        handle.id(),
                        end,
                        delay.as_secs_f64()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_signal(&mut shutdown_rx) => {}
                        _ = restarts.changed() => info!("restart requested during backoff"),
                    }
                    if control.is_shutting_down() {
                        info!("shutdown during backoff; not reconnecting");
                        break ControllerExit::Shutdown;
                    }
                }
            }
        };
        control.request_shutdown();
        info!("controller exiting: {:?}", exit);
        exit
    }
}

/// Resolve once shutdown is latched. The borrowed value is dropped here so
/// callers stay `Send` across later awaits.
pub(crate) async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|s| *s).await;
}

async fn await_exit(task: &mut JoinHandle<SessionEnd>, id: u64, fallback: SessionEnd) -> SessionEnd {
    match tokio::time::timeout(SESSION_EXIT_TIMEOUT, &mut *task).await {
        Ok(Ok(end)) => end,
        Ok(Err(e)) => {
            error!("session {} worker failed while stopping: {}", id, e);
            fallback
        }
        Err(_) => {
            warn!("session {} did not stop within {:?}; aborting", id, SESSION_EXIT_TIMEOUT);
            task.abort();
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_range_is_swapped() {
        let p = ReconnectPolicy::new(Duration::from_secs(9), Duration::from_secs(2));
        assert_eq!(p.min, Duration::from_secs(2));
        assert_eq!(p.max, Duration::from_secs(9));
    }

    #[test]
    fn delay_stays_in_range() {
        let p = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(3));
        for _ in 0..200 {
            let d = p.delay();
            assert!(d >= p.min && d <= p.max, "{:?} out of range", d);
        }
        let fixed = ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(fixed.delay(), Duration::from_secs(5));
    }

    #[test]
    fn shutdown_is_a_latch() {
        let control = ControlHandle::new();
        assert!(!control.is_shutting_down());
        control.request_shutdown();
        control.request_shutdown();
        assert!(control.is_shutting_down());
        assert!(*control.subscribe_shutdown().borrow());
    }

    #[tokio::test]
    async fn restart_requests_wake_subscribers() {
        let control = ControlHandle::new();
        let mut rx = control.subscribe_restarts();
        control.request_restart();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
