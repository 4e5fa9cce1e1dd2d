//! Process-wide counters for the session pipeline.
//!
//! Counters survive reconnects (they are not part of session state) and are
//! reported by the `health` admin command.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

static SESSIONS_STARTED: AtomicU64 = AtomicU64::new(0);
static RECONNECT_ATTEMPTS: AtomicU64 = AtomicU64::new(0);
static MESSAGES_REASSEMBLED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static POLICY_DENIALS: AtomicU64 = AtomicU64::new(0);
static HANDLER_FAILURES: AtomicU64 = AtomicU64::new(0);
static FRAGMENTS_SENT: AtomicU64 = AtomicU64::new(0);
static SEND_REFUSALS: AtomicU64 = AtomicU64::new(0);

static VERB_COUNTERS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

pub fn inc_sessions_started() {
    SESSIONS_STARTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_reconnect_attempts() {
    RECONNECT_ATTEMPTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_reassembled() {
    MESSAGES_REASSEMBLED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_policy_denials() {
    POLICY_DENIALS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_handler_failures() {
    HANDLER_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn add_fragments_sent(n: u64) {
    FRAGMENTS_SENT.fetch_add(n, Ordering::Relaxed);
}
pub fn inc_send_refusals() {
    SEND_REFUSALS.fetch_add(1, Ordering::Relaxed);
}

fn verb_counter_lock() -> &'static Mutex<HashMap<String, u64>> {
    VERB_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Count one dispatched command, both in total and per verb.
pub fn record_command(verb: &str) {
    COMMANDS_DISPATCHED.fetch_add(1, Ordering::Relaxed);
    // A poisoned counter map only loses statistics.
    if let Ok(mut guard) = verb_counter_lock().lock() {
        let slot = guard.entry(verb.to_string()).or_default();
        *slot = slot.saturating_add(1);
    }
}

/// Most used verbs, highest count first.
pub fn top_verbs(limit: usize) -> Vec<(String, u64)> {
    let mut all: Vec<(String, u64)> = match verb_counter_lock().lock() {
        Ok(guard) => guard.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        Err(_) => Vec::new(),
    };
    all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    all.truncate(limit);
    all
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub sessions_started: u64,
    pub reconnect_attempts: u64,
    pub messages_reassembled: u64,
    pub commands_dispatched: u64,
    pub policy_denials: u64,
    pub handler_failures: u64,
    pub fragments_sent: u64,
    pub send_refusals: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sessions_started: SESSIONS_STARTED.load(Ordering::Relaxed),
        reconnect_attempts: RECONNECT_ATTEMPTS.load(Ordering::Relaxed),
        messages_reassembled: MESSAGES_REASSEMBLED.load(Ordering::Relaxed),
        commands_dispatched: COMMANDS_DISPATCHED.load(Ordering::Relaxed),
        policy_denials: POLICY_DENIALS.load(Ordering::Relaxed),
        handler_failures: HANDLER_FAILURES.load(Ordering::Relaxed),
        fragments_sent: FRAGMENTS_SENT.load(Ordering::Relaxed),
        send_refusals: SEND_REFUSALS.load(Ordering::Relaxed),
    }
}
