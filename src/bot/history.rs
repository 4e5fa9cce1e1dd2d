//! Per-conversation message history fed to the AI service as context.
//!
//! Conversations are keyed by [`ConversationKey`]; entries older than the
//! retention window are pruned on read and whenever the window changes.

use crate::transport::{ChannelId, UserId};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Private(UserId),
    Channel(ChannelId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub text: String,
    pub from_bot: bool,
    pub at: Instant,
}

#[derive(Debug)]
pub struct ContextHistory {
    retention: Duration,
    conversations: HashMap<ConversationKey, VecDeque<HistoryEntry>>,
}

impl ContextHistory {
    pub fn new(retention_minutes: u64) -> Self {
        Self {
            retention: Duration::from_secs(retention_minutes.saturating_mul(60)),
            conversations: HashMap::new(),
        }
    }

    pub fn retention_minutes(&self) -> u64 {
        self.retention.as_secs() / 60
    }

    pub fn set_retention_minutes(&mut self, minutes: u64) {
        debug!("context history retention set to {} minutes", minutes);
        self.retention = Duration::from_secs(minutes.saturating_mul(60));
        self.prune_all(Instant::now());
    }

    pub fn add(&mut self, key: ConversationKey, text: &str, from_bot: bool) {
        self.add_at(key, text, from_bot, Instant::now());
    }

    pub fn add_at(&mut self, key: ConversationKey, text: &str, from_bot: bool, at: Instant) {
        let retention = self.retention;
        let entries = self.conversations.entry(key).or_default();
        entries.push_back(HistoryEntry {
            text: text.to_string(),
            from_bot,
            at,
        });
        prune(entries, retention, at);
    }

    pub fn get(&mut self, key: &ConversationKey) -> Vec<HistoryEntry> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &ConversationKey, now: Instant) -> Vec<HistoryEntry> {
        let retention = self.retention;
        match self.conversations.get_mut(key) {
            Some(entries) => {
                prune(entries, retention, now);
                entries.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    fn prune_all(&mut self, now: Instant) {
        let retention = self.retention;
        for entries in self.conversations.values_mut() {
            prune(entries, retention, now);
        }
        self.conversations.retain(|_, e| !e.is_empty());
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}

fn prune(entries: &mut VecDeque<HistoryEntry>, retention: Duration, now: Instant) {
    while let Some(front) = entries.front() {
        if now.saturating_duration_since(front.at) > retention {
            entries.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_older_than_retention_are_pruned() {
        let mut h = ContextHistory::new(1);
        let t0 = Instant::now();
        let key = ConversationKey::Private(3);
        h.add_at(key.clone(), "old", false, t0);
        h.add_at(key.clone(), "new", true, t0 + Duration::from_secs(50));
        let kept = h.get_at(&key, t0 + Duration::from_secs(90));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "new");
        assert!(kept[0].from_bot);
    }

    #[test]
    fn conversations_are_separate() {
        let mut h = ContextHistory::new(60);
        h.add(ConversationKey::Private(1), "a", false);
        h.add(ConversationKey::Channel(1), "b", false);
        assert_eq!(h.get(&ConversationKey::Private(1)).len(), 1);
        assert_eq!(h.get(&ConversationKey::Channel(1)).len(), 1);
        assert_eq!(h.conversation_count(), 2);
    }

    #[test]
    fn retention_reports_minutes() {
        let mut h = ContextHistory::new(60);
        h.set_retention_minutes(15);
        assert_eq!(h.retention_minutes(), 15);
    }
}
