//! Incremental reassembly of multi-part text messages.
//!
//! The server splits long messages into fragments and flags every fragment
//! except the last with `more = true`. Fragments of one logical message share
//! a [`FragmentKey`]; distinct keys may interleave freely, fragments of the
//! same key arrive in order.
//!
//! ```text
//!  (alice, channel, 7) "Hello, " more ─┐
//!  (bob,   private, 0) "hi"      done ─┼─▶ emit "hi"
//!  (alice, channel, 7) "world"   done ─┴─▶ emit "Hello, world"
//! ```
//!
//! A stream whose final fragment never arrives simply stays buffered until
//! the reassembler is dropped with its session.

use crate::transport::{ChannelId, MessageKind, TextMessage, UserId};
use log::{debug, trace};
use std::collections::HashMap;

/// Identity of one fragment stream: (sender, kind, destination-or-zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub sender: UserId,
    pub kind: MessageKind,
    pub destination: ChannelId,
}

impl FragmentKey {
    pub fn of(msg: &TextMessage) -> Self {
        Self {
            sender: msg.from_user_id,
            kind: msg.kind,
            destination: msg.destination(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FragmentReassembler {
    buffers: HashMap<FragmentKey, String>,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the complete text when `more` is false.
    ///
    /// A completed message that is empty is dropped and yields `None`.
    pub fn push(&mut self, key: FragmentKey, chunk: &str, more: bool) -> Option<String> {
        if more {
            self.buffers.entry(key).or_default().push_str(chunk);
            trace!("fragment buffered for {:?} ({} pending)", key, self.buffers.len());
            return None;
        }
        let mut full = self.buffers.remove(&key).unwrap_or_default();
        full.push_str(chunk);
        if full.is_empty() {
            debug!("dropping empty message from {:?}", key);
            return None;
        }
        Some(full)
    }

    pub fn push_message(&mut self, msg: &TextMessage) -> Option<String> {
        self.push(FragmentKey::of(msg), &msg.text, msg.more)
    }

    /// Number of streams waiting for their final fragment.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sender: UserId, kind: MessageKind, destination: ChannelId) -> FragmentKey {
        FragmentKey {
            sender,
            kind,
            destination,
        }
    }

    #[test]
    fn single_fragment_passes_through() {
        let mut r = FragmentReassembler::new();
        let k = key(1, MessageKind::User, 0);
        assert_eq!(r.push(k, "ping", false).as_deref(), Some("ping"));
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn concatenates_and_emits_once() {
        let mut r = FragmentReassembler::new();
        let k = key(5, MessageKind::Channel, 3);
        let parts = ["a", "bb", "ccc", "dddd"];
        let mut emitted = Vec::new();
        for (i, p) in parts.iter().enumerate() {
            if let Some(done) = r.push(k, p, i + 1 < parts.len()) {
                emitted.push(done);
            }
        }
        assert_eq!(emitted, vec!["abbcccdddd".to_string()]);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn interleaved_streams_do_not_mix() {
        let mut r = FragmentReassembler::new();
        let a = key(1, MessageKind::Channel, 9);
        let b = key(1, MessageKind::User, 0);
        let c = key(2, MessageKind::Channel, 9);
        assert_eq!(r.push(a, "A1", true), None);
        assert_eq!(r.push(b, "B1", true), None);
        assert_eq!(r.push(c, "C1", true), None);
        assert_eq!(r.push(b, "B2", false).as_deref(), Some("B1B2"));
        assert_eq!(r.push(a, "A2", true), None);
        assert_eq!(r.push(c, "C2", false).as_deref(), Some("C1C2"));
        assert_eq!(r.push(a, "A3", false).as_deref(), Some("A1A2A3"));
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn empty_completed_message_is_dropped() {
        let mut r = FragmentReassembler::new();
        let k = key(1, MessageKind::User, 0);
        assert_eq!(r.push(k, "", true), None);
        assert_eq!(r.push(k, "", false), None);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn unfinished_stream_stays_pending() {
        let mut r = FragmentReassembler::new();
        r.push(key(1, MessageKind::User, 0), "half", true);
        assert_eq!(r.pending(), 1);
        r.clear();
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn private_destination_is_normalized_to_zero() {
        let msg = TextMessage {
            kind: MessageKind::User,
            from_user_id: 4,
            to_user_id: 99,
            channel_id: 12,
            text: "x".into(),
            more: true,
        };
        assert_eq!(FragmentKey::of(&msg).destination, 0);
    }
}
