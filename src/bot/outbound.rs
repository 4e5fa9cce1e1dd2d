//! Outbound gateway: policy checks and chunking for every message the bot
//! sends.
//!
//! Text longer than [`MAX_FRAGMENT_CHARS`] is cut on character boundaries;
//! every chunk but the last carries `more = true` so the receiving client
//! can reassemble it. A rejected chunk (command id `0`) aborts the rest.

use super::history::ConversationKey;
use super::state::SessionState;
use crate::metrics;
use crate::transport::{
    ChannelId, MessageKind, TextMessage, Transport, UserId, UserRights, MAX_FRAGMENT_CHARS,
};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    User(UserId),
    Channel(ChannelId),
    Broadcast,
}

impl Destination {
    pub fn kind(self) -> MessageKind {
        match self {
            Destination::User(_) => MessageKind::User,
            Destination::Channel(_) => MessageKind::Channel,
            Destination::Broadcast => MessageKind::Broadcast,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    Empty,
    #[error("{0} are disabled")]
    FeatureDisabled(&'static str),
    #[error("bot is locked")]
    Locked,
    #[error("missing permission {0}")]
    MissingRight(&'static str),
    #[error("transport rejected fragment {index} of {total}")]
    Rejected { index: usize, total: usize },
    #[error("session is not connected")]
    NotConnected,
}

/// Split `text` into pieces of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Refusals that apply before anything reaches the transport.
///
/// Private messages are always allowed so that denials and help still reach
/// users while the bot is locked.
pub fn check_policy(state: &SessionState, dest: Destination) -> Result<(), SendError> {
    match dest {
        Destination::User(_) => Ok(()),
        Destination::Channel(_) => {
            if !state.toggles.channel_messages {
                return Err(SendError::FeatureDisabled("channel messages"));
            }
            if state.is_locked() {
                return Err(SendError::Locked);
            }
            if !state.has_right(UserRights::TEXTMESSAGE_CHANNEL) {
                return Err(SendError::MissingRight("TEXTMESSAGE_CHANNEL"));
            }
            Ok(())
        }
        Destination::Broadcast => {
            if !state.toggles.broadcast {
                return Err(SendError::FeatureDisabled("broadcasts"));
            }
            if state.is_locked() {
                return Err(SendError::Locked);
            }
            if !state.has_right(UserRights::TEXTMESSAGE_BROADCAST) {
                return Err(SendError::MissingRight("TEXTMESSAGE_BROADCAST"));
            }
            Ok(())
        }
    }
}

/// Send `text` to `dest`. Returns the number of fragments submitted.
pub fn send_text(
    state: &mut SessionState,
    transport: &mut dyn Transport,
    dest: Destination,
    text: &str,
) -> Result<usize, SendError> {
    if text.is_empty() {
        return Err(SendError::Empty);
    }
    if let Err(e) = check_policy(state, dest) {
        debug!("send to {:?} refused: {}", dest, e);
        metrics::inc_send_refusals();
        return Err(e);
    }

    let (to_user_id, channel_id) = match dest {
        Destination::User(id) => (id, 0),
        Destination::Channel(id) => (0, id),
        Destination::Broadcast => (0, 0),
    };
    let chunks = chunk_text(text, MAX_FRAGMENT_CHARS);
    let total = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        let msg = TextMessage {
            kind: dest.kind(),
            from_user_id: state.identity.user_id,
            to_user_id,
            channel_id,
            text: chunk.to_string(),
            more: i + 1 < total,
        };
        if transport.send_text(&msg) == 0 {
            warn!("send to {:?} aborted at fragment {}/{}", dest, i + 1, total);
            metrics::inc_send_refusals();
            return Err(SendError::Rejected { index: i + 1, total });
        }
    }
    metrics::add_fragments_sent(total as u64);

    if state.toggles.context_history {
        let key = match dest {
            Destination::User(id) => Some(ConversationKey::Private(id)),
            Destination::Channel(id) => Some(ConversationKey::Channel(id)),
            Destination::Broadcast => None,
        };
        if let Some(key) = key {
            state.history.add(key, text, true);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_char_boundaries() {
        let text = "aé😀bc";
        assert_eq!(chunk_text(text, 2), vec!["aé", "😀b", "c"]);
        assert_eq!(chunk_text("", 5), Vec::<&str>::new());
        assert_eq!(chunk_text("abc", 3), vec!["abc"]);
    }

    #[test]
    fn one_over_limit_gives_two_chunks() {
        let text = "x".repeat(MAX_FRAGMENT_CHARS + 1);
        let chunks = chunk_text(&text, MAX_FRAGMENT_CHARS);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), MAX_FRAGMENT_CHARS);
        assert_eq!(chunks[1], "x");
    }

    #[test]
    fn empty_and_disabled_sends_never_reach_the_transport() {
        use crate::config::Config;
        use crate::transport::sim::SimServer;
        use crate::transport::TransportFactory;

        let sim = SimServer::new();
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let mut transport = sim.create(tx);
        let mut state = SessionState::new(&Config::default());
        assert_eq!(
            send_text(&mut state, transport.as_mut(), Destination::User(7), ""),
            Err(SendError::Empty)
        );
        state.toggles.broadcast = false;
        assert_eq!(
            send_text(&mut state, transport.as_mut(), Destination::Broadcast, "hi"),
            Err(SendError::FeatureDisabled("broadcasts"))
        );
        assert!(sim.sent().is_empty());
    }
}
