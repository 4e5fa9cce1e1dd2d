//! Command dispatcher.
//!
//! Decides whether a reassembled message is a command, applies the word
//! filter to channel traffic, enforces lock / block / admin policy and runs
//! the handler. Denials are answered by PM for private messages and dropped
//! silently for channel messages.

use log::{debug, error, info, warn};

use super::commands::{CommandContext, Invocation};
use super::filter::WARNING_THRESHOLD;
use super::outbound::Destination;
use super::session::SessionHandle;
use super::state::SessionState;
use super::Shared;
use crate::logutil::escape_log;
use crate::metrics;
use crate::sec_log;
use crate::transport::{ChannelId, MessageKind, Transport, UserId, UserRights};

/// Leading characters that mark a channel message as a command.
pub const COMMAND_MARKERS: [char; 2] = ['!', '/'];

/// A complete inbound message as seen by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'m> {
    pub kind: MessageKind,
    pub sender_id: UserId,
    pub sender_nick: &'m str,
    pub channel_id: ChannelId,
    pub text: &'m str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Locked,
    Blocked,
    NotAuthorized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command: broadcast, plain chat, or a channel the bot is not in.
    Ignored,
    /// Swallowed by the word filter; carries the sender's warning count
    /// before any reset.
    Filtered { warnings: u32 },
    Denied(Denial),
    /// No handler for the verb.
    Unknown(String),
    Handled(&'static str),
    Failed(&'static str),
}

/// Split into lowercase verb and raw argument string.
pub fn parse_command(text: &str) -> (String, &str) {
    let trimmed = text.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((verb, args)) => (verb.to_lowercase(), args.trim_start()),
        None => (trimmed.to_lowercase(), ""),
    }
}

/// Channel text minus its command marker, if it has one.
pub fn strip_marker(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    trimmed
        .strip_prefix(COMMAND_MARKERS[0])
        .or_else(|| trimmed.strip_prefix(COMMAND_MARKERS[1]))
}

fn denial_text(denial: Denial, verb: &str) -> String {
    match denial {
        Denial::Locked => "Command ignored; bot is locked.".to_string(),
        Denial::Blocked => format!("Command '{}' is blocked.", verb),
        Denial::NotAuthorized => format!("Error: You are not authorized to use '{}'.", verb),
    }
}

pub fn dispatch(
    state: &mut SessionState,
    transport: &mut dyn Transport,
    shared: &Shared,
    handle: &SessionHandle,
    msg: &Inbound<'_>,
) -> DispatchOutcome {
    let mut ctx = CommandContext {
        state,
        transport,
        shared,
        handle,
    };

    let command_text = match msg.kind {
        MessageKind::Broadcast => {
            debug!(
                "broadcast from {}: {}",
                escape_log(msg.sender_nick),
                escape_log(msg.text)
            );
            return DispatchOutcome::Ignored;
        }
        MessageKind::Channel => {
            if !ctx.state.in_channel(msg.channel_id) {
                return DispatchOutcome::Ignored;
            }
            if let Some(word) = ctx.state.filter_match(msg.text) {
                return apply_filter(&mut ctx, msg, &word);
            }
            match strip_marker(msg.text) {
                Some(rest) => rest,
                None => return DispatchOutcome::Ignored,
            }
        }
        MessageKind::User => msg.text,
    };

    let (verb, args) = parse_command(command_text);
    if verb.is_empty() {
        return DispatchOutcome::Ignored;
    }

    let spec = ctx.shared.registry.resolve(msg.kind, &verb);
    let canonical = spec.map(|s| s.verb).unwrap_or(verb.as_str());
    let exempt = !ctx.shared.registry.is_blockable(canonical);

    let denial = if ctx.state.is_locked() && !exempt {
        Some(Denial::Locked)
    } else if ctx.state.is_blocked(canonical) && !exempt {
        Some(Denial::Blocked)
    } else {
        None
    };
    if let Some(denial) = denial {
        return deny(&mut ctx, msg, denial, canonical);
    }

    let Some(spec) = spec else {
        debug!("no handler for '{}' from {}", escape_log(&verb), msg.sender_id);
        return DispatchOutcome::Unknown(verb);
    };

    if spec.admin && !ctx.state.is_admin(msg.sender_id) {
        sec_log!(
            "unauthorized admin command '{}' by {} ({})",
            spec.verb,
            escape_log(msg.sender_nick),
            msg.sender_id
        );
        return deny(&mut ctx, msg, Denial::NotAuthorized, spec.verb);
    }

    metrics::record_command(spec.verb);
    let invocation = Invocation {
        verb: spec.verb,
        args: args.to_string(),
        sender_id: msg.sender_id,
        sender_nick: msg.sender_nick.to_string(),
        kind: msg.kind,
        channel_id: msg.channel_id,
    };
    match (spec.handler)(&mut ctx, &invocation) {
        Ok(()) => DispatchOutcome::Handled(spec.verb),
        Err(e) => {
            error!("error executing command '{}': {:#}", spec.verb, e);
            metrics::inc_handler_failures();
            ctx.pm(
                msg.sender_id,
                &format!("An unexpected error occurred executing '{}'.", spec.verb),
            );
            DispatchOutcome::Failed(spec.verb)
        }
    }
}

fn deny(
    ctx: &mut CommandContext<'_>,
    msg: &Inbound<'_>,
    denial: Denial,
    verb: &str,
) -> DispatchOutcome {
    metrics::inc_policy_denials();
    debug!("denied '{}' for {}: {:?}", verb, msg.sender_id, denial);
    if msg.kind == MessageKind::User {
        ctx.pm(msg.sender_id, &denial_text(denial, verb));
    }
    DispatchOutcome::Denied(denial)
}

fn apply_filter(ctx: &mut CommandContext<'_>, msg: &Inbound<'_>, word: &str) -> DispatchOutcome {
    let count = ctx.state.add_warning(msg.sender_id);
    info!(
        "filtered word '{}' from {} ({}), warning {}/{}",
        escape_log(word),
        escape_log(msg.sender_nick),
        msg.sender_id,
        count,
        WARNING_THRESHOLD
    );
    let channel = Destination::Channel(msg.channel_id);
    ctx.send_quiet(
        channel,
        &format!(
            "Warning {}/{} for {}: Please avoid inappropriate language.",
            count, WARNING_THRESHOLD, msg.sender_nick
        ),
    );
    if count >= WARNING_THRESHOLD {
        if !ctx.state.has_right(UserRights::KICK_USERS) {
            ctx.send_quiet(
                channel,
                &format!(
                    "{} has {} warnings, but bot cannot kick.",
                    msg.sender_nick, WARNING_THRESHOLD
                ),
            );
        } else if ctx.transport.kick_user(msg.sender_id, msg.channel_id) == 0 {
            warn!(
                "kick of {} ({}) after filter warnings was rejected",
                escape_log(msg.sender_nick),
                msg.sender_id
            );
            ctx.send_quiet(
                channel,
                &format!(
                    "{} has {} warnings, but the kick request failed.",
                    msg.sender_nick, WARNING_THRESHOLD
                ),
            );
        } else {
            sec_log!(
                "kicked {} ({}) from channel {} after {} filter warnings",
                escape_log(msg.sender_nick),
                msg.sender_id,
                msg.channel_id,
                WARNING_THRESHOLD
            );
            ctx.send_quiet(
                channel,
                &format!(
                    "User {} kicked after {} warnings.",
                    msg.sender_nick, WARNING_THRESHOLD
                ),
            );
        }
        ctx.state.reset_warnings(msg.sender_id);
    }
    DispatchOutcome::Filtered { warnings: count }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_is_lowercased_and_args_kept_raw() {
        assert_eq!(parse_command("PING"), ("ping".to_string(), ""));
        assert_eq!(
            parse_command("  W   New York  "),
            ("w".to_string(), "New York")
        );
        assert_eq!(parse_command("   "), (String::new(), ""));
    }

    #[test]
    fn markers_are_required_and_stripped() {
        assert_eq!(strip_marker("!poll x"), Some("poll x"));
        assert_eq!(strip_marker("/w Oslo"), Some("w Oslo"));
        assert_eq!(strip_marker("!!time"), Some("!time"));
        assert_eq!(strip_marker("hello"), None);
    }
}
