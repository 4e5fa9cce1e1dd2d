//! `afk` and `seen`, backed by the persistent presence store.

use chrono::Utc;
use log::info;

use super::{CommandContext, Invocation};
use crate::logutil::{escape_log, format_elapsed};

pub fn afk(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let reason = inv.args();
    if reason.is_empty() {
        ctx.pm(inv.sender_id, "Usage: afk <reason>");
        return Ok(());
    }
    ctx.shared
        .presence
        .set_afk(inv.sender_id, &inv.sender_nick, reason)?;
    info!("{} is now AFK: {}", escape_log(&inv.sender_nick), escape_log(reason));
    ctx.pm(
        inv.sender_id,
        &format!("You are now marked as AFK. Reason: {}", reason),
    );
    Ok(())
}

pub fn seen(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let nick = inv.args();
    if nick.is_empty() {
        ctx.pm(inv.sender_id, "Usage: seen <nickname>");
        return Ok(());
    }
    let text = match ctx.shared.presence.last_seen_by_nick(nick)? {
        None => format!("I have no record of anyone named '{}'.", nick),
        Some(record) => {
            let ago = format_elapsed((Utc::now() - record.timestamp).num_seconds().max(0));
            let mut text = format!(
                "I last saw {} about {} ago ({}), when they {}.",
                record.nick,
                ago,
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.action
            );
            if let Some(afk) = ctx.shared.presence.afk(record.user_id)? {
                text.push_str(&format!(" They are currently AFK: {}", afk.reason));
            }
            text
        }
    };
    ctx.pm(inv.sender_id, &text);
    Ok(())
}
