//! Admin moderation: directory listings, user management, channel moves and
//! relayed channel/broadcast text.

use log::info;

use super::{CommandContext, Invocation};
use crate::bot::outbound::Destination;
use crate::logutil::escape_log;
use crate::sec_log;
use crate::transport::{UserInfo, UserRights};
use crate::validation::validate_channel_path;

fn require_right(ctx: &mut CommandContext<'_>, inv: &Invocation, right: UserRights, name: &str) -> bool {
    if ctx.state.has_right(right) {
        return true;
    }
    ctx.pm(
        inv.sender_id,
        &format!("Error: The bot lacks the {} permission.", name),
    );
    false
}

fn find_user(ctx: &mut CommandContext<'_>, inv: &Invocation, nick: &str) -> Option<UserInfo> {
    let found = ctx.state.directory.find_by_nick(nick).cloned().or_else(|| {
        ctx.transport
            .server_users()
            .into_iter()
            .filter(|u| u.nickname.eq_ignore_ascii_case(nick))
            .min_by_key(|u| u.user_id)
    });
    if found.is_none() {
        ctx.pm(inv.sender_id, &format!("Error: User '{}' not found.", nick));
    }
    found
}

pub fn list_users(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let channel = if inv.args().is_empty() {
        ctx.state.primary_channel()
    } else {
        validate_channel_path(inv.args())
            .ok()
            .and_then(|p| ctx.transport.channel_id_from_path(&p))
    };
    let Some(channel_id) = channel else {
        ctx.pm(inv.sender_id, "Error: Channel not found.");
        return Ok(());
    };
    let path = ctx
        .transport
        .channel_path(channel_id)
        .unwrap_or_else(|| channel_id.to_string());
    let mut users = ctx.transport.channel_users(channel_id);
    users.sort_by_key(|u| u.user_id);
    let mut lines = vec![format!("Users in {} ({}):", path, users.len())];
    lines.extend(
        users
            .iter()
            .map(|u| format!("- {} ({}, ID {})", u.nickname, u.username, u.user_id)),
    );
    ctx.pm(inv.sender_id, &lines.join("\n"));
    Ok(())
}

pub fn list_channels(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let mut paths: Vec<String> = ctx
        .transport
        .server_channels()
        .iter()
        .filter_map(|c| ctx.transport.channel_path(c.channel_id))
        .collect();
    paths.sort();
    let mut lines = vec![format!("Channels ({}):", paths.len())];
    lines.extend(paths.into_iter().map(|p| format!("- {}", p)));
    ctx.pm(inv.sender_id, &lines.join("\n"));
    Ok(())
}

pub fn move_user(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let Some((nick, path)) = inv.args().split_once(char::is_whitespace) else {
        ctx.pm(inv.sender_id, "Usage: move <nickname> <channel_path>");
        return Ok(());
    };
    if !require_right(ctx, inv, UserRights::MOVE_USERS, "MOVE_USERS") {
        return Ok(());
    }
    let Some(user) = find_user(ctx, inv, nick) else {
        return Ok(());
    };
    let target = validate_channel_path(path.trim())
        .ok()
        .and_then(|p| ctx.transport.channel_id_from_path(&p));
    let Some(channel_id) = target else {
        ctx.pm(inv.sender_id, &format!("Error: Channel '{}' not found.", path.trim()));
        return Ok(());
    };
    if ctx.transport.move_user(user.user_id, channel_id) == 0 {
        anyhow::bail!("move request rejected by transport");
    }
    sec_log!(
        "{} moved {} ({}) to channel {}",
        escape_log(&inv.sender_nick),
        escape_log(&user.nickname),
        user.user_id,
        channel_id
    );
    ctx.pm(
        inv.sender_id,
        &format!("Move of {} to {} requested.", user.nickname, path.trim()),
    );
    Ok(())
}

pub fn kick(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let nick = inv.args().to_string();
    if nick.is_empty() {
        ctx.pm(inv.sender_id, "Usage: kick <nickname>");
        return Ok(());
    }
    if !require_right(ctx, inv, UserRights::KICK_USERS, "KICK_USERS") {
        return Ok(());
    }
    let Some(channel_id) = ctx.state.primary_channel() else {
        ctx.pm(inv.sender_id, "Error: The bot is not in a channel.");
        return Ok(());
    };
    let Some(user) = find_user(ctx, inv, &nick) else {
        return Ok(());
    };
    if ctx.transport.kick_user(user.user_id, channel_id) == 0 {
        anyhow::bail!("kick request rejected by transport");
    }
    sec_log!(
        "{} kicked {} ({}) from channel {}",
        escape_log(&inv.sender_nick),
        escape_log(&user.nickname),
        user.user_id,
        channel_id
    );
    ctx.pm(inv.sender_id, &format!("Kick of {} requested.", user.nickname));
    Ok(())
}

pub fn ban(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let nick = inv.args().to_string();
    if nick.is_empty() {
        ctx.pm(inv.sender_id, "Usage: ban <nickname>");
        return Ok(());
    }
    if !require_right(ctx, inv, UserRights::BAN_USERS, "BAN_USERS") {
        return Ok(());
    }
    let Some(user) = find_user(ctx, inv, &nick) else {
        return Ok(());
    };
    if ctx.transport.ban_user(user.user_id) == 0 {
        anyhow::bail!("ban request rejected by transport");
    }
    sec_log!(
        "{} banned {} ({}, account '{}')",
        escape_log(&inv.sender_nick),
        escape_log(&user.nickname),
        user.user_id,
        escape_log(&user.username)
    );
    ctx.pm(inv.sender_id, &format!("Ban of {} requested.", user.nickname));
    Ok(())
}

pub fn unban(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let username = inv.args().to_string();
    if username.is_empty() {
        ctx.pm(inv.sender_id, "Usage: unban <username>");
        return Ok(());
    }
    if !require_right(ctx, inv, UserRights::BAN_USERS, "BAN_USERS") {
        return Ok(());
    }
    if ctx.transport.unban_user(&username) == 0 {
        anyhow::bail!("unban request rejected by transport");
    }
    sec_log!("{} unbanned account '{}'", escape_log(&inv.sender_nick), escape_log(&username));
    ctx.pm(inv.sender_id, &format!("Unban of '{}' requested.", username));
    Ok(())
}

pub fn join_channel(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let (raw_path, password) = match inv.args().split_once('|') {
        Some((p, pw)) => (p.trim(), pw.trim()),
        None => (inv.args(), ""),
    };
    let path = match validate_channel_path(raw_path) {
        Ok(p) => p,
        Err(_) => {
            ctx.pm(inv.sender_id, "Usage: jc <channel_path>[|password]");
            return Ok(());
        }
    };
    let Some(channel_id) = ctx.transport.channel_id_from_path(&path) else {
        ctx.pm(inv.sender_id, &format!("Error: Channel '{}' not found.", path));
        return Ok(());
    };
    let cmd_id = ctx.transport.join_channel(channel_id, password);
    if cmd_id == 0 {
        anyhow::bail!("join request rejected by transport");
    }
    ctx.state.target_channel_path = path.clone();
    ctx.state.target_channel_id = Some(channel_id);
    ctx.state.channel_password = password.to_string();
    ctx.state.join_cmd_id = cmd_id;
    ctx.state.join_requested_by = Some(inv.sender_id);
    info!("join of '{}' requested by {}", escape_log(&path), inv.sender_id);
    ctx.pm(inv.sender_id, &format!("Attempting to join '{}'...", path));
    Ok(())
}

pub fn channel_text(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let text = inv.args().to_string();
    if text.is_empty() {
        ctx.pm(inv.sender_id, "Usage: ct <message>");
        return Ok(());
    }
    let Some(channel_id) = ctx.state.primary_channel() else {
        ctx.pm(inv.sender_id, "Error: The bot is not in a channel.");
        return Ok(());
    };
    match ctx.send(Destination::Channel(channel_id), &text) {
        Ok(_) => {
            ctx.pm(inv.sender_id, "Message sent to channel.");
        }
        Err(e) => {
            ctx.pm(inv.sender_id, &format!("Error: Could not send to channel ({}).", e));
        }
    }
    Ok(())
}

pub fn broadcast(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let text = inv.args().to_string();
    if text.is_empty() {
        ctx.pm(inv.sender_id, "Usage: bm <message>");
        return Ok(());
    }
    match ctx.send(Destination::Broadcast, &text) {
        Ok(_) => {
            info!("broadcast sent for {}", inv.sender_id);
            ctx.pm(inv.sender_id, "Broadcast sent.");
        }
        Err(e) => {
            ctx.pm(inv.sender_id, &format!("Error: Could not send broadcast ({}).", e));
        }
    }
    Ok(())
}
