//! Everyday commands: help, liveness and identity.

use super::{CommandContext, Invocation};
use crate::bot::features::{on_off, Feature};
use crate::bot::outbound::Destination;
use crate::logutil::format_elapsed;
use crate::validation::{validate_nickname, validate_status, ValidationError};
use log::{info, warn};

pub fn help(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let is_admin = ctx.state.is_admin(inv.sender_id);
    let text = ctx.shared.registry.help_text(is_admin);
    ctx.pm(inv.sender_id, &text);
    Ok(())
}

pub fn ping(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    ctx.pm(inv.sender_id, "Pong!");
    Ok(())
}

pub fn info(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let uptime = format_elapsed(ctx.shared.started_at.elapsed().as_secs() as i64);
    let connected = ctx
        .state
        .uptime_secs()
        .map(|s| format_elapsed(s as i64))
        .unwrap_or_else(|| "N/A".to_string());
    let channel = ctx
        .state
        .primary_channel()
        .and_then(|id| ctx.transport.channel_path(id))
        .unwrap_or_else(|| "(none)".to_string());
    let server = ctx
        .transport
        .server_name()
        .unwrap_or_else(|| ctx.config().connection.host.clone());

    let mut lines = vec![
        format!("{} ({})", ctx.config().bot.client_name, ctx.state.identity.nickname),
        format!("Server: {}", server),
        format!("Channel: {}", channel),
        format!("Uptime: {} (connected {})", uptime, connected),
        format!("Locked: {}", if ctx.state.is_locked() { "Yes" } else { "No" }),
        format!("Welcome mode: {}", ctx.state.welcome_mode.label()),
    ];
    for feature in Feature::all().filter(|f| *f != Feature::Lock) {
        lines.push(format!("{}: {}", feature.label(), on_off(ctx.state.toggles.get(feature))));
    }
    ctx.pm(inv.sender_id, &lines.join("\n"));
    Ok(())
}

pub fn whoami(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let username = ctx
        .state
        .directory
        .get(inv.sender_id)
        .map(|u| u.username.clone())
        .or_else(|| ctx.transport.user(inv.sender_id).map(|u| u.username))
        .unwrap_or_else(|| "?".to_string());
    let admin = if ctx.state.is_admin(inv.sender_id) { "Yes" } else { "No" };
    let text = format!(
        "Nick: {}\nID: {}\nUser: {}\nAdmin: {}",
        inv.sender_nick, inv.sender_id, username, admin
    );
    ctx.pm(inv.sender_id, &text);
    Ok(())
}

pub fn rights(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let rights = ctx.state.rights();
    let mut lines = vec![format!("My Permissions ({:#010x}):", rights.0)];
    let names = rights.names();
    if names.is_empty() {
        lines.push("- (none)".to_string());
    }
    lines.extend(names.into_iter().map(|n| format!("- {}", n)));
    ctx.pm(inv.sender_id, &lines.join("\n"));
    Ok(())
}

pub fn change_nick(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    if inv.args().is_empty() {
        ctx.pm(inv.sender_id, "Usage: cn <new_nickname>");
        return Ok(());
    }
    let nickname = match validate_nickname(inv.args()) {
        Ok(n) => n,
        Err(ValidationError::TooLong { .. }) => {
            ctx.pm(inv.sender_id, "Error: Nickname too long.");
            return Ok(());
        }
        Err(e) => {
            ctx.pm(inv.sender_id, &format!("Error: {}.", e));
            return Ok(());
        }
    };
    if ctx.transport.change_nickname(&nickname) == 0 {
        warn!("nickname change to '{}' rejected", nickname);
        anyhow::bail!("nickname change rejected by transport");
    }
    info!("nickname change to '{}' requested by {}", nickname, inv.sender_id);
    ctx.state.identity.nickname = nickname.clone();
    ctx.pm(inv.sender_id, &format!("Nickname change to '{}' requested.", nickname));
    Ok(())
}

pub fn change_status(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let status = match validate_status(inv.args()) {
        Ok(s) => s,
        Err(ValidationError::TooLong { .. }) => {
            ctx.pm(inv.sender_id, "Error: Status too long.");
            return Ok(());
        }
        Err(e) => {
            ctx.pm(inv.sender_id, &format!("Error: {}.", e));
            return Ok(());
        }
    };
    if ctx.transport.change_status(&status) == 0 {
        anyhow::bail!("status change rejected by transport");
    }
    ctx.state.identity.status_text = status;
    ctx.send_quiet(Destination::User(inv.sender_id), "Status change requested.");
    Ok(())
}
