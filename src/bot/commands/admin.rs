//! Admin-only bot control, configuration and feature toggles.
//!
//! Configuration changes are applied to the live session and persisted
//! through the shared [`ConfigStore`](crate::config::ConfigStore) in the same
//! handler call.

use log::{info, warn};

use super::{CommandContext, Invocation};
use crate::bot::features::{on_off, Feature, ToggleError};
use crate::bot::outbound::Destination;
use crate::bot::state::BlockChange;
use crate::logutil::{escape_log, format_elapsed};
use crate::metrics;
use crate::sec_log;
use crate::validation::{sanitize_filter_word, validate_channel_path};

pub fn lock(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let on = ctx.state.toggle_feature(Feature::Lock)?;
    sec_log!("bot lock {} by {} ({})", on_off(on), escape_log(&inv.sender_nick), inv.sender_id);
    ctx.pm(inv.sender_id, &format!("Bot lock is now {}.", on_off(on)));
    Ok(())
}

/// Shared by `block` and `unblock`; the verb decides the direction.
pub fn block(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let wanted = inv.args().to_lowercase();
    if wanted.is_empty() {
        let blocked: Vec<&str> = ctx.state.blocked_verbs().collect();
        let list = if blocked.is_empty() {
            "none".to_string()
        } else {
            blocked.join(", ")
        };
        ctx.pm(
            inv.sender_id,
            &format!("Usage: {} <command>\nCurrently blocked: {}", inv.verb, list),
        );
        return Ok(());
    }
    let shared = ctx.shared;
    let registry = &shared.registry;
    let verb = if registry.get(&wanted).is_some() {
        wanted
    } else if registry.get(&format!("!{}", wanted)).is_some() {
        format!("!{}", wanted)
    } else {
        wanted
    };
    if !registry.is_blockable(&verb) {
        ctx.pm(
            inv.sender_id,
            &format!("Error: Command '{}' cannot be blocked.", verb),
        );
        return Ok(());
    }

    let want_blocked = inv.verb == "block";
    if ctx.state.is_blocked(&verb) == want_blocked {
        let state = if want_blocked { "already blocked" } else { "not blocked" };
        ctx.pm(inv.sender_id, &format!("Command '{}' is {}.", verb, state));
        return Ok(());
    }
    let word = match ctx.state.toggle_block(&verb) {
        BlockChange::Blocked => "BLOCKED",
        BlockChange::Unblocked => "UNBLOCKED",
    };
    info!("command '{}' {} by {}", verb, word, inv.sender_id);
    ctx.pm(inv.sender_id, &format!("Command '{}' has been {}.", verb, word));
    Ok(())
}

pub fn restart(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    sec_log!("restart requested by {} ({})", escape_log(&inv.sender_nick), inv.sender_id);
    ctx.pm(inv.sender_id, "Acknowledged. Restarting bot...");
    if !ctx.handle.request_stop(true) {
        anyhow::bail!("session worker is gone");
    }
    Ok(())
}

pub fn quit(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    sec_log!("shutdown requested by {} ({})", escape_log(&inv.sender_nick), inv.sender_id);
    ctx.pm(inv.sender_id, "Acknowledged. Quitting...");
    ctx.shared.control.request_shutdown();
    Ok(())
}

pub fn health(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let m = metrics::snapshot();
    let channels: Vec<String> = ctx.state.occupied_channels().map(|c| c.to_string()).collect();
    let pending = ctx.shared.reminders.len();
    let mut lines = vec![
        "--- Health ---".to_string(),
        format!("Status: {}", ctx.state.status()),
        format!(
            "Process uptime: {}",
            format_elapsed(ctx.shared.started_at.elapsed().as_secs() as i64)
        ),
        format!(
            "Channels: {}",
            if channels.is_empty() { "none".to_string() } else { channels.join(", ") }
        ),
        format!(
            "Users known: {}, admins online: {}",
            ctx.state.directory.len(),
            ctx.state.admin_count()
        ),
        format!("Conversations in history: {}", ctx.state.history.conversation_count()),
        format!("Pending reminders: {}", pending),
        format!(
            "Sessions: {} started, {} reconnect attempts",
            m.sessions_started, m.reconnect_attempts
        ),
        format!(
            "Messages: {} reassembled, {} commands, {} denials, {} handler failures",
            m.messages_reassembled, m.commands_dispatched, m.policy_denials, m.handler_failures
        ),
        format!("Sends: {} fragments, {} refusals", m.fragments_sent, m.send_refusals),
    ];
    let top = metrics::top_verbs(5);
    if !top.is_empty() {
        let verbs: Vec<String> = top.iter().map(|(v, n)| format!("{} ({})", v, n)).collect();
        lines.push(format!("Top commands: {}", verbs.join(", ")));
    }
    ctx.pm(inv.sender_id, &lines.join("\n"));
    Ok(())
}

pub fn set_api_key(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let key = inv.args().to_string();
    if key.is_empty() {
        ctx.pm(inv.sender_id, "Usage: gapi <api_key>");
        return Ok(());
    }
    ctx.shared.config.update(|c| c.ai.api_key = key)?;
    sec_log!("AI API key changed by {} ({})", escape_log(&inv.sender_nick), inv.sender_id);
    ctx.pm(inv.sender_id, "AI API key updated and saved.");
    Ok(())
}

pub fn set_instruction(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let text = inv.args().to_string();
    if text.is_empty() {
        let current = ctx.config().ai.system_instruction.clone();
        ctx.pm(
            inv.sender_id,
            &format!("Usage: instruct <text>\nCurrent instruction: {}", current),
        );
        return Ok(());
    }
    ctx.shared.config.update(|c| c.ai.system_instruction = text)?;
    ctx.pm(inv.sender_id, "AI system instruction updated.");
    Ok(())
}

pub fn set_model(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let model = inv.args().to_string();
    if model.is_empty() {
        let current = ctx.config().ai.model.clone();
        ctx.pm(
            inv.sender_id,
            &format!("Usage: setmodel <model_name>\nCurrent model: {}", current),
        );
        return Ok(());
    }
    ctx.shared.config.update(|c| c.ai.model = model.clone())?;
    ctx.pm(inv.sender_id, &format!("AI model set to '{}'.", model));
    Ok(())
}

pub fn list_models(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let settings = ctx.config().ai.clone();
    let services = ctx.shared.services.clone();
    ctx.spawn_reply(Destination::User(inv.sender_id), async move {
        match services.list_models(&settings).await {
            Ok(models) if models.is_empty() => "No models available.".to_string(),
            Ok(models) => {
                let mut lines = vec!["Available models:".to_string()];
                lines.extend(models.into_iter().map(|m| {
                    let marker = if m == settings.model { " (current)" } else { "" };
                    format!("- {}{}", m, marker)
                }));
                lines.join("\n")
            }
            Err(e) => {
                warn!("model listing failed: {}", e);
                format!("Error listing models: {}", e)
            }
        }
    })
}

pub fn set_channel_path(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    if inv.args().is_empty() {
        ctx.pm(inv.sender_id, "Usage: scp <channel_path>");
        return Ok(());
    }
    let path = match validate_channel_path(inv.args()) {
        Ok(p) => p,
        Err(e) => {
            ctx.pm(inv.sender_id, &format!("Error: {}.", e));
            return Ok(());
        }
    };
    ctx.shared
        .config
        .update(|c| c.bot.initial_channel_path = path.clone())?;
    ctx.state.target_channel_path = path.clone();
    info!("initial channel path set to '{}' by {}", escape_log(&path), inv.sender_id);
    ctx.pm(
        inv.sender_id,
        &format!("Initial channel path set to '{}'. It will be used on the next connect.", path),
    );
    Ok(())
}

fn persist_filter(ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    let words = ctx.state.filter_word_list();
    let enabled = ctx.state.toggles.word_filter;
    ctx.shared.config.update(|c| {
        c.bot.filtered_words = words;
        c.bot.features.word_filter = enabled;
    })
}

pub fn filter(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    const USAGE: &str = "Usage: !filter <add|remove|list> [word]";
    let (action, word) = match inv.args().split_once(char::is_whitespace) {
        Some((a, w)) => (a.to_lowercase(), w.trim()),
        None => (inv.args().to_lowercase(), ""),
    };
    match action.as_str() {
        "list" => {
            let words = ctx.state.filter_word_list();
            let status = if ctx.state.toggles.word_filter { "ENABLED" } else { "DISABLED" };
            let list = if words.is_empty() { "Empty".to_string() } else { words.join(", ") };
            ctx.pm(inv.sender_id, &format!("Filtered Words ({}): {}", status, list));
        }
        "add" | "remove" => {
            let word = match sanitize_filter_word(word) {
                Ok(w) => w,
                Err(_) => {
                    ctx.pm(inv.sender_id, USAGE);
                    return Ok(());
                }
            };
            let text = if action == "add" {
                if ctx.state.add_filter_word(&word) {
                    format!("Word '{}' added to filter. Filter enabled.", word)
                } else {
                    format!("Word '{}' is already in the filter.", word)
                }
            } else if ctx.state.remove_filter_word(&word) {
                format!("Word '{}' removed from filter.", word)
            } else {
                format!("Word '{}' is not in the filter.", word)
            };
            persist_filter(ctx)?;
            ctx.pm(inv.sender_id, &text);
        }
        _ => {
            ctx.pm(inv.sender_id, USAGE);
        }
    }
    Ok(())
}

pub fn set_context_retention(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let minutes = match inv.args().parse::<u64>() {
        Ok(m) if m > 0 => m,
        _ => {
            ctx.pm(
                inv.sender_id,
                "Usage: set_context_retention <minutes> (e.g., set_context_retention 60)",
            );
            return Ok(());
        }
    };
    ctx.state.history.set_retention_minutes(minutes);
    ctx.shared
        .config
        .update(|c| c.bot.context_history_retention_minutes = minutes)?;
    ctx.pm(
        inv.sender_id,
        &format!("Context history retention set to {} minutes.", minutes),
    );
    Ok(())
}

fn toggle(ctx: &mut CommandContext<'_>, inv: &Invocation, feature: Feature) -> anyhow::Result<()> {
    let text = match ctx.state.toggle_feature(feature) {
        Ok(on) => format!("{} is now {}.", feature.label(), on_off(on)),
        Err(ToggleError::EmptyFilter) => {
            "Cannot enable the word filter: the filter list is empty. Use '!filter add <word>'."
                .to_string()
        }
        Err(e) => return Err(e.into()),
    };
    ctx.pm(inv.sender_id, &text);
    Ok(())
}

pub fn toggle_jcl(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::JoinLeaveAnnouncements)
}

pub fn toggle_chanmsg(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::ChannelMessages)
}

pub fn toggle_broadcast(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::Broadcast)
}

pub fn toggle_ai_pm(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::AiPrivate)
}

pub fn toggle_ai_chan(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::AiChannel)
}

pub fn toggle_filter(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::WordFilter)
}

pub fn toggle_context_history(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::ContextHistory)
}

pub fn toggle_debug_logging(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    toggle(ctx, inv, Feature::DebugLogging)
}

pub fn toggle_welcome_mode(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let mode = ctx.state.toggle_welcome_mode();
    ctx.pm(inv.sender_id, &format!("Welcome message mode set to {}.", mode.label()));
    Ok(())
}
