//! Commands that call external services, plus `remindme`.
//!
//! Service calls are spawned; the reply is posted back through the session
//! queue once the call finishes, so a slow API never stalls the worker.

use log::{debug, info, warn};

use super::{CommandContext, Invocation};
use crate::bot::history::ConversationKey;
use crate::bot::outbound::Destination;
use crate::services::{CompletionRequest, HistoryTurn, ServiceError};
use crate::storage::reminders::{parse_reminder, REMINDER_USAGE};
use crate::transport::MessageKind;

fn service_reply(result: Result<String, ServiceError>) -> String {
    match result {
        Ok(text) => text,
        Err(ServiceError::Unavailable(what)) => format!("Sorry, {} is not configured.", what),
        Err(ServiceError::BadInput(msg)) => msg,
        Err(e) => {
            warn!("service call failed: {}", e);
            format!("Error: {}", e)
        }
    }
}

pub fn weather(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let location = inv.args().to_string();
    if location.is_empty() {
        let usage = match inv.kind {
            MessageKind::Channel => "Usage: /w <location>",
            _ => "Usage: w <location>",
        };
        ctx.reply(inv, usage);
        return Ok(());
    }
    let services = ctx.shared.services.clone();
    ctx.spawn_reply(inv.reply_destination(), async move {
        service_reply(services.weather(&location).await)
    })
}

pub fn ask_ai(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let in_channel = inv.kind == MessageKind::Channel;
    let enabled = if in_channel {
        ctx.state.toggles.ai_channel
    } else {
        ctx.state.toggles.ai_private
    };
    if !enabled {
        let text = if in_channel {
            "AI in the channel is currently disabled."
        } else {
            "AI in private messages is currently disabled."
        };
        ctx.reply(inv, text);
        return Ok(());
    }
    let prompt = inv.args().to_string();
    if prompt.is_empty() {
        let usage = if in_channel {
            "Usage: /c <your question>"
        } else {
            "Usage: c <your question>"
        };
        ctx.reply(inv, usage);
        return Ok(());
    }
    let settings = ctx.config().ai.clone();
    if !settings.is_configured() {
        ctx.reply(inv, "Sorry, the AI service is not configured.");
        return Ok(());
    }

    let key = if in_channel {
        ConversationKey::Channel(inv.channel_id)
    } else {
        ConversationKey::Private(inv.sender_id)
    };
    let history = if ctx.state.toggles.context_history {
        ctx.state
            .history
            .get(&key)
            .into_iter()
            .map(|e| HistoryTurn {
                text: e.text,
                from_bot: e.from_bot,
            })
            .collect()
    } else {
        Vec::new()
    };
    debug!(
        "AI request from {} with {} history turn(s)",
        inv.sender_id,
        history.len()
    );

    let notice = if in_channel {
        format!("[Bot] Asking AI for {}...", inv.sender_nick)
    } else {
        "[Bot] Asking AI...".to_string()
    };
    ctx.reply(inv, &notice);

    let services = ctx.shared.services.clone();
    let request = CompletionRequest {
        settings,
        history,
        prompt,
    };
    let nick = inv.sender_nick.clone();
    ctx.spawn_reply(inv.reply_destination(), async move {
        let answer = service_reply(services.complete(request).await);
        if in_channel {
            format!("Answering {}: {}", nick, answer)
        } else {
            answer
        }
    })
}

pub fn time(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let location = inv.args().to_string();
    if location.is_empty() {
        ctx.reply(
            inv,
            "Usage: !time <city/country> (e.g., !time London or !time New_York)",
        );
        return Ok(());
    }
    let services = ctx.shared.services.clone();
    ctx.spawn_reply(inv.reply_destination(), async move {
        service_reply(services.time_for(&location).await)
    })
}

pub fn news(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let topic = match inv.args() {
        "" => "top".to_string(),
        t => t.to_string(),
    };
    let services = ctx.shared.services.clone();
    ctx.spawn_reply(Destination::User(inv.sender_id), async move {
        service_reply(services.news(&topic).await)
    })
}

pub fn shorten(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let url = inv.args().to_string();
    if url.is_empty() {
        ctx.pm(inv.sender_id, "Usage: shorten <long_url>");
        return Ok(());
    }
    let services = ctx.shared.services.clone();
    ctx.spawn_reply(Destination::User(inv.sender_id), async move {
        match services.shorten(&url).await {
            Ok(short) => format!("Short URL: {}", short),
            Err(e) => service_reply(Err(e)),
        }
    })
}

pub fn remind_me(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let Some(request) = parse_reminder(inv.args()) else {
        ctx.pm(inv.sender_id, REMINDER_USAGE);
        return Ok(());
    };
    let job = ctx
        .shared
        .reminders
        .schedule_in(inv.sender_id, &request.message, request.delay)?;
    info!(
        "reminder {} for {} scheduled at {}",
        job.id, inv.sender_id, job.fire_at
    );
    ctx.pm(
        inv.sender_id,
        &format!(
            "OK, I will remind you to '{}' in {} {}.",
            request.message, request.amount, request.unit_text
        ),
    );
    Ok(())
}
