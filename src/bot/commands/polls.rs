//! `!poll`, `!vote` and `!results`. Polls live only as long as the session.

use super::{CommandContext, Invocation};
use crate::bot::polls::parse_quoted;

const POLL_USAGE: &str = "Usage: !poll \"Question\" \"Option A\" \"Option B\" ...";
const VOTE_USAGE: &str = "Usage: !vote <poll_id> <option_number>";

pub fn create(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let mut parts = parse_quoted(inv.args());
    if parts.len() < 3 {
        ctx.reply(inv, POLL_USAGE);
        return Ok(());
    }
    let question = parts.remove(0);
    let text = match ctx.state.polls.create(inv.sender_id, &question, parts) {
        Ok(poll) => poll.render_announcement(),
        Err(e) => e.to_string(),
    };
    ctx.reply(inv, &text);
    Ok(())
}

pub fn vote(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let mut words = inv.args().split_whitespace();
    let parsed = match (words.next(), words.next(), words.next()) {
        (Some(id), Some(option), None) => id
            .trim_start_matches('#')
            .parse::<u32>()
            .ok()
            .zip(option.parse::<usize>().ok()),
        _ => None,
    };
    let Some((poll_id, option)) = parsed else {
        ctx.reply(inv, VOTE_USAGE);
        return Ok(());
    };
    let text = match ctx.state.polls.vote(poll_id, inv.sender_id, option) {
        Ok(poll) => format!(
            "{} voted for option {} in poll #{} ({}).",
            inv.sender_nick, option, poll.id, poll.options[option - 1]
        ),
        Err(e) => e.to_string(),
    };
    ctx.reply(inv, &text);
    Ok(())
}

pub fn results(ctx: &mut CommandContext<'_>, inv: &Invocation) -> anyhow::Result<()> {
    let args = inv.args();
    let poll = if args.is_empty() {
        ctx.state.polls.latest()
    } else {
        match args.trim_start_matches('#').parse::<u32>() {
            Ok(id) => ctx.state.polls.get(id),
            Err(_) => {
                ctx.reply(inv, "Usage: !results [poll_id]");
                return Ok(());
            }
        }
    };
    let text = match poll {
        Some(poll) => poll.render_results(),
        None if args.is_empty() => "There are no polls yet.".to_string(),
        None => format!("Poll #{} does not exist.", args.trim_start_matches('#')),
    };
    ctx.reply(inv, &text);
    Ok(())
}
