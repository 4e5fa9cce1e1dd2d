//! Command registration table and the context handlers run in.
//!
//! Every verb is described once by a [`CommandSpec`]: its handler, whether
//! it needs an admin, whether it can be blocked (or is exempt from the lock),
//! and where it may be used. Dispatch policy and the `h` help text both read
//! this table.
//!
//! Handlers run on the session worker with the session lock held. They get
//! the state and transport through [`CommandContext`] and must never call
//! `SessionHandle::with_state`. Anything slow (HTTP services) is spawned with
//! [`CommandContext::spawn_reply`] and answered through the session queue.

mod admin;
mod general;
mod moderation;
mod polls;
mod presence;
mod services;

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLockReadGuard;

use log::debug;

use super::outbound::{self, Destination, SendError};
use super::session::SessionHandle;
use super::state::SessionState;
use super::Shared;
use crate::config::Config;
use crate::transport::{ChannelId, MessageKind, Transport, UserId};

/// One parsed command as handed to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Canonical verb from the registration table.
    pub verb: &'static str,
    pub args: String,
    pub sender_id: UserId,
    pub sender_nick: String,
    pub kind: MessageKind,
    pub channel_id: ChannelId,
}

impl Invocation {
    /// Where a normal answer goes: the channel for channel commands, the
    /// sender otherwise.
    pub fn reply_destination(&self) -> Destination {
        match self.kind {
            MessageKind::Channel => Destination::Channel(self.channel_id),
            _ => Destination::User(self.sender_id),
        }
    }

    pub fn args(&self) -> &str {
        self.args.trim()
    }
}

pub struct CommandContext<'a> {
    pub state: &'a mut SessionState,
    pub transport: &'a mut dyn Transport,
    pub shared: &'a Shared,
    pub handle: &'a SessionHandle,
}

impl CommandContext<'_> {
    pub fn send(&mut self, dest: Destination, text: &str) -> Result<usize, SendError> {
        outbound::send_text(self.state, self.transport, dest, text)
    }

    /// Send and log a refusal instead of returning it.
    pub fn send_quiet(&mut self, dest: Destination, text: &str) -> bool {
        match self.send(dest, text) {
            Ok(_) => true,
            Err(e) => {
                debug!("send to {:?} not delivered: {}", dest, e);
                false
            }
        }
    }

    pub fn pm(&mut self, user_id: UserId, text: &str) -> bool {
        self.send_quiet(Destination::User(user_id), text)
    }

    pub fn reply(&mut self, inv: &Invocation, text: &str) -> bool {
        self.send_quiet(inv.reply_destination(), text)
    }

    pub fn config(&self) -> RwLockReadGuard<'_, Config> {
        self.shared.config.read()
    }

    /// Run `work` off the worker and deliver its text to `dest`.
    pub fn spawn_reply<F>(&self, dest: Destination, work: F) -> anyhow::Result<()>
    where
        F: Future<Output = String> + Send + 'static,
    {
        if self.handle.spawn_reply(dest, work) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("no async runtime available"))
        }
    }
}

pub type HandlerFn = fn(&mut CommandContext<'_>, &Invocation) -> anyhow::Result<()>;

/// Where a verb is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Private,
    Channel,
    Both,
}

impl Scope {
    fn allows(self, kind: MessageKind) -> bool {
        match (self, kind) {
            (_, MessageKind::Broadcast) => false,
            (Scope::Both, _) => true,
            (Scope::Private, MessageKind::User) => true,
            (Scope::Channel, MessageKind::Channel) => true,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct CommandSpec {
    pub verb: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    pub handler: HandlerFn,
    pub admin: bool,
    /// `false` for verbs that can neither be blocked nor locked out.
    pub blockable: bool,
    pub scope: Scope,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("verb", &self.verb)
            .field("admin", &self.admin)
            .field("blockable", &self.blockable)
            .field("scope", &self.scope)
            .finish()
    }
}

fn user_cmd(
    verb: &'static str,
    usage: &'static str,
    summary: &'static str,
    handler: HandlerFn,
    scope: Scope,
) -> CommandSpec {
    CommandSpec {
        verb,
        usage,
        summary,
        handler,
        admin: false,
        blockable: true,
        scope,
    }
}

fn admin_cmd(
    verb: &'static str,
    usage: &'static str,
    summary: &'static str,
    handler: HandlerFn,
) -> CommandSpec {
    CommandSpec {
        verb,
        usage,
        summary,
        handler,
        admin: true,
        blockable: true,
        scope: Scope::Private,
    }
}

fn pinned(mut spec: CommandSpec) -> CommandSpec {
    spec.blockable = false;
    spec
}

#[derive(Debug, Clone)]
pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
    index: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    pub fn new(specs: Vec<CommandSpec>) -> Self {
        let index = specs.iter().enumerate().map(|(i, s)| (s.verb, i)).collect();
        Self { specs, index }
    }

    /// The full built-in command set.
    pub fn builtin() -> Self {
        use Scope::{Both, Private};
        Self::new(vec![
            // general
            pinned(user_cmd("h", "h", "Show this help.", general::help, Both)),
            user_cmd("ping", "ping", "Check if the bot is responding.", general::ping, Private),
            pinned(user_cmd("info", "info", "Display bot status and server info.", general::info, Private)),
            pinned(user_cmd("whoami", "whoami", "Show your user info.", general::whoami, Private)),
            pinned(user_cmd("rights", "rights", "Show the bot's permissions.", general::rights, Private)),
            user_cmd("cn", "cn <new_nick>", "Change the bot's nickname.", general::change_nick, Private),
            user_cmd("cs", "cs <new_status>", "Change the bot's status.", general::change_status, Private),
            // services
            user_cmd("w", "w <location>", "Get the weather (also /w in channel).", services::weather, Both),
            user_cmd("c", "c <question>", "Ask the AI (also /c in channel).", services::ask_ai, Both),
            user_cmd("!time", "!time <location>", "Get the time for a location (also in channel).", services::time, Both),
            user_cmd("news", "news [topic]", "Get top news headlines.", services::news, Private),
            user_cmd("shorten", "shorten <url>", "Create a short URL.", services::shorten, Private),
            user_cmd("remindme", "remindme \"msg\" in <N> <minutes|hours|days>", "Set a reminder.", services::remind_me, Private),
            // presence
            pinned(user_cmd("afk", "afk <reason>", "Set your AFK status.", presence::afk, Private)),
            pinned(user_cmd("seen", "seen <nick>", "Check when a user was last active.", presence::seen, Private)),
            // polls
            user_cmd("!poll", "!poll \"Q\" \"A\" \"B\"", "Create a poll.", polls::create, Both),
            user_cmd("!vote", "!vote <id> <num>", "Vote in a poll.", polls::vote, Both),
            user_cmd("!results", "!results [id]", "Show poll results.", polls::results, Both),
            // bot control
            pinned(admin_cmd("lock", "lock", "Toggle the command lock.", admin::lock)),
            pinned(admin_cmd("block", "block <cmd>", "Block a command.", admin::block)),
            pinned(admin_cmd("unblock", "unblock <cmd>", "Unblock a command.", admin::block)),
            pinned(admin_cmd("rs", "rs", "Restart the bot.", admin::restart)),
            pinned(admin_cmd("q", "q", "Shut down the bot.", admin::quit)),
            pinned(admin_cmd("health", "health", "Show a diagnostic report.", admin::health)),
            // configuration
            admin_cmd("gapi", "gapi <key>", "Set the AI API key.", admin::set_api_key),
            admin_cmd("instruct", "instruct <text>", "Set the AI system instruction.", admin::set_instruction),
            admin_cmd("setmodel", "setmodel <name>", "Set the AI model.", admin::set_model),
            admin_cmd("listmodels", "listmodels", "List available AI models.", admin::list_models),
            admin_cmd("scp", "scp <path>", "Set the initial channel path.", admin::set_channel_path),
            admin_cmd("!filter", "!filter <add|remove|list> [word]", "Manage the word filter.", admin::filter),
            admin_cmd("set_context_retention", "set_context_retention <min>", "Set context history retention.", admin::set_context_retention),
            // toggles
            admin_cmd("jcl", "jcl", "Toggle join/leave announcements.", admin::toggle_jcl),
            admin_cmd("tg_chanmsg", "tg_chanmsg", "Toggle channel messages.", admin::toggle_chanmsg),
            admin_cmd("tg_broadcast", "tg_broadcast", "Toggle broadcasts.", admin::toggle_broadcast),
            admin_cmd("tg_ai_pm", "tg_ai_pm", "Toggle AI in private messages.", admin::toggle_ai_pm),
            admin_cmd("tg_ai_chan", "tg_ai_chan", "Toggle AI in the channel.", admin::toggle_ai_chan),
            pinned(admin_cmd("!tgmmode", "!tgmmode", "Toggle AI/template welcome messages.", admin::toggle_welcome_mode)),
            pinned(admin_cmd("!tfilter", "!tfilter", "Toggle the word filter.", admin::toggle_filter)),
            admin_cmd("tg_context_history", "tg_context_history", "Toggle AI context history.", admin::toggle_context_history),
            admin_cmd("tg_debug_logging", "tg_debug_logging", "Toggle debug logging.", admin::toggle_debug_logging),
            // moderation
            admin_cmd("listusers", "listusers [path]", "List users in a channel.", moderation::list_users),
            admin_cmd("listchannels", "listchannels", "List all server channels.", moderation::list_channels),
            admin_cmd("move", "move <nick> <path>", "Move a user to a channel.", moderation::move_user),
            admin_cmd("kick", "kick <nick>", "Kick a user from the bot's channel.", moderation::kick),
            admin_cmd("ban", "ban <nick>", "Ban a user.", moderation::ban),
            admin_cmd("unban", "unban <username>", "Unban a username.", moderation::unban),
            admin_cmd("jc", "jc <path>[|password]", "Make the bot join a channel.", moderation::join_channel),
            admin_cmd("ct", "ct <msg>", "Send a message to the bot's channel.", moderation::channel_text),
            admin_cmd("bm", "bm <msg>", "Send a broadcast message.", moderation::broadcast),
        ])
    }

    pub fn get(&self, verb: &str) -> Option<&CommandSpec> {
        self.index.get(verb).map(|&i| &self.specs[i])
    }

    /// Handler for `verb` as typed in a message of `kind`. Channel lookups
    /// try `!verb` before `verb`.
    pub fn resolve(&self, kind: MessageKind, verb: &str) -> Option<&CommandSpec> {
        let found = match kind {
            MessageKind::Channel => self
                .get(&format!("!{}", verb))
                .filter(|s| s.scope.allows(kind))
                .or_else(|| self.get(verb)),
            _ => self.get(verb),
        };
        found.filter(|s| s.scope.allows(kind))
    }

    /// Unknown verbs are blockable.
    pub fn is_blockable(&self, verb: &str) -> bool {
        self.get(verb).map_or(true, |s| s.blockable)
    }

    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    pub fn never_blockable(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().filter(|s| !s.blockable).map(|s| s.verb)
    }

    /// Help text; admin entries only for admins.
    pub fn help_text(&self, include_admin: bool) -> String {
        let mut lines = vec!["--- Bot Commands (Send via PM) ---".to_string()];
        for spec in self.specs.iter().filter(|s| !s.admin) {
            lines.push(format!("- {}: {}", spec.usage, spec.summary));
        }
        if include_admin {
            lines.push(String::new());
            lines.push("--- Admin Commands ---".to_string());
            let mut admin: Vec<&CommandSpec> = self.specs.iter().filter(|s| s.admin).collect();
            admin.sort_by_key(|s| s.usage);
            for spec in admin {
                lines.push(format!("- {}: {}", spec.usage, spec.summary));
            }
        }
        lines.join("\n")
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
