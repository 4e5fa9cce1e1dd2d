//! Operator console on stdin.
//!
//! Commands act on the live session through the same state lock the worker
//! uses, so a console toggle and an admin toggle are indistinguishable.
//!
//! - `status` - connection, channels and feature states
//! - `toggle <feature>` - flip a feature by key (see [`FEATURE_TABLE`])
//! - `set_retention <minutes>` - context history retention, persisted
//! - `restart` - drop the session and reconnect now
//! - `exit` / `quit` - intentional shutdown
//! - `help`

use std::sync::Arc;

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bot::controller::shutdown_signal;
use crate::bot::features::{on_off, Feature, ToggleError, FEATURE_TABLE};
use crate::bot::Shared;
use crate::logutil::format_elapsed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Continue,
    Exit,
}

const NO_SESSION: &str = "No active session.";

pub fn help_text() -> String {
    let keys: Vec<&str> = FEATURE_TABLE.iter().map(|(k, _, _)| *k).collect();
    [
        "Console commands:".to_string(),
        "  status                   Show connection and feature status".to_string(),
        format!("  toggle <feature>         Toggle a feature ({})", keys.join(", ")),
        "  set_retention <minutes>  Set context history retention".to_string(),
        "  restart                  Reconnect the bot".to_string(),
        "  exit | quit              Shut the bot down".to_string(),
        "  help                     Show this help".to_string(),
    ]
    .join("\n")
}

/// Run one console line. Returns the text to print and whether to stop
/// reading input.
pub fn execute(line: &str, shared: &Shared) -> (String, ConsoleAction) {
    let line = line.trim();
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((c, a)) => (c.to_lowercase(), a.trim()),
        None => (line.to_lowercase(), ""),
    };
    let out = match cmd.as_str() {
        "" => String::new(),
        "help" | "?" => help_text(),
        "status" => status(shared),
        "toggle" => toggle(shared, arg),
        "set_retention" => set_retention(shared, arg),
        "restart" => {
            shared.control.request_restart();
            "Restart requested.".to_string()
        }
        "exit" | "quit" => {
            shared.control.request_shutdown();
            return ("Shutting down...".to_string(), ConsoleAction::Exit);
        }
        other => format!("Unknown command '{}'. Type 'help' for commands.", other),
    };
    (out, ConsoleAction::Continue)
}

fn status(shared: &Shared) -> String {
    let uptime = format_elapsed(shared.started_at.elapsed().as_secs() as i64);
    let Some(session) = shared.live.current() else {
        return format!("{}\nUptime: {}", NO_SESSION, uptime);
    };
    session.with_state(|s| {
        let channels: Vec<String> = s.occupied_channels().map(|c| c.to_string()).collect();
        let mut lines = vec![
            format!("Session: {} ({})", session.id(), s.status()),
            format!("Nickname: {} (ID {})", s.identity.nickname, s.identity.user_id),
            format!(
                "Channels: {}",
                if channels.is_empty() { "none".to_string() } else { channels.join(", ") }
            ),
            format!("Target path: {}", s.target_channel_path),
            format!("Uptime: {}", uptime),
            format!("Welcome mode: {}", s.welcome_mode.label()),
            format!("Context retention: {} minutes", s.history.retention_minutes()),
        ];
        for feature in Feature::all() {
            lines.push(format!(
                "  {:<16} {:<26} {}",
                feature.key(),
                feature.label(),
                on_off(s.toggles.get(feature))
            ));
        }
        lines.join("\n")
    })
}

fn toggle(shared: &Shared, arg: &str) -> String {
    if arg.is_empty() {
        return "Usage: toggle <feature>".to_string();
    }
    let feature = match arg.parse::<Feature>() {
        Ok(f) => f,
        Err(e) => {
            let keys: Vec<&str> = FEATURE_TABLE.iter().map(|(k, _, _)| *k).collect();
            return format!("{}. Available: {}", e, keys.join(", "));
        }
    };
    let Some(session) = shared.live.current() else {
        return NO_SESSION.to_string();
    };
    match session.with_state(|s| s.toggle_feature(feature)) {
        Ok(on) => {
            info!("console toggled {} {}", feature.key(), on_off(on));
            format!("{} is now {}.", feature.label(), on_off(on))
        }
        Err(ToggleError::EmptyFilter) => {
            "Cannot enable the word filter: the filter list is empty.".to_string()
        }
        Err(e) => e.to_string(),
    }
}

fn set_retention(shared: &Shared, arg: &str) -> String {
    let minutes = match arg.parse::<u64>() {
        Ok(m) if m > 0 => m,
        _ => return "Usage: set_retention <minutes>".to_string(),
    };
    if let Some(session) = shared.live.current() {
        session.with_state(|s| s.history.set_retention_minutes(minutes));
    }
    if let Err(e) = shared
        .config
        .update(|c| c.bot.context_history_retention_minutes = minutes)
    {
        warn!("failed to persist retention: {:#}", e);
        return format!(
            "Retention set to {} minutes, but saving the config failed: {}",
            minutes, e
        );
    }
    format!("Context history retention set to {} minutes.", minutes)
}

/// Read console lines until EOF, `exit`, or shutdown.
pub async fn run_console(shared: Arc<Shared>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = shared.control.subscribe_shutdown();
    println!("{}", help_text());
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let (out, action) = execute(&line, &shared);
                    if !out.is_empty() {
                        println!("{}", out);
                    }
                    if action == ConsoleAction::Exit {
                        break;
                    }
                }
                Ok(None) => {
                    info!("console input closed");
                    break;
                }
                Err(e) => {
                    warn!("console read failed: {}", e);
                    break;
                }
            },
            _ = shutdown_signal(&mut shutdown) => break,
        }
    }
}
