//! Binary entrypoint for the TalkBot CLI.
//!
//! Commands:
//! - `start [--no-console]` - run the bot until shutdown
//! - `init` - write a starter `config.toml`
//! - `check-config` - parse the configuration and print a summary
//!
//! See the library crate docs for module-level details: `talkbot::`.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use talkbot::bot::reminders::ReminderScheduler;
use talkbot::bot::{Controller, ControllerExit, Shared};
use talkbot::config::{Config, ConfigStore};
use talkbot::console::run_console;
use talkbot::services::ServiceHub;
use talkbot::storage::reminders::ReminderStore;
use talkbot::storage::PresenceStore;
use talkbot::transport::sim::{SimServer, ROOT_CHANNEL_ID};

#[derive(Parser)]
#[command(name = "talkbot")]
#[command(about = "A resilient command bot for voice chat servers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run the bot
    Start {
        /// Do not read operator commands from stdin
        #[arg(long)]
        no_console: bool,
    },
    /// Write a default configuration file
    Init,
    /// Validate the configuration file and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { no_console } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting TalkBot v{}", env!("CARGO_PKG_VERSION"));
            let exit = run_bot(config, PathBuf::from(&cli.config), no_console).await?;
            if let ControllerExit::Fatal(code) = exit {
                error!("exiting after fatal error: {}", code.describe());
                std::process::exit(1);
            }
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if std::path::Path::new(&cli.config).exists() {
                warn!("{} already exists; not overwriting", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::CheckConfig => {
            init_logging(&None, cli.verbose);
            let config = Config::load(&cli.config).await?;
            println!("Configuration OK: {}", cli.config);
            println!(
                "  server:    {}:{} as {}",
                config.connection.host, config.connection.tcp_port, config.connection.nickname
            );
            println!("  channel:   {}", config.bot.initial_channel_path);
            println!(
                "  reconnect: {}-{}s",
                config.bot.reconnect_delay_min, config.bot.reconnect_delay_max
            );
            println!("  admins:    {}", config.bot.admin_usernames.len());
            println!(
                "  ai:        {}",
                if config.ai.is_configured() { "configured" } else { "not configured" }
            );
        }
    }

    Ok(())
}

async fn run_bot(config: Config, config_path: PathBuf, no_console: bool) -> Result<ControllerExit> {
    let presence = PresenceStore::open(config.storage.presence_path())?;
    let reminders = ReminderStore::open(config.storage.reminders_path())?;
    let services = Arc::new(ServiceHub::new(&config));
    let server = simulated_server(&config);
    let shared = Shared::new(
        Arc::new(ConfigStore::new(config, Some(config_path))),
        presence,
        reminders,
        services,
    );

    tokio::spawn(ReminderScheduler::new(shared.clone()).run());
    if !no_console {
        tokio::spawn(run_console(shared.clone()));
    }

    let control = shared.control.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                control.request_shutdown();
            }
            Err(e) => warn!("failed to listen for ctrl-c: {}", e),
        }
    });

    let exit = Controller::new(Arc::new(server), shared.clone()).run().await;
    if let Err(e) = shared.presence.flush() {
        warn!("failed to flush presence store: {}", e);
    }
    info!("TalkBot stopped");
    Ok(exit)
}

/// Build the in-process server with the configured channel path present so
/// the initial join succeeds.
fn simulated_server(config: &Config) -> SimServer {
    let server = SimServer::new();
    server.set_server_name(&config.connection.host);
    let mut parent = ROOT_CHANNEL_ID;
    for name in config
        .bot
        .initial_channel_path
        .split('/')
        .filter(|s| !s.trim().is_empty())
    {
        parent = server.add_channel(parent, name.trim());
    }
    server
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // sled is chatty at debug
    builder.filter_module("sled", log::LevelFilter::Info);

    let file = config.as_ref().and_then(|c| {
        let path = c.logging.file.as_ref()?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());

    match file {
        Some(f) => {
            let write_mutex = Arc::new(std::sync::Mutex::new(f));
            // Mirror to the console only when attached to a terminal.
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                write_security_line(record.target(), security_path.as_deref(), &line);
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                write_security_line(record.target(), security_path.as_deref(), &line);
                writeln!(fmt, "{}", line)
            });
        }
    }
    let _ = builder.try_init();
}

fn write_security_line(target: &str, path: Option<&str>, line: &str) {
    use std::io::Write;
    if target != "security" {
        return;
    }
    if let Some(path) = path {
        if let Ok(mut sf) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(sf, "{}", line);
        }
    }
}
