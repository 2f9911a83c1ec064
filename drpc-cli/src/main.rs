//! drpc-cli - Command-line interface for the desktop RPC host
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use drpc_client::{Session, SessionConfig, SessionEvent};
use drpc_protocol::ActivityType;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drpc-cli")]
#[command(about = "Command-line interface for the desktop RPC host")]
#[command(version)]
struct Cli {
    /// Application (client) id
    #[arg(short, long, env = "DRPC_CLIENT_ID")]
    client_id: String,

    /// Access token to authenticate with after connecting
    #[arg(short = 't', long, env = "DRPC_ACCESS_TOKEN")]
    token: Option<String>,

    /// Explicit IPC socket or pipe path (skips discovery)
    #[arg(long, env = "DRPC_IPC_PATH")]
    ipc_path: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Connect and print the host's READY data
    Ready,

    /// Publish an activity and keep it until Ctrl+C
    SetActivity {
        #[command(flatten)]
        activity: ActivityArgs,

        /// Process id the activity belongs to (default: this process)
        #[arg(long)]
        pid: Option<u32>,
    },

    /// Clear the activity of a process
    ClearActivity {
        /// Process id (default: this process)
        #[arg(long)]
        pid: Option<u32>,
    },

    /// Send a raw command
    Request {
        /// Command name, e.g. GET_VOICE_SETTINGS
        command: String,

        /// Arguments JSON (or @file.json to read from file)
        args: Option<String>,

        /// Event name for commands that take one
        #[arg(short, long)]
        evt: Option<String>,
    },

    /// Subscribe to an event and print dispatches until Ctrl+C
    Subscribe {
        /// Event name, e.g. VOICE_SETTINGS_UPDATE
        event: String,

        /// Subscription arguments JSON
        args: Option<String>,
    },

    /// List the user's guilds
    Guilds,

    /// List channels
    Channels {
        /// Only channels of this guild
        #[arg(short, long)]
        guild: Option<String>,
    },

    /// Register the join/spectate URL scheme for this application
    Register {
        /// Command launched for the URL (default: this executable)
        #[arg(long)]
        command: Option<String>,
    },
}

/// Activity fields accepted on the command line.
#[derive(Args, Debug, Clone)]
pub(crate) struct ActivityArgs {
    /// Activity name
    #[arg(short, long)]
    pub name: String,

    /// Activity kind
    #[arg(short, long, value_enum)]
    pub kind: Option<ActivityKind>,

    #[arg(short, long)]
    pub details: Option<String>,

    #[arg(short, long)]
    pub state: Option<String>,

    /// Stream url (streaming activities only)
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub large_image: Option<String>,

    #[arg(long)]
    pub large_text: Option<String>,

    #[arg(long)]
    pub small_image: Option<String>,

    #[arg(long)]
    pub small_text: Option<String>,

    /// Party size as CURRENT/MAX
    #[arg(long)]
    pub party: Option<String>,

    /// Button as LABEL=URL (repeatable, at most two)
    #[arg(long = "button")]
    pub buttons: Vec<String>,

    /// Show elapsed time since now
    #[arg(long)]
    pub elapsed: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub(crate) enum ActivityKind {
    Playing,
    Streaming,
    Listening,
    Watching,
    Competing,
}

impl From<ActivityKind> for ActivityType {
    fn from(kind: ActivityKind) -> Self {
        match kind {
            ActivityKind::Playing => ActivityType::Playing,
            ActivityKind::Streaming => ActivityType::Streaming,
            ActivityKind::Listening => ActivityType::Listening,
            ActivityKind::Watching => ActivityType::Watching,
            ActivityKind::Competing => ActivityType::Competing,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Registration touches only the local desktop, no host connection needed
    if let Some(Commands::Register { command }) = &cli.command {
        let scheme = drpc_client::register(&cli.client_id, command.as_deref())?;
        println!("{} {}", "Registered".green(), scheme.cyan());
        return Ok(());
    }

    let mut config = SessionConfig::new(&cli.client_id)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    if let Some(ref path) = cli.ipc_path {
        config = config.with_ipc_path(path);
    }
    let session = Session::new(config);

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(session, cli.token).await?;
        }
        Some(Commands::Register { .. }) => unreachable!(), // Already handled above
        Some(Commands::SetActivity { activity, pid }) => {
            connect(&session, cli.token.as_deref()).await?;

            let activity = commands::build_activity(&activity)?;
            match session.set_activity(&activity, pid).await {
                Ok(outcome) => {
                    eprintln!(
                        "{}: {}",
                        commands::describe_outcome(&outcome),
                        activity.name.cyan()
                    );
                    eprintln!("{}", "Press Ctrl+C to clear and exit...".dimmed());
                    hold_until_interrupted(&session).await;
                    let _ = session.clear_activity(pid).await;
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    session.destroy().await;
                    std::process::exit(1);
                }
            }

            session.destroy().await;
        }
        Some(Commands::Subscribe { event, args }) => {
            connect(&session, cli.token.as_deref()).await?;

            let args = args
                .map(|a| commands::parse_json_arg(&a))
                .transpose()?
                .unwrap_or_else(|| serde_json::json!({}));

            match session.subscribe_channel(&event, args).await {
                Ok((subscription, mut rx)) => {
                    eprintln!("{} {}", "Subscribed to".green(), event.cyan());
                    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

                    let mut lifecycle = session.events();
                    loop {
                        tokio::select! {
                            data = rx.recv() => match data {
                                Some(data) => println!("{}", data),
                                None => break,
                            },
                            event = lifecycle.recv() => {
                                if let Ok(SessionEvent::Disconnected { reason, .. }) = event {
                                    eprintln!("{}: {}", "Connection closed".red(), reason);
                                    break;
                                }
                            }
                            _ = tokio::signal::ctrl_c() => {
                                eprintln!("\n{}", "Unsubscribing...".dimmed());
                                let _ = subscription.unsubscribe().await;
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    session.destroy().await;
                    std::process::exit(1);
                }
            }

            session.destroy().await;
        }
        Some(cmd) => {
            connect(&session, cli.token.as_deref()).await?;

            let result = commands::execute(&session, cmd).await;
            session.destroy().await;

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Connects and, with a token, authenticates.
async fn connect(
    session: &Session,
    token: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    session.connect().await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;
    if let Some(token) = token {
        session.authenticate(token).await.map_err(|e| {
            eprintln!("{}: {}", "Authentication failed".red(), e);
            e
        })?;
    }
    Ok(())
}

/// Waits for Ctrl+C or for the host to drop the connection.
async fn hold_until_interrupted(session: &Session) {
    let mut lifecycle = session.events();
    loop {
        tokio::select! {
            event = lifecycle.recv() => match event {
                Ok(SessionEvent::Disconnected { reason, .. }) => {
                    eprintln!("{}: {}", "Connection closed".red(), reason);
                    return;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => return,
        }
    }
}
