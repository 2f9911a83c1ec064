//! Interactive REPL.

use crate::commands::{
    describe_outcome, describe_user, format_json, format_named_list, parse_button, parse_party,
};
use colored::Colorize;
use drpc_client::{Session, SessionEvent, Subscription};
use drpc_protocol::Activity;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::{json, Value};
use std::collections::HashMap;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  ready                         Show the host's READY data
  auth <access_token>           Authenticate the connection
  whoami                        Show the authenticated user

  guilds                        List guilds
  guild <id>                    Get a guild
  channels [guild_id]           List channels
  channel <id>                  Get a channel
  relationships                 List relationships
  voice                         Get voice settings

  activity <name> [details]     Set the activity
  party <current>/<max>         Add a party to the last activity and resend
  button <label>=<url>          Add a button to the last activity and resend
  clear                         Clear the activity

  sub <event> [args_json]       Subscribe, printing dispatches as they arrive
  unsub <event>                 Drop a subscription made with 'sub'
  request <CMD> [args_json]     Send a raw command

  reconnect                     Reconnect after the host went away
  quit, exit                    Exit the REPL
"#;

struct ReplState {
    activity: Option<Activity>,
    subscriptions: HashMap<String, Subscription>,
}

pub async fn run(
    session: Session,
    token: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "drpc CLI".bold().cyan());
    println!("Connecting to the host as {}...", session.client_id());

    // Connect
    session.connect().await?;
    println!("{}", "Connected!".green());
    if let Some(token) = &token {
        session.authenticate(token).await?;
        println!("{}", "Authenticated.".green());
    }

    // Report lifecycle changes while the prompt is open
    let mut lifecycle = session.events();
    tokio::spawn(async move {
        while let Ok(event) = lifecycle.recv().await {
            match event {
                SessionEvent::Disconnected { reason, .. } => {
                    println!("\n{}: {}", "Disconnected".red(), reason);
                }
                SessionEvent::HandlerFailed { event, message } => {
                    println!("\n{} {}: {}", "Handler failed for".yellow(), event, message);
                }
                SessionEvent::Dispatch { event, .. } => {
                    tracing::debug!("Unrouted {} dispatch", event);
                }
                _ => {}
            }
        }
    });

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = home::home_dir()
        .map(|h| h.join(".drpc_history"))
        .unwrap_or_else(|| ".drpc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    let mut state = ReplState {
        activity: None,
        subscriptions: HashMap::new(),
    };

    loop {
        let prompt = format!("{} ", "drpc>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&session, &mut state, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    // Disconnect
    session.destroy().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    session: &Session,
    state: &mut ReplState,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "ready" => match session.ready_info() {
            Some(ready) => Ok(Some(format_json(&serde_json::to_value(ready)?))),
            None => Ok(Some("Not connected".yellow().to_string())),
        },

        "auth" => {
            if args.is_empty() {
                return Ok(Some("Usage: auth <access_token>".to_string()));
            }
            let data = session.authenticate(args[0]).await?;
            let user = data.get("user").map(describe_user).unwrap_or_default();
            Ok(Some(format!("{} {}", "Authenticated as".green(), user.cyan())))
        }

        "whoami" => match session.user() {
            Some(user) => Ok(Some(describe_user(&user))),
            None => Ok(Some("No user yet".yellow().to_string())),
        },

        "guilds" => {
            let guilds = session.get_guilds(None).await?;
            Ok(Some(format_named_list(&guilds)))
        }

        "guild" => {
            if args.is_empty() {
                return Ok(Some("Usage: guild <id>".to_string()));
            }
            Ok(Some(format_json(&session.get_guild(args[0], None).await?)))
        }

        "channels" => {
            let channels = session.get_channels(args.first().copied(), None).await?;
            Ok(Some(format_named_list(&channels)))
        }

        "channel" => {
            if args.is_empty() {
                return Ok(Some("Usage: channel <id>".to_string()));
            }
            Ok(Some(format_json(&session.get_channel(args[0], None).await?)))
        }

        "relationships" => {
            let relationships = session.get_relationships().await?;
            Ok(Some(format_json(&Value::Array(relationships))))
        }

        "voice" => Ok(Some(format_json(&session.get_voice_settings().await?))),

        "activity" | "act" => {
            if args.is_empty() {
                return Ok(Some("Usage: activity <name> [details]".to_string()));
            }
            let mut activity = Activity::new(args[0]);
            if args.len() > 1 {
                activity = activity.with_details(args[1..].join(" "));
            }
            publish(session, state, activity).await
        }

        "party" => {
            let Some(activity) = state.activity.clone() else {
                return Ok(Some("Set an activity first".yellow().to_string()));
            };
            if args.is_empty() {
                return Ok(Some("Usage: party <current>/<max>".to_string()));
            }
            let (size, max) = parse_party(args[0])?;
            publish(session, state, activity.with_party(None, size, max)).await
        }

        "button" => {
            let Some(activity) = state.activity.clone() else {
                return Ok(Some("Set an activity first".yellow().to_string()));
            };
            if args.is_empty() {
                return Ok(Some("Usage: button <label>=<url>".to_string()));
            }
            let button = parse_button(&args.join(" "))?;
            publish(session, state, activity.with_button(button)).await
        }

        "clear" => {
            session.clear_activity(None).await?;
            state.activity = None;
            Ok(Some("Activity cleared".green().to_string()))
        }

        "sub" | "subscribe" => {
            if args.is_empty() {
                return Ok(Some("Usage: sub <event> [args_json]".to_string()));
            }
            let event = args[0].to_uppercase();
            let sub_args = parse_inline_json(&args[1..])?;

            let label = event.clone();
            let subscription = session
                .subscribe(&event, sub_args, move |data: &Value| {
                    println!("\n{} {}", label.cyan(), data);
                    Ok(())
                })
                .await?;
            if let Some(previous) = state.subscriptions.insert(event.clone(), subscription) {
                previous.unsubscribe().await?;
            }
            Ok(Some(format!("{} {}", "Subscribed to".green(), event.cyan())))
        }

        "unsub" | "unsubscribe" => {
            if args.is_empty() {
                return Ok(Some("Usage: unsub <event>".to_string()));
            }
            let event = args[0].to_uppercase();
            match state.subscriptions.remove(&event) {
                Some(subscription) => {
                    subscription.unsubscribe().await?;
                    Ok(Some(format!("{} {}", "Unsubscribed from".green(), event.cyan())))
                }
                None => Ok(Some(format!("{}: not subscribed to {}", "Warning".yellow(), event))),
            }
        }

        "request" | "req" => {
            if args.is_empty() {
                return Ok(Some("Usage: request <CMD> [args_json]".to_string()));
            }
            let request_args = parse_inline_json(&args[1..])?;
            let data = session
                .request(&args[0].to_uppercase(), request_args, None)
                .await?;
            Ok(Some(format_json(&data)))
        }

        "reconnect" => {
            state.subscriptions.clear();
            session.connect().await?;
            Ok(Some("Connected!".green().to_string()))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}

async fn publish(
    session: &Session,
    state: &mut ReplState,
    activity: Activity,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let outcome = session.set_activity(&activity, None).await?;
    state.activity = Some(activity);
    Ok(Some(describe_outcome(&outcome)))
}

/// Joins the remaining words into one JSON value; nothing means `{}`.
fn parse_inline_json(words: &[&str]) -> Result<Value, serde_json::Error> {
    if words.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&words.join(" "))
}
