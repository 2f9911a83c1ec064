//! Command execution.

use crate::{ActivityArgs, Commands};
use colored::Colorize;
use drpc_client::{ActivityOutcome, Session};
use drpc_protocol::{Activity, ActivityAssets, ActivityButton, ActivityTimestamps};
use serde_json::Value;

/// Executes a command and returns the formatted output.
pub async fn execute(
    session: &Session,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Ready => {
            let ready = session.ready_info().ok_or("no READY data")?;
            let user = ready
                .user
                .as_ref()
                .map(describe_user)
                .unwrap_or_else(|| "unknown".to_string());
            Ok(format!(
                "{}\n  Protocol: v{}\n  User: {}\n  Environment: {}\n  API: {}",
                "Ready".green().bold(),
                ready.v.unwrap_or(1),
                user.cyan(),
                ready.config.environment.as_deref().unwrap_or("?"),
                ready.config.api_endpoint.as_deref().unwrap_or("?")
            ))
        }

        Commands::ClearActivity { pid } => {
            session.clear_activity(pid).await?;
            Ok(format!("{}", "Activity cleared".green()))
        }

        Commands::Request { command, args, evt } => {
            let args = args
                .map(|a| parse_json_arg(&a))
                .transpose()?
                .unwrap_or_else(|| serde_json::json!({}));
            let data = session
                .request(&command.to_uppercase(), args, evt.as_deref())
                .await?;
            Ok(format_json(&data))
        }

        Commands::Guilds => {
            let guilds = session.get_guilds(None).await?;
            if guilds.is_empty() {
                return Ok("No guilds".yellow().to_string());
            }
            Ok(format_named_list(&guilds))
        }

        Commands::Channels { guild } => {
            let channels = session.get_channels(guild.as_deref(), None).await?;
            if channels.is_empty() {
                return Ok("No channels".yellow().to_string());
            }
            Ok(format_named_list(&channels))
        }

        // Streaming and local commands are handled directly in main.rs
        Commands::SetActivity { .. } => unreachable!(),
        Commands::Subscribe { .. } => unreachable!(),
        Commands::Register { .. } => unreachable!(),
    }
}

/// Builds and validates an activity from command-line fields.
pub fn build_activity(args: &ActivityArgs) -> Result<Activity, Box<dyn std::error::Error>> {
    let mut activity = Activity::new(&args.name);

    if let Some(kind) = args.kind {
        activity = activity.with_kind(kind.into());
    }
    if let Some(url) = &args.url {
        activity = activity.with_url(url);
    }
    if let Some(details) = &args.details {
        activity = activity.with_details(details);
    }
    if let Some(state) = &args.state {
        activity = activity.with_state(state);
    }

    let assets = ActivityAssets {
        large_image: args.large_image.clone(),
        large_text: args.large_text.clone(),
        small_image: args.small_image.clone(),
        small_text: args.small_text.clone(),
        ..ActivityAssets::default()
    };
    if assets != ActivityAssets::default() {
        activity = activity.with_assets(assets);
    }

    if let Some(party) = &args.party {
        let (size, max) = parse_party(party)?;
        activity = activity.with_party(None, size, max);
    }
    for button in &args.buttons {
        activity = activity.with_button(parse_button(button)?);
    }
    if args.elapsed {
        activity = activity.with_timestamps(ActivityTimestamps::now());
    }

    activity.validate()?;
    Ok(activity)
}

/// Parses `CURRENT/MAX`.
pub fn parse_party(arg: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (size, max) = arg
        .split_once('/')
        .ok_or_else(|| format!("party must be CURRENT/MAX, got {arg:?}"))?;
    Ok((size.trim().parse()?, max.trim().parse()?))
}

/// Parses `LABEL=URL`.
pub fn parse_button(arg: &str) -> Result<ActivityButton, Box<dyn std::error::Error>> {
    let (label, url) = arg
        .split_once('=')
        .ok_or_else(|| format!("button must be LABEL=URL, got {arg:?}"))?;
    Ok(ActivityButton::new(label, url))
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// One line per item: `id  name`.
pub fn format_named_list(items: &[Value]) -> String {
    let mut output = String::new();
    for item in items {
        let id = item["id"].as_str().unwrap_or("?");
        let name = item["name"].as_str().unwrap_or("?");
        output.push_str(&format!("  {:>20}  {}\n", id.dimmed(), name.cyan()));
    }
    output
}

/// `username (id)` of a user object.
pub fn describe_user(user: &Value) -> String {
    let id = user["id"].as_str().unwrap_or("?");
    match user["username"].as_str() {
        Some(name) => format!("{name} ({id})"),
        None => id.to_string(),
    }
}

pub fn describe_outcome(outcome: &ActivityOutcome) -> String {
    match outcome {
        ActivityOutcome::Sent(_) => "Activity set".green().to_string(),
        ActivityOutcome::Superseded => "Activity replaced by a newer update".yellow().to_string(),
    }
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActivityKind;
    use drpc_protocol::ActivityType;
    use serde_json::json;

    fn args(name: &str) -> ActivityArgs {
        ActivityArgs {
            name: name.to_string(),
            kind: None,
            details: None,
            state: None,
            url: None,
            large_image: None,
            large_text: None,
            small_image: None,
            small_text: None,
            party: None,
            buttons: Vec::new(),
            elapsed: false,
        }
    }

    #[test]
    fn test_build_minimal_activity() {
        let activity = build_activity(&args("Snek")).unwrap();
        assert_eq!(activity.name, "Snek");
        assert!(activity.assets.is_none());
        assert!(activity.timestamps.is_none());
    }

    #[test]
    fn test_build_full_activity() {
        let mut input = args("Snek");
        input.kind = Some(ActivityKind::Watching);
        input.details = Some("Level 3".to_string());
        input.large_image = Some("snek_large".to_string());
        input.party = Some("2/4".to_string());
        input.buttons = vec!["Site=https://example.com".to_string()];
        input.elapsed = true;

        let activity = build_activity(&input).unwrap();
        assert_eq!(activity.kind, Some(ActivityType::Watching));
        assert_eq!(activity.party.unwrap().size, Some([2, 4]));
        assert_eq!(activity.assets.unwrap().large_image.as_deref(), Some("snek_large"));
        assert_eq!(activity.buttons[0].url, "https://example.com");
        assert!(activity.timestamps.unwrap().start.is_some());
    }

    #[test]
    fn test_build_rejects_invalid_activity() {
        let mut input = args("Snek");
        input.party = Some("5/4".to_string());
        assert!(build_activity(&input).is_err());

        let mut input = args("Snek");
        input.url = Some("https://twitch.tv/snek".to_string());
        assert!(build_activity(&input).is_err());
    }

    #[test]
    fn test_parse_party_and_button() {
        assert_eq!(parse_party(" 1 / 8 ").unwrap(), (1, 8));
        assert!(parse_party("8").is_err());
        assert!(parse_party("a/b").is_err());

        let button = parse_button("Join=https://example.com/?a=b").unwrap();
        assert_eq!(button.label, "Join");
        assert_eq!(button.url, "https://example.com/?a=b");
        assert!(parse_button("no-separator").is_err());
    }

    #[test]
    fn test_parse_json_arg_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.json");
        std::fs::write(&path, r#"{"guild_id": "1"}"#).unwrap();

        let value = parse_json_arg(&format!("@{}", path.display())).unwrap();
        assert_eq!(value, json!({ "guild_id": "1" }));
        assert_eq!(parse_json_arg("[1,2]").unwrap(), json!([1, 2]));
        assert!(parse_json_arg("{nope").is_err());
    }

    #[test]
    fn test_describe_user() {
        assert_eq!(
            describe_user(&json!({ "id": "1", "username": "snek" })),
            "snek (1)"
        );
        assert_eq!(describe_user(&json!({ "id": "1" })), "1");
    }
}
