//! drpc - presence daemon
//!
//! Logs in to the local desktop host and keeps an activity published,
//! refreshing it on an interval until interrupted.

mod config;

use config::Config;
use drpc_client::{ActivityOutcome, ClientError, Session, SessionEvent};
use drpc_protocol::ActivityTimestamps;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if DRPC_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("DRPC_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting drpc presence daemon");
    tracing::info!("  Client id: {}", config.client.client_id);
    tracing::info!("  Refresh interval: {}s", config.presence.refresh_secs);

    if config.presence.register_scheme {
        match drpc_client::register(&config.client.client_id, None) {
            Ok(scheme) => tracing::info!("  Registered URL scheme {}", scheme),
            Err(e) => tracing::warn!("URL scheme registration failed: {}", e),
        }
    }

    let session = Session::new(config.session_config());
    let mut lifecycle = session.events();

    if let Err(e) = session.login(config.login_options()).await {
        tracing::error!("{}", e);
        return Err(e.into());
    }
    match session.user() {
        Some(user) => tracing::info!("RPC ready for {}", user["username"].as_str().unwrap_or("?")),
        None => tracing::info!("RPC ready"),
    }

    let mut presence = config.presence.clone();
    if presence.show_elapsed && presence.activity.timestamps.is_none() {
        presence.activity.timestamps = Some(ActivityTimestamps::now());
    }

    let mut refreshes = 0u64;
    let mut ticker = tokio::time::interval(presence.refresh_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !session.is_connected() {
                    tracing::info!("Reconnecting...");
                    if let Err(e) = session.login(config.login_options()).await {
                        tracing::warn!("{}", e);
                        continue;
                    }
                }

                let activity = presence.render(refreshes);
                match session.set_activity(&activity, presence.pid).await {
                    Ok(ActivityOutcome::Sent(_)) => {
                        refreshes += 1;
                        tracing::debug!("Activity refreshed ({} updates)", refreshes);
                    }
                    Ok(ActivityOutcome::Superseded) => {}
                    Err(ClientError::RateLimited { retry_after }) => {
                        tracing::debug!("Refresh skipped, window open in {:?}", retry_after);
                    }
                    Err(e) => tracing::warn!("Failed to set activity: {}", e),
                }
            }
            event = lifecycle.recv() => match event {
                Ok(SessionEvent::Disconnected { code, reason }) => {
                    tracing::warn!("Disconnected ({:?}): {}", code, reason);
                }
                Ok(SessionEvent::Error(message)) => tracing::warn!("Session error: {}", message),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Missed {} session events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal, clearing activity...");
                break;
            }
        }
    }

    // Bounded: a clear inside the rate window waits for the window.
    if session.is_connected() {
        let clear = session.clear_activity(presence.pid);
        match tokio::time::timeout(Duration::from_secs(2), clear).await {
            Ok(Err(e)) => tracing::warn!("Failed to clear activity: {}", e),
            Err(_) => tracing::debug!("Activity clear still queued at shutdown"),
            Ok(Ok(_)) => {}
        }
    }
    session.destroy().await;

    tracing::info!("Daemon stopped");
    Ok(())
}
