//! Daemon configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via DRPC_CONFIG)
//! 3. Environment variables

use drpc_client::{ActivityPolicy, LoginOptions, SessionConfig};
use drpc_protocol::Activity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application identity and credentials.
    pub client: ClientConfig,
    /// Connection tuning.
    pub session: SessionSettings,
    /// The published activity.
    pub presence: PresenceConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("DRPC_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.client.apply_env_overrides();
        self.session.apply_env_overrides();
        self.presence.apply_env_overrides();
    }

    /// Checks what the file format cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.client_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.client_id is required (or set DRPC_CLIENT_ID)".to_string(),
            ));
        }
        if self.presence.refresh_secs == 0 {
            return Err(ConfigError::ValidationError(
                "presence.refresh_secs must be positive".to_string(),
            ));
        }
        self.presence
            .activity
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("presence.activity: {e}")))
    }

    /// Session settings for the client library.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.client.client_id)
            .with_handshake_timeout(Duration::from_millis(self.session.handshake_timeout_ms))
            .with_request_timeout(Duration::from_millis(self.session.request_timeout_ms))
            .with_activity_policy(self.session.activity_policy);
        if let Some(path) = &self.client.ipc_path {
            config = config.with_ipc_path(path);
        }
        config
    }

    /// Login options derived from the client section.
    pub fn login_options(&self) -> LoginOptions {
        LoginOptions {
            client_secret: self.client.client_secret.clone(),
            access_token: self.client.access_token.clone(),
            scopes: self.client.scopes.clone(),
            redirect_uri: self.client.redirect_uri.clone(),
            token_endpoint: self.client.token_endpoint.clone(),
            ..LoginOptions::default()
        }
    }
}

/// Application identity and credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Authenticate with this token instead of running AUTHORIZE.
    pub access_token: Option<String>,
    /// OAuth2 scopes; empty means no authorization.
    pub scopes: Vec<String>,
    pub redirect_uri: Option<String>,
    pub token_endpoint: Option<String>,
    /// Explicit IPC socket or pipe path.
    pub ipc_path: Option<PathBuf>,
}

impl ClientConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("DRPC_CLIENT_ID") {
            self.client_id = id;
        }

        if let Ok(secret) = std::env::var("DRPC_CLIENT_SECRET") {
            self.client_secret = Some(secret).filter(|s| !s.is_empty());
        }

        if let Ok(token) = std::env::var("DRPC_ACCESS_TOKEN") {
            self.access_token = Some(token).filter(|s| !s.is_empty());
        }

        if let Ok(scopes) = std::env::var("DRPC_SCOPES") {
            self.scopes = scopes
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(path) = std::env::var("DRPC_IPC_PATH") {
            self.ipc_path = Some(PathBuf::from(path));
        }
    }
}

/// Connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub handshake_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// What to do with updates inside the host's rate-limit window.
    pub activity_policy: ActivityPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            activity_policy: ActivityPolicy::Coalesce,
        }
    }
}

impl SessionSettings {
    fn apply_env_overrides(&mut self) {
        if let Ok(ms) = std::env::var("DRPC_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.request_timeout_ms = ms;
            }
        }
    }
}

/// The published activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Activity to publish. `{refreshes}` in `details` or `state` is replaced
    /// by the number of updates sent so far.
    pub activity: Activity,
    /// Seconds between refreshes.
    pub refresh_secs: u64,
    /// Stamp the activity with the daemon's start time.
    pub show_elapsed: bool,
    /// Register the join/spectate URL scheme on startup.
    pub register_scheme: bool,
    /// Process the activity belongs to (default: the daemon).
    pub pid: Option<u32>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            activity: Activity::new("drpc"),
            refresh_secs: 15,
            show_elapsed: true,
            register_scheme: false,
            pid: None,
        }
    }
}

impl PresenceConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(secs) = std::env::var("DRPC_REFRESH_SECS") {
            if let Ok(secs) = secs.parse() {
                self.refresh_secs = secs;
            }
        }

        if let Ok(register) = std::env::var("DRPC_REGISTER") {
            self.register_scheme = register == "1" || register.to_lowercase() == "true";
        }
    }

    /// Returns the refresh interval as Duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    /// The activity for the given refresh count.
    pub fn render(&self, refreshes: u64) -> Activity {
        let mut activity = self.activity.clone();
        let count = refreshes.to_string();
        for field in [&mut activity.details, &mut activity.state].into_iter().flatten() {
            *field = field.replace("{refreshes}", &count);
        }
        activity
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
