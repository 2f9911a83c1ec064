//! Session façade.
//!
//! A `Session` owns the transport and at most one live [`Connection`]. It
//! drives the lifecycle (connect, authenticate/login, destroy) and exposes the
//! command helpers. Reconnecting after a close builds a fresh connection; no
//! pending requests or subscriptions carry over.

use crate::config::SessionConfig;
use crate::connection::{AuthInfo, Connection};
use crate::error::ClientError;
use crate::oauth::{AccessToken, HttpTokenExchange, TokenExchange, TokenRequest};
use crate::rate_limit::ActivityOutcome;
use crate::router::{EventHandler, HandlerError, Removal, SubscriptionKey};
use crate::state::{SessionEvent, SessionState, StateCell};
use crate::transport::{IpcTransport, Transport};
use drpc_protocol::{Activity, Command, ProtocolError, ReadyData};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Event the host emits while a shortcut capture is running.
pub const CAPTURE_SHORTCUT_CHANGE: &str = "CAPTURE_SHORTCUT_CHANGE";

/// RPC token source for AUTHORIZE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RpcToken {
    #[default]
    None,
    /// Fetch one from the token exchange (requires the client secret).
    Fetch,
    /// Use this token as is.
    Value(String),
}

/// Options for [`Session::login`].
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub client_secret: Option<String>,
    /// Skip AUTHORIZE and authenticate with this token.
    pub access_token: Option<String>,
    pub rpc_token: RpcToken,
    pub scopes: Vec<String>,
    pub redirect_uri: Option<String>,
    /// AUTHORIZE prompt behaviour, e.g. `"none"`.
    pub prompt: Option<String>,
    /// Custom token endpoint used when no exchange is configured.
    pub token_endpoint: Option<String>,
}

impl LoginOptions {
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Lobby visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LobbyType {
    Private = 1,
    Public = 2,
}

impl From<LobbyType> for u8 {
    fn from(kind: LobbyType) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for LobbyType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(LobbyType::Private),
            2 => Ok(LobbyType::Public),
            other => Err(format!("unknown lobby type {other}")),
        }
    }
}

/// Optional fields of an UPDATE_LOBBY request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LobbyUpdate {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<LobbyType>,
    #[serde(rename = "owner_id", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Client session with the host application.
pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    token_exchange: Option<Arc<dyn TokenExchange>>,
    state: StateCell,
    events: broadcast::Sender<SessionEvent>,
    conn: RwLock<Option<Arc<Connection>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl Session {
    /// Creates a session over the local IPC transport.
    pub fn new(config: SessionConfig) -> Self {
        let transport = match &config.ipc_path {
            Some(path) => IpcTransport::with_path(path),
            None => IpcTransport::new(),
        };
        Self::with_transport(config, transport)
    }

    /// Creates a session over a custom transport.
    pub fn with_transport(config: SessionConfig, transport: impl Transport + 'static) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            config,
            transport: Arc::new(transport),
            token_exchange: None,
            state: StateCell::new(),
            events,
            conn: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the token exchange used by [`Session::login`].
    pub fn with_token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.token_exchange = Some(exchange);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Subscribes to lifecycle notifications.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns whether a live connection exists.
    pub fn is_connected(&self) -> bool {
        self.conn.read().as_ref().is_some_and(|c| !c.is_closed())
    }

    fn live_connection(&self) -> Option<Arc<Connection>> {
        self.conn.read().as_ref().filter(|c| !c.is_closed()).cloned()
    }

    /// READY data of the live connection.
    pub fn ready_info(&self) -> Option<ReadyData> {
        self.live_connection().map(|c| c.ready().clone())
    }

    /// Authenticated user, or the user announced in READY.
    ///
    /// Like the other auth accessors, this is `None` once the connection is
    /// gone.
    pub fn user(&self) -> Option<Value> {
        let conn = self.live_connection()?;
        conn.auth().user.or_else(|| conn.ready().user.clone())
    }

    /// Application returned by AUTHENTICATE.
    pub fn application(&self) -> Option<Value> {
        self.live_connection()?.auth().application
    }

    /// Access token of the live connection's last successful authentication.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.live_connection()?.auth().token
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.conn.read().as_ref().map_or(0, |c| c.pending_count())
    }

    fn connection(&self) -> Result<Arc<Connection>, ClientError> {
        match self.conn.read().as_ref() {
            Some(conn) if conn.is_closed() => Err(ClientError::ConnectionClosed),
            Some(conn) => Ok(Arc::clone(conn)),
            None => Err(ClientError::NotConnected),
        }
    }

    fn timeout_for(&self, command: &str) -> Option<Duration> {
        if command == Command::Authorize.as_str() {
            self.config.authorize_timeout
        } else {
            Some(self.config.request_timeout)
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects and performs the handshake. A no-op on a live connection.
    pub async fn connect(&self) -> Result<ReadyData, ClientError> {
        let _guard = self.connect_lock.lock().await;

        let existing = self.conn.read().clone();
        if let Some(conn) = existing {
            if !conn.is_closed() {
                return Ok(conn.ready().clone());
            }
        }
        self.conn.write().take();

        let result = Connection::establish(
            self.transport.as_ref(),
            self.config.clone(),
            self.state.clone(),
            self.events.clone(),
        )
        .await;

        match result {
            Ok(conn) => {
                let ready = conn.ready().clone();
                *self.conn.write() = Some(conn);
                self.state
                    .transition(SessionState::Handshaking, SessionState::Ready);
                let _ = self.events.send(SessionEvent::Ready(ready.clone()));
                Ok(ready)
            }
            Err(e) => {
                tracing::debug!("Connect failed: {}", e);
                self.state.set(SessionState::Closed);
                let _ = self.events.send(SessionEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Authenticates the connection with an access token.
    pub async fn authenticate(&self, access_token: &str) -> Result<Value, ClientError> {
        self.authenticate_with(AccessToken::bearer(access_token))
            .await
    }

    async fn authenticate_with(&self, token: AccessToken) -> Result<Value, ClientError> {
        let conn = self.connection()?;
        self.state
            .transition(SessionState::Ready, SessionState::Authenticating);

        let result = conn
            .request(
                Command::Authenticate.as_str(),
                json!({ "access_token": token.access_token }),
                None,
                Some(self.config.request_timeout),
            )
            .await;
        self.state
            .transition(SessionState::Authenticating, SessionState::Ready);
        let data = result?;

        let user = data.get("user").cloned();
        let application = data.get("application").cloned();
        conn.set_auth(AuthInfo {
            token: Some(token),
            user: user.clone(),
            application: application.clone(),
        });

        let username = user
            .as_ref()
            .and_then(|u| u.get("username"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown user");
        tracing::info!("Authenticated as {}", username);
        let _ = self
            .events
            .send(SessionEvent::Authenticated { user, application });
        Ok(data)
    }

    /// Connects and, depending on the options, authorizes and authenticates.
    ///
    /// With an access token, AUTHORIZE is skipped. Without scopes and token
    /// the session stays unauthenticated.
    pub async fn login(&self, options: LoginOptions) -> Result<(), ClientError> {
        self.login_steps(options)
            .await
            .map_err(|e| ClientError::LoginFailed(Box::new(e)))
    }

    async fn login_steps(&self, options: LoginOptions) -> Result<(), ClientError> {
        self.connect().await?;

        if let Some(token) = &options.access_token {
            self.authenticate(token).await?;
            return Ok(());
        }
        if options.scopes.is_empty() {
            tracing::debug!("No scopes requested; staying unauthenticated");
            return Ok(());
        }

        let exchange = self.token_exchange.clone().unwrap_or_else(|| {
            let mut http = HttpTokenExchange::new();
            if let Some(endpoint) = &options.token_endpoint {
                http = http.with_token_endpoint(endpoint);
            }
            let http: Arc<dyn TokenExchange> = Arc::new(http);
            http
        });

        let rpc_token = match &options.rpc_token {
            RpcToken::None => None,
            RpcToken::Value(token) => Some(token.clone()),
            RpcToken::Fetch => Some(
                exchange
                    .rpc_token(self.client_id(), options.client_secret.as_deref())
                    .await?,
            ),
        };

        let code = self.authorize(&options, rpc_token).await?;
        let token = exchange
            .exchange(TokenRequest {
                code,
                client_id: self.config.client_id.clone(),
                client_secret: options.client_secret.clone(),
                redirect_uri: options.redirect_uri.clone(),
            })
            .await?;

        self.authenticate_with(token).await?;
        Ok(())
    }

    /// Sends AUTHORIZE and returns the authorization code.
    async fn authorize(
        &self,
        options: &LoginOptions,
        rpc_token: Option<String>,
    ) -> Result<String, ClientError> {
        let mut args = Map::new();
        args.insert("client_id".into(), json!(self.config.client_id));
        args.insert("scopes".into(), json!(options.scopes));
        if let Some(prompt) = &options.prompt {
            args.insert("prompt".into(), json!(prompt));
        }
        if let Some(token) = rpc_token {
            args.insert("rpc_token".into(), json!(token));
        }

        let data = self
            .request(Command::Authorize.as_str(), Value::Object(args), None)
            .await?;
        data.get("code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::MissingField("code").into())
    }

    /// Closes the connection, fails pending work and forgets the token.
    /// Idempotent.
    pub async fn destroy(&self) {
        let conn = self.conn.write().take();
        if let Some(conn) = conn {
            conn.close().await;
        }
        self.state.set(SessionState::Closed);
    }

    // =========================================================================
    // Requests and subscriptions
    // =========================================================================

    /// Sends an arbitrary command.
    pub async fn request(
        &self,
        command: &str,
        args: Value,
        evt: Option<&str>,
    ) -> Result<Value, ClientError> {
        let conn = self.connection()?;
        conn.request(command, args, evt, self.timeout_for(command))
            .await
    }

    /// Subscribes `handler` to an event. Handlers run on the read loop and
    /// should return quickly.
    pub async fn subscribe<F>(
        &self,
        event: &str,
        args: Value,
        handler: F,
    ) -> Result<Subscription, ClientError>
    where
        F: Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let conn = self.connection()?;
        let handler: EventHandler = Arc::new(handler);

        // Registered before SUBSCRIBE so no dispatch right behind the
        // response is missed.
        let (key, id) = conn.router().register(event, args.clone(), handler);
        let registered = RegisteredHandler::new(&conn, &key, id);
        conn.request(
            Command::Subscribe.as_str(),
            args.clone(),
            Some(event),
            Some(self.config.request_timeout),
        )
        .await?;
        registered.keep();

        tracing::debug!("Subscribed to {}", event);
        Ok(Subscription {
            conn,
            key,
            id,
            event: event.to_string(),
            args,
            timeout: self.config.request_timeout,
        })
    }

    /// Subscribes to an event and delivers its payloads on a channel.
    pub async fn subscribe_channel(
        &self,
        event: &str,
        args: Value,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<Value>), ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self
            .subscribe(event, args, move |data: &Value| {
                tx.send(data.clone())
                    .map_err(|_| HandlerError::from("receiver dropped"))
            })
            .await?;
        Ok((subscription, rx))
    }

    // =========================================================================
    // Activity
    // =========================================================================

    /// Validates and publishes an activity for `pid` (default: this process).
    pub async fn set_activity(
        &self,
        activity: &Activity,
        pid: Option<u32>,
    ) -> Result<ActivityOutcome, ClientError> {
        activity.validate()?;
        let conn = self.connection()?;
        let args = json!({
            "pid": pid.unwrap_or_else(std::process::id),
            "activity": activity,
        });
        conn.set_activity(args).await
    }

    /// Clears the activity for `pid` (default: this process).
    pub async fn clear_activity(&self, pid: Option<u32>) -> Result<ActivityOutcome, ClientError> {
        let conn = self.connection()?;
        let args = json!({ "pid": pid.unwrap_or_else(std::process::id) });
        conn.set_activity(args).await
    }

    /// Accepts a join request or invite from `user_id`.
    pub async fn send_join_invite(&self, user_id: &str) -> Result<Value, ClientError> {
        self.request(
            Command::SendActivityJoinInvite.as_str(),
            json!({ "user_id": user_id }),
            None,
        )
        .await
    }

    pub async fn send_join_request(&self, user_id: &str) -> Result<Value, ClientError> {
        self.request(
            Command::SendActivityJoinRequest.as_str(),
            json!({ "user_id": user_id }),
            None,
        )
        .await
    }

    /// Rejects a join request from `user_id`.
    pub async fn close_join_request(&self, user_id: &str) -> Result<Value, ClientError> {
        self.request(
            Command::CloseActivityJoinRequest.as_str(),
            json!({ "user_id": user_id }),
            None,
        )
        .await
    }

    // =========================================================================
    // Guilds and channels
    // =========================================================================

    /// Fetches a guild. `timeout` is the host-side lookup timeout in seconds.
    pub async fn get_guild(&self, guild_id: &str, timeout: Option<u64>) -> Result<Value, ClientError> {
        let mut args = json!({ "guild_id": guild_id });
        if let Some(timeout) = timeout {
            args["timeout"] = json!(timeout);
        }
        self.request(Command::GetGuild.as_str(), args, None).await
    }

    /// Lists the user's guilds.
    pub async fn get_guilds(&self, timeout: Option<u64>) -> Result<Vec<Value>, ClientError> {
        let mut args = json!({});
        if let Some(timeout) = timeout {
            args["timeout"] = json!(timeout);
        }
        let data = self.request(Command::GetGuilds.as_str(), args, None).await?;
        Ok(take_list(data, "guilds"))
    }

    pub async fn get_channel(
        &self,
        channel_id: &str,
        timeout: Option<u64>,
    ) -> Result<Value, ClientError> {
        let mut args = json!({ "channel_id": channel_id });
        if let Some(timeout) = timeout {
            args["timeout"] = json!(timeout);
        }
        self.request(Command::GetChannel.as_str(), args, None).await
    }

    /// Lists channels, of one guild or of all guilds.
    pub async fn get_channels(
        &self,
        guild_id: Option<&str>,
        timeout: Option<u64>,
    ) -> Result<Vec<Value>, ClientError> {
        let mut args = json!({});
        if let Some(guild_id) = guild_id {
            args["guild_id"] = json!(guild_id);
        }
        if let Some(timeout) = timeout {
            args["timeout"] = json!(timeout);
        }
        let data = self
            .request(Command::GetChannels.as_str(), args, None)
            .await?;
        Ok(take_list(data, "channels"))
    }

    /// Joins (or with `None`, leaves) a voice channel.
    pub async fn select_voice_channel(
        &self,
        channel_id: Option<&str>,
        timeout: Option<u64>,
        force: bool,
    ) -> Result<Value, ClientError> {
        let mut args = json!({ "channel_id": channel_id, "force": force });
        if let Some(timeout) = timeout {
            args["timeout"] = json!(timeout);
        }
        self.request(Command::SelectVoiceChannel.as_str(), args, None)
            .await
    }

    pub async fn select_text_channel(
        &self,
        channel_id: Option<&str>,
        timeout: Option<u64>,
    ) -> Result<Value, ClientError> {
        let mut args = json!({ "channel_id": channel_id });
        if let Some(timeout) = timeout {
            args["timeout"] = json!(timeout);
        }
        self.request(Command::SelectTextChannel.as_str(), args, None)
            .await
    }

    pub async fn get_relationships(&self) -> Result<Vec<Value>, ClientError> {
        let data = self
            .request(Command::GetRelationships.as_str(), json!({}), None)
            .await?;
        Ok(take_list(data, "relationships"))
    }

    // =========================================================================
    // Voice
    // =========================================================================

    /// Declares the hardware devices that handle echo cancellation etc.
    pub async fn set_certified_devices(&self, devices: Vec<Value>) -> Result<Value, ClientError> {
        self.request(
            Command::SetCertifiedDevices.as_str(),
            json!({ "devices": devices }),
            None,
        )
        .await
    }

    /// Sets per-user voice settings (`pan`, `volume`, `mute`).
    pub async fn set_user_voice_settings(
        &self,
        user_id: &str,
        settings: Value,
    ) -> Result<Value, ClientError> {
        let mut args = match settings {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        args.insert("user_id".into(), json!(user_id));
        self.request(
            Command::SetUserVoiceSettings.as_str(),
            Value::Object(args),
            None,
        )
        .await
    }

    pub async fn get_voice_settings(&self) -> Result<Value, ClientError> {
        self.request(Command::GetVoiceSettings.as_str(), json!({}), None)
            .await
    }

    pub async fn set_voice_settings(&self, settings: Value) -> Result<Value, ClientError> {
        self.request(Command::SetVoiceSettings.as_str(), settings, None)
            .await
    }

    /// Starts capturing a keyboard shortcut; `callback` receives each
    /// captured shortcut until the returned handle is stopped.
    pub async fn capture_shortcut<F>(&self, callback: F) -> Result<ShortcutCapture, ClientError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let conn = self.connection()?;
        let handler: EventHandler = Arc::new(move |data: &Value| {
            callback(data.get("shortcut").unwrap_or(data));
            Ok(())
        });
        let (key, id) = conn
            .router()
            .register(CAPTURE_SHORTCUT_CHANGE, Value::Null, handler);
        let registered = RegisteredHandler::new(&conn, &key, id);

        conn.request(
            Command::CaptureShortcut.as_str(),
            json!({ "action": "START" }),
            None,
            Some(self.config.request_timeout),
        )
        .await?;
        registered.keep();

        Ok(ShortcutCapture {
            conn,
            key,
            id,
            timeout: self.config.request_timeout,
        })
    }

    // =========================================================================
    // Lobbies
    // =========================================================================

    pub async fn create_lobby(
        &self,
        kind: LobbyType,
        capacity: u32,
        metadata: Value,
    ) -> Result<Value, ClientError> {
        self.request(
            Command::CreateLobby.as_str(),
            json!({ "type": kind, "capacity": capacity, "metadata": metadata }),
            None,
        )
        .await
    }

    pub async fn update_lobby(
        &self,
        lobby_id: &str,
        update: LobbyUpdate,
    ) -> Result<Value, ClientError> {
        let mut args = match serde_json::to_value(update)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        args.insert("id".into(), json!(lobby_id));
        self.request(Command::UpdateLobby.as_str(), Value::Object(args), None)
            .await
    }

    pub async fn delete_lobby(&self, lobby_id: &str) -> Result<Value, ClientError> {
        self.request(Command::DeleteLobby.as_str(), json!({ "id": lobby_id }), None)
            .await
    }

    pub async fn connect_to_lobby(&self, lobby_id: &str, secret: &str) -> Result<Value, ClientError> {
        self.request(
            Command::ConnectToLobby.as_str(),
            json!({ "id": lobby_id, "secret": secret }),
            None,
        )
        .await
    }

    pub async fn send_to_lobby(&self, lobby_id: &str, data: Value) -> Result<Value, ClientError> {
        self.request(
            Command::SendToLobby.as_str(),
            json!({ "id": lobby_id, "data": data }),
            None,
        )
        .await
    }

    pub async fn disconnect_from_lobby(&self, lobby_id: &str) -> Result<Value, ClientError> {
        self.request(
            Command::DisconnectFromLobby.as_str(),
            json!({ "id": lobby_id }),
            None,
        )
        .await
    }

    pub async fn update_lobby_member(
        &self,
        lobby_id: &str,
        user_id: &str,
        metadata: Value,
    ) -> Result<Value, ClientError> {
        self.request(
            Command::UpdateLobbyMember.as_str(),
            json!({ "lobby_id": lobby_id, "user_id": user_id, "metadata": metadata }),
            None,
        )
        .await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            conn.abort();
        }
    }
}

/// Removes a handler registered ahead of its request unless the request
/// succeeds, including when the caller's future is dropped mid-request.
struct RegisteredHandler<'a> {
    conn: &'a Connection,
    key: &'a SubscriptionKey,
    id: u64,
    armed: bool,
}

impl<'a> RegisteredHandler<'a> {
    fn new(conn: &'a Connection, key: &'a SubscriptionKey, id: u64) -> Self {
        Self {
            conn,
            key,
            id,
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for RegisteredHandler<'_> {
    fn drop(&mut self) {
        if self.armed && self.conn.router().remove(self.key, self.id) != Removal::NotFound {
            tracing::debug!("Dropped handler {} for {}", self.id, self.key.event);
        }
    }
}

fn take_list(mut data: Value, field: &str) -> Vec<Value> {
    match data.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Handle of an event subscription.
///
/// Dropping the handle keeps the handler registered for the life of the
/// connection; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    conn: Arc<Connection>,
    key: SubscriptionKey,
    id: u64,
    event: String,
    args: Value,
    timeout: Duration,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Removes the handler. UNSUBSCRIBE is sent once the last handler for
    /// this event and filter is gone.
    pub async fn unsubscribe(self) -> Result<(), ClientError> {
        match self.conn.router().remove(&self.key, self.id) {
            Removal::Last if !self.conn.is_closed() => {
                self.conn
                    .request(
                        Command::Unsubscribe.as_str(),
                        self.args,
                        Some(&self.event),
                        Some(self.timeout),
                    )
                    .await?;
                tracing::debug!("Unsubscribed from {}", self.event);
            }
            _ => {}
        }
        Ok(())
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("args", &self.args)
            .field("id", &self.id)
            .finish()
    }
}

/// Running shortcut capture.
pub struct ShortcutCapture {
    conn: Arc<Connection>,
    key: SubscriptionKey,
    id: u64,
    timeout: Duration,
}

impl ShortcutCapture {
    /// Stops the capture.
    pub async fn stop(self) -> Result<Value, ClientError> {
        self.conn.router().remove(&self.key, self.id);
        self.conn
            .request(
                Command::CaptureShortcut.as_str(),
                json!({ "action": "STOP" }),
                None,
                Some(self.timeout),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_type_wire_values() {
        assert_eq!(serde_json::to_value(LobbyType::Private).unwrap(), json!(1));
        assert_eq!(
            serde_json::from_value::<LobbyType>(json!(2)).unwrap(),
            LobbyType::Public
        );
        assert!(serde_json::from_value::<LobbyType>(json!(3)).is_err());
    }

    #[test]
    fn test_lobby_update_skips_unset_fields() {
        let update = LobbyUpdate {
            capacity: Some(4),
            owner: Some("u1".to_string()),
            ..LobbyUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            json!({ "capacity": 4, "owner_id": "u1" })
        );
    }

    #[test]
    fn test_take_list() {
        let data = json!({ "guilds": [{ "id": "1" }, { "id": "2" }] });
        assert_eq!(take_list(data, "guilds").len(), 2);
        assert!(take_list(json!({}), "guilds").is_empty());
    }

    #[tokio::test]
    async fn test_requests_before_connect_fail() {
        let (client, _server) = tokio::io::duplex(64);
        let session = Session::with_transport(
            SessionConfig::new("123"),
            crate::transport::StreamTransport::new(client),
        );

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.get_guilds(None).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            session.clear_activity(None).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_invalid_activity_rejected_before_connection_check() {
        let (client, _server) = tokio::io::duplex(64);
        let session = Session::with_transport(
            SessionConfig::new("123"),
            crate::transport::StreamTransport::new(client),
        );

        let err = session
            .set_activity(&Activity::new(""), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_destroy_without_connection_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let session = Session::with_transport(
            SessionConfig::new("123"),
            crate::transport::StreamTransport::new(client),
        );

        session.destroy().await;
        session.destroy().await;
        assert_eq!(session.state(), SessionState::Closed);
    }
}
