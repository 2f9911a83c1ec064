//! JSON payload types for handshake, command requests, responses and
//! event dispatches.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Event name the host uses for error responses.
pub const ERROR_EVENT: &str = "ERROR";

/// Event name of the dispatch that completes the handshake.
pub const READY_EVENT: &str = "READY";

/// RPC commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    // Unsolicited events
    Dispatch,

    // Authorization
    Authorize,
    Authenticate,

    // Guilds and channels
    GetGuild,
    GetGuilds,
    GetChannel,
    GetChannels,
    SelectVoiceChannel,
    SelectTextChannel,

    // Subscriptions
    Subscribe,
    Unsubscribe,

    // Voice
    SetCertifiedDevices,
    SetUserVoiceSettings,
    GetVoiceSettings,
    SetVoiceSettings,
    CaptureShortcut,

    // Activity
    SetActivity,
    SendActivityJoinInvite,
    SendActivityJoinRequest,
    CloseActivityJoinRequest,

    // Lobbies
    CreateLobby,
    UpdateLobby,
    DeleteLobby,
    ConnectToLobby,
    SendToLobby,
    DisconnectFromLobby,
    UpdateLobbyMember,

    // Relationships
    GetRelationships,
}

impl Command {
    /// Returns the wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Dispatch => "DISPATCH",
            Command::Authorize => "AUTHORIZE",
            Command::Authenticate => "AUTHENTICATE",
            Command::GetGuild => "GET_GUILD",
            Command::GetGuilds => "GET_GUILDS",
            Command::GetChannel => "GET_CHANNEL",
            Command::GetChannels => "GET_CHANNELS",
            Command::SelectVoiceChannel => "SELECT_VOICE_CHANNEL",
            Command::SelectTextChannel => "SELECT_TEXT_CHANNEL",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::SetCertifiedDevices => "SET_CERTIFIED_DEVICES",
            Command::SetUserVoiceSettings => "SET_USER_VOICE_SETTINGS",
            Command::GetVoiceSettings => "GET_VOICE_SETTINGS",
            Command::SetVoiceSettings => "SET_VOICE_SETTINGS",
            Command::CaptureShortcut => "CAPTURE_SHORTCUT",
            Command::SetActivity => "SET_ACTIVITY",
            Command::SendActivityJoinInvite => "SEND_ACTIVITY_JOIN_INVITE",
            Command::SendActivityJoinRequest => "SEND_ACTIVITY_JOIN_REQUEST",
            Command::CloseActivityJoinRequest => "CLOSE_ACTIVITY_JOIN_REQUEST",
            Command::CreateLobby => "CREATE_LOBBY",
            Command::UpdateLobby => "UPDATE_LOBBY",
            Command::DeleteLobby => "DELETE_LOBBY",
            Command::ConnectToLobby => "CONNECT_TO_LOBBY",
            Command::SendToLobby => "SEND_TO_LOBBY",
            Command::DisconnectFromLobby => "DISCONNECT_FROM_LOBBY",
            Command::UpdateLobbyMember => "UPDATE_LOBBY_MEMBER",
            Command::GetRelationships => "GET_RELATIONSHIPS",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake payload (opcode 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Protocol version.
    pub v: u32,
    /// Application client id.
    pub client_id: String,
}

impl Handshake {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: crate::PROTOCOL_VERSION,
            client_id: client_id.into(),
        }
    }
}

/// Outbound command request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Command name. Free-form so callers can reach commands this crate
    /// has no helper for.
    pub cmd: String,

    /// Command arguments.
    #[serde(default)]
    pub args: Value,

    /// Correlation id echoed back in the response.
    pub nonce: String,

    /// Event name (SUBSCRIBE/UNSUBSCRIBE only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evt: Option<String>,
}

impl Request {
    pub fn new(cmd: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: Value::Object(Default::default()),
            nonce: nonce.into(),
            evt: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_event(mut self, evt: impl Into<String>) -> Self {
        self.evt = Some(evt.into());
        self
    }
}

/// Error body carried by an `ERROR` response or a CLOSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorData {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Inbound message carried by a FRAME opcode.
///
/// Responses echo `cmd` and `nonce`; dispatches carry `cmd: "DISPATCH"`,
/// an `evt` and no nonce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl Message {
    /// Parses a message out of a frame payload.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        if !value.is_object() {
            return Err(ProtocolError::MalformedFrame {
                reason: "message payload is not an object".to_string(),
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Builds a dispatch message for an event.
    pub fn dispatch(evt: impl Into<String>, data: Value) -> Self {
        Self {
            cmd: Some(Command::Dispatch.as_str().to_string()),
            evt: Some(evt.into()),
            nonce: None,
            data,
            args: None,
        }
    }

    /// Builds a successful response to a request.
    pub fn response(cmd: impl Into<String>, nonce: impl Into<String>, data: Value) -> Self {
        Self {
            cmd: Some(cmd.into()),
            evt: None,
            nonce: Some(nonce.into()),
            data,
            args: None,
        }
    }

    /// Builds an error response to a request.
    pub fn error(
        cmd: impl Into<String>,
        nonce: impl Into<String>,
        code: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            cmd: Some(cmd.into()),
            evt: Some(ERROR_EVENT.to_string()),
            nonce: Some(nonce.into()),
            data: serde_json::json!({ "code": code, "message": message.into() }),
            args: None,
        }
    }

    /// Returns whether this is an unsolicited event dispatch.
    pub fn is_dispatch(&self) -> bool {
        self.nonce.is_none() && self.cmd.as_deref() == Some(Command::Dispatch.as_str())
    }

    /// Returns whether this message reports an error.
    pub fn is_error(&self) -> bool {
        self.evt.as_deref() == Some(ERROR_EVENT)
    }

    /// Extracts the error body of an error message.
    pub fn error_data(&self) -> Option<RpcErrorData> {
        if !self.is_error() {
            return None;
        }
        Some(serde_json::from_value(self.data.clone()).unwrap_or(RpcErrorData {
            code: 0,
            message: self.data.to_string(),
        }))
    }
}

/// Host configuration announced in the READY dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyConfig {
    #[serde(default)]
    pub cdn_host: Option<String>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

/// Data of the READY dispatch that completes the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadyData {
    #[serde(default)]
    pub v: Option<u32>,
    #[serde(default)]
    pub config: ReadyConfig,
    #[serde(default)]
    pub user: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_serialization() {
        let json = serde_json::to_string(&Command::SetActivity).unwrap();
        assert_eq!(json, "\"SET_ACTIVITY\"");

        let parsed: Command = serde_json::from_str("\"GET_GUILDS\"").unwrap();
        assert_eq!(parsed, Command::GetGuilds);
    }

    #[test]
    fn test_command_as_str_matches_serde() {
        for cmd in [
            Command::Authenticate,
            Command::CloseActivityJoinRequest,
            Command::DisconnectFromLobby,
            Command::SetUserVoiceSettings,
        ] {
            let json = serde_json::to_value(cmd).unwrap();
            assert_eq!(json, Value::String(cmd.as_str().to_string()));
        }
    }

    #[test]
    fn test_request_shape() {
        let request = Request::new("AUTHENTICATE", "n1").with_args(json!({"access_token": "tok"}));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"cmd": "AUTHENTICATE", "args": {"access_token": "tok"}, "nonce": "n1"})
        );
    }

    #[test]
    fn test_subscribe_request_carries_event() {
        let request = Request::new("SUBSCRIBE", "n2").with_event("CHANNEL_CREATE");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["evt"], "CHANNEL_CREATE");
    }

    #[test]
    fn test_dispatch_classification() {
        let msg = Message::from_value(json!({
            "cmd": "DISPATCH",
            "evt": "READY",
            "data": {"v": 1}
        }))
        .unwrap();
        assert!(msg.is_dispatch());
        assert!(!msg.is_error());
    }

    #[test]
    fn test_error_response() {
        let msg = Message::error("GET_GUILD", "n3", 4000, "Invalid guild id");
        assert!(msg.is_error());
        assert!(!msg.is_dispatch());

        let data = msg.error_data().unwrap();
        assert_eq!(data.code, 4000);
        assert_eq!(data.message, "Invalid guild id");
    }

    #[test]
    fn test_error_data_with_unexpected_body() {
        let msg = Message {
            evt: Some(ERROR_EVENT.to_string()),
            data: json!("boom"),
            ..Default::default()
        };
        let data = msg.error_data().unwrap();
        assert_eq!(data.code, 0);
        assert!(data.message.contains("boom"));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let result = Message::from_value(json!([1, 2, 3]));
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
    }

    #[test]
    fn test_ready_data() {
        let ready: ReadyData = serde_json::from_value(json!({
            "v": 1,
            "config": {"cdn_host": "cdn.example.com", "environment": "production"},
            "user": {"id": "u1", "username": "snek"}
        }))
        .unwrap();
        assert_eq!(ready.v, Some(1));
        assert_eq!(ready.config.cdn_host.as_deref(), Some("cdn.example.com"));
        assert_eq!(ready.user.unwrap()["id"], "u1");
    }
}
