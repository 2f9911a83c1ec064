//! Activity (rich presence) value model.
//!
//! Activities are plain values: callers build one, [`Activity::validate`]
//! checks it against the host's limits, and the session sends it unchanged.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of buttons on an activity.
pub const MAX_BUTTONS: usize = 2;

/// Maximum length of a button label, in characters.
pub const MAX_BUTTON_LABEL_LEN: usize = 32;

/// Maximum length of a button url, in characters.
pub const MAX_BUTTON_URL_LEN: usize = 512;

/// Maximum length of free-text fields (details, state, asset hover texts).
pub const MAX_TEXT_LEN: usize = 128;

/// Kind of activity, shown as the verb in front of the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ActivityType {
    Playing = 0,
    Streaming = 1,
    Listening = 2,
    Watching = 3,
    Custom = 4,
    Competing = 5,
}

impl From<ActivityType> for u8 {
    fn from(value: ActivityType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for ActivityType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActivityType::Playing),
            1 => Ok(ActivityType::Streaming),
            2 => Ok(ActivityType::Listening),
            3 => Ok(ActivityType::Watching),
            4 => Ok(ActivityType::Custom),
            5 => Ok(ActivityType::Competing),
            other => Err(format!("unknown activity type: {other}")),
        }
    }
}

/// Which field the host shows in the member list status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StatusDisplayType {
    Name = 0,
    State = 1,
    Details = 2,
}

impl From<StatusDisplayType> for u8 {
    fn from(value: StatusDisplayType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for StatusDisplayType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusDisplayType::Name),
            1 => Ok(StatusDisplayType::State),
            2 => Ok(StatusDisplayType::Details),
            other => Err(format!("unknown status display type: {other}")),
        }
    }
}

/// Activity flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityFlags(u32);

impl ActivityFlags {
    pub const INSTANCE: u32 = 1 << 0;
    pub const JOIN: u32 = 1 << 1;
    pub const SPECTATE: u32 = 1 << 2;
    pub const JOIN_REQUEST: u32 = 1 << 3;
    pub const SYNC: u32 = 1 << 4;
    pub const PLAY: u32 = 1 << 5;
    pub const PARTY_PRIVACY_FRIENDS: u32 = 1 << 6;
    pub const PARTY_PRIVACY_VOICE_CHANNEL: u32 = 1 << 7;
    pub const EMBEDDED: u32 = 1 << 8;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with(mut self, flag: u32) -> Self {
        self.0 |= flag;
        self
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

/// Start/end timestamps in unix milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

impl ActivityTimestamps {
    /// Timestamps with only a start time ("elapsed" display).
    pub fn started_at(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start.timestamp_millis()),
            end: None,
        }
    }

    /// Timestamps with only an end time ("remaining" display).
    pub fn ending_at(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end.timestamp_millis()),
        }
    }

    /// Timestamps starting now.
    pub fn now() -> Self {
        Self::started_at(Utc::now())
    }
}

/// Emoji for custom statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEmoji {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,
}

/// Status emoji: a plain unicode emoji or an emoji object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusEmoji {
    Unicode(String),
    Custom(ActivityEmoji),
}

impl From<&str> for StatusEmoji {
    fn from(emoji: &str) -> Self {
        StatusEmoji::Unicode(emoji.to_string())
    }
}

impl From<String> for StatusEmoji {
    fn from(emoji: String) -> Self {
        StatusEmoji::Unicode(emoji)
    }
}

impl From<ActivityEmoji> for StatusEmoji {
    fn from(emoji: ActivityEmoji) -> Self {
        StatusEmoji::Custom(emoji)
    }
}

/// Party information; `size` is `[current, max]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityParty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
}

/// Images and hover texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAssets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_cover_image: Option<String>,
}

/// Secrets for join/spectate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySecrets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectate: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_secret: Option<String>,
}

impl ActivitySecrets {
    fn is_empty(&self) -> bool {
        self.join.is_none() && self.spectate.is_none() && self.match_secret.is_none()
    }
}

/// A clickable button under the activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityButton {
    pub label: String,
    pub url: String,
}

impl ActivityButton {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// A presence activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActivityType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<ActivityTimestamps>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_display_type: Option<StatusDisplayType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<StatusEmoji>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<ActivityParty>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<ActivityAssets>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<ActivitySecrets>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<ActivityFlags>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<ActivityButton>,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: ActivityType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_timestamps(mut self, timestamps: ActivityTimestamps) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<StatusEmoji>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn with_party(mut self, id: Option<String>, size: u32, max: u32) -> Self {
        self.party = Some(ActivityParty {
            id,
            size: Some([size, max]),
        });
        self
    }

    pub fn with_assets(mut self, assets: ActivityAssets) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_secrets(mut self, secrets: ActivitySecrets) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_button(mut self, button: ActivityButton) -> Self {
        self.buttons.push(button);
        self
    }

    pub fn with_instance(mut self, instance: bool) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn with_flags(mut self, flags: ActivityFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Checks the activity against the host's limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }

        check_text("details", self.details.as_deref())?;
        check_text("state", self.state.as_deref())?;

        if self.url.is_some() && self.kind != Some(ActivityType::Streaming) {
            return Err(ValidationError::UrlNotStreaming);
        }

        if let Some(ts) = &self.timestamps {
            if let (Some(start), Some(end)) = (ts.start, ts.end) {
                if start > end {
                    return Err(ValidationError::TimestampOrder { start, end });
                }
            }
        }

        if let Some([size, max]) = self.party.as_ref().and_then(|p| p.size) {
            if size == 0 {
                return Err(ValidationError::EmptyParty);
            }
            if size > max {
                return Err(ValidationError::PartySize { size, max });
            }
        }

        if let Some(assets) = &self.assets {
            check_text("assets.large_text", assets.large_text.as_deref())?;
            check_text("assets.small_text", assets.small_text.as_deref())?;
        }

        if self.buttons.len() > MAX_BUTTONS {
            return Err(ValidationError::TooManyButtons {
                count: self.buttons.len(),
                max: MAX_BUTTONS,
            });
        }
        for button in &self.buttons {
            check_len("button.label", &button.label, 1, MAX_BUTTON_LABEL_LEN)?;
            check_len("button.url", &button.url, 1, MAX_BUTTON_URL_LEN)?;
        }

        let has_secrets = self.secrets.as_ref().is_some_and(|s| !s.is_empty());
        if has_secrets && !self.buttons.is_empty() {
            return Err(ValidationError::ButtonsWithSecrets);
        }

        Ok(())
    }
}

fn check_text(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(text) => check_len(field, text, 1, MAX_TEXT_LEN),
        None => Ok(()),
    }
}

fn check_len(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::Length {
            field,
            len,
            min,
            max,
        });
    }
    Ok(())
}
