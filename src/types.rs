//! Wire types for the KCD backend.
//!
//! These mirror the backend's response schemas. Unknown fields are ignored
//! and optional fields default so older or newer backends still decode.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Auth & Users
// =============================================================================

/// Body of `POST /v1/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Plain-text password.
    pub password: String,
}

/// Successful login response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for subsequent calls.
    pub access_token: String,
    /// Always "bearer" in practice.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// The authenticated user.
    pub user: UserProfile,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// A user as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Numeric ids from the backend are accepted and kept as strings.
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
}

impl UserProfile {
    /// Name shown in the dashboard header.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

fn default_role() -> String {
    "user".to_string()
}

fn default_true() -> bool {
    true
}

/// Error body returned by the backend (`{"detail": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub detail: serde_json::Value,
}

impl ErrorDetail {
    /// Flatten `detail`, which is a string for HTTP errors and a list for
    /// validation errors.
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

// =============================================================================
// Workspaces
// =============================================================================

/// The user's workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default, deserialize_with = "opt_id_as_string")]
    pub id: Option<String>,
    #[serde(rename = "workspace_name")]
    pub name: String,
    #[serde(rename = "workspace_description", default)]
    pub description: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    /// Present when the backend inlines the owner's tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<String>,
    /// Raw theme string; may not be one of the known [`crate::theme::ThemeId`]s.
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub widgets: Vec<String>,
}

/// Body of `PUT /v1/workspaces/me`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceUpdate {
    pub theme: String,
}

// =============================================================================
// Chat
// =============================================================================

/// A chat partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Community,
    Moderator,
}

impl Channel {
    /// Every channel the client follows.
    pub const ALL: [Channel; 2] = [Channel::Community, Channel::Moderator];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Community => "community",
            Channel::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "community" => Ok(Channel::Community),
            "moderator" => Ok(Channel::Moderator),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub channel: Channel,
    #[serde(deserialize_with = "id_as_string")]
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /v1/chat/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub channel: Channel,
    pub content: String,
}

// =============================================================================
// Portfolio
// =============================================================================

/// Kind of an uploaded portfolio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// An uploaded portfolio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_id_as_string")]
    pub user_id: Option<String>,
    pub file_url: String,
    pub file_type: MediaKind,
    #[serde(default, deserialize_with = "opt_lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Lenient decoding helpers
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => s,
            RawId::Int(n) => n.to_string(),
        }
    }
}

fn id_as_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

fn opt_id_as_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(String::from))
}

/// The backend emits naive UTC timestamps (no offset); accept both forms.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn opt_lenient_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.and_then(|raw| parse_timestamp(&raw)))
}
