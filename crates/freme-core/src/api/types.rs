//! Backend payloads.
//!
//! The backend owns these records; the client only reads the fields it
//! displays. Unknown fields are ignored and missing ones default.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub display_name: Option<String>,
    pub handle: String,
    pub user_id: Option<String>,
    pub created: Option<String>,
}

/// Connection status as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Someone asked to connect with us and we have not answered yet
    Pending,
    Connected,
    /// We asked to connect and are waiting on the other side
    Requested,
    Declined,
    #[serde(untagged)]
    Other(String),
}

impl ConnectionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ConnectionStatus::Pending)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Requested => "requested",
            ConnectionStatus::Declined => "declined",
            ConnectionStatus::Other(other) => other,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relationship record between the current user and another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub status: ConnectionStatus,
    #[serde(default)]
    pub unread_message_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl Connection {
    /// Display name, falling back to `handle@host`.
    pub fn label(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| self.address(), str::to_string)
    }

    pub fn address(&self) -> String {
        format!("{}@{}", self.handle, self.host)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: String,
    pub post_id: Option<String>,
    pub text: String,
    pub created: Option<String>,
    /// Signed URLs of attached files
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub created: Option<String>,
    /// Signed URLs of attached files
    pub files: Vec<String>,
    pub comments: Vec<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// Action accepted by `/manage-connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Connect,
    Decline,
    Delete,
}

impl ConnectionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionAction::Connect => "connect",
            ConnectionAction::Decline => "decline",
            ConnectionAction::Delete => "delete",
        }
    }
}

/// Result of exchanging an identity-provider token with `/firebase/check-user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckUser {
    /// The backend knows a profile for this identity
    Known,
    /// No profile yet; the user must finish sign-up
    NeedsSignup,
}
