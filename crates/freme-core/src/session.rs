//! Session storage and retrieval.
//!
//! A session is the single credential the client holds for its lifetime:
//! either an identity-provider ID token (sent as a bearer token) or the
//! backend's `session` cookie from a password login. It is stored in
//! `<base>/session.json` with restricted permissions (0600).
//! Tokens are never logged or displayed in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;

/// Name of the backend's session cookie.
pub const SESSION_COOKIE: &str = "session";

/// Credential forwarded to the backend on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Identity-provider ID token, sent as `Authorization: Bearer <token>`.
    ///
    /// The backend keeps the signed-in profile in its `session` cookie,
    /// issued once `check-user` accepts the token; it rides along with the
    /// token from then on.
    Bearer {
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cookie: Option<String>,
    },
    /// Backend session cookie, sent as `Cookie: session=<value>`
    Cookie { value: String },
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential::Bearer {
            token: token.into(),
            cookie: None,
        }
    }

    fn secret(&self) -> &str {
        match self {
            Credential::Bearer { token, .. } => token,
            Credential::Cookie { value } => value,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Bearer { .. } => "bearer",
            Credential::Cookie { .. } => "cookie",
        }
    }

    /// The backend `session` cookie, if one has been issued.
    pub fn session_cookie(&self) -> Option<&str> {
        match self {
            Credential::Bearer { cookie, .. } => cookie.as_deref(),
            Credential::Cookie { value } => Some(value),
        }
    }

    /// Records a `session` cookie set by the backend.
    pub fn remember_cookie(&mut self, value: String) {
        match self {
            Credential::Bearer { cookie, .. } => *cookie = Some(value),
            Credential::Cookie { value: current } => *current = value,
        }
    }

    /// Attaches this credential to an outgoing request.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = match self {
            Credential::Bearer { token, .. } => request.bearer_auth(token),
            Credential::Cookie { .. } => request,
        };
        match self.session_cookie() {
            Some(value) => request.header(
                reqwest::header::COOKIE,
                format!("{SESSION_COOKIE}={value}"),
            ),
            None => request,
        }
    }
}

/// An authenticated session against one backend host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Backend host (`host[:port]`)
    pub host: String,
    /// `https` or `http`
    pub protocol: String,
    pub credential: Credential,
    /// Name shown to the user (display name or e-mail), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Session {
    /// Creates a session after checking that host and protocol form a valid URL.
    ///
    /// # Errors
    /// Returns an error if `<protocol>://<host>` is not a valid URL.
    pub fn new(
        host: impl Into<String>,
        protocol: impl Into<String>,
        credential: Credential,
    ) -> Result<Self> {
        let session = Self {
            host: host.into().trim().trim_end_matches('/').to_string(),
            protocol: protocol.into().trim().to_string(),
            credential,
            user: None,
        };
        let base = session.base_url();
        url::Url::parse(&base).with_context(|| format!("Invalid backend URL: {base}"))?;
        Ok(session)
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Returns `<protocol>://<host>`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }

    /// Returns the credential in a form safe for display.
    pub fn masked_credential(&self) -> String {
        format!(
            "{} {}",
            self.credential.kind(),
            mask_token(self.credential.secret())
        )
    }

    /// Loads the session from the default location.
    /// Returns `None` if no session has been saved.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&paths::session_path())
    }

    /// Loads the session from a specific path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session from {}", path.display()))?;

        serde_json::from_str(&contents)
            .map(Some)
            .with_context(|| format!("Failed to parse session from {}", path.display()))
    }

    /// Saves the session to the default location.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&paths::session_path())
    }

    /// Saves the session with restricted permissions (0600).
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize session")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        #[cfg(not(unix))]
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        tracing::debug!(host = %self.host, credential = %self.masked_credential(), "session saved");
        Ok(())
    }

    /// Removes the session saved at the default location.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear() -> Result<bool> {
        Self::clear_at(&paths::session_path())
    }

    /// Removes a saved session. Returns whether one existed.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear_at(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove session at {}", path.display()))?;
        Ok(true)
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    match token.char_indices().nth(12) {
        Some((idx, _)) if token.chars().count() > 16 => format!("{}...", &token[..idx]),
        _ => "***".to_string(),
    }
}
