//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod connections;
pub mod messages;
pub mod watch;

use anyhow::{Context, Result};
use freme_core::api::ApiClient;
use freme_core::config::Config;
use freme_core::session::Session;

/// Where an unauthenticated command should connect.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub host: Option<String>,
    pub protocol: Option<String>,
}

impl Target {
    /// Resolves `(host, protocol)` from flags, then environment and config.
    pub fn resolve(&self, config: &Config) -> Result<(String, String)> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(|| config.effective_host())
            .context("No host given. Pass --host or set `host` in the config file.")?;
        let protocol = self
            .protocol
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map_or_else(|| config.effective_protocol(), str::to_string);
        Ok((host, protocol))
    }
}

pub(crate) fn client(config: &Config) -> Result<ApiClient> {
    ApiClient::from_config(config).context("create HTTP client")
}

pub(crate) fn require_session() -> Result<Session> {
    Session::load()
        .context("load session")?
        .context("Not logged in. Run `freme login` or `freme token` first.")
}
