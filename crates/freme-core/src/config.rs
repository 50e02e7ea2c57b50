//! Configuration management for freme.
//!
//! Loads configuration from ${FREME_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for freme configuration and data directories.
    //!
    //! FREME_HOME resolution order:
    //! 1. FREME_HOME environment variable (if set)
    //! 2. ~/.config/freme (default)

    use std::path::PathBuf;

    /// Returns the freme home directory.
    ///
    /// Checks FREME_HOME env var first, falls back to ~/.config/freme
    /// (or ./.config/freme when no home directory can be determined).
    pub fn freme_home() -> PathBuf {
        if let Ok(home) = std::env::var("FREME_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("freme")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        freme_home().join("config.toml")
    }

    /// Returns the path to the persisted session file.
    pub fn session_path() -> PathBuf {
        freme_home().join("session.json")
    }

    /// Returns the directory used for rolling log files.
    pub fn logs_dir() -> PathBuf {
        freme_home().join("logs")
    }
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// New comments from the template stay present while the user's
/// values win.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(arr) => {
                target[key] = Item::ArrayOfTables(arr.clone());
            }
            Item::None => {}
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend host (`host[:port]`), if one has been chosen
    pub host: Option<String>,

    /// Protocol used to reach the backend
    pub protocol: String,

    /// Seconds between connection-info refreshes
    pub poll_interval_secs: u64,

    /// Dwell time before a focused message is marked read
    pub mark_read_delay_ms: u64,

    /// HTTP request timeout in seconds (0 disables)
    pub request_timeout_secs: u64,

    /// Write logs to a rolling file instead of stderr
    pub log_to_file: bool,
}

impl Config {
    pub const DEFAULT_PROTOCOL: &str = "https";
    const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
    const DEFAULT_MARK_READ_DELAY_MS: u64 = 2000;
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Saves only the host (and protocol) to the config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, merged or written.
    pub fn save_host(host: &str, protocol: &str) -> Result<()> {
        Self::save_host_to(&paths::config_path(), host, protocol)
    }

    /// Saves only the host (and protocol) to a specific config file path.
    ///
    /// Creates the file with default template if it doesn't exist.
    /// If file exists, merges user values into the latest template.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, merged or written.
    pub fn save_host_to(path: &Path, host: &str, protocol: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["host"] = value(host);
        doc["protocol"] = value(protocol);

        Self::write_config(path, &doc.to_string())
    }

    /// Returns the backend host, preferring `FREME_HOST` over the file.
    pub fn effective_host(&self) -> Option<String> {
        non_empty_env("FREME_HOST").or_else(|| {
            self.host
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }

    /// Returns the protocol, preferring `FREME_PROTOCOL` over the file.
    pub fn effective_protocol(&self) -> String {
        non_empty_env("FREME_PROTOCOL").unwrap_or_else(|| {
            let trimmed = self.protocol.trim();
            if trimmed.is_empty() {
                Self::DEFAULT_PROTOCOL.to_string()
            } else {
                trimmed.to_string()
            }
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn mark_read_delay(&self) -> Duration {
        Duration::from_millis(self.mark_read_delay_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_secs))
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename).
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            protocol: Self::DEFAULT_PROTOCOL.to_string(),
            poll_interval_secs: Self::DEFAULT_POLL_INTERVAL_SECS,
            mark_read_delay_ms: Self::DEFAULT_MARK_READ_DELAY_MS,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            log_to_file: false,
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
