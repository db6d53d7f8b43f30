//! Session configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{BuddyError, Result};

/// Tuning for the inbound and reply pipes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    /// Upper bound on how long a reply append waits for the target to open
    /// the reply pipe; 0 means wait forever.
    #[serde(default = "default_reply_timeout_seconds")]
    pub reply_timeout_seconds: u64,
    /// Interval between attempts to open the reply pipe for writing.
    #[serde(default = "default_reply_poll_millis")]
    pub reply_poll_millis: u64,
    /// Pause before reopening the inbound pipe after end-of-stream.
    #[serde(default = "default_reopen_backoff_millis")]
    pub reopen_backoff_millis: u64,
    /// Number of characters of an inbound line shown in log records.
    #[serde(default = "default_log_preview_chars")]
    pub log_preview_chars: usize,
    /// Prefix of the temporary directory holding the pipes.
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
}

fn default_reply_timeout_seconds() -> u64 {
    10
}

fn default_reply_poll_millis() -> u64 {
    5
}

fn default_reopen_backoff_millis() -> u64 {
    10
}

fn default_log_preview_chars() -> usize {
    160
}

fn default_temp_prefix() -> String {
    "kak-buddy".into()
}

fn default_kak_binary() -> String {
    "kak".into()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reply_timeout_seconds: default_reply_timeout_seconds(),
            reply_poll_millis: default_reply_poll_millis(),
            reopen_backoff_millis: default_reopen_backoff_millis(),
            log_preview_chars: default_log_preview_chars(),
            temp_prefix: default_temp_prefix(),
        }
    }
}

impl ChannelConfig {
    /// Host-side bound on a reply append, `None` when unbounded.
    #[must_use]
    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_seconds > 0).then_some(Duration::from_secs(self.reply_timeout_seconds))
    }

    /// Interval between reply-pipe open attempts.
    #[must_use]
    pub fn reply_poll(&self) -> Duration {
        Duration::from_millis(self.reply_poll_millis)
    }

    /// Pause before an inbound reopen.
    #[must_use]
    pub fn reopen_backoff(&self) -> Duration {
        Duration::from_millis(self.reopen_backoff_millis)
    }
}

/// Buddy configuration parsed from `kak-buddy.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BuddyConfig {
    /// Kakoune session to talk to (`kak -p <session>`).
    pub session: String,
    /// Client that outbound snippets are evaluated in, if any.
    #[serde(default)]
    pub client: Option<String>,
    /// Kakoune executable.
    #[serde(default = "default_kak_binary")]
    pub kak_binary: String,
    /// Pipe tuning.
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl BuddyConfig {
    /// Configuration for `session` with every other setting defaulted.
    #[must_use]
    pub fn for_session(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            client: None,
            kak_binary: default_kak_binary(),
            channel: ChannelConfig::default(),
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| BuddyError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.session.trim().is_empty() {
            return Err(BuddyError::Config("session must not be empty".into()));
        }
        if self.session.chars().any(char::is_whitespace) {
            return Err(BuddyError::Config(
                "session must not contain whitespace".into(),
            ));
        }
        if let Some(client) = &self.client {
            if client.is_empty() || client.chars().any(char::is_whitespace) {
                return Err(BuddyError::Config(format!("invalid client name: {client:?}")));
            }
        }
        if self.kak_binary.trim().is_empty() {
            return Err(BuddyError::Config("kak_binary must not be empty".into()));
        }
        if self.channel.reply_poll_millis == 0 {
            return Err(BuddyError::Config(
                "channel.reply_poll_millis must be greater than zero".into(),
            ));
        }
        if self.channel.log_preview_chars == 0 {
            return Err(BuddyError::Config(
                "channel.log_preview_chars must be greater than zero".into(),
            ));
        }
        if self.channel.temp_prefix.is_empty()
            || !self
                .channel
                .temp_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(BuddyError::Config(format!(
                "channel.temp_prefix must be non-empty [A-Za-z0-9_-]: {:?}",
                self.channel.temp_prefix
            )));
        }
        Ok(())
    }
}
