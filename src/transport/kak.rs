//! `kak -p` transport.
//!
//! Every send spawns `kak -p <session>` with the text on stdin. The child
//! evaluates it in the session and exits; a non-zero status (unknown
//! session, for instance) becomes a transport error carrying its stderr.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{is_blank, ClientFocus, Transport};
use crate::config::BuddyConfig;
use crate::{BuddyError, Result};

/// Transport piping text into `kak -p`.
#[derive(Debug, Clone)]
pub struct KakTransport {
    binary: String,
    session: String,
    focus: ClientFocus,
}

impl KakTransport {
    /// Transport for `session` using the `kak` executable at `binary`.
    #[must_use]
    pub fn new(binary: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            session: session.into(),
            focus: ClientFocus::none(),
        }
    }

    /// Unfocused transport for the session and binary in `config`; the
    /// configured client is applied with [`crate::Buddy::focus`].
    #[must_use]
    pub fn from_config(config: &BuddyConfig) -> Self {
        Self::new(&config.kak_binary, &config.session)
    }

    async fn deliver(&self, text: String) -> Result<()> {
        if is_blank(&text) {
            return Ok(());
        }
        let payload = self.focus.wrap(&text);

        let mut child = Command::new(&self.binary)
            .arg("-p")
            .arg(&self.session)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuddyError::Transport(format!("failed to spawn {}: {e}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BuddyError::Transport("child stdin unavailable".into()))?;
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| BuddyError::Transport(format!("write to {} failed: {e}", self.binary)))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BuddyError::Transport(format!("{} did not finish: {e}", self.binary)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuddyError::Transport(format!(
                "{} -p {} exited with {}: {}",
                self.binary,
                self.session,
                output.status,
                stderr.trim()
            )));
        }
        debug!(
            session = self.session,
            client = self.focus.client.as_deref(),
            bytes = payload.len(),
            "snippet sent"
        );
        Ok(())
    }
}

impl Transport for KakTransport {
    fn session(&self) -> &str {
        &self.session
    }

    fn client(&self) -> Option<&str> {
        self.focus.client.as_deref()
    }

    fn send(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.deliver(text))
    }

    fn focus(&self, focus: ClientFocus) -> Arc<dyn Transport> {
        Arc::new(Self {
            binary: self.binary.clone(),
            session: self.session.clone(),
            focus,
        })
    }
}
