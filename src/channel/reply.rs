//! Reply pipe writer.
//!
//! A synchronous request leaves the target blocked in `cat <reply pipe>`.
//! The host answers by opening the pipe for writing, appending the reply
//! text and closing it, which ends the target's read.
//!
//! The pipe is opened non-blocking: while the target has not reached its
//! read yet the open fails with `ENXIO` and is retried every poll interval,
//! up to the configured timeout. Nothing is ever left blocked in a thread
//! waiting on a reader that will not come.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::{BuddyError, Result};

/// Appends replies to the reply pipe.
#[derive(Debug, Clone)]
pub struct ReplyWriter {
    path: PathBuf,
    timeout: Option<Duration>,
    poll: Duration,
}

impl ReplyWriter {
    /// Writer for the pipe at `path` tuned by `config`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: &ChannelConfig) -> Self {
        Self {
            path: path.into(),
            timeout: config.reply_timeout(),
            poll: config.reply_poll(),
        }
    }

    /// Pipe being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `text` and close the pipe so the target's read completes.
    ///
    /// # Errors
    ///
    /// - `BuddyError::Transport` when the pipe is gone (teardown) or no
    ///   reader shows up within the timeout.
    /// - `BuddyError::Io` when the write itself fails.
    pub async fn append(&self, text: &str) -> Result<()> {
        let mut sender = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.open())
                .await
                .map_err(|_| {
                    BuddyError::Transport(format!(
                        "no reader on {} after {limit:?}",
                        self.path.display()
                    ))
                })??,
            None => self.open().await?,
        };
        sender
            .write_all(text.as_bytes())
            .await
            .map_err(|e| BuddyError::Io(format!("reply write failed: {e}")))?;
        sender
            .flush()
            .await
            .map_err(|e| BuddyError::Io(format!("reply flush failed: {e}")))?;
        debug!(bytes = text.len(), "reply appended");
        Ok(())
    }

    async fn open(&self) -> Result<pipe::Sender> {
        loop {
            match pipe::OpenOptions::new().open_sender(&self.path) {
                Ok(sender) => return Ok(sender),
                Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                    tokio::time::sleep(self.poll).await;
                }
                Err(e) => {
                    return Err(BuddyError::Transport(format!(
                        "cannot open reply pipe {}: {e}",
                        self.path.display()
                    )));
                }
            }
        }
    }
}
