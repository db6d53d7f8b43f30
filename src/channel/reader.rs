//! Inbound reader task.
//!
//! Reads newline-delimited JSON from the inbound pipe, routes each message
//! to the [`Registry`] and appends any reply the handler produced to the
//! reply pipe before taking the next line.
//!
//! The reader is driven by [`FramedRead`] backed by [`LineCodec`], so
//! several messages arriving in one physical read are handled one at a time,
//! in order, and a partial line waits for its newline.
//! A line the codec rejects (too long, not UTF-8) is logged and skipped; the
//! lines buffered after it are still handled.
//!
//! On Linux the pipe is opened read-write; the reader then holds a writer
//! end itself and never observes end-of-file between target writes. Other
//! platforms reopen the pipe after every end-of-file, pausing for the
//! configured backoff first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::unix::pipe;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::codec::{InboundFrame, LineCodec};
use crate::channel::reply::ReplyWriter;
use crate::config::ChannelConfig;
use crate::registry::{InboundMessage, Registry};
use crate::{BuddyError, Result};

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse one inbound line.
///
/// # Return value
///
/// - `Ok(Some(message))` for a JSON object carrying a `command`.
/// - `Ok(None)` for an empty or whitespace-only line.
///
/// # Errors
///
/// [`BuddyError::Codec`]`("malformed json: …")` when the line is not a
/// valid message.
pub fn parse_inbound_line(line: &str) -> Result<Option<InboundMessage>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    InboundMessage::parse(line).map(Some)
}

/// Shorten `line` to at most `max_chars` characters for logging.
#[must_use]
pub fn preview(line: &str, max_chars: usize) -> String {
    match line.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &line[..cut]),
        None => line.to_owned(),
    }
}

/// Everything the reader task needs, bundled so the task owns it.
#[derive(Debug)]
pub struct InboundReader {
    session: String,
    path: PathBuf,
    registry: Arc<Registry>,
    reply: ReplyWriter,
    reopen_backoff: Duration,
    preview_chars: usize,
}

impl InboundReader {
    /// Reader for the pipe at `path`, dispatching into `registry`.
    #[must_use]
    pub fn new(
        session: impl Into<String>,
        path: impl Into<PathBuf>,
        registry: Arc<Registry>,
        reply: ReplyWriter,
        config: &ChannelConfig,
    ) -> Self {
        Self {
            session: session.into(),
            path: path.into(),
            registry,
            reply,
            reopen_backoff: config.reopen_backoff(),
            preview_chars: config.log_preview_chars,
        }
    }

    /// Run until `cancel` fires or the pipe disappears.
    ///
    /// Malformed lines and lines for unknown ids are logged and skipped;
    /// they never stop the task.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Transport` when the pipe cannot be opened for a
    /// reason other than it having been removed.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let session = self.session.as_str();
        loop {
            let receiver = match open_inbound(&self.path) {
                Ok(receiver) => receiver,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(session, "inbound reader: pipe removed, stopping");
                    return Ok(());
                }
                Err(e) => {
                    warn!(session, error = %e, "inbound reader: cannot open pipe, stopping");
                    return Err(BuddyError::Transport(format!(
                        "cannot open inbound pipe {}: {e}",
                        self.path.display()
                    )));
                }
            };
            let mut framed = FramedRead::new(receiver, LineCodec::new());

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        debug!(session, "inbound reader: cancellation received, stopping");
                        return Ok(());
                    }

                    item = framed.next() => match item {
                        None => {
                            debug!(session, "inbound reader: EOF, reopening");
                            break;
                        }
                        Some(Ok(InboundFrame::Rejected(reason))) => {
                            warn!(
                                session,
                                error = reason.as_str(),
                                "inbound reader: framing error, skipping line"
                            );
                        }
                        Some(Ok(InboundFrame::Line(line))) => self.handle_line(&line).await,
                        Some(Err(e)) => {
                            warn!(session, error = %e, "inbound reader: IO error, reopening");
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.reopen_backoff) => {}
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        let session = self.session.as_str();
        let message = match parse_inbound_line(line) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                warn!(
                    session,
                    error = %e,
                    raw_line = %preview(line, self.preview_chars),
                    "inbound reader: parse error, skipping line"
                );
                return;
            }
        };

        let dispatched = match self.registry.dispatch(&message) {
            Ok(dispatched) => dispatched,
            Err(e) => {
                warn!(
                    session,
                    error = %e,
                    raw_line = %preview(line, self.preview_chars),
                    "inbound reader: no handler, dropping message"
                );
                return;
            }
        };
        debug!(session, id = %dispatched.id, "inbound reader: dispatched");

        if let Some(error) = &dispatched.error {
            warn!(session, id = %dispatched.id, error = %error, "inbound reader: handler failed");
        }
        if let Some(reply) = dispatched.reply {
            match self.reply.append(&reply.text).await {
                Ok(()) => reply.delivered(),
                Err(e) => {
                    warn!(session, id = %dispatched.id, error = %e, "inbound reader: reply not delivered");
                    reply.failed(e);
                }
            }
        }
    }
}

/// Open the inbound pipe for reading without blocking on a writer.
///
/// # Errors
///
/// Propagates the open error; `NotFound` means the pipe was removed.
pub fn open_inbound(path: &std::path::Path) -> std::io::Result<pipe::Receiver> {
    let mut options = pipe::OpenOptions::new();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    options.read_write(true);
    options.open_receiver(path)
}
