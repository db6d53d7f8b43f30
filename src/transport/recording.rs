//! In-process transport that records what would have been sent.
//!
//! Used by the tests and by `kak-buddy --dry-run`. Focused copies share the
//! same log, so one recording covers every client of a runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::{is_blank, ClientFocus, Transport};
use crate::{BuddyError, Result};

/// One recorded send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSnippet {
    /// Session it was addressed to.
    pub session: String,
    /// Focus at the time of sending.
    pub focus: ClientFocus,
    /// Text as handed to the transport, before client wrapping.
    pub text: String,
}

#[derive(Debug, Default)]
struct Shared {
    log: Mutex<Vec<SentSnippet>>,
    fail: AtomicBool,
    sink: Mutex<Option<mpsc::UnboundedSender<SentSnippet>>>,
}

/// Transport appending every send to a shared log.
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    session: String,
    focus: ClientFocus,
    shared: Arc<Shared>,
}

impl RecordingTransport {
    /// Recorder for `session`.
    #[must_use]
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            focus: ClientFocus::none(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Also forward each recorded send to the returned receiver.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SentSnippet> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .shared
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    /// Make subsequent sends fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, fail: bool) {
        self.shared.fail.store(fail, Ordering::SeqCst);
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentSnippet> {
        self.shared
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded sends.
    #[must_use]
    pub fn count(&self) -> usize {
        self.shared
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, text: String) -> Result<()> {
        if self.shared.fail.load(Ordering::SeqCst) {
            return Err(BuddyError::Transport(format!(
                "session {} unreachable",
                self.session
            )));
        }
        if is_blank(&text) {
            return Ok(());
        }
        let snippet = SentSnippet {
            session: self.session.clone(),
            focus: self.focus.clone(),
            text,
        };
        debug!(
            session = self.session,
            client = self.focus.client.as_deref(),
            "recorded snippet"
        );
        if let Some(sink) = self
            .shared
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            // A dropped receiver only stops forwarding; the log still records.
            let _ = sink.send(snippet.clone());
        }
        self.shared
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snippet);
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn session(&self) -> &str {
        &self.session
    }

    fn client(&self) -> Option<&str> {
        self.focus.client.as_deref()
    }

    fn send(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let outcome = self.record(text);
        Box::pin(async move { outcome })
    }

    fn focus(&self, focus: ClientFocus) -> Arc<dyn Transport> {
        Arc::new(Self {
            session: self.session.clone(),
            focus,
            shared: Arc::clone(&self.shared),
        })
    }
}
