//! Explicit state of a one-shot request.
//!
//! A request moves `Sent -> Completed` (plain ask) or
//! `Sent -> AwaitingReply -> Completed` (ask with reply). Any stage may end
//! in `Errored`. The host side holds a [`Request`]; the registry holds the
//! matching [`RequestTracker`] until the answer is dispatched.

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use tokio::sync::watch;

use super::CorrelationId;
use crate::field::Fields;
use crate::{BuddyError, Result};

/// Lifecycle of a one-shot request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    /// Snippet handed to the transport; no answer yet.
    Sent,
    /// Answer received and handled; reply not yet taken by the target.
    AwaitingReply,
    /// Finished with the decoded fields.
    Completed(Fields),
    /// Finished unsuccessfully.
    Errored(BuddyError),
}

impl RequestState {
    /// Whether no further transition can happen.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Errored(_))
    }
}

/// Registry-side handle that advances a request.
#[derive(Debug)]
pub struct RequestTracker {
    id: CorrelationId,
    tx: watch::Sender<RequestState>,
}

/// Caller-side handle observing a request.
///
/// Awaiting it (or calling [`Request::wait`]) yields the decoded fields.
#[derive(Debug)]
pub struct Request {
    id: CorrelationId,
    rx: watch::Receiver<RequestState>,
}

/// Linked tracker/request pair starting in [`RequestState::Sent`].
#[must_use]
pub fn request_pair(id: CorrelationId) -> (RequestTracker, Request) {
    let (tx, rx) = watch::channel(RequestState::Sent);
    (RequestTracker { id, tx }, Request { id, rx })
}

impl RequestTracker {
    /// Correlation id of the tracked request.
    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// The handler ran; its reply is on the way to the target.
    pub fn awaiting_reply(&self) {
        self.tx.send_replace(RequestState::AwaitingReply);
    }

    /// Settle successfully.
    pub fn complete(self, fields: Fields) {
        self.tx.send_replace(RequestState::Completed(fields));
    }

    /// Settle with `error`.
    pub fn fail(self, error: BuddyError) {
        self.tx.send_replace(RequestState::Errored(error));
    }
}

impl Request {
    /// Correlation id of this request.
    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.rx.borrow().clone()
    }

    /// Wait until the request settles.
    ///
    /// # Errors
    ///
    /// Returns the error the request settled with, or
    /// `BuddyError::Transport` if the session was torn down first.
    pub async fn wait(mut self) -> Result<Fields> {
        loop {
            if let Some(outcome) = self.settled() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return self.settled().unwrap_or_else(|| {
                    Err(BuddyError::Transport(format!(
                        "request {} abandoned before completion",
                        self.id
                    )))
                });
            }
        }
    }

    fn settled(&self) -> Option<Result<Fields>> {
        match &*self.rx.borrow() {
            RequestState::Completed(fields) => Some(Ok(fields.clone())),
            RequestState::Errored(err) => Some(Err(err.clone())),
            RequestState::Sent | RequestState::AwaitingReply => None,
        }
    }
}

impl IntoFuture for Request {
    type Output = Result<Fields>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<Fields>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
