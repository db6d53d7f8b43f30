//! Outbound transport to the target session.
//!
//! The [`Transport`] trait decouples the runtime from how text reaches the
//! target. [`kak::KakTransport`] pipes it to `kak -p <session>`;
//! [`recording::RecordingTransport`] captures it for inspection.
//!
//! A transport is bound to one session and, optionally, one client. Text
//! sent through a focused transport is wrapped so the target evaluates it
//! in that client's context.

pub mod kak;
pub mod recording;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::snippet::escape::quote;
use crate::Result;

/// How strictly a focused client must exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Fail in the target when the client is gone (`eval -client`).
    #[default]
    Required,
    /// Drop silently when the client is gone (`eval -try-client`).
    IfExists,
}

impl Delivery {
    /// Switch given to `eval`.
    #[must_use]
    pub fn flag(self) -> &'static str {
        match self {
            Self::Required => "-client",
            Self::IfExists => "-try-client",
        }
    }
}

/// Client a transport evaluates in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientFocus {
    /// Client name; `None` means session context.
    pub client: Option<String>,
    /// What to do when the client does not exist.
    pub delivery: Delivery,
}

impl ClientFocus {
    /// Session context, no client.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Focus `client`, failing in the target if it is gone.
    #[must_use]
    pub fn required(client: impl Into<String>) -> Self {
        Self {
            client: Some(client.into()),
            delivery: Delivery::Required,
        }
    }

    /// Focus `client` if it exists.
    #[must_use]
    pub fn if_exists(client: impl Into<String>) -> Self {
        Self {
            client: Some(client.into()),
            delivery: Delivery::IfExists,
        }
    }

    /// `text` wrapped so the target evaluates it in the focused client.
    #[must_use]
    pub fn wrap(&self, text: &str) -> String {
        match &self.client {
            None => text.to_owned(),
            Some(client) => format!(
                "eval {} {} {}",
                self.delivery.flag(),
                quote(client),
                quote(text)
            ),
        }
    }
}

/// Delivery of command text to the target session.
///
/// Implementations skip empty or whitespace-only text.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Session this transport talks to.
    fn session(&self) -> &str;

    /// Focused client, if any.
    fn client(&self) -> Option<&str>;

    /// Hand `text` to the target for evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Transport`](crate::BuddyError::Transport) when
    /// the text could not be delivered.
    fn send(&self, text: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Same session, evaluating in the context described by `focus`.
    fn focus(&self, focus: ClientFocus) -> Arc<dyn Transport>;
}

/// Whether `text` has nothing for the target to evaluate.
#[must_use]
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
