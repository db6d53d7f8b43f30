//! Inbound message envelope.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::CorrelationId;
use crate::{BuddyError, Result};

/// One JSON line written by the target.
///
/// `command` carries the correlation id; every other key is a field value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    /// Correlation id as written by the target.
    pub command: String,
    #[serde(flatten)]
    values: Map<String, Value>,
}

impl InboundMessage {
    /// Parse one line (without its newline).
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Codec` when the line is not a JSON object with a
    /// string `command`.
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| BuddyError::Codec(format!("malformed json: {e}")))
    }

    /// Correlation id the message answers.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::UnknownCommand` when `command` is not an id this
    /// runtime could have issued.
    pub fn id(&self) -> Result<CorrelationId> {
        self.command
            .parse()
            .map_err(|_| BuddyError::UnknownCommand(self.command.clone()))
    }

    /// Raw string value of field `name`.
    ///
    /// # Errors
    ///
    /// `MissingField` when absent, `Parse` when the value is not a string.
    pub fn raw(&self, name: &str) -> Result<&str> {
        match self.values.get(name) {
            None => Err(BuddyError::MissingField(name.to_owned())),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(BuddyError::Parse {
                field: name.to_owned(),
                reason: format!("expected a string, got {other}"),
            }),
        }
    }

    /// Field names carried besides `command`.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
