//! Error types shared across the buddy runtime.

use std::fmt::{Display, Formatter};

/// Shared buddy result type.
pub type Result<T> = std::result::Result<T, BuddyError>;

/// Error enumeration covering every protocol failure mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuddyError {
    /// A field name, command name, path or message cannot be embedded in a
    /// snippet safely. Raised before anything is sent.
    Encoding(String),
    /// An inbound message lacks a field its request declared.
    MissingField(String),
    /// A field value failed its typed conversion.
    Parse {
        /// Field whose value was rejected.
        field: String,
        /// Why the raw value was rejected.
        reason: String,
    },
    /// An inbound message references a correlation id nobody is waiting on.
    UnknownCommand(String),
    /// The target session or the pipes are unreachable.
    Transport(String),
    /// A user callback failed or panicked.
    Handler(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// Inbound line framing failure (line too long, bad UTF-8).
    Codec(String),
    /// File-system or pipe I/O failure.
    Io(String),
}

impl Display for BuddyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encoding(msg) => write!(f, "encoding: {msg}"),
            Self::MissingField(field) => write!(f, "missing field: {field}"),
            Self::Parse { field, reason } => write!(f, "parse: field `{field}`: {reason}"),
            Self::UnknownCommand(id) => write!(f, "unknown command: {id}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Handler(msg) => write!(f, "handler: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for BuddyError {}

impl From<toml::de::Error> for BuddyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for BuddyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
