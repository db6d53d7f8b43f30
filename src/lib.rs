#![forbid(unsafe_code)]

//! Request/response runtime for a text-evaluating Kakoune session.
//!
//! The host sends command text to the target; the target answers by writing
//! one JSON line per request to a named pipe, and may block on a second pipe
//! until the host replies with more command text.

pub mod buddy;
pub mod channel;
pub mod config;
pub mod errors;
pub mod field;
pub mod registry;
pub mod snippet;
pub mod transport;

pub use buddy::Buddy;
pub use config::{BuddyConfig, ChannelConfig};
pub use errors::{BuddyError, Result};
pub use field::value::{Cursor, FieldValue, Fields, Pos};
pub use field::{FieldSet, FieldSpec};
pub use registry::{CorrelationId, Request, RequestState};
pub use transport::{ClientFocus, Delivery, Transport};
