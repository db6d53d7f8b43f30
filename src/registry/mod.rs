//! Correlation registry.
//!
//! Issues correlation ids and maps each one to the handler waiting for the
//! target's answer. One-shot entries are taken out of the map in the same
//! critical section that finds them, so a duplicate or late line for the
//! same id cannot fire twice. Persistent entries (commands declared in the
//! target) stay until teardown or until the command is redefined.
//!
//! Handlers run outside the lock; they may register further requests.

pub mod message;
pub mod request;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::field::{FieldSet, Fields};
use crate::snippet::escape::quote;
use crate::{BuddyError, Result};

pub use message::InboundMessage;
pub use request::{request_pair, Request, RequestState, RequestTracker};

/// Error type user callbacks may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a reply-producing callback: target command text to evaluate.
pub type ReplyResult = std::result::Result<String, HandlerError>;

/// Persistent callback without reply.
pub type CommandHandler = Arc<dyn Fn(Fields) + Send + Sync>;

/// Persistent callback producing a reply.
pub type ReplyHandler = Arc<dyn Fn(Fields) -> ReplyResult + Send + Sync>;

/// One-shot callback producing a reply.
pub type OnceReplyHandler = Box<dyn FnOnce(Fields) -> ReplyResult + Send>;

/// Process-unique token shared by a snippet and the line it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// What to do when the answer for an entry arrives.
pub enum Responder {
    /// Settle a one-shot request with the decoded fields.
    Notify(RequestTracker),
    /// Run a one-shot callback, send its reply, then settle the request.
    OnceReply(OnceReplyHandler, RequestTracker),
    /// Run a persistent callback on every invocation.
    Command(CommandHandler),
    /// Run a persistent callback on every invocation and send its reply.
    CommandReply(ReplyHandler),
}

impl Responder {
    /// Whether the entry survives dispatch.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Command(_) | Self::CommandReply(_))
    }

    /// Whether the target blocks on a reply for this entry.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        matches!(self, Self::OnceReply(..) | Self::CommandReply(_))
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Notify(_) => "Notify",
            Self::OnceReply(..) => "OnceReply",
            Self::Command(_) => "Command",
            Self::CommandReply(_) => "CommandReply",
        };
        f.write_str(kind)
    }
}

/// Registry entry: the fields asked for and the responder.
#[derive(Debug)]
pub struct PendingEntry {
    fields: Vec<String>,
    responder: Responder,
}

impl PendingEntry {
    /// Requested field names, in request order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether the entry survives dispatch.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.responder.is_persistent()
    }
}

/// Reply text the reader must append to the reply pipe.
#[derive(Debug)]
pub struct PendingReply {
    /// Target command text.
    pub text: String,
    settle: Option<(RequestTracker, Result<Fields>)>,
}

impl PendingReply {
    fn detached(text: String) -> Self {
        Self { text, settle: None }
    }

    /// The target has the reply; settle the request with its outcome.
    pub fn delivered(self) {
        match self.settle {
            Some((tracker, Ok(fields))) => tracker.complete(fields),
            Some((tracker, Err(err))) => tracker.fail(err),
            None => {}
        }
    }

    /// The reply could not be appended.
    pub fn failed(self, error: BuddyError) {
        if let Some((tracker, _)) = self.settle {
            tracker.fail(error);
        }
    }
}

/// Outcome of dispatching one inbound message to a known entry.
#[derive(Debug)]
pub struct Dispatched {
    /// Entry the message answered.
    pub id: CorrelationId,
    /// Reply owed to the target, if the entry expects one.
    pub reply: Option<PendingReply>,
    /// Decode or handler failure; a reply, if owed, is still present.
    pub error: Option<BuddyError>,
}

/// Map of in-flight correlation ids to their handlers.
#[derive(Debug)]
pub struct Registry {
    fields: FieldSet,
    next_id: AtomicU64,
    entries: Mutex<HashMap<CorrelationId, PendingEntry>>,
    commands: Mutex<HashMap<String, CorrelationId>>,
}

impl Registry {
    /// Empty registry resolving fields against `fields`.
    #[must_use]
    pub fn new(fields: FieldSet) -> Self {
        Self {
            fields,
            next_id: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
            commands: Mutex::new(HashMap::new()),
        }
    }

    /// Field table entries are decoded with.
    #[must_use]
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Reserve the next correlation id.
    #[must_use]
    pub fn next_id(&self) -> CorrelationId {
        CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Store `responder` under a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Encoding` when a requested field is undeclared.
    pub fn register(&self, requested: &[String], responder: Responder) -> Result<CorrelationId> {
        let id = self.next_id();
        self.insert(id, requested, responder)?;
        Ok(id)
    }

    /// Store `responder` under `id`, which must come from [`Self::next_id`].
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Encoding` when a requested field is undeclared.
    pub fn insert(
        &self,
        id: CorrelationId,
        requested: &[String],
        responder: Responder,
    ) -> Result<()> {
        for name in requested {
            self.fields.require(name)?;
        }
        self.entries().insert(
            id,
            PendingEntry {
                fields: requested.to_vec(),
                responder,
            },
        );
        Ok(())
    }

    /// Bind command `name` to `id`, dropping the entry of its previous
    /// definition. Returns the replaced id.
    pub fn bind_command(&self, name: &str, id: CorrelationId) -> Option<CorrelationId> {
        let previous = lock(&self.commands).insert(name.to_owned(), id);
        if let Some(old) = previous.filter(|old| *old != id) {
            self.remove(old);
            debug!(command = name, old = %old, new = %id, "registry: command redefined");
        }
        previous
    }

    /// Id currently bound to command `name`.
    #[must_use]
    pub fn command_id(&self, name: &str) -> Option<CorrelationId> {
        lock(&self.commands).get(name).copied()
    }

    /// Drop the entry for `id`; true if one existed.
    pub fn remove(&self, id: CorrelationId) -> bool {
        self.entries().remove(&id).is_some()
    }

    /// Whether `id` has an entry.
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries().contains_key(&id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no entry is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop every entry, failing outstanding one-shot requests with `reason`.
    pub fn clear(&self, reason: &str) {
        let drained: Vec<PendingEntry> = self.entries().drain().map(|(_, e)| e).collect();
        lock(&self.commands).clear();
        for entry in drained {
            match entry.responder {
                Responder::Notify(tracker) | Responder::OnceReply(_, tracker) => {
                    tracker.fail(BuddyError::Transport(reason.to_owned()));
                }
                Responder::Command(_) | Responder::CommandReply(_) => {}
            }
        }
    }

    /// Route one inbound message to its entry.
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::UnknownCommand` when no entry matches. Decode
    /// and handler failures are reported in [`Dispatched::error`] instead,
    /// because a reply may still be owed.
    pub fn dispatch(&self, message: &InboundMessage) -> Result<Dispatched> {
        let id = message.id()?;
        let taken = {
            let mut entries = self.entries();
            let persistent = match entries.get(&id) {
                None => return Err(BuddyError::UnknownCommand(message.command.clone())),
                Some(entry) => match &entry.responder {
                    Responder::Command(handler) => {
                        Some(Taken::Command(entry.fields.clone(), Arc::clone(handler)))
                    }
                    Responder::CommandReply(handler) => {
                        Some(Taken::CommandReply(entry.fields.clone(), Arc::clone(handler)))
                    }
                    Responder::Notify(_) | Responder::OnceReply(..) => None,
                },
            };
            match persistent {
                Some(taken) => taken,
                None => match entries.remove(&id) {
                    Some(entry) => Taken::Once(entry),
                    None => return Err(BuddyError::UnknownCommand(message.command.clone())),
                },
            }
        };

        let mut dispatched = Dispatched {
            id,
            reply: None,
            error: None,
        };
        match taken {
            Taken::Once(PendingEntry { fields, responder }) => {
                let decoded = self.fields.decode(&fields, message);
                match (responder, decoded) {
                    (Responder::Notify(tracker), Ok(fields)) => tracker.complete(fields),
                    (Responder::OnceReply(handler, tracker), Ok(fields)) => {
                        tracker.awaiting_reply();
                        let (text, error) = run_reply(id, || handler(fields.clone()));
                        let outcome = match &error {
                            Some(err) => Err(err.clone()),
                            None => Ok(fields),
                        };
                        dispatched.reply = Some(PendingReply {
                            text,
                            settle: Some((tracker, outcome)),
                        });
                        dispatched.error = error;
                    }
                    (Responder::OnceReply(_, tracker), Err(err)) => {
                        dispatched.reply = Some(PendingReply::detached(diagnostic(id, &err)));
                        tracker.fail(err.clone());
                        dispatched.error = Some(err);
                    }
                    (Responder::Notify(tracker), Err(err)) => {
                        tracker.fail(err.clone());
                        dispatched.error = Some(err);
                    }
                    (Responder::Command(_) | Responder::CommandReply(_), _) => {}
                }
            }
            Taken::Command(fields, handler) => match self.fields.decode(&fields, message) {
                Ok(fields) => {
                    let outcome = catch_unwind(AssertUnwindSafe(|| handler(fields)));
                    dispatched.error = outcome.err().map(|panic| panic_error(id, &*panic));
                }
                Err(err) => dispatched.error = Some(err),
            },
            Taken::CommandReply(fields, handler) => match self.fields.decode(&fields, message) {
                Ok(fields) => {
                    let (text, error) = run_reply(id, || handler(fields));
                    dispatched.reply = Some(PendingReply::detached(text));
                    dispatched.error = error;
                }
                Err(err) => {
                    dispatched.reply = Some(PendingReply::detached(diagnostic(id, &err)));
                    dispatched.error = Some(err);
                }
            },
        }
        Ok(dispatched)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingEntry>> {
        lock(&self.entries)
    }
}

enum Taken {
    Once(PendingEntry),
    Command(Vec<String>, CommandHandler),
    CommandReply(Vec<String>, ReplyHandler),
}

/// Placeholder reply for a request whose handler failed; it only logs in the
/// target so the blocked evaluation can finish.
#[must_use]
pub fn diagnostic(id: CorrelationId, error: &BuddyError) -> String {
    format!(
        "echo -debug {}",
        quote(&format!("kak-buddy: request {id} failed: {error}"))
    )
}

fn run_reply(
    id: CorrelationId,
    handler: impl FnOnce() -> ReplyResult,
) -> (String, Option<BuddyError>) {
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(text)) => (text, None),
        Ok(Err(err)) => {
            let err = BuddyError::Handler(err.to_string());
            (diagnostic(id, &err), Some(err))
        }
        Err(panic) => {
            let err = panic_error(id, &*panic);
            (diagnostic(id, &err), Some(err))
        }
    }
}

fn panic_error(id: CorrelationId, panic: &(dyn std::any::Any + Send)) -> BuddyError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    BuddyError::Handler(format!("handler for {id} panicked: {detail}"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
