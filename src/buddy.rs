//! Runtime facade.
//!
//! A [`Buddy`] owns one session's pipes, registry and reader task, plus an
//! outbound [`Transport`]. Focusing on a client yields another `Buddy`
//! sharing everything except the transport, so correlation ids stay unique
//! across all clients of the session.
//!
//! Every request is registered before its snippet is sent; a failed send
//! removes the entry again.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::reader::InboundReader;
use crate::channel::reply::ReplyWriter;
use crate::channel::Channels;
use crate::config::ChannelConfig;
use crate::field::{FieldSet, Fields};
use crate::registry::{
    request_pair, CorrelationId, OnceReplyHandler, Registry, ReplyResult, Request, Responder,
};
use crate::snippet::SnippetBuilder;
use crate::transport::{ClientFocus, Transport};
use crate::{BuddyError, Result};

#[derive(Debug)]
struct Session {
    registry: Arc<Registry>,
    snippets: SnippetBuilder,
    channels: Channels,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<Result<()>>>>,
    torn_down: AtomicBool,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handle on a running session, optionally focused on one client.
#[derive(Debug, Clone)]
pub struct Buddy {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
}

impl Buddy {
    /// Create the pipes, start the reader and declare the helper commands in
    /// the target.
    ///
    /// # Errors
    ///
    /// - `BuddyError::Transport` if the pipes cannot be created or the
    ///   helper declarations cannot be sent.
    /// - `BuddyError::Encoding` if the pipe paths cannot be embedded.
    pub async fn init(
        fields: FieldSet,
        transport: Arc<dyn Transport>,
        config: &ChannelConfig,
    ) -> Result<Self> {
        let channels = Channels::create(config)?;
        let snippets = SnippetBuilder::new(fields.clone(), channels.inbound(), channels.reply())?;
        let registry = Arc::new(Registry::new(fields));
        let cancel = CancellationToken::new();

        let reader = InboundReader::new(
            transport.session(),
            channels.inbound(),
            Arc::clone(&registry),
            ReplyWriter::new(channels.reply(), config),
            config,
        );
        let handle = tokio::spawn(reader.run(cancel.clone()));

        let buddy = Self {
            session: Arc::new(Session {
                registry,
                snippets,
                channels,
                cancel,
                reader: Mutex::new(Some(handle)),
                torn_down: AtomicBool::new(false),
            }),
            transport,
        };

        if let Err(err) = buddy.transport.send(buddy.session.snippets.prelude()).await {
            if let Err(cleanup) = buddy.teardown().await {
                warn!(error = %cleanup, "teardown after failed init also failed");
            }
            return Err(err);
        }
        info!(
            session = buddy.session(),
            inbound = %buddy.inbound_path().display(),
            "buddy session ready"
        );
        Ok(buddy)
    }

    /// Same session, evaluating in `client`; the target reports an error if
    /// the client does not exist.
    #[must_use]
    pub fn focus(&self, client: impl Into<String>) -> Self {
        self.with_focus(ClientFocus::required(client))
    }

    /// Same session, evaluating in `client` only if it exists.
    #[must_use]
    pub fn focus_if_exists(&self, client: impl Into<String>) -> Self {
        self.with_focus(ClientFocus::if_exists(client))
    }

    /// Same session, evaluating in session context.
    #[must_use]
    pub fn unfocused(&self) -> Self {
        self.with_focus(ClientFocus::none())
    }

    fn with_focus(&self, focus: ClientFocus) -> Self {
        Self {
            session: Arc::clone(&self.session),
            transport: self.transport.focus(focus),
        }
    }

    /// Target session name.
    #[must_use]
    pub fn session(&self) -> &str {
        self.transport.session()
    }

    /// Focused client, if any.
    #[must_use]
    pub fn client(&self) -> Option<&str> {
        self.transport.client()
    }

    /// Registry shared by every focus of this session.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.session.registry
    }

    /// Snippet builder bound to this session's pipes.
    #[must_use]
    pub fn snippets(&self) -> &SnippetBuilder {
        &self.session.snippets
    }

    /// Pipe the target writes answers to.
    #[must_use]
    pub fn inbound_path(&self) -> &Path {
        self.session.channels.inbound()
    }

    /// Pipe the target reads replies from.
    #[must_use]
    pub fn reply_path(&self) -> &Path {
        self.session.channels.reply()
    }

    /// Send `text` for evaluation without expecting anything back.
    ///
    /// # Errors
    ///
    /// `BuddyError::Transport` after teardown or when delivery fails.
    pub async fn msg(&self, text: &str) -> Result<()> {
        self.ensure_live()?;
        self.transport.send(text.to_owned()).await
    }

    /// Ask the target for `fields`.
    ///
    /// # Errors
    ///
    /// `BuddyError::Encoding` for an undeclared field, nothing sent;
    /// `BuddyError::Transport` after teardown or when delivery fails.
    pub async fn ask(&self, fields: &[&str]) -> Result<Request> {
        self.request(None, fields, None).await
    }

    /// Ask the target for `fields` and answer with the text `handler`
    /// returns; the target blocks until the answer arrives.
    ///
    /// # Errors
    ///
    /// As [`Self::ask`].
    pub async fn ask_with_reply<F>(&self, fields: &[&str], handler: F) -> Result<Request>
    where
        F: FnOnce(Fields) -> ReplyResult + Send + 'static,
    {
        self.request(None, fields, Some(Box::new(handler))).await
    }

    /// Evaluate `text`, then ask for `fields`.
    ///
    /// # Errors
    ///
    /// As [`Self::ask`].
    pub async fn msg_and_ask(&self, text: &str, fields: &[&str]) -> Result<Request> {
        self.request(Some(text), fields, None).await
    }

    /// Evaluate `text`, ask for `fields` and answer with `handler`'s reply.
    ///
    /// # Errors
    ///
    /// As [`Self::msg_and_ask`].
    pub async fn msg_and_ask_with_reply<F>(
        &self,
        text: &str,
        fields: &[&str],
        handler: F,
    ) -> Result<Request>
    where
        F: FnOnce(Fields) -> ReplyResult + Send + 'static,
    {
        self.request(Some(text), fields, Some(Box::new(handler)))
            .await
    }

    /// Evaluate `text`; the request completes once the target got past it.
    ///
    /// # Errors
    ///
    /// As [`Self::msg_and_ask`].
    pub async fn msg_and_then(&self, text: &str) -> Result<Request> {
        self.request(Some(text), &[], None).await
    }

    /// Evaluate `text`, then block the target until `handler`'s reply is
    /// evaluated after it.
    ///
    /// # Errors
    ///
    /// As [`Self::msg_and_ask`].
    pub async fn msg_with_reply<F>(&self, text: &str, handler: F) -> Result<Request>
    where
        F: FnOnce() -> ReplyResult + Send + 'static,
    {
        self.request(Some(text), &[], Some(Box::new(move |_| handler())))
            .await
    }

    /// Declare target command `name` that calls `handler` with `fields`
    /// every time it runs. Redefining `name` replaces the previous handler.
    ///
    /// `params` is the declaration's switch list, e.g. `-params 0..1`.
    ///
    /// # Errors
    ///
    /// `BuddyError::Encoding` for an unsafe name, bad parameters or an
    /// undeclared field; `BuddyError::Transport` as for [`Self::msg`].
    pub async fn def<F>(
        &self,
        name: &str,
        params: &str,
        fields: &[&str],
        handler: F,
    ) -> Result<CorrelationId>
    where
        F: Fn(Fields) + Send + Sync + 'static,
    {
        self.define(name, params, fields, Responder::Command(Arc::new(handler)))
            .await
    }

    /// Like [`Self::def`], but the command blocks until `handler`'s reply
    /// has been evaluated.
    ///
    /// # Errors
    ///
    /// As [`Self::def`].
    pub async fn def_with_reply<F>(
        &self,
        name: &str,
        params: &str,
        fields: &[&str],
        handler: F,
    ) -> Result<CorrelationId>
    where
        F: Fn(Fields) -> ReplyResult + Send + Sync + 'static,
    {
        self.define(
            name,
            params,
            fields,
            Responder::CommandReply(Arc::new(handler)),
        )
        .await
    }

    /// Stop the reader, fail outstanding requests and remove the pipes.
    ///
    /// Safe to call more than once; later calls do nothing.
    ///
    /// # Errors
    ///
    /// `BuddyError::Io` if the pipes or their directory cannot be removed.
    pub async fn teardown(&self) -> Result<()> {
        if self.session.torn_down.swap(true, Ordering::SeqCst) {
            debug!(session = self.session(), "teardown: already done");
            return Ok(());
        }
        self.session.cancel.cancel();
        self.session.registry.clear("session torn down");
        let removed = self.session.channels.teardown();

        let reader = self
            .session
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "inbound reader ended with error"),
                Err(err) => warn!(error = %err, "inbound reader task failed"),
            }
        }
        removed?;
        info!(session = self.session(), "buddy session torn down");
        Ok(())
    }

    /// Whether [`Self::teardown`] has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.session.torn_down.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_torn_down() {
            Err(BuddyError::Transport("session torn down".into()))
        } else {
            Ok(())
        }
    }

    async fn request(
        &self,
        message: Option<&str>,
        fields: &[&str],
        reply: Option<OnceReplyHandler>,
    ) -> Result<Request> {
        self.ensure_live()?;
        let requested = owned(fields);
        let registry = &self.session.registry;
        let id = registry.next_id();

        let mut snippet = self.session.snippets.request(id, &requested)?;
        if reply.is_some() {
            snippet = self.session.snippets.with_reply(&snippet);
        }
        if let Some(message) = message {
            snippet = SnippetBuilder::prefixed(message, &snippet);
        }

        let (tracker, request) = request_pair(id);
        let responder = match reply {
            Some(handler) => Responder::OnceReply(handler, tracker),
            None => Responder::Notify(tracker),
        };
        registry.insert(id, &requested, responder)?;
        self.send_registered(id, snippet).await?;
        debug!(
            session = self.session(),
            client = self.client(),
            id = %id,
            fields = ?requested,
            "request sent"
        );
        Ok(request)
    }

    async fn define(
        &self,
        name: &str,
        params: &str,
        fields: &[&str],
        responder: Responder,
    ) -> Result<CorrelationId> {
        self.ensure_live()?;
        let requested = owned(fields);
        let registry = &self.session.registry;
        let id = registry.next_id();

        let mut body = self.session.snippets.request(id, &requested)?;
        if responder.expects_reply() {
            body = self.session.snippets.with_reply(&body);
        }
        let declaration = SnippetBuilder::declare(name, params, &body)?;

        registry.insert(id, &requested, responder)?;
        self.send_registered(id, declaration).await?;
        registry.bind_command(name, id);
        info!(session = self.session(), command = name, id = %id, "command defined");
        Ok(id)
    }

    async fn send_registered(&self, id: CorrelationId, text: String) -> Result<()> {
        if let Err(err) = self.transport.send(text).await {
            self.session.registry.remove(id);
            return Err(err);
        }
        Ok(())
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| (*f).to_owned()).collect()
}
