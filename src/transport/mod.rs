//! Request/response transport to the wallet context
//!
//! ```text
//!   Signer ──send──▶ Transport ──outbound──▶ wallet context
//!                      │  pending: HashMap<MessageId, PendingRequest>
//!   Signer ◀─oneshot── Transport ◀─inbound── (Ready | Message | Closed)
//! ```
//!
//! - At most one context is live at a time; `open` reuses it.
//! - Sends issued before the context reports `Ready` are queued and flushed
//!   in order once it does.
//! - Responses are matched on `requestId`, never by arrival order. Anything
//!   that does not parse or names no pending request is ignored.
//! - When the context closes every request still pending on it fails with
//!   [`Error::TransportClosed`].

pub mod channel;
pub mod memory;

use crate::message::{MessageId, RequestContent, RpcRequestMessage, RpcResponseMessage};
use crate::{Error, Result};
use channel::{ChannelConnector, ChannelEvent};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use url::Url;

/// Lifecycle of a request that has not been answered yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Registered, waiting for the context to become ready
    Sent,
    /// Transmitted, waiting for the response
    Awaiting,
}

struct PendingRequest {
    generation: u64,
    method: Option<String>,
    chain_id: Option<u64>,
    created_at: Instant,
    state: PendingState,
    completion: oneshot::Sender<Result<RpcResponseMessage>>,
}

struct TransportSession {
    generation: u64,
    outbound: mpsc::UnboundedSender<Value>,
    ready: watch::Sender<bool>,
    deferred: Vec<(MessageId, Value)>,
}

impl TransportSession {
    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }
}

#[derive(Default)]
struct TransportState {
    session: Option<TransportSession>,
    pending: HashMap<MessageId, PendingRequest>,
}

struct Inner {
    connector: Arc<dyn ChannelConnector>,
    url: Url,
    timeout: Option<Duration>,
    open_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    state: Mutex<TransportState>,
}

/// Handle to the transport; clones share the same context and pending map
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("url", &self.inner.url.as_str())
            .field("open", &self.is_open())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Transport {
    pub fn new(connector: Arc<dyn ChannelConnector>, url: Url) -> Self {
        Self::with_timeout(connector, url, None)
    }

    /// Fail requests that wait longer than `timeout`
    pub fn with_timeout(
        connector: Arc<dyn ChannelConnector>,
        url: Url,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                url,
                timeout,
                open_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                state: Mutex::new(TransportState::default()),
            }),
        }
    }

    /// Whether a context is currently live
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().session.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Ids of unanswered requests (for diagnostics)
    pub fn pending_ids(&self) -> Vec<MessageId> {
        self.inner.state.lock().pending.keys().copied().collect()
    }

    /// Open the context, or reuse the live one, and wait until it is ready.
    ///
    /// With a request timeout configured, a context that never reports ready
    /// is closed and the call fails with [`Error::Timeout`].
    pub async fn open(&self) -> Result<()> {
        let _guard = self.inner.open_lock.lock().await;

        let existing = self
            .inner
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| (s.generation, s.ready.subscribe()));

        let (generation, mut ready) = match existing {
            Some(existing) => existing,
            None => self.connect().await?,
        };

        let became_ready = ready.wait_for(|ready| *ready);
        let outcome = match self.inner.timeout {
            None => became_ready.await.map(|_| ()),
            Some(limit) => match tokio::time::timeout(limit, became_ready).await {
                Ok(outcome) => outcome.map(|_| ()),
                Err(_) => {
                    tracing::warn!(generation, ?limit, "Wallet context never became ready");
                    self.inner.close(Some(generation));
                    return Err(Error::Timeout(limit));
                }
            },
        };
        outcome.map_err(|_| Error::TransportClosed)
    }

    async fn connect(&self) -> Result<(u64, watch::Receiver<bool>)> {
        let link = self.inner.connector.connect(&self.inner.url).await?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (ready_tx, ready_rx) = watch::channel(false);

        self.inner.state.lock().session = Some(TransportSession {
            generation,
            outbound: link.outbound,
            ready: ready_tx,
            deferred: Vec::new(),
        });

        tracing::info!(generation, url = %self.inner.url, "Opened wallet context");
        tokio::spawn(read_loop(Arc::downgrade(&self.inner), generation, link.inbound));
        Ok((generation, ready_rx))
    }

    /// Send content under a fresh correlation id.
    ///
    /// The context must have been opened; the message is queued if it is not
    /// ready yet.
    pub fn send(&self, content: RequestContent) -> Result<PendingResponse> {
        let message = RpcRequestMessage::new(content);
        let id = message.id;
        let (method, chain_id) = match &message.content {
            RequestContent::Action { action, chain_id } => {
                (Some(action.method.clone()), Some(*chain_id))
            }
            RequestContent::Handshake { handshake } => (Some(handshake.method.clone()), None),
            RequestContent::Encrypted { .. } => (None, None),
        };
        let raw = serde_json::to_value(&message)?;
        let (completion, rx) = oneshot::channel();

        let mut state = self.inner.state.lock();
        let Some(session) = state.session.as_mut() else {
            return Err(Error::TransportClosed);
        };
        let generation = session.generation;

        let pending_state = if session.is_ready() {
            if session.outbound.send(raw).is_err() {
                return Err(Error::TransportClosed);
            }
            PendingState::Awaiting
        } else {
            session.deferred.push((id, raw));
            PendingState::Sent
        };

        state.pending.insert(
            id,
            PendingRequest {
                generation,
                method: method.clone(),
                chain_id,
                created_at: Instant::now(),
                state: pending_state,
                completion,
            },
        );
        tracing::debug!(
            request_id = %id,
            method = method.as_deref().unwrap_or("<encrypted>"),
            chain_id,
            state = ?pending_state,
            pending = state.pending.len(),
            "Registered pending request"
        );

        Ok(PendingResponse {
            id,
            rx,
            timeout: self.inner.timeout,
            transport: Arc::downgrade(&self.inner),
        })
    }

    /// Open (or reuse) the context, send, and wait for the correlated response
    pub async fn request(&self, content: RequestContent) -> Result<RpcResponseMessage> {
        self.open().await?;
        self.send(content)?.wait().await
    }

    /// Route a raw inbound message to its pending request
    pub fn on_message(&self, raw: Value) {
        self.inner.on_message(raw);
    }

    /// Close the live context; pending requests fail with `TransportClosed`
    pub fn close(&self) {
        self.inner.close(None);
    }
}

/// Receiving side of a sent request
#[derive(Debug)]
pub struct PendingResponse {
    id: MessageId,
    rx: oneshot::Receiver<Result<RpcResponseMessage>>,
    timeout: Option<Duration>,
    transport: Weak<Inner>,
}

impl PendingResponse {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub async fn wait(self) -> Result<RpcResponseMessage> {
        let outcome = match self.timeout {
            None => self.rx.await,
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    if let Some(inner) = self.transport.upgrade() {
                        inner.state.lock().pending.remove(&self.id);
                    }
                    tracing::warn!(request_id = %self.id, ?limit, "Request timed out");
                    return Err(Error::Timeout(limit));
                }
            },
        };
        outcome.unwrap_or(Err(Error::TransportClosed))
    }
}

impl Inner {
    fn mark_ready(&self, generation: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut().filter(|s| s.generation == generation) else {
            return;
        };
        if session.is_ready() {
            return;
        }

        let deferred = std::mem::take(&mut session.deferred);
        tracing::debug!(generation, flushed = deferred.len(), "Wallet context ready");
        for (id, raw) in deferred {
            if session.outbound.send(raw).is_err() {
                break;
            }
            if let Some(pending) = state.pending.get_mut(&id) {
                pending.state = PendingState::Awaiting;
            }
        }
        session.ready.send_replace(true);
    }

    fn on_message(&self, raw: Value) {
        let message: RpcResponseMessage = match serde_json::from_value(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unrecognized message");
                return;
            }
        };

        let Some(pending) = self.state.lock().pending.remove(&message.request_id) else {
            tracing::debug!(request_id = %message.request_id, "Ignoring response with no pending request");
            return;
        };

        tracing::debug!(
            request_id = %message.request_id,
            method = pending.method.as_deref().unwrap_or("<encrypted>"),
            chain_id = pending.chain_id,
            state = ?pending.state,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            "Resolved pending request"
        );
        let _ = pending.completion.send(Ok(message));
    }

    /// Tear down the session. `generation` restricts the close to one session,
    /// so a stale reader cannot close its successor.
    fn close(&self, generation: Option<u64>) {
        let failed: Vec<PendingRequest> = {
            let mut state = self.state.lock();
            let matches = state
                .session
                .as_ref()
                .is_some_and(|s| generation.map_or(true, |g| s.generation == g));
            if !matches {
                return;
            }
            let closed = state.session.take().map(|s| s.generation);
            let ids: Vec<MessageId> = state
                .pending
                .iter()
                .filter(|(_, p)| Some(p.generation) == closed)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| state.pending.remove(id)).collect()
        };

        tracing::info!(failed = failed.len(), "Wallet context closed");
        for pending in failed {
            let _ = pending.completion.send(Err(Error::TransportClosed));
        }
    }
}

async fn read_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(strong) = inner.upgrade() else {
            return;
        };
        match event {
            ChannelEvent::Ready => strong.mark_ready(generation),
            ChannelEvent::Message(raw) => strong.on_message(raw),
            ChannelEvent::Closed => break,
        }
    }
    if let Some(inner) = inner.upgrade() {
        inner.close(Some(generation));
    }
}
