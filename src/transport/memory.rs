//! In-memory channel
//!
//! Each `connect` hands a [`RemoteEnd`] to whoever plays the wallet: the
//! [`WalletHost`](crate::wallet::WalletHost) or a test driving the protocol by hand.

use super::channel::{ChannelConnector, ChannelEvent, ChannelLink};
use crate::message::{ResponseContent, RpcRequestMessage, RpcResponseMessage};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Wallet side of an in-memory context
#[derive(Debug)]
pub struct RemoteEnd {
    pub url: Url,
    requests: mpsc::UnboundedReceiver<Value>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl RemoteEnd {
    /// Signal that the context has loaded
    pub fn ready(&self) {
        let _ = self.events.send(ChannelEvent::Ready);
    }

    /// Post a raw message to the provider
    pub fn post(&self, message: Value) {
        let _ = self.events.send(ChannelEvent::Message(message));
    }

    /// Next message from the provider; `None` once the provider closed the context
    pub async fn next_request(&mut self) -> Option<Value> {
        self.requests.recv().await
    }

    /// Close the context from the wallet side
    pub fn close(self) {
        let _ = self.events.send(ChannelEvent::Closed);
    }

    /// Answer each request with `handler` until the provider closes the
    /// context. A `None` answer leaves the request unanswered.
    pub async fn serve<F>(mut self, mut handler: F)
    where
        F: FnMut(RpcRequestMessage) -> Option<ResponseContent> + Send,
    {
        while let Some(raw) = self.next_request().await {
            let request: RpcRequestMessage = match serde_json::from_value(raw) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "Wallet received a malformed request");
                    continue;
                }
            };
            let request_id = request.id;
            if let Some(content) = handler(request) {
                match serde_json::to_value(RpcResponseMessage::reply_to(request_id, content)) {
                    Ok(reply) => self.post(reply),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode wallet reply"),
                }
            }
        }
    }
}

/// Mark every context opened through `remotes` ready and serve it with `handler`
pub fn spawn_responder<F>(
    mut remotes: mpsc::UnboundedReceiver<RemoteEnd>,
    handler: F,
) -> JoinHandle<()>
where
    F: Fn(RpcRequestMessage) -> Option<ResponseContent> + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        while let Some(remote) = remotes.recv().await {
            tracing::debug!(url = %remote.url, "Serving wallet context");
            remote.ready();
            let handler = handler.clone();
            tokio::spawn(remote.serve(move |request| handler(request)));
        }
    })
}

/// Connector whose contexts live in the same process
#[derive(Debug)]
pub struct MemoryConnector {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    /// Create a connector and the stream of remote ends it will open
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        (
            Self {
                remotes,
                connects: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Number of contexts opened so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<ChannelLink> {
        let (outbound, requests) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();

        self.remotes
            .send(RemoteEnd {
                url: url.clone(),
                requests,
                events,
            })
            .map_err(|_| Error::Internal("wallet context failed to open".to_string()))?;
        self.connects.fetch_add(1, Ordering::SeqCst);

        Ok(ChannelLink { outbound, inbound })
    }
}
