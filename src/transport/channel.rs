//! Abstract bidirectional channel to the wallet context
//!
//! A connector opens one secondary context per call to [`ChannelConnector::connect`].
//! The returned [`ChannelLink`] carries raw JSON values out and [`ChannelEvent`]s
//! back. Dropping the outbound sender closes the context from our side.

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

/// Event raised by the wallet context
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Context finished loading and can receive messages
    Ready,
    /// Raw inbound message; may come from unrelated origins
    Message(Value),
    /// Context was closed by the user or externally
    Closed,
}

/// Both halves of an open secondary context
pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<Value>,
    pub inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl std::fmt::Debug for ChannelLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLink")
            .field("outbound_closed", &self.outbound.is_closed())
            .finish()
    }
}

/// Opens secondary contexts (popup window, subprocess, socket, in-memory)
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<ChannelLink>;
}
