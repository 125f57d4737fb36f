//! Read-only RPC proxy
//!
//! Calls that need no account (`eth_call`, `eth_getBalance`, ...) bypass the
//! wallet entirely and go straight to a JSON-RPC node for the active chain.

use crate::config::{Config, RpcConfig};
use crate::error::{codes, ProviderRpcError};
use crate::message::RequestArguments;
use crate::types::Chain;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[async_trait]
pub trait RpcForwarder: Send + Sync {
    /// Forward `args` unchanged to a node serving `chain`
    async fn forward(&self, args: &RequestArguments, chain: &Chain) -> Result<Value>;
}

/// JSON-RPC 2.0 over HTTP.
///
/// The endpoint is the chain's own rpc url when the wallet reported one,
/// else the configured chain's, else the environment/public default.
pub struct HttpRpcForwarder {
    client: Client,
    fallback: HashMap<u64, String>,
    next_id: AtomicU64,
}

impl HttpRpcForwarder {
    pub fn new(config: &Config, rpc: &RpcConfig) -> Self {
        let mut fallback: HashMap<u64, String> = rpc
            .iter()
            .map(|(id, url)| (id, url.to_string()))
            .collect();
        // Configured chains take precedence over env/public urls
        for chain in &config.chains {
            if let Some(url) = &chain.rpc_url {
                fallback.insert(chain.id, url.clone());
            }
        }
        Self {
            client: Client::new(),
            fallback,
            next_id: AtomicU64::new(1),
        }
    }

    /// Resolve the endpoint for `chain`
    pub fn endpoint(&self, chain: &Chain) -> Result<String> {
        chain
            .rpc_url
            .clone()
            .or_else(|| self.fallback.get(&chain.id).cloned())
            .ok_or_else(|| Error::Internal(format!("No RPC URL set for chain {}", chain.id)))
    }
}

#[async_trait]
impl RpcForwarder for HttpRpcForwarder {
    async fn forward(&self, args: &RequestArguments, chain: &Chain) -> Result<Value> {
        let endpoint = self.endpoint(chain)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": args.method,
            "params": args.params.clone().unwrap_or_else(|| json!([])),
        });

        let start = Instant::now();
        let response: Value = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(
            method = %args.method,
            chain_id = chain.id,
            latency_ms = start.elapsed().as_millis() as u64,
            "Forwarded RPC call"
        );

        if let Some(error) = response.get("error") {
            let failure: ProviderRpcError = serde_json::from_value(error.clone())
                .unwrap_or_else(|_| ProviderRpcError::new(codes::INTERNAL, error.to_string()));
            return Err(Error::RemoteFailure(failure));
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| Error::Internal("RPC response has neither result nor error".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP request with `body`, returning the request body seen
    async fn one_shot_node(body: Value) -> (String, tokio::task::JoinHandle<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let (header_end, content_length) = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    break (pos + 4, length);
                }
            };
            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }

            let payload = body.to_string();
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap()
        });

        (url, handle)
    }

    fn forwarder() -> HttpRpcForwarder {
        HttpRpcForwarder::new(&Config::default(), &RpcConfig::with_urls(HashMap::new()))
    }

    #[test]
    fn test_endpoint_resolution_order() {
        let mut config = Config::default();
        config.chains[0].rpc_url = Some("https://configured.example".to_string());
        let mut urls = HashMap::new();
        urls.insert(1, "https://env.example".to_string());
        urls.insert(10, "https://op.example".to_string());
        let forwarder = HttpRpcForwarder::new(&config, &RpcConfig::with_urls(urls));

        assert_eq!(
            forwarder
                .endpoint(&Chain::with_rpc_url(1, "https://wallet.example"))
                .unwrap(),
            "https://wallet.example"
        );
        assert_eq!(
            forwarder.endpoint(&Chain::new(1)).unwrap(),
            "https://configured.example"
        );
        assert_eq!(forwarder.endpoint(&Chain::new(10)).unwrap(), "https://op.example");
        assert!(matches!(
            forwarder.endpoint(&Chain::new(1337)),
            Err(Error::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_forward_returns_result() {
        let (url, node) = one_shot_node(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" })).await;

        let value = forwarder()
            .forward(
                &RequestArguments::with_params("eth_blockNumber", json!([])),
                &Chain::with_rpc_url(1, url),
            )
            .await
            .unwrap();

        assert_eq!(value, json!("0x10"));
        let seen = node.await.unwrap();
        assert_eq!(seen["method"], json!("eth_blockNumber"));
        assert_eq!(seen["jsonrpc"], json!("2.0"));
    }

    #[tokio::test]
    async fn test_forward_surfaces_node_error() {
        let (url, _node) = one_shot_node(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted" }
        }))
        .await;

        let err = forwarder()
            .forward(&RequestArguments::new("eth_call"), &Chain::with_rpc_url(1, url))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_rpc_error(),
            ProviderRpcError::new(-32000, "execution reverted")
        );
    }
}
