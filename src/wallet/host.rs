//! In-process wallet context
//!
//! Plays the wallet side of the channel protocol with a local key, so the
//! provider can be exercised end to end without a browser. Every answer
//! carries the chains and capabilities the host currently knows.

use super::SecureWallet;
use crate::error::{codes, ProviderRpcError};
use crate::message::{
    RequestArguments, RequestContent, ResponseContent, ResponseData, RpcRequestMessage,
    RpcResponse,
};
use crate::method::{
    ETH_ACCOUNTS, ETH_CHAIN_ID, ETH_REQUEST_ACCOUNTS, WALLET_ADD_ETHEREUM_CHAIN,
    WALLET_GET_CAPABILITIES, WALLET_SWITCH_ETHEREUM_CHAIN,
};
use crate::transport::memory::{spawn_responder, MemoryConnector};
use crate::types::{hex_chain_id, parse_chain_id, AvailableChains, WalletCapabilities};
use crate::{Error, Result};
use alloy::hex;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct WalletHost {
    wallet: SecureWallet,
    chains: Mutex<AvailableChains>,
    active_chain: Mutex<u64>,
    capabilities: Mutex<WalletCapabilities>,
    /// Methods the simulated user refuses
    rejected: Mutex<HashSet<String>>,
    served: AtomicUsize,
}

impl WalletHost {
    /// Host serving `chains`; the lowest chain id starts active
    pub fn new(wallet: SecureWallet, chains: AvailableChains) -> Self {
        let active = chains.keys().next().copied().unwrap_or(1);
        Self {
            wallet,
            chains: Mutex::new(chains),
            active_chain: Mutex::new(active),
            capabilities: Mutex::new(WalletCapabilities::default()),
            rejected: Mutex::new(HashSet::new()),
            served: AtomicUsize::new(0),
        }
    }

    pub fn with_capabilities(self, capabilities: WalletCapabilities) -> Self {
        *self.capabilities.lock() = capabilities;
        self
    }

    pub fn address(&self) -> alloy::primitives::Address {
        self.wallet.address()
    }

    /// Make the simulated user reject every future `method` call
    pub fn reject(&self, method: &str) {
        self.rejected.lock().insert(method.to_string());
    }

    pub fn active_chain(&self) -> u64 {
        *self.active_chain.lock()
    }

    /// Number of action requests answered so far
    pub fn request_count(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Serve every context opened through the returned connector
    pub fn spawn(self: Arc<Self>) -> (Arc<MemoryConnector>, JoinHandle<()>) {
        let (connector, remotes) = MemoryConnector::new();
        let handle = spawn_responder(remotes, move |request| self.handle(request));
        (Arc::new(connector), handle)
    }

    pub fn handle(&self, request: RpcRequestMessage) -> Option<ResponseContent> {
        let content = match request.content {
            RequestContent::Action { action, chain_id } => {
                self.served.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(method = %action.method, chain_id, "Wallet handling request");
                let response = match self.answer(&action) {
                    Ok(value) => RpcResponse::value(value),
                    Err(e) => RpcResponse::error(e.to_rpc_error()),
                };
                ResponseContent::Response(response.with_data(self.data()))
            }
            RequestContent::Handshake { handshake } => {
                tracing::info!(app = %handshake.params.app_name, "Wallet handshake");
                ResponseContent::Response(
                    RpcResponse::value(json!([self.wallet.address_string()])).with_data(self.data()),
                )
            }
            RequestContent::Encrypted { .. } => ResponseContent::Failure {
                failure: ProviderRpcError::new(
                    codes::INTERNAL,
                    "Encrypted payloads are not supported by this wallet",
                ),
            },
        };
        Some(content)
    }

    fn data(&self) -> ResponseData {
        ResponseData {
            chains: Some(self.chains.lock().clone()),
            capabilities: Some(self.capabilities.lock().clone()),
        }
    }

    fn answer(&self, action: &RequestArguments) -> Result<Value> {
        if self.rejected.lock().contains(&action.method) {
            return Err(Error::user_rejected("User rejected the request."));
        }

        match action.method.as_str() {
            ETH_REQUEST_ACCOUNTS | ETH_ACCOUNTS => Ok(json!([self.wallet.address_string()])),
            ETH_CHAIN_ID => Ok(json!(hex_chain_id(self.active_chain()))),
            "personal_sign" => self.personal_sign(action),
            WALLET_SWITCH_ETHEREUM_CHAIN => {
                let chain_id = chain_param(action)?;
                if !self.chains.lock().contains_key(&chain_id) {
                    return Err(Error::RemoteFailure(ProviderRpcError::new(
                        codes::UNRECOGNIZED_CHAIN,
                        "Unrecognized chain ID",
                    )));
                }
                *self.active_chain.lock() = chain_id;
                Ok(Value::Null)
            }
            WALLET_ADD_ETHEREUM_CHAIN => {
                let chain_id = chain_param(action)?;
                let rpc_url = action
                    .first_param()
                    .and_then(|p| p["rpcUrls"].get(0))
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::InvalidParams("rpcUrls must not be empty".to_string()))?;
                self.chains.lock().insert(chain_id, rpc_url.to_string());
                Ok(Value::Null)
            }
            WALLET_GET_CAPABILITIES => Ok(self.capabilities.lock().to_value()),
            other => Err(Error::RemoteFailure(ProviderRpcError::new(
                codes::METHOD_NOT_SUPPORTED,
                format!("Wallet does not support {}", other),
            ))),
        }
    }

    /// `personal_sign` params are `[hex message, address]`
    fn personal_sign(&self, action: &RequestArguments) -> Result<Value> {
        let message = action
            .first_param()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidParams("expected [message, address]".to_string()))?;
        let bytes = hex::decode(message)
            .map_err(|e| Error::InvalidParams(format!("message is not hex: {}", e)))?;
        let signature = self.wallet.sign_message(&bytes)?;
        Ok(json!(hex::encode_prefixed(signature.as_bytes())))
    }
}

fn chain_param(action: &RequestArguments) -> Result<u64> {
    let value = action
        .first_param()
        .and_then(|p| p.get("chainId"))
        .ok_or_else(|| Error::InvalidParams("expected params [{ chainId }]".to_string()))?;
    parse_chain_id(value)
}
