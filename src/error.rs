//! Error types for the wallet provider
//!
//! Every error that crosses the [`Provider`](crate::Provider) boundary is
//! normalized into a [`ProviderRpcError`] (`{code, message, data?}`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Standard EIP-1193 / JSON-RPC error codes
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const DISCONNECTED: i64 = 4900;
    /// Wallet does not recognize the requested chain (EIP-3326)
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
    pub const METHOD_NOT_SUPPORTED: i64 = -32004;
}

/// Normalized error shape handed to callers
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Payload of the `disconnect` event
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::new(codes::DISCONNECTED, reason)
    }
}

/// Why a method is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodStatus {
    Deprecated,
    NotSupported,
}

impl std::fmt::Display for MethodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodStatus::Deprecated => f.write_str("deprecated"),
            MethodStatus::NotSupported => f.write_str("not supported"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("User rejected the request: {0}")]
    UserRejected(String, Option<ProviderRpcError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Chain {0} is not configured")]
    ChainNotConfigured(u64),

    #[error("Failed to switch chain: {0}")]
    SwitchChainFailed(ProviderRpcError),

    #[error("Method {method} is {status}")]
    MethodNotSupported { method: String, status: MethodStatus },

    #[error("Wallet context closed before the request completed")]
    TransportClosed,

    /// Failure reported by the wallet; the payload is kept verbatim
    #[error("{0}")]
    RemoteFailure(ProviderRpcError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Error::UserRejected(message.into(), None)
    }

    /// Numeric code this error normalizes to
    pub fn code(&self) -> i64 {
        match self {
            Error::UserRejected(..) => codes::USER_REJECTED,
            Error::Unauthorized(_) => codes::UNAUTHORIZED,
            Error::InvalidParams(_) => codes::INVALID_PARAMS,
            Error::ChainNotConfigured(_) => codes::UNRECOGNIZED_CHAIN,
            Error::SwitchChainFailed(_) => codes::UNRECOGNIZED_CHAIN,
            Error::MethodNotSupported { .. } => codes::METHOD_NOT_SUPPORTED,
            Error::TransportClosed => codes::DISCONNECTED,
            Error::RemoteFailure(e) => e.code,
            Error::Json(_) => codes::INVALID_REQUEST,
            Error::Timeout(_)
            | Error::Config(_)
            | Error::Storage(_)
            | Error::Internal(_)
            | Error::Wallet(_)
            | Error::Network(_) => codes::INTERNAL,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code() == codes::UNAUTHORIZED
    }

    /// Normalize into the `{code, message, data?}` shape.
    ///
    /// Remote failures are passed through untouched.
    pub fn to_rpc_error(&self) -> ProviderRpcError {
        match self {
            Error::RemoteFailure(e) => e.clone(),
            Error::UserRejected(message, Some(cause)) => {
                ProviderRpcError::new(self.code(), message.clone())
                    .with_data(json!({ "cause": cause }))
            }
            Error::UserRejected(message, None) => {
                ProviderRpcError::new(self.code(), message.clone())
            }
            Error::ChainNotConfigured(chain_id) => {
                ProviderRpcError::new(self.code(), "Chain not configured.")
                    .with_data(json!({ "chainId": chain_id }))
            }
            Error::SwitchChainFailed(cause) => {
                ProviderRpcError::new(self.code(), "An error occurred when attempting to switch chain.")
                    .with_data(json!({ "cause": cause }))
            }
            Error::MethodNotSupported { method, .. } => {
                ProviderRpcError::new(self.code(), self.to_string())
                    .with_data(json!({ "method": method }))
            }
            _ => ProviderRpcError::new(self.code(), self.to_string()),
        }
    }
}

impl From<Error> for ProviderRpcError {
    fn from(error: Error) -> Self {
        error.to_rpc_error()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
