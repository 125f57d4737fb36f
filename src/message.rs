//! Wire messages exchanged with the wallet context

use crate::config::AppMetadata;
use crate::error::ProviderRpcError;
use crate::types::{AvailableChains, WalletCapabilities};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Correlation id of a message
pub type MessageId = Uuid;

/// A JSON-RPC style call as made by the dapp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }

    /// Validate the shape of an untyped call.
    ///
    /// The call must be an object with a non-empty string `method`; `params`,
    /// when present, must be an array or an object.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::InvalidParams(
                "expected a single, non-array, object argument".to_string(),
            ));
        };

        let method = match map.remove("method") {
            Some(Value::String(m)) if !m.is_empty() => m,
            _ => {
                return Err(Error::InvalidParams(
                    "'args.method' must be a non-empty string".to_string(),
                ))
            }
        };

        let params = match map.remove("params") {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Array(_) | Value::Object(_))) => Some(p),
            Some(_) => {
                return Err(Error::InvalidParams(
                    "'args.params' must be an object or array if provided".to_string(),
                ))
            }
        };

        Ok(Self { method, params })
    }

    /// First positional parameter, if params is a non-empty array
    pub fn first_param(&self) -> Option<&Value> {
        self.params.as_ref()?.as_array()?.first()
    }
}

/// Opaque encrypted envelope; confidentiality is handled outside this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedData {
    pub iv: String,
    pub cipher_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeAction {
    pub method: String,
    pub params: AppMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestContent {
    Handshake {
        handshake: HandshakeAction,
    },
    Encrypted {
        encrypted: EncryptedData,
    },
    Action {
        action: RequestArguments,
        #[serde(rename = "chainId")]
        chain_id: u64,
    },
}

/// Message sent to the wallet context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequestMessage {
    pub id: MessageId,
    pub content: RequestContent,
    pub timestamp: DateTime<Utc>,
}

impl RpcRequestMessage {
    /// Build a message with a fresh id
    pub fn new(content: RequestContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            timestamp: Utc::now(),
        }
    }
}

/// `{value}` or `{error}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResult {
    Error { error: ProviderRpcError },
    Value { value: Value },
}

/// Side-channel state the wallet may attach to any response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::types::chain_map"
    )]
    pub chains: Option<AvailableChains>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<WalletCapabilities>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub result: RpcResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl RpcResponse {
    pub fn value(value: Value) -> Self {
        Self {
            result: RpcResult::Value { value },
            data: None,
        }
    }

    pub fn error(error: ProviderRpcError) -> Self {
        Self {
            result: RpcResult::Error { error },
            data: None,
        }
    }

    pub fn with_data(mut self, data: ResponseData) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseContent {
    Failure { failure: ProviderRpcError },
    Encrypted { encrypted: EncryptedData },
    Response(RpcResponse),
}

/// Message received from the wallet context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponseMessage {
    pub id: MessageId,
    /// Id of the request this message answers
    pub request_id: MessageId,
    pub content: ResponseContent,
    pub timestamp: DateTime<Utc>,
}

impl RpcResponseMessage {
    pub fn reply_to(request_id: MessageId, content: ResponseContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            content,
            timestamp: Utc::now(),
        }
    }
}
