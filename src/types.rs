//! Domain types shared by the signer, state and provider layers.

use crate::{Error, Result};
use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

/// Where a state update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// Live result from the wallet; observers are notified
    Wallet,
    /// Rehydrated from persisted storage; silent
    Storage,
}

/// Ordered, deduplicated list of account addresses.
///
/// The zero address is never admitted. Addresses serialize in EIP-55
/// checksummed form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSet(Vec<Address>);

impl AccountSet {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut seen = HashSet::new();
        let accounts = addresses
            .into_iter()
            .filter(|a| !a.is_zero())
            .filter(|a| seen.insert(*a))
            .collect();
        Self(accounts)
    }

    /// Parse a wallet result (`["0x..", ...]`)
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::InvalidParams("accounts must be an array".to_string()))?;
        let addresses = items
            .iter()
            .map(|item| {
                let s = item.as_str().ok_or_else(|| {
                    Error::InvalidParams(format!("account is not a string: {}", item))
                })?;
                Address::from_str(s)
                    .map_err(|e| Error::InvalidParams(format!("invalid address {}: {}", s, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(addresses))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<Address> {
        self.0.first().copied()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.0
    }

    /// Set equality, ignoring order
    pub fn same_set(&self, other: &AccountSet) -> bool {
        self.0.len() == other.0.len() && {
            let mine: HashSet<_> = self.0.iter().collect();
            other.0.iter().all(|a| mine.contains(a))
        }
    }

    /// Checksummed strings, in order
    pub fn to_checksummed(&self) -> Vec<String> {
        self.0.iter().map(|a| a.to_checksum(None)).collect()
    }

    pub fn to_value(&self) -> Value {
        Value::from(self.to_checksummed())
    }
}

impl Serialize for AccountSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_checksummed().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AccountSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        AccountSet::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Active chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl Chain {
    pub fn new(id: u64) -> Self {
        Self { id, rpc_url: None }
    }

    pub fn with_rpc_url(id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            id,
            rpc_url: Some(rpc_url.into()),
        }
    }

    pub fn hex_id(&self) -> String {
        hex_chain_id(self.id)
    }
}

/// Chains the wallet reported as available, with their RPC endpoints
pub type AvailableChains = BTreeMap<u64, String>;

/// Serde helper for an optional [`AvailableChains`] keyed by chain id strings.
///
/// JSON object keys are always strings, and buffered deserializers (untagged
/// enums) will not coerce them to integers, so keys are read as strings and
/// parsed with [`parse_chain_id`].
pub(crate) mod chain_map {
    use super::{parse_chain_id, AvailableChains};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        chains: &Option<AvailableChains>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        chains
            .as_ref()
            .map(|c| {
                c.iter()
                    .map(|(id, url)| (id.to_string(), url.as_str()))
                    .collect::<BTreeMap<_, _>>()
            })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<AvailableChains>, D::Error> {
        let Some(raw) = Option::<BTreeMap<String, String>>::deserialize(deserializer)? else {
            return Ok(None);
        };
        raw.into_iter()
            .map(|(key, url)| {
                parse_chain_id(&Value::String(key))
                    .map(|id| (id, url))
                    .map_err(serde::de::Error::custom)
            })
            .collect::<std::result::Result<AvailableChains, _>>()
            .map(Some)
    }
}

/// Per-chain capability map reported by the wallet; opaque to the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletCapabilities(pub serde_json::Map<String, Value>);

impl WalletCapabilities {
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// `0x`-prefixed lowercase hex chain id
pub fn hex_chain_id(chain_id: u64) -> String {
    format!("0x{:x}", chain_id)
}

/// Parse a chain id given as a JSON number, hex string or decimal string.
///
/// Only positive ids are well-formed.
pub fn parse_chain_id(value: &Value) -> Result<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
            Some(_) => None,
            None => s.parse::<u64>().ok(),
        },
        _ => None,
    };
    match parsed {
        Some(id) if id > 0 => Ok(id),
        _ => Err(Error::InvalidParams(format!("invalid chain id: {}", value))),
    }
}
