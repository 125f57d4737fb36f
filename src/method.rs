//! Method classification
//!
//! Maps JSON-RPC method names onto the dispatch category the provider
//! routes them through. The table is static data; [`classify`] is total.

use serde::{Deserialize, Serialize};

/// Dispatch category of an inbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodCategory {
    /// Authentication / account discovery
    Handshake,
    /// Needs the wallet
    Sign,
    /// Proxied to the chain RPC
    Fetch,
    /// Answered from cached state
    State,
    Deprecated,
    Unsupported,
}

/// Category used for names the table does not list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownMethodPolicy {
    /// Forward unknown names to the chain RPC
    #[default]
    Fetch,
    /// Reject unknown names as not supported
    Unsupported,
}

impl UnknownMethodPolicy {
    fn category(self) -> MethodCategory {
        match self {
            UnknownMethodPolicy::Fetch => MethodCategory::Fetch,
            UnknownMethodPolicy::Unsupported => MethodCategory::Unsupported,
        }
    }
}

pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const WALLET_SWITCH_ETHEREUM_CHAIN: &str = "wallet_switchEthereumChain";
pub const WALLET_ADD_ETHEREUM_CHAIN: &str = "wallet_addEthereumChain";
pub const WALLET_GET_CAPABILITIES: &str = "wallet_getCapabilities";
pub const ETH_CHAIN_ID: &str = "eth_chainId";
pub const NET_VERSION: &str = "net_version";
pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const ETH_COINBASE: &str = "eth_coinbase";

const TABLE: &[(MethodCategory, &[&str])] = &[
    (MethodCategory::Handshake, &[ETH_REQUEST_ACCOUNTS]),
    (
        MethodCategory::Sign,
        &[
            "eth_ecRecover",
            "personal_sign",
            "personal_ecRecover",
            "eth_signTransaction",
            "eth_sendTransaction",
            "eth_signTypedData_v1",
            "eth_signTypedData_v3",
            "eth_signTypedData_v4",
            "eth_signTypedData",
            WALLET_ADD_ETHEREUM_CHAIN,
            WALLET_SWITCH_ETHEREUM_CHAIN,
            "wallet_watchAsset",
            WALLET_GET_CAPABILITIES,
            "wallet_sendCalls",
            "wallet_showCallsStatus",
        ],
    ),
    (
        MethodCategory::State,
        &[ETH_CHAIN_ID, ETH_ACCOUNTS, ETH_COINBASE, NET_VERSION],
    ),
    (
        MethodCategory::Deprecated,
        &["eth_sign", "eth_signTypedData_v2"],
    ),
    (
        MethodCategory::Unsupported,
        &["eth_subscribe", "eth_unsubscribe"],
    ),
];

/// Look a method up in the static table
pub fn lookup(method: &str) -> Option<MethodCategory> {
    TABLE
        .iter()
        .find(|(_, methods)| methods.contains(&method))
        .map(|(category, _)| *category)
}

/// Classify with the default policy (unknown names are fetched)
pub fn classify(method: &str) -> MethodCategory {
    classify_with(method, UnknownMethodPolicy::default())
}

pub fn classify_with(method: &str, policy: UnknownMethodPolicy) -> MethodCategory {
    lookup(method).unwrap_or_else(|| policy.category())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_methods() {
        assert_eq!(classify("eth_requestAccounts"), MethodCategory::Handshake);
        assert_eq!(classify("personal_sign"), MethodCategory::Sign);
        assert_eq!(classify("wallet_switchEthereumChain"), MethodCategory::Sign);
        assert_eq!(classify("eth_chainId"), MethodCategory::State);
        assert_eq!(classify("eth_sign"), MethodCategory::Deprecated);
        assert_eq!(classify("eth_subscribe"), MethodCategory::Unsupported);
    }

    #[test]
    fn test_unknown_defaults_to_fetch() {
        assert_eq!(classify("eth_getBalance"), MethodCategory::Fetch);
        assert_eq!(classify(""), MethodCategory::Fetch);
    }

    #[test]
    fn test_unknown_policy_unsupported() {
        let policy = UnknownMethodPolicy::Unsupported;
        assert_eq!(
            classify_with("eth_getBalance", policy),
            MethodCategory::Unsupported
        );
        // Listed names ignore the policy
        assert_eq!(classify_with("eth_accounts", policy), MethodCategory::State);
    }

    #[test]
    fn test_table_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for (_, methods) in TABLE {
            for method in *methods {
                assert!(seen.insert(*method), "{} listed twice", method);
            }
        }
    }

    #[test]
    fn test_classify_is_total_and_deterministic() {
        // Table names, near misses, case variants and junk
        let mut inputs: Vec<String> = TABLE
            .iter()
            .flat_map(|(_, methods)| methods.iter())
            .flat_map(|m| [m.to_string(), m.to_uppercase(), format!("{} ", m), format!("x{}", m)])
            .collect();
        inputs.extend(["", " ", "\0", "eth_", "🦀", "wallet_"].map(String::from));
        inputs.extend((0..256u32).filter_map(char::from_u32).map(|c| c.to_string()));

        for policy in [UnknownMethodPolicy::Fetch, UnknownMethodPolicy::Unsupported] {
            for input in &inputs {
                let first = classify_with(input, policy);
                assert_eq!(first, classify_with(input, policy));
                match lookup(input) {
                    Some(category) => assert_eq!(first, category),
                    None => assert_eq!(first, policy.category()),
                }
            }
        }
    }
}
