//! Fallback RPC endpoints for the fetch proxy
//!
//! Calls the wallet does not handle are proxied to a public chain RPC. The
//! endpoint comes from the active chain first; when that chain carries no
//! endpoint, this registry is consulted. Resolution order:
//! 1. Per-chain env vars (ETH_RPC_URL, ARBITRUM_RPC_URL, ...)
//! 2. ALCHEMY_API_KEY - builds URLs for all known chains
//! 3. Public RPC fallbacks - rate limited, for testing only

use std::collections::HashMap;

/// RPC URLs indexed by chain ID
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    urls: HashMap<u64, String>,
}

/// Chain ID constants
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const ARBITRUM: u64 = 42161;
    pub const OPTIMISM: u64 = 10;
    pub const BASE: u64 = 8453;
}

mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const ARBITRUM_RPC_URL: &str = "ARBITRUM_RPC_URL";
    pub const OPTIMISM_RPC_URL: &str = "OPTIMISM_RPC_URL";
    pub const BASE_RPC_URL: &str = "BASE_RPC_URL";
    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
}

mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const ARBITRUM: &str = "https://arb1.arbitrum.io/rpc";
    pub const OPTIMISM: &str = "https://mainnet.optimism.io";
    pub const BASE: &str = "https://mainnet.base.org";
}

const PER_CHAIN_VARS: [(u64, &str); 4] = [
    (chains::ETHEREUM, env_vars::ETH_RPC_URL),
    (chains::ARBITRUM, env_vars::ARBITRUM_RPC_URL),
    (chains::OPTIMISM, env_vars::OPTIMISM_RPC_URL),
    (chains::BASE, env_vars::BASE_RPC_URL),
];

impl RpcConfig {
    /// Public endpoints only; never reads the environment
    pub fn public() -> Self {
        let mut urls = HashMap::new();
        urls.insert(chains::ETHEREUM, public_rpcs::ETHEREUM.to_string());
        urls.insert(chains::ARBITRUM, public_rpcs::ARBITRUM.to_string());
        urls.insert(chains::OPTIMISM, public_rpcs::OPTIMISM.to_string());
        urls.insert(chains::BASE, public_rpcs::BASE.to_string());
        Self { urls }
    }

    /// Build the registry from environment variables
    pub fn from_env() -> Self {
        let mut urls = HashMap::new();

        for (chain_id, var) in PER_CHAIN_VARS {
            if let Ok(url) = std::env::var(var) {
                tracing::debug!(chain_id, var, "Using RPC URL from environment");
                urls.insert(chain_id, url);
            }
        }

        if urls.is_empty() {
            if let Ok(key) = std::env::var(env_vars::ALCHEMY_API_KEY) {
                tracing::info!("Building RPC URLs from ALCHEMY_API_KEY");
                for (chain_id, subdomain) in [
                    (chains::ETHEREUM, "eth-mainnet"),
                    (chains::ARBITRUM, "arb-mainnet"),
                    (chains::OPTIMISM, "opt-mainnet"),
                    (chains::BASE, "base-mainnet"),
                ] {
                    urls.insert(
                        chain_id,
                        format!("https://{}.g.alchemy.com/v2/{}", subdomain, key),
                    );
                }
            }
        }

        if !urls.contains_key(&chains::ETHEREUM) {
            tracing::warn!("No RPC configured for Ethereum, using public RPC (rate limited)");
        }
        for (chain_id, url) in Self::public().urls {
            urls.entry(chain_id).or_insert(url);
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<u64, String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }

    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.urls.contains_key(&chain_id)
    }

    /// All `(chain_id, url)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.urls.iter().map(|(id, url)| (*id, url.as_str()))
    }
}
