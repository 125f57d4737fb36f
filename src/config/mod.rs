//! Configuration for the wallet provider

pub mod rpc;

use crate::method::UnknownMethodPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Wallet endpoint used when none is configured
pub const DEFAULT_WALLET_URL: &str = "http://localhost:3001/wallet";

/// Chain used when nothing has been negotiated
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Sign-in provider id handed to the session service by default
pub const DEFAULT_AUTH_PROVIDER: &str = "alias";

/// Well-known networks with built-in chain metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Arbitrum,
    Optimism,
    Base,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ethereum => 1,
            Network::Arbitrum => 42161,
            Network::Optimism => 10,
            Network::Base => 8453,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Ethereum => "Ethereum",
            Network::Arbitrum => "Arbitrum One",
            Network::Optimism => "OP Mainnet",
            Network::Base => "Base",
        }
    }

    fn explorer(&self) -> &'static str {
        match self {
            Network::Ethereum => "https://etherscan.io",
            Network::Arbitrum => "https://arbiscan.io",
            Network::Optimism => "https://optimistic.etherscan.io",
            Network::Base => "https://basescan.org",
        }
    }

    /// Parse a network name as accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "ethereum" | "mainnet" => Some(Network::Ethereum),
            "arbitrum" => Some(Network::Arbitrum),
            "optimism" => Some(Network::Optimism),
            "base" => Some(Network::Base),
            _ => None,
        }
    }

    /// Chain metadata for this network, using the public RPC from [`RpcConfig`]
    pub fn chain_config(&self, rpc: &RpcConfig) -> ChainConfig {
        ChainConfig {
            id: self.chain_id(),
            name: self.name().to_string(),
            rpc_url: rpc.get(self.chain_id()).map(str::to_string),
            native_currency: NativeCurrency::ether(),
            block_explorer_url: Some(self.explorer().to_string()),
        }
    }
}

/// Native currency description used when asking the wallet to add a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn ether() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

/// Metadata for a chain the dapp supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub block_explorer_url: Option<String>,
}

/// Application metadata shown by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    /// Application name
    pub app_name: String,
    /// Application logo image URL
    #[serde(default)]
    pub app_logo_url: Option<String>,
    /// Chain ids the dapp supports, first one is the default
    #[serde(default)]
    pub app_chain_ids: Vec<u64>,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            app_name: "Dapp".to_string(),
            app_logo_url: None,
            app_chain_ids: vec![Network::Ethereum.chain_id(), Network::Base.chain_id()],
        }
    }
}

/// Redirect behaviour for sign-in / sign-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectConfig {
    pub enabled: bool,
    pub url: String,
}

/// Session service settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Sign-in provider id (defaults to [`DEFAULT_AUTH_PROVIDER`])
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub sign_in_redirect: Option<RedirectConfig>,
    #[serde(default)]
    pub sign_out_redirect: Option<RedirectConfig>,
}

impl OAuthConfig {
    pub fn provider_id(&self) -> &str {
        self.provider.as_deref().unwrap_or(DEFAULT_AUTH_PROVIDER)
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application metadata sent to the wallet
    #[serde(default)]
    pub metadata: AppMetadata,
    /// Endpoint the wallet context is opened at
    pub wallet_url: Url,
    /// Chains the dapp can switch to
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    /// Session service settings
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// How to treat method names missing from the method table
    #[serde(default)]
    pub unknown_methods: UnknownMethodPolicy,
    /// Per-request timeout (milliseconds); `None` waits until the wallet answers or closes
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// File used to persist session state; in-memory when unset
    #[serde(default)]
    pub storage_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let rpc = RpcConfig::public();
        Self {
            metadata: AppMetadata::default(),
            wallet_url: Url::parse(DEFAULT_WALLET_URL).expect("default wallet url is valid"),
            chains: vec![
                Network::Ethereum.chain_config(&rpc),
                Network::Base.chain_config(&rpc),
            ],
            oauth: OAuthConfig::default(),
            unknown_methods: UnknownMethodPolicy::default(),
            request_timeout_ms: None,
            storage_path: None,
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can never be satisfied
    pub fn validate(&self) -> Result<()> {
        if let Some(chain) = self.chains.iter().find(|c| c.id == 0) {
            return Err(Error::Config(format!(
                "chain '{}' has id 0, chain ids must be positive",
                chain.name
            )));
        }
        if self.metadata.app_chain_ids.contains(&0) {
            return Err(Error::Config(
                "appChainIds must contain positive chain ids".to_string(),
            ));
        }
        Ok(())
    }

    /// Chain the provider starts on and falls back to after a disconnect
    pub fn default_chain_id(&self) -> u64 {
        self.metadata
            .app_chain_ids
            .first()
            .copied()
            .unwrap_or(DEFAULT_CHAIN_ID)
    }

    /// Metadata for a configured chain
    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.id == chain_id)
    }

    /// A chain is configured when the dapp declared it in metadata or chain list
    pub fn is_configured(&self, chain_id: u64) -> bool {
        self.chain(chain_id).is_some() || self.metadata.app_chain_ids.contains(&chain_id)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
