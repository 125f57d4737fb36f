//! Alias wallet provider
//!
//! An EIP-1193 style account provider for dapps whose wallet lives in a
//! separate context (popup, iframe or another process):
//! - `Provider` classifies each call and answers it from cached state, an
//!   RPC node, or the wallet
//! - `Signer` owns the account session and reconciles wallet results into
//!   the session state
//! - `Transport` correlates requests and responses over the wallet channel
//!
//! # Security Model
//!
//! - The provider never holds keys; signing happens in the wallet context
//! - Account access requires a session from an external session service
//! - An unauthorized failure anywhere disconnects the provider

pub mod auth;
pub mod config;
pub mod fetch;
pub mod message;
pub mod method;
pub mod provider;
pub mod signer;
pub mod state;
pub mod transport;
pub mod types;
pub mod wallet;

mod error;

pub use config::{AppMetadata, ChainConfig, Config, Network, RpcConfig};
pub use error::{codes, Error, MethodStatus, ProviderRpcError, Result};
pub use method::{classify, classify_with, MethodCategory, UnknownMethodPolicy};
pub use provider::{ConnectInfo, Provider, ProviderBuilder};
pub use signer::{Signer, SignerState};
pub use types::{AccountSet, Chain};
