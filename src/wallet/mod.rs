//! Local wallet
//!
//! A key held in process and a host that answers the wallet protocol with
//! it. Used by the CLI demo and by end-to-end tests.

mod host;
mod signer;

pub use host::WalletHost;
pub use signer::SecureWallet;
