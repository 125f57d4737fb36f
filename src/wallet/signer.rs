//! Key custody for the in-process wallet
//!
//! The private key lives only inside alloy's `PrivateKeySigner`:
//! - it is read from a `SecretString` and never kept as plain text
//! - there is no `Serialize` impl
//! - `Debug` redacts it

use crate::{Error, Result};
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, SignerSync};
use secrecy::{ExposeSecret, SecretString};

pub struct SecureWallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl SecureWallet {
    /// Load the key from an environment variable
    pub fn from_env(var_name: &str) -> Result<Self> {
        let key = std::env::var(var_name).map_err(|_| {
            Error::Wallet(format!(
                "Environment variable {} not set. Required for the local wallet.",
                var_name
            ))
        })?;
        Self::from_secret(&SecretString::from(key))
    }

    /// Parse a hex-encoded private key, with or without `0x`
    pub fn from_secret(key: &SecretString) -> Result<Self> {
        let exposed = key.expose_secret();
        let hex = exposed.strip_prefix("0x").unwrap_or(exposed);
        let signer: PrivateKeySigner = hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;
        let address = signer.address();
        Ok(Self { signer, address })
    }

    /// Fresh random key, for demos
    pub fn random() -> Self {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        Self { signer, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 checksummed address
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// EIP-191 `personal_sign` signature over `message`
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.signer
            .sign_message_sync(message)
            .map_err(|e| Error::Wallet(format!("Signing failed: {}", e)))
    }

    pub fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::Wallet(format!("Signing failed: {}", e)))
    }
}

impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> SecureWallet {
        SecureWallet::from_secret(&SecretString::from(TEST_KEY.to_string())).unwrap()
    }

    #[test]
    fn test_wallet_from_secret() {
        assert_eq!(
            wallet().address_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_invalid_key() {
        let err = SecureWallet::from_secret(&SecretString::from("0xnothex".to_string())).unwrap_err();
        assert!(matches!(err, Error::Wallet(_)));
    }

    #[test]
    fn test_message_signature_recovers() {
        let wallet = wallet();
        let signature = wallet.sign_message(b"hello alias").unwrap();
        let recovered = signature.recover_address_from_msg(b"hello alias").unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[test]
    fn test_hash_signature_recovers() {
        let wallet = wallet();
        let hash = alloy::primitives::keccak256(b"typed data digest");
        let signature = wallet.sign_hash(&hash).unwrap();
        assert_eq!(
            signature.recover_address_from_prehash(&hash).unwrap(),
            wallet.address()
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug_str = format!("{:?}", wallet());
        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
