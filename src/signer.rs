//! Account signer
//!
//! Owns the authentication lifecycle and every call that must be answered by
//! the wallet context. State changes reported by the wallet are reconciled
//! into [`SessionState`] before the caller sees the result.
//!
//! ```text
//! Unauthenticated ──handshake──▶ Authenticating ──session found──▶ Authorized
//!        ▲                                                            │
//!        └──────────── disconnect / unauthorized error ◀──────────────┘
//! ```

use crate::auth::SessionAuthenticator;
use crate::config::Config;
use crate::message::{RequestArguments, RequestContent, ResponseContent, RpcResponse, RpcResult};
use crate::method::{ETH_REQUEST_ACCOUNTS, WALLET_GET_CAPABILITIES, WALLET_SWITCH_ETHEREUM_CHAIN};
use crate::state::SessionState;
use crate::transport::Transport;
use crate::types::{parse_chain_id, AccountSet, Chain, UpdateSource};
use crate::{Error, Result};
use alloy::primitives::Address;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerState {
    Unauthenticated,
    /// Sign-in started, session not confirmed yet
    Authenticating,
    Authorized,
}

pub struct Signer {
    config: Arc<Config>,
    transport: Transport,
    state: Arc<SessionState>,
    auth: Arc<dyn SessionAuthenticator>,
    address: Mutex<Option<Address>>,
    status: Mutex<SignerState>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("status", &*self.status.lock())
            .field("address", &*self.address.lock())
            .field("transport", &self.transport)
            .finish()
    }
}

impl Signer {
    pub fn new(
        config: Arc<Config>,
        transport: Transport,
        state: Arc<SessionState>,
        auth: Arc<dyn SessionAuthenticator>,
    ) -> Self {
        Self {
            config,
            transport,
            state,
            auth,
            address: Mutex::new(None),
            status: Mutex::new(SignerState::Unauthenticated),
        }
    }

    pub fn status(&self) -> SignerState {
        *self.status.lock()
    }

    /// Address of the authenticated account, if any
    pub fn address(&self) -> Option<Address> {
        *self.address.lock()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn set_status(&self, status: SignerState) {
        let previous = std::mem::replace(&mut *self.status.lock(), status);
        if previous != status {
            tracing::debug!(from = ?previous, to = ?status, "Signer state changed");
        }
    }

    /// Establish the account session.
    ///
    /// With an existing session the accounts come from it and the wallet
    /// context is never opened. Otherwise a sign-in is started and the
    /// currently known (usually empty) accounts are returned.
    pub async fn handshake(&self) -> Result<AccountSet> {
        self.set_status(SignerState::Authenticating);

        let session = match self.auth.get_session().await {
            Ok(session) => session,
            Err(e) => {
                self.set_status(SignerState::Unauthenticated);
                return Err(e);
            }
        };

        if let Some(session) = session {
            *self.address.lock() = Some(session.address);
            self.state
                .update_accounts(AccountSet::new([session.address]), UpdateSource::Wallet);
            self.set_status(SignerState::Authorized);
            tracing::info!(address = %session.address, "Signer authorized from existing session");
            return Ok(self.state.accounts());
        }

        let provider_id = self.config.oauth.provider_id();
        tracing::info!(provider_id, "No session, starting sign-in");
        if let Err(e) = self
            .auth
            .sign_in(provider_id, self.config.oauth.sign_in_options())
            .await
        {
            self.set_status(SignerState::Unauthenticated);
            return Err(e);
        }
        Ok(self.state.accounts())
    }

    /// Answer a call locally when possible, otherwise through the wallet
    pub async fn request(&self, args: &RequestArguments) -> Result<Value> {
        let result = self.dispatch(args).await;
        if let Err(e) = &result {
            if e.is_unauthorized() {
                tracing::warn!(method = %args.method, error = %e, "Signer lost authorization");
                self.set_status(SignerState::Unauthenticated);
            }
        }
        result
    }

    async fn dispatch(&self, args: &RequestArguments) -> Result<Value> {
        if let Some(value) = self.answer_locally(args)? {
            tracing::debug!(method = %args.method, "Answered without the wallet");
            return Ok(value);
        }

        let Some(session) = self.auth.get_session().await? else {
            return Err(Error::Unauthorized(
                "No valid session found, try requestAccounts before other methods".to_string(),
            ));
        };
        // A sign-in may have completed after a redirect, or the accounts were
        // rehydrated from storage without a handshake
        self.address.lock().get_or_insert(session.address);
        self.set_status(SignerState::Authorized);

        let chain_id = self.state.chain().id;
        let message = self
            .transport
            .request(RequestContent::Action {
                action: args.clone(),
                chain_id,
            })
            .await?;

        let response = match message.content {
            ResponseContent::Failure { failure } => return Err(Error::RemoteFailure(failure)),
            ResponseContent::Encrypted { .. } => {
                return Err(Error::Internal(
                    "received an encrypted response but no payload cipher is configured"
                        .to_string(),
                ))
            }
            ResponseContent::Response(response) => response,
        };

        self.reconcile(args, &response)?;

        match response.result {
            RpcResult::Error { error } => Err(Error::RemoteFailure(error)),
            RpcResult::Value { value } => Ok(value),
        }
    }

    fn answer_locally(&self, args: &RequestArguments) -> Result<Option<Value>> {
        match args.method.as_str() {
            WALLET_SWITCH_ETHEREUM_CHAIN => {
                let chain_id = switch_target(args)?;
                if chain_id == self.state.chain().id {
                    return Ok(Some(Value::Null));
                }
                if !self.config.is_configured(chain_id) {
                    return Err(Error::ChainNotConfigured(chain_id));
                }
                if self.state.switch_chain(chain_id) {
                    return Ok(Some(Value::Null));
                }
                Ok(None)
            }
            WALLET_GET_CAPABILITIES => Ok(self.state.capabilities().map(|c| c.to_value())),
            _ => Ok(None),
        }
    }

    /// Fold wallet-reported state into the session state
    fn reconcile(&self, args: &RequestArguments, response: &RpcResponse) -> Result<()> {
        if let Some(data) = &response.data {
            if let Some(chains) = &data.chains {
                self.state
                    .update_available_chains(chains.clone(), UpdateSource::Wallet);
            }
            if let Some(capabilities) = &data.capabilities {
                self.state.update_capabilities(capabilities.clone());
            }
        }

        let RpcResult::Value { value } = &response.result else {
            return Ok(());
        };

        match args.method.as_str() {
            ETH_REQUEST_ACCOUNTS => {
                let accounts = AccountSet::from_value(value)?;
                if let Some(first) = accounts.first() {
                    *self.address.lock() = Some(first);
                }
                self.state.update_accounts(accounts, UpdateSource::Wallet);
            }
            WALLET_SWITCH_ETHEREUM_CHAIN if value.is_null() => {
                let chain_id = switch_target(args)?;
                let rpc_url = self
                    .state
                    .available_chains()
                    .get(&chain_id)
                    .cloned()
                    .or_else(|| self.config.chain(chain_id).and_then(|c| c.rpc_url.clone()));
                let chain = match rpc_url {
                    Some(url) => Chain::with_rpc_url(chain_id, url),
                    None => Chain::new(chain_id),
                };
                self.state.update_chain(chain, UpdateSource::Wallet);
            }
            _ => {}
        }
        Ok(())
    }

    /// Forget the account, wipe session state and end the session.
    ///
    /// Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        *self.address.lock() = None;
        self.state.clear();
        self.transport.close();
        self.set_status(SignerState::Unauthenticated);

        if self.auth.get_session().await?.is_some() {
            self.auth
                .sign_out(self.config.oauth.sign_out_options())
                .await?;
            tracing::info!("Signed out");
        }
        Ok(())
    }
}

/// Target chain of a `wallet_switchEthereumChain` call
fn switch_target(args: &RequestArguments) -> Result<u64> {
    let chain_id = args
        .first_param()
        .and_then(|p| p.get("chainId"))
        .ok_or_else(|| {
            Error::InvalidParams("expected params [{ chainId }] for chain switch".to_string())
        })?;
    parse_chain_id(chain_id)
}
