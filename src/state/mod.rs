//! Session state
//!
//! Single source of truth for accounts, active chain, available chains and
//! wallet capabilities. All writes go through the `update_*` methods:
//! - an update equal to the current value is a no-op;
//! - a changed value tagged [`UpdateSource::Wallet`] is persisted and then
//!   reported to listeners before the update returns;
//! - a changed value tagged [`UpdateSource::Storage`] is applied silently.

pub mod listeners;
pub mod storage;

use crate::types::{AccountSet, AvailableChains, Chain, UpdateSource, WalletCapabilities};
use listeners::{ListenerId, Listeners};
use parking_lot::{Mutex, ReentrantMutex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use storage::KeyValueStore;

mod keys {
    pub const ACCOUNTS: &str = "alias:accounts";
    pub const ACTIVE_CHAIN: &str = "alias:activeChain";
    pub const AVAILABLE_CHAINS: &str = "alias:availableChains";
    pub const CAPABILITIES: &str = "alias:walletCapabilities";
}

/// Point-in-time copy of the state
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub accounts: AccountSet,
    pub chain: Chain,
    pub available_chains: AvailableChains,
    pub capabilities: Option<WalletCapabilities>,
    pub last_update_source: Option<UpdateSource>,
}

impl Snapshot {
    fn empty(default_chain_id: u64) -> Self {
        Self {
            accounts: AccountSet::default(),
            chain: Chain::new(default_chain_id),
            available_chains: AvailableChains::new(),
            capabilities: None,
            last_update_source: None,
        }
    }
}

pub struct SessionState {
    default_chain_id: u64,
    store: Arc<dyn KeyValueStore>,
    /// Serializes write-then-notify; reentrant so listeners may write back
    write_lock: ReentrantMutex<()>,
    snapshot: Mutex<Snapshot>,
    accounts_listeners: Listeners<AccountSet>,
    chain_listeners: Listeners<Chain>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("snapshot", &*self.snapshot.lock())
            .finish()
    }
}

impl SessionState {
    /// Empty state on the default chain
    pub fn new(default_chain_id: u64, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            default_chain_id,
            store,
            write_lock: ReentrantMutex::new(()),
            snapshot: Mutex::new(Snapshot::empty(default_chain_id)),
            accounts_listeners: Listeners::default(),
            chain_listeners: Listeners::default(),
        }
    }

    /// Load persisted state. Every field is applied with source = storage, so
    /// nothing is reported to listeners. Unreadable entries are skipped.
    pub fn rehydrate(default_chain_id: u64, store: Arc<dyn KeyValueStore>) -> Self {
        let state = Self::new(default_chain_id, store);

        if let Some(chains) = state.load::<AvailableChains>(keys::AVAILABLE_CHAINS) {
            state.update_available_chains(chains, UpdateSource::Storage);
        }
        if let Some(capabilities) = state.load::<WalletCapabilities>(keys::CAPABILITIES) {
            state.apply_capabilities(capabilities, UpdateSource::Storage);
        }
        if let Some(chain) = state.load::<Chain>(keys::ACTIVE_CHAIN) {
            state.update_chain(chain, UpdateSource::Storage);
        }
        if let Some(accounts) = state.load::<AccountSet>(keys::ACCOUNTS) {
            state.update_accounts(accounts, UpdateSource::Storage);
        }

        let snapshot = state.snapshot();
        tracing::debug!(
            accounts = snapshot.accounts.len(),
            chain_id = snapshot.chain.id,
            "Rehydrated session state"
        );
        state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().clone()
    }

    pub fn accounts(&self) -> AccountSet {
        self.snapshot.lock().accounts.clone()
    }

    pub fn chain(&self) -> Chain {
        self.snapshot.lock().chain.clone()
    }

    pub fn available_chains(&self) -> AvailableChains {
        self.snapshot.lock().available_chains.clone()
    }

    pub fn capabilities(&self) -> Option<WalletCapabilities> {
        self.snapshot.lock().capabilities.clone()
    }

    /// Connected means at least one account is known
    pub fn is_connected(&self) -> bool {
        !self.snapshot.lock().accounts.is_empty()
    }

    pub fn default_chain_id(&self) -> u64 {
        self.default_chain_id
    }

    /// Returns true if the account set changed
    pub fn update_accounts(&self, accounts: AccountSet, source: UpdateSource) -> bool {
        let _write = self.write_lock.lock();
        {
            let mut snapshot = self.snapshot.lock();
            if snapshot.accounts.same_set(&accounts) {
                return false;
            }
            snapshot.accounts = accounts.clone();
            snapshot.last_update_source = Some(source);
        }

        tracing::debug!(accounts = accounts.len(), ?source, "Accounts updated");
        if source == UpdateSource::Wallet {
            self.persist(keys::ACCOUNTS, &accounts);
            self.accounts_listeners.emit(&accounts);
        }
        true
    }

    /// Returns true if the chain id or rpc endpoint changed
    pub fn update_chain(&self, chain: Chain, source: UpdateSource) -> bool {
        let _write = self.write_lock.lock();
        {
            let mut snapshot = self.snapshot.lock();
            if snapshot.chain == chain {
                return false;
            }
            snapshot.chain = chain.clone();
            snapshot.last_update_source = Some(source);
        }

        tracing::debug!(chain_id = chain.id, ?source, "Active chain updated");
        if source == UpdateSource::Wallet {
            self.persist(keys::ACTIVE_CHAIN, &chain);
            self.chain_listeners.emit(&chain);
        }
        true
    }

    /// Store capabilities reported by the wallet
    pub fn update_capabilities(&self, capabilities: WalletCapabilities) {
        self.apply_capabilities(capabilities, UpdateSource::Wallet);
    }

    fn apply_capabilities(&self, capabilities: WalletCapabilities, source: UpdateSource) {
        let _write = self.write_lock.lock();
        {
            let mut snapshot = self.snapshot.lock();
            snapshot.capabilities = Some(capabilities.clone());
            snapshot.last_update_source = Some(source);
        }
        if source == UpdateSource::Wallet {
            self.persist(keys::CAPABILITIES, &capabilities);
        }
    }

    /// Record the chains the wallet can serve. If the active chain is among
    /// them its rpc endpoint is refreshed.
    pub fn update_available_chains(&self, chains: AvailableChains, source: UpdateSource) {
        let _write = self.write_lock.lock();
        let active = {
            let mut snapshot = self.snapshot.lock();
            snapshot.available_chains = chains.clone();
            snapshot.last_update_source = Some(source);
            snapshot.chain.id
        };
        if source == UpdateSource::Wallet {
            self.persist(keys::AVAILABLE_CHAINS, &chains);
        }
        if let Some(rpc_url) = chains.get(&active) {
            self.update_chain(Chain::with_rpc_url(active, rpc_url.clone()), source);
        }
    }

    /// Switch to a chain the wallet already reported as available.
    ///
    /// Returns false, changing nothing, if the chain is unknown.
    pub fn switch_chain(&self, chain_id: u64) -> bool {
        let rpc_url = self.snapshot.lock().available_chains.get(&chain_id).cloned();
        match rpc_url {
            Some(rpc_url) => {
                self.update_chain(Chain::with_rpc_url(chain_id, rpc_url), UpdateSource::Wallet);
                true
            }
            None => false,
        }
    }

    /// Reset to the empty snapshot and wipe the persisted copy. Listeners are
    /// not notified.
    pub fn clear(&self) {
        let _write = self.write_lock.lock();
        *self.snapshot.lock() = Snapshot::empty(self.default_chain_id);
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted session state");
        }
    }

    pub fn on_accounts_changed(
        &self,
        callback: impl Fn(&AccountSet) + Send + Sync + 'static,
    ) -> ListenerId {
        self.accounts_listeners.add(callback)
    }

    pub fn on_chain_changed(&self, callback: impl Fn(&Chain) + Send + Sync + 'static) -> ListenerId {
        self.chain_listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.accounts_listeners.remove(id) || self.chain_listeners.remove(id)
    }

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(crate::Error::from)
            .and_then(|json| self.store.set(key, json));
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Failed to persist session state");
        }
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable persisted state");
                None
            }
        }
    }
}
