//! Dapp-facing provider
//!
//! Single `request` entry point. Each call is classified and then either
//! answered from cached state, proxied to an RPC node, or delegated to the
//! [`Signer`]. Every failure leaves as a [`ProviderRpcError`]; an
//! unauthorized failure disconnects the provider before it is returned.

use crate::auth::SessionAuthenticator;
use crate::config::{Config, RpcConfig};
use crate::error::{codes, MethodStatus, ProviderRpcError};
use crate::fetch::{HttpRpcForwarder, RpcForwarder};
use crate::message::RequestArguments;
use crate::method::{
    classify_with, MethodCategory, ETH_ACCOUNTS, ETH_CHAIN_ID, ETH_COINBASE, NET_VERSION,
    WALLET_ADD_ETHEREUM_CHAIN, WALLET_SWITCH_ETHEREUM_CHAIN,
};
use crate::signer::Signer;
use crate::state::listeners::{ListenerId, Listeners};
use crate::state::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use crate::state::SessionState;
use crate::transport::channel::ChannelConnector;
use crate::transport::Transport;
use crate::types::{hex_chain_id, AccountSet, Chain};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Payload of the `connect` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    /// Hex chain id
    pub chain_id: String,
}

#[derive(Debug, Default)]
struct ProviderEvents {
    connect: Listeners<ConnectInfo>,
    disconnect: Listeners<ProviderRpcError>,
    chain_changed: Listeners<str>,
    accounts_changed: Listeners<AccountSet>,
}

pub struct Provider {
    config: Arc<Config>,
    state: Arc<SessionState>,
    signer: Signer,
    forwarder: Arc<dyn RpcForwarder>,
    events: Arc<ProviderEvents>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("state", &self.state)
            .field("signer", &self.signer)
            .finish()
    }
}

/// Assembles a [`Provider`] from its collaborators
pub struct ProviderBuilder {
    config: Config,
    connector: Arc<dyn ChannelConnector>,
    auth: Arc<dyn SessionAuthenticator>,
    store: Option<Arc<dyn KeyValueStore>>,
    forwarder: Option<Arc<dyn RpcForwarder>>,
}

impl ProviderBuilder {
    /// Persist state here instead of `config.storage_path`
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom RPC proxy instead of HTTP
    pub fn forwarder(mut self, forwarder: Arc<dyn RpcForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn build(self) -> Result<Provider> {
        self.config.validate()?;

        let store: Arc<dyn KeyValueStore> = match (self.store, &self.config.storage_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(JsonFileStore::open(path)?),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let forwarder = match self.forwarder {
            Some(forwarder) => forwarder,
            None => Arc::new(HttpRpcForwarder::new(&self.config, &RpcConfig::from_env())),
        };

        let config = Arc::new(self.config);
        let state = Arc::new(SessionState::rehydrate(config.default_chain_id(), store));
        let transport = Transport::with_timeout(
            self.connector,
            config.wallet_url.clone(),
            config.request_timeout(),
        );
        let signer = Signer::new(config.clone(), transport, state.clone(), self.auth);

        let events = Arc::new(ProviderEvents::default());
        {
            let events = events.clone();
            state.on_accounts_changed(move |accounts| events.accounts_changed.emit(accounts));
        }
        {
            let events = events.clone();
            state.on_chain_changed(move |chain| events.chain_changed.emit(chain.hex_id().as_str()));
        }

        tracing::info!(
            app = %config.metadata.app_name,
            wallet_url = %config.wallet_url,
            chain_id = state.chain().id,
            connected = state.is_connected(),
            "Provider ready"
        );

        Ok(Provider {
            config,
            state,
            signer,
            forwarder,
            events,
        })
    }
}

impl Provider {
    pub fn builder(
        config: Config,
        connector: Arc<dyn ChannelConnector>,
        auth: Arc<dyn SessionAuthenticator>,
    ) -> ProviderBuilder {
        ProviderBuilder {
            config,
            connector,
            auth,
            store: None,
            forwarder: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Connected means at least one account is known
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn accounts(&self) -> AccountSet {
        self.state.accounts()
    }

    pub fn chain(&self) -> Chain {
        self.state.chain()
    }

    /// Handle an untyped `{method, params?}` call
    pub async fn request(&self, args: Value) -> std::result::Result<Value, ProviderRpcError> {
        let args = RequestArguments::from_value(args)?;
        self.request_args(args).await
    }

    pub async fn request_args(
        &self,
        args: RequestArguments,
    ) -> std::result::Result<Value, ProviderRpcError> {
        match self.dispatch(&args).await {
            Ok(value) => Ok(value),
            Err(e) => {
                let error = e.to_rpc_error();
                if error.code == codes::UNAUTHORIZED {
                    tracing::warn!(method = %args.method, "Unauthorized, disconnecting");
                    if let Err(cleanup) = self.disconnect().await {
                        tracing::warn!(error = %cleanup, "Disconnect after unauthorized failed");
                    }
                } else {
                    tracing::debug!(method = %args.method, code = error.code, "Request failed");
                }
                Err(error)
            }
        }
    }

    async fn dispatch(&self, args: &RequestArguments) -> Result<Value> {
        let category = classify_with(&args.method, self.config.unknown_methods);
        tracing::debug!(method = %args.method, ?category, "Dispatching request");

        match category {
            MethodCategory::Handshake => self.handshake().await,
            MethodCategory::Sign => {
                if !self.state.is_connected() {
                    return Err(Error::Unauthorized(
                        "Must call 'eth_requestAccounts' before other methods".to_string(),
                    ));
                }
                self.signer.request(args).await
            }
            MethodCategory::State => self.answer_state(args),
            MethodCategory::Fetch => self.forwarder.forward(args, &self.state.chain()).await,
            MethodCategory::Deprecated => Err(Error::MethodNotSupported {
                method: args.method.clone(),
                status: MethodStatus::Deprecated,
            }),
            MethodCategory::Unsupported => Err(Error::MethodNotSupported {
                method: args.method.clone(),
                status: MethodStatus::NotSupported,
            }),
        }
    }

    async fn handshake(&self) -> Result<Value> {
        if self.state.is_connected() {
            self.emit_connect();
            return Ok(self.state.accounts().to_value());
        }
        let accounts = self.signer.handshake().await?;
        self.emit_connect();
        Ok(accounts.to_value())
    }

    fn emit_connect(&self) {
        let info = ConnectInfo {
            chain_id: self.state.chain().hex_id(),
        };
        tracing::info!(chain_id = %info.chain_id, "Provider connected");
        self.events.connect.emit(&info);
    }

    /// Queries answered from cached state, without the wallet
    fn answer_state(&self, args: &RequestArguments) -> Result<Value> {
        match args.method.as_str() {
            ETH_CHAIN_ID => Ok(json!(self.state.chain().hex_id())),
            NET_VERSION => Ok(json!(self.state.chain().id)),
            ETH_ACCOUNTS => Ok(self.connected_accounts()?.to_value()),
            ETH_COINBASE => {
                let first = self.connected_accounts()?.first();
                Ok(json!(first.map(|a| a.to_checksum(None))))
            }
            other => Err(Error::MethodNotSupported {
                method: other.to_string(),
                status: MethodStatus::NotSupported,
            }),
        }
    }

    fn connected_accounts(&self) -> Result<AccountSet> {
        let accounts = self.state.accounts();
        if accounts.is_empty() {
            return Err(Error::Unauthorized(
                "Must call 'eth_requestAccounts' before other methods".to_string(),
            ));
        }
        Ok(accounts)
    }

    /// End the session and notify `disconnect` listeners
    pub async fn disconnect(&self) -> Result<()> {
        let result = self.signer.disconnect().await;
        self.events
            .disconnect
            .emit(&ProviderRpcError::disconnected("User initiated disconnection"));
        result
    }

    /// Switch the wallet to `chain_id`, asking it to add the chain first if
    /// it does not recognize it.
    pub async fn switch_chain(&self, chain_id: u64) -> std::result::Result<Chain, ProviderRpcError> {
        if !self.config.is_configured(chain_id) {
            return Err(Error::ChainNotConfigured(chain_id).into());
        }

        let switch = RequestArguments::with_params(
            WALLET_SWITCH_ETHEREUM_CHAIN,
            json!([{ "chainId": hex_chain_id(chain_id) }]),
        );
        let error = match self.request_args(switch.clone()).await {
            Ok(_) => return Ok(self.state.chain()),
            Err(error) => error,
        };
        if error.code != codes::UNRECOGNIZED_CHAIN {
            return Err(Error::SwitchChainFailed(error).into());
        }

        let Some(chain) = self.config.chain(chain_id) else {
            return Err(Error::SwitchChainFailed(error).into());
        };
        tracing::info!(chain_id, "Wallet does not know the chain, adding it");
        let add = RequestArguments::with_params(
            WALLET_ADD_ETHEREUM_CHAIN,
            json!([{
                "chainId": hex_chain_id(chain.id),
                "chainName": chain.name,
                "nativeCurrency": chain.native_currency,
                "rpcUrls": chain.rpc_url.iter().collect::<Vec<_>>(),
                "blockExplorerUrls": chain.block_explorer_url.iter().collect::<Vec<_>>(),
            }]),
        );

        let retried = match self.request_args(add).await {
            Ok(_) => self.request_args(switch).await,
            Err(e) => Err(e),
        };
        match retried {
            Ok(_) => Ok(self.state.chain()),
            Err(cause) => Err(Error::UserRejected(
                "User rejected adding or switching to the chain".to_string(),
                Some(cause),
            )
            .into()),
        }
    }

    pub fn on_connect(&self, callback: impl Fn(&ConnectInfo) + Send + Sync + 'static) -> ListenerId {
        self.events.connect.add(callback)
    }

    pub fn on_disconnect(
        &self,
        callback: impl Fn(&ProviderRpcError) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.disconnect.add(callback)
    }

    /// Called with the new hex chain id
    pub fn on_chain_changed(&self, callback: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        self.events.chain_changed.add(callback)
    }

    pub fn on_accounts_changed(
        &self,
        callback: impl Fn(&AccountSet) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.accounts_changed.add(callback)
    }

    /// Returns false if no registry held `id`
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.connect.remove(id)
            || self.events.disconnect.remove(id)
            || self.events.chain_changed.remove(id)
            || self.events.accounts_changed.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemorySessionAuthenticator, Session};
    use crate::message::{RequestContent, ResponseContent, RpcRequestMessage, RpcResponse};
    use crate::method::{UnknownMethodPolicy, ETH_REQUEST_ACCOUNTS};
    use crate::transport::memory::{spawn_responder, MemoryConnector};
    use alloy::primitives::Address;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const ALICE: Address = Address::repeat_byte(0xaa);
    const BOB: Address = Address::repeat_byte(0xbb);

    #[derive(Default)]
    struct RecordingForwarder {
        calls: Mutex<Vec<(String, u64)>>,
    }

    #[async_trait]
    impl RpcForwarder for RecordingForwarder {
        async fn forward(&self, args: &RequestArguments, chain: &Chain) -> Result<Value> {
            self.calls.lock().push((args.method.clone(), chain.id));
            Ok(json!("0x0"))
        }
    }

    struct Fixture {
        provider: Provider,
        auth: Arc<MemorySessionAuthenticator>,
        connector: Arc<MemoryConnector>,
        forwarder: Arc<RecordingForwarder>,
        wallet_calls: Arc<Mutex<Vec<String>>>,
    }

    fn fixture<F>(mut config: Config, auth: MemorySessionAuthenticator, wallet: F) -> Fixture
    where
        F: Fn(&RequestArguments) -> ResponseContent + Send + Sync + 'static,
    {
        // A lost response fails the test instead of hanging it
        config.request_timeout_ms.get_or_insert(5_000);
        let (connector, remotes) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let wallet_calls = Arc::new(Mutex::new(Vec::new()));
        {
            let wallet_calls = wallet_calls.clone();
            spawn_responder(remotes, move |request: RpcRequestMessage| match &request.content {
                RequestContent::Action { action, .. } => {
                    wallet_calls.lock().push(action.method.clone());
                    Some(wallet(action))
                }
                _ => None,
            });
        }

        let auth = Arc::new(auth);
        let forwarder = Arc::new(RecordingForwarder::default());
        let provider = Provider::builder(config, connector.clone(), auth.clone())
            .forwarder(forwarder.clone())
            .build()
            .unwrap();

        Fixture {
            provider,
            auth,
            connector,
            forwarder,
            wallet_calls,
        }
    }

    fn value(value: Value) -> ResponseContent {
        ResponseContent::Response(RpcResponse::value(value))
    }

    fn failure(code: i64, message: &str) -> ResponseContent {
        ResponseContent::Failure {
            failure: ProviderRpcError::new(code, message),
        }
    }

    fn signed_in() -> MemorySessionAuthenticator {
        MemorySessionAuthenticator::signed_in(Session::new(ALICE))
    }

    fn unreachable_wallet(args: &RequestArguments) -> ResponseContent {
        failure(codes::INTERNAL, &format!("wallet should not see {}", args.method))
    }

    fn record<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |item: T| seen.lock().push(item)
        };
        (seen, sink)
    }

    #[tokio::test]
    async fn test_chain_id_before_handshake() {
        let f = fixture(Config::default(), MemorySessionAuthenticator::new(), unreachable_wallet);

        let chain_id = f.provider.request(json!({ "method": "eth_chainId" })).await.unwrap();
        let version = f.provider.request(json!({ "method": "net_version" })).await.unwrap();

        assert_eq!(chain_id, json!("0x1"));
        assert_eq!(version, json!(1));
        assert_eq!(f.connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_accounts_before_handshake_is_unauthorized() {
        let f = fixture(Config::default(), MemorySessionAuthenticator::new(), unreachable_wallet);
        let (disconnects, sink) = record::<i64>();
        f.provider.on_disconnect(move |e| sink(e.code));

        let err = f
            .provider
            .request(json!({ "method": "eth_accounts" }))
            .await
            .unwrap_err();

        assert_eq!(err.code, codes::UNAUTHORIZED);
        // Unauthorized disconnects before the error is returned
        assert_eq!(*disconnects.lock(), vec![codes::DISCONNECTED]);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let f = fixture(Config::default(), MemorySessionAuthenticator::new(), unreachable_wallet);

        for bad in [
            json!(["eth_chainId"]),
            json!({ "method": "" }),
            json!({ "method": "eth_call", "params": "0x1" }),
        ] {
            let err = f.provider.request(bad).await.unwrap_err();
            assert_eq!(err.code, codes::INVALID_PARAMS);
        }
    }

    #[tokio::test]
    async fn test_handshake_with_session_skips_transport() {
        let f = fixture(Config::default(), signed_in(), unreachable_wallet);
        let (connects, sink) = record::<String>();
        f.provider.on_connect(move |info| sink(info.chain_id.clone()));
        let (accounts_seen, accounts_sink) = record::<usize>();
        f.provider.on_accounts_changed(move |a| accounts_sink(a.len()));

        let accounts = f
            .provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();

        assert_eq!(accounts, json!([ALICE.to_checksum(None)]));
        assert_eq!(f.connector.connect_count(), 0);
        assert_eq!(*connects.lock(), vec!["0x1".to_string()]);
        assert_eq!(*accounts_seen.lock(), vec![1]);

        // Already connected: no second session lookup, connect fires again
        let lookups = f.auth.lookup_count();
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();
        assert_eq!(f.auth.lookup_count(), lookups);
        assert_eq!(connects.lock().len(), 2);
        assert_eq!(*accounts_seen.lock(), vec![1]);

        let coinbase = f.provider.request(json!({ "method": "eth_coinbase" })).await.unwrap();
        assert_eq!(coinbase, json!(ALICE.to_checksum(None)));
    }

    #[tokio::test]
    async fn test_sign_requires_connection() {
        let f = fixture(Config::default(), signed_in(), unreachable_wallet);

        let err = f
            .provider
            .request(json!({ "method": "personal_sign", "params": ["0x00", "0x00"] }))
            .await
            .unwrap_err();

        assert_eq!(err.code, codes::UNAUTHORIZED);
        assert_eq!(f.connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_round_trip() {
        let f = fixture(Config::default(), signed_in(), |args| {
            match args.method.as_str() {
                "personal_sign" => value(json!("0xsignature")),
                ETH_REQUEST_ACCOUNTS => value(json!([BOB.to_checksum(None), ALICE.to_checksum(None)])),
                _ => failure(codes::INTERNAL, "unexpected"),
            }
        });
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();

        let signature = f
            .provider
            .request(json!({ "method": "personal_sign", "params": ["0x68690a", ALICE.to_checksum(None)] }))
            .await
            .unwrap();
        assert_eq!(signature, json!("0xsignature"));
        assert_eq!(*f.wallet_calls.lock(), vec!["personal_sign".to_string()]);
    }

    #[tokio::test]
    async fn test_switch_to_active_chain_is_noop() {
        let f = fixture(Config::default(), signed_in(), unreachable_wallet);
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();
        let (changes, sink) = record::<String>();
        f.provider.on_chain_changed(move |id| sink(id.to_string()));

        let result = f
            .provider
            .request(json!({ "method": WALLET_SWITCH_ETHEREUM_CHAIN, "params": [{ "chainId": "0x1" }] }))
            .await
            .unwrap();

        assert_eq!(result, Value::Null);
        assert_eq!(f.connector.connect_count(), 0);
        assert!(changes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_switch_to_unconfigured_chain() {
        let f = fixture(Config::default(), signed_in(), unreachable_wallet);
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();

        let err = f.provider.switch_chain(1337).await.unwrap_err();

        assert_eq!(err.code, codes::UNRECOGNIZED_CHAIN);
        assert_eq!(err.data, Some(json!({ "chainId": 1337 })));
        assert_eq!(f.connector.connect_count(), 0);
        assert!(f.provider.is_connected());
    }

    #[tokio::test]
    async fn test_switch_chain_emits_chain_changed() {
        let f = fixture(Config::default(), signed_in(), |args| match args.method.as_str() {
            WALLET_SWITCH_ETHEREUM_CHAIN => value(Value::Null),
            _ => failure(codes::INTERNAL, "unexpected"),
        });
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();
        let (changes, sink) = record::<String>();
        f.provider.on_chain_changed(move |id| sink(id.to_string()));

        let chain = f.provider.switch_chain(8453).await.unwrap();

        assert_eq!(chain.id, 8453);
        assert_eq!(*changes.lock(), vec!["0x2105".to_string()]);
        let chain_id = f.provider.request(json!({ "method": "eth_chainId" })).await.unwrap();
        assert_eq!(chain_id, json!("0x2105"));
    }

    #[tokio::test]
    async fn test_switch_chain_adds_unknown_chain_then_retries() {
        let added = Arc::new(Mutex::new(false));
        let f = {
            let added = added.clone();
            fixture(Config::default(), signed_in(), move |args| {
                match args.method.as_str() {
                    WALLET_SWITCH_ETHEREUM_CHAIN if !*added.lock() => {
                        failure(codes::UNRECOGNIZED_CHAIN, "Unrecognized chain ID")
                    }
                    WALLET_SWITCH_ETHEREUM_CHAIN => value(Value::Null),
                    WALLET_ADD_ETHEREUM_CHAIN => {
                        assert_eq!(args.first_param().unwrap()["chainName"], json!("Base"));
                        *added.lock() = true;
                        value(Value::Null)
                    }
                    _ => failure(codes::INTERNAL, "unexpected"),
                }
            })
        };
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();

        let chain = f.provider.switch_chain(8453).await.unwrap();

        assert_eq!(chain.id, 8453);
        assert_eq!(
            *f.wallet_calls.lock(),
            vec![
                WALLET_SWITCH_ETHEREUM_CHAIN.to_string(),
                WALLET_ADD_ETHEREUM_CHAIN.to_string(),
                WALLET_SWITCH_ETHEREUM_CHAIN.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_switch_chain_add_rejected() {
        let f = fixture(Config::default(), signed_in(), |args| match args.method.as_str() {
            WALLET_SWITCH_ETHEREUM_CHAIN => failure(codes::UNRECOGNIZED_CHAIN, "Unrecognized chain ID"),
            _ => failure(codes::USER_REJECTED, "User rejected the request."),
        });
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();

        let err = f.provider.switch_chain(8453).await.unwrap_err();

        assert_eq!(err.code, codes::USER_REJECTED);
        assert_eq!(err.data.unwrap()["cause"]["code"], json!(codes::USER_REJECTED));
        assert_eq!(f.provider.chain().id, 1);
    }

    #[tokio::test]
    async fn test_switch_chain_other_failure() {
        let f = fixture(Config::default(), signed_in(), |_| failure(-32000, "busy"));
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();

        let err = f.provider.switch_chain(8453).await.unwrap_err();

        assert_eq!(err.code, codes::UNRECOGNIZED_CHAIN);
        assert_eq!(err.data.unwrap()["cause"]["message"], json!("busy"));
    }

    #[tokio::test]
    async fn test_unauthorized_from_wallet_disconnects_and_surfaces_error() {
        let f = fixture(Config::default(), signed_in(), |_| {
            failure(codes::UNAUTHORIZED, "Session expired")
        });
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();
        let (disconnects, sink) = record::<String>();
        f.provider.on_disconnect(move |e| sink(e.message.clone()));

        let err = f
            .provider
            .request(json!({ "method": "eth_sendTransaction", "params": [{}] }))
            .await
            .unwrap_err();

        assert_eq!(err, ProviderRpcError::new(codes::UNAUTHORIZED, "Session expired"));
        assert_eq!(*disconnects.lock(), vec!["User initiated disconnection".to_string()]);
        assert!(!f.provider.is_connected());
        assert_eq!(f.auth.sign_out_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_resets_state() {
        let f = fixture(Config::default(), signed_in(), |_| value(Value::Null));
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();
        f.provider.switch_chain(8453).await.unwrap();

        f.provider.disconnect().await.unwrap();

        assert!(f.provider.accounts().is_empty());
        assert_eq!(f.provider.chain(), Chain::new(1));
        assert!(!f.provider.signer().transport().is_open());
    }

    #[tokio::test]
    async fn test_fetch_and_unsupported_routing() {
        let f = fixture(Config::default(), MemorySessionAuthenticator::new(), unreachable_wallet);

        let balance = f
            .provider
            .request(json!({ "method": "eth_getBalance", "params": [ALICE.to_checksum(None), "latest"] }))
            .await
            .unwrap();
        assert_eq!(balance, json!("0x0"));
        assert_eq!(
            *f.forwarder.calls.lock(),
            vec![("eth_getBalance".to_string(), 1)]
        );

        let err = f.provider.request(json!({ "method": "eth_sign" })).await.unwrap_err();
        assert_eq!(err.code, codes::METHOD_NOT_SUPPORTED);
        assert_eq!(err.data, Some(json!({ "method": "eth_sign" })));

        let err = f
            .provider
            .request(json!({ "method": "eth_subscribe" }))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::METHOD_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_unknown_methods_rejected_when_configured() {
        let config = Config {
            unknown_methods: UnknownMethodPolicy::Unsupported,
            ..Config::default()
        };
        let f = fixture(config, MemorySessionAuthenticator::new(), unreachable_wallet);

        let err = f
            .provider
            .request(json!({ "method": "eth_getBalance" }))
            .await
            .unwrap_err();

        assert_eq!(err.code, codes::METHOD_NOT_SUPPORTED);
        assert!(f.forwarder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_listener_removal() {
        let f = fixture(Config::default(), signed_in(), unreachable_wallet);
        let (connects, sink) = record::<String>();
        let id = f.provider.on_connect(move |info| sink(info.chain_id.clone()));

        assert!(f.provider.remove_listener(id));
        assert!(!f.provider.remove_listener(id));
        f.provider
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await
            .unwrap();

        assert!(connects.lock().is_empty());
    }

    #[tokio::test]
    async fn test_state_persists_across_providers() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_path: Some(dir.path().join("session.json").display().to_string()),
            ..Config::default()
        };

        {
            let f = fixture(config.clone(), signed_in(), |_| value(Value::Null));
            f.provider
                .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
                .await
                .unwrap();
            f.provider.switch_chain(8453).await.unwrap();
        }

        let f = fixture(config, signed_in(), unreachable_wallet);
        let (accounts_seen, sink) = record::<usize>();
        f.provider.on_accounts_changed(move |a| sink(a.len()));

        assert!(f.provider.is_connected());
        assert_eq!(f.provider.chain().id, 8453);
        let accounts = f
            .provider
            .request(json!({ "method": "eth_accounts" }))
            .await
            .unwrap();
        assert_eq!(accounts, json!([ALICE.to_checksum(None)]));
        assert!(accounts_seen.lock().is_empty());
    }
}
