//! Alias provider CLI
//!
//! Inspect configuration, classify methods, proxy read-only RPC calls, and
//! run the provider end to end against an in-process wallet.

use alias_wallet_provider::auth::{MemorySessionAuthenticator, Session};
use alias_wallet_provider::fetch::{HttpRpcForwarder, RpcForwarder};
use alias_wallet_provider::message::RequestArguments;
use alias_wallet_provider::types::AvailableChains;
use alias_wallet_provider::wallet::{SecureWallet, WalletHost};
use alias_wallet_provider::{
    classify_with, Chain, Config, Error, Network, Provider, Result, RpcConfig,
    UnknownMethodPolicy,
};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "alias-provider")]
#[command(about = "Account provider backed by a remote wallet context")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,

    /// Show how the provider routes method names
    Classify {
        methods: Vec<String>,

        /// Treat names missing from the method table as unsupported
        #[arg(long)]
        strict: bool,
    },

    /// Forward a read-only call to the chain RPC
    Fetch {
        /// JSON-RPC method, e.g. eth_blockNumber
        #[arg(short, long)]
        method: String,

        /// Params as a JSON array or object
        #[arg(short = 'P', long)]
        params: Option<String>,

        /// Network (ethereum, arbitrum, optimism, base)
        #[arg(short, long, default_value = "ethereum")]
        network: String,
    },

    /// Run a full session against an in-process wallet
    Demo {
        /// Chain to switch to during the demo
        #[arg(long, default_value_t = 8453)]
        switch_to: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let config = match cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Classify { methods, strict } => {
            let policy = if strict {
                UnknownMethodPolicy::Unsupported
            } else {
                config.unknown_methods
            };
            for method in methods {
                println!("{:<32} {:?}", method, classify_with(&method, policy));
            }
        }
        Commands::Fetch {
            method,
            params,
            network,
        } => {
            run_fetch(&config, method, params, network).await?;
        }
        Commands::Demo { switch_to } => {
            run_demo(config, switch_to).await?;
        }
    }

    Ok(())
}

async fn run_fetch(
    config: &Config,
    method: String,
    params: Option<String>,
    network: String,
) -> Result<()> {
    let network = Network::from_name(&network)
        .ok_or_else(|| Error::InvalidParams(format!("Unknown network: {}", network)))?;
    let args = match params {
        Some(raw) => RequestArguments::from_value(json!({
            "method": method,
            "params": serde_json::from_str::<Value>(&raw)?,
        }))?,
        None => RequestArguments::new(method),
    };

    let forwarder = HttpRpcForwarder::new(config, &RpcConfig::from_env());
    let result = forwarder
        .forward(&args, &Chain::new(network.chain_id()))
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_demo(config: Config, switch_to: u64) -> Result<()> {
    let wallet = match std::env::var("PRIVATE_KEY") {
        Ok(_) => SecureWallet::from_env("PRIVATE_KEY")?,
        Err(_) => {
            tracing::warn!("No PRIVATE_KEY set, using a random key");
            SecureWallet::random()
        }
    };
    let address = wallet.address();

    // The wallet starts out knowing only the default chain
    let mut known = AvailableChains::new();
    let default_chain = config.default_chain_id();
    if let Some(url) = config.chain(default_chain).and_then(|c| c.rpc_url.clone()) {
        known.insert(default_chain, url);
    }
    let host = Arc::new(WalletHost::new(wallet, known));
    let (connector, _serving) = host.clone().spawn();

    let auth = Arc::new(MemorySessionAuthenticator::new());
    auth.grant_on_sign_in(Session::new(address));

    let provider = Provider::builder(config, connector, auth).build()?;
    provider.on_connect(|info| println!("event connect        {}", info.chain_id));
    provider.on_accounts_changed(|accounts| {
        println!("event accountsChanged {:?}", accounts.to_checksummed())
    });
    provider.on_chain_changed(|chain_id| println!("event chainChanged   {}", chain_id));
    provider.on_disconnect(|e| println!("event disconnect     {} {}", e.code, e.message));

    let provider_ref = &provider;
    let call = move |method: &'static str, params: Value| {
        let provider = provider_ref;
        async move {
            let result = provider
                .request(json!({ "method": method, "params": params }))
                .await
                .map_err(Error::RemoteFailure)?;
            println!("{:<28} {}", method, result);
            Ok::<Value, Error>(result)
        }
    };

    call("eth_chainId", json!([])).await?;
    // First handshake starts sign-in, the second finds the session
    call("eth_requestAccounts", json!([])).await?;
    call("eth_requestAccounts", json!([])).await?;

    let message = alloy::hex::encode_prefixed("hello from alias");
    let checksummed = address.to_checksum(None);
    let (signature, chain_id) = futures::future::join(
        call("personal_sign", json!([message, checksummed])),
        call("eth_chainId", json!([])),
    )
    .await;
    signature?;
    chain_id?;

    let chain = provider
        .switch_chain(switch_to)
        .await
        .map_err(Error::RemoteFailure)?;
    println!("{:<28} {} ({:?})", "switched", chain.id, chain.rpc_url);
    call("eth_chainId", json!([])).await?;

    provider.disconnect().await?;
    println!(
        "wallet answered {} requests; connected = {}",
        host.request_count(),
        provider.is_connected()
    );
    Ok(())
}
