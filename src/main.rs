//! Stellar Bridge - wallet bridge between Ethereum-family chains and Stellar
//!
//! Keeps EVM and Freighter wallet snapshots current and runs swap requests
//! through validation, signing and settlement on the Stellar ledger.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

mod api;
mod config;
mod error;
mod ledger;
mod metrics;
mod swap;
mod sync;
mod tokens;
mod wallet;

use config::{Settings, SignerMode, StellarNetwork};
use ledger::HorizonClient;
use metrics::MetricsServer;
use swap::{SwapOrchestrator, SwapTracker};
use sync::WalletSynchronizer;
use wallet::{
    EvmWallet, FreighterBridgeClient, JsonRpcProvider, LocalKeySigner, StellarWallet,
    TransactionSigner, WalletAdapter,
};

const TRACKER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Stellar Bridge v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    let network = settings.stellar.network;
    info!(
        "Loaded configuration for {} (instance {})",
        network.name(),
        settings.service.instance_id
    );

    // Horizon for the configured network settles swaps. The other networks
    // only serve balance lookups when the extension points elsewhere.
    let horizon = Arc::new(HorizonClient::new(settings.stellar.horizon_url())?);
    info!("Using Horizon at {}", horizon.base_url());

    let freighter = Arc::new(FreighterBridgeClient::new(&settings.freighter)?);
    let mut stellar_wallet = StellarWallet::new(freighter).with_ledger(network, horizon.clone());
    for other in StellarNetwork::ALL {
        if other != network {
            let client = HorizonClient::new(other.default_horizon_url())?;
            stellar_wallet = stellar_wallet.with_ledger(other, Arc::new(client));
        }
    }
    let stellar_wallet = Arc::new(stellar_wallet);

    let evm_provider = Arc::new(JsonRpcProvider::new(&settings.evm)?);
    let evm_wallet = Arc::new(EvmWallet::new(evm_provider.clone()));
    let provider_events = evm_wallet.events();
    info!("EVM provider initialized");

    let signer: Arc<dyn TransactionSigner> = match settings.signer.mode {
        SignerMode::Freighter => stellar_wallet.clone(),
        SignerMode::Local => {
            let var = settings
                .signer
                .secret_key_env
                .as_deref()
                .context("signer.secret_key_env is required in local signer mode")?;
            let signer = LocalKeySigner::from_env(var)?;
            warn!("Signing locally as {}", signer.address());
            Arc::new(signer)
        }
    };

    let adapters: Vec<Arc<dyn WalletAdapter>> = vec![evm_wallet.clone(), stellar_wallet];
    let synchronizer = Arc::new(WalletSynchronizer::new(
        adapters,
        Duration::from_secs(settings.service.poll_interval_secs),
    ));

    let tracker = Arc::new(SwapTracker::new());
    let orchestrator = Arc::new(SwapOrchestrator::new(
        &settings,
        horizon,
        synchronizer.clone(),
        tracker.clone(),
    ));
    info!("Swap orchestrator initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = api::AppState {
            synchronizer: synchronizer.clone(),
            orchestrator,
            signer,
            evm_wallet: Some(evm_wallet),
            metrics_enabled: settings.metrics.enabled,
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server if enabled
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let watcher_handle = evm_provider.clone().spawn_change_watcher();
    let sync_handle = tokio::spawn(synchronizer.clone().run(provider_events));
    let change_handles = spawn_change_logs(&synchronizer);

    // Drop finished attempts after the retention window
    let cleanup_handle = tokio::spawn({
        let retention = settings.service.attempt_retention_secs;
        async move {
            let mut ticker = tokio::time::interval(TRACKER_CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                if tracker.is_empty() {
                    continue;
                }
                let removed = tracker.cleanup(retention);
                if removed > 0 {
                    debug!("Dropped {} finished swap attempts", removed);
                }
            }
        }
    });

    info!("Stellar Bridge is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    synchronizer.stop();
    evm_provider.stop().await;

    api_handle.abort();
    watcher_handle.abort();
    sync_handle.abort();
    cleanup_handle.abort();
    for h in change_handles {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Stellar Bridge stopped");
    Ok(())
}

/// Log connection and account changes as the synchronizer publishes them
fn spawn_change_logs(synchronizer: &WalletSynchronizer) -> Vec<JoinHandle<()>> {
    synchronizer
        .chains()
        .filter_map(|chain| synchronizer.subscribe(chain).map(|rx| (chain, rx)))
        .map(|(chain, mut rx)| {
            tokio::spawn(async move {
                let mut last = rx.borrow_and_update().address().map(str::to_string);
                while rx.changed().await.is_ok() {
                    let current = rx.borrow_and_update().address().map(str::to_string);
                    if current != last {
                        match &current {
                            Some(address) => info!("{} wallet now at {}", chain, address),
                            None => info!("{} wallet disconnected", chain),
                        }
                        last = current;
                    }
                }
            })
        })
        .collect()
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stellar_bridge=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
