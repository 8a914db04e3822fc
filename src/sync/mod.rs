//! Wallet-state synchronizer
//!
//! Keeps one snapshot per wallet, refreshed through `refresh`, on a fixed
//! interval while connected, and on provider change events. Snapshots are published
//! through `watch` channels and always replaced whole, so readers never see
//! fields from two different refreshes.

use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::swap::{BalanceSource, Network};
use crate::wallet::{ProviderEvent, WalletAdapter, WalletChain, WalletSnapshot};

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Instructions for the background loop
#[derive(Debug, Clone, Copy)]
enum Command {
    Stop,
}

pub struct WalletSynchronizer {
    adapters: HashMap<WalletChain, Arc<dyn WalletAdapter>>,
    snapshots: HashMap<WalletChain, watch::Sender<Arc<WalletSnapshot>>>,
    poll_interval: Duration,
    commands: mpsc::UnboundedSender<Command>,
    /// Taken by `run`
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

impl WalletSynchronizer {
    pub fn new(adapters: Vec<Arc<dyn WalletAdapter>>, poll_interval: Duration) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let mut by_chain = HashMap::new();
        let mut snapshots = HashMap::new();

        for adapter in adapters {
            let chain = adapter.chain();
            let (tx, _) = watch::channel(Arc::new(WalletSnapshot::disconnected()));
            snapshots.insert(chain, tx);
            by_chain.insert(chain, adapter);
        }

        Self {
            adapters: by_chain,
            snapshots,
            poll_interval,
            commands,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Latest snapshot; a chain without an adapter reads as disconnected
    pub fn snapshot(&self, chain: WalletChain) -> Arc<WalletSnapshot> {
        self.snapshots
            .get(&chain)
            .map(|tx| tx.borrow().clone())
            .unwrap_or_else(|| Arc::new(WalletSnapshot::disconnected()))
    }

    pub fn subscribe(&self, chain: WalletChain) -> Option<watch::Receiver<Arc<WalletSnapshot>>> {
        self.snapshots.get(&chain).map(|tx| tx.subscribe())
    }

    pub fn chains(&self) -> impl Iterator<Item = WalletChain> + '_ {
        WalletChain::ALL
            .into_iter()
            .filter(|chain| self.adapters.contains_key(chain))
    }

    /// Query the wallet now and publish the result
    pub async fn refresh(&self, chain: WalletChain) -> BridgeResult<Arc<WalletSnapshot>> {
        let adapter = self.adapter(chain)?;
        let snapshot = Arc::new(adapter.query_state().await);
        self.publish(chain, snapshot.clone());
        Ok(snapshot)
    }

    /// Refresh every wallet concurrently
    pub async fn refresh_all(&self) {
        let refreshes = self.chains().map(|chain| self.refresh_quietly(chain));
        futures::future::join_all(refreshes).await;
    }

    /// Ask the user to connect the wallet, then refresh its snapshot
    pub async fn connect(&self, chain: WalletChain) -> BridgeResult<Arc<WalletSnapshot>> {
        let adapter = self.adapter(chain)?;
        let address = adapter.request_connection().await?;
        info!("{} wallet connected as {}", chain, address);
        self.refresh(chain).await
    }

    /// Background loop. Refreshes connected wallets every poll interval and
    /// the EVM wallet on source-provider events.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ProviderEvent>) {
        let Some(mut commands) = self.receiver.lock().await.take() else {
            warn!("Wallet synchronizer is already running");
            return;
        };

        info!(
            "Starting wallet synchronizer (poll every {:?})",
            self.poll_interval
        );
        self.refresh_all().await;

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_connected().await;
                }
                Some(Command::Stop) = commands.recv() => break,
                event = events.recv(), if events_open => {
                    match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Missed {} provider events, refreshing", skipped);
                            self.refresh_quietly(WalletChain::Evm).await;
                        }
                        Err(RecvError::Closed) => {
                            warn!("Provider event stream closed");
                            events_open = false;
                        }
                    }
                }
            }
        }

        info!("Wallet synchronizer stopped");
    }

    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    async fn poll_connected(&self) {
        let connected: Vec<_> = self
            .chains()
            .filter(|chain| self.snapshot(*chain).is_connected())
            .collect();

        for chain in connected {
            self.refresh_quietly(chain).await;
        }
    }

    async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                info!("EVM wallet disconnected");
                self.publish(WalletChain::Evm, Arc::new(WalletSnapshot::disconnected()));
            }
            ProviderEvent::AccountsChanged(_) => {
                debug!("EVM accounts changed, refreshing");
                self.refresh_quietly(WalletChain::Evm).await;
            }
            ProviderEvent::ChainChanged(chain_id) => {
                debug!("EVM chain changed to {}, refreshing", chain_id);
                self.refresh_quietly(WalletChain::Evm).await;
            }
        }
    }

    async fn refresh_quietly(&self, chain: WalletChain) {
        if let Err(e) = self.refresh(chain).await {
            warn!("Failed to refresh {} wallet: {}", chain, e);
        }
    }

    fn adapter(&self, chain: WalletChain) -> BridgeResult<&Arc<dyn WalletAdapter>> {
        self.adapters
            .get(&chain)
            .ok_or_else(|| BridgeError::UnknownChain(chain.to_string()))
    }

    fn publish(&self, chain: WalletChain, snapshot: Arc<WalletSnapshot>) {
        metrics::record_wallet_refresh(chain.as_str(), snapshot.is_connected());
        if let Some(tx) = self.snapshots.get(&chain) {
            tx.send_replace(snapshot);
        }
    }
}

impl BalanceSource for WalletSynchronizer {
    fn available_balance(&self, network: Network) -> Option<Decimal> {
        let chain = match network {
            Network::Ethereum | Network::Polygon => WalletChain::Evm,
            Network::Stellar => WalletChain::Stellar,
            Network::Solana => return None,
        };

        let snapshot = self.snapshot(chain);
        if !snapshot.is_connected() {
            return None;
        }
        snapshot.balance_decimal()
    }
}
