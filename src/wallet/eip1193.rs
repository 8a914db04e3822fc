//! EIP-1193 provider capability set and its JSON-RPC implementation

use crate::config::EvmConfig;
use crate::error::ConnectionError;
use crate::wallet::format_balance;

use async_trait::async_trait;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::U256;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// JSON-RPC error code for a request rejected by the user
const USER_REJECTED_REQUEST: i64 = 4001;
/// JSON-RPC error code for an unknown chain in `wallet_switchEthereumChain`
const UNRECOGNIZED_CHAIN: i64 = 4902;

/// Change notifications emitted by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

/// Requests the source-chain wallet understands
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// Whether a provider is reachable
    async fn is_available(&self) -> bool;

    /// `eth_requestAccounts`: prompts the user for access
    async fn request_accounts(&self) -> Result<Vec<String>, ConnectionError>;

    /// `eth_accounts`: accounts already exposed, without prompting
    async fn accounts(&self) -> Result<Vec<String>, ConnectionError>;

    /// `eth_chainId`, hex encoded
    async fn chain_id(&self) -> Result<String, ConnectionError>;

    /// `wallet_switchEthereumChain`
    async fn switch_chain(&self, chain_id: &str) -> Result<(), ConnectionError>;

    /// Native balance in ether, formatted to four decimal places
    async fn balance(&self, address: &str) -> Result<String, ConnectionError>;

    /// Subscribe to account and chain change notifications
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// EIP-1193 provider reached over JSON-RPC.
///
/// JSON-RPC has no push notifications, so account and chain changes are
/// detected by [`JsonRpcProvider::spawn_change_watcher`].
pub struct JsonRpcProvider {
    provider: Provider<Http>,
    events: broadcast::Sender<ProviderEvent>,
    poll_interval: Duration,
    shutdown: Arc<RwLock<bool>>,
}

impl JsonRpcProvider {
    pub fn new(config: &EvmConfig) -> Result<Self, ConnectionError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| ConnectionError::Provider(format!("Invalid RPC URL: {}", e)))?;
        let (events, _) = broadcast::channel(64);

        Ok(Self {
            provider,
            events,
            poll_interval: Duration::from_millis(config.event_poll_interval_ms),
            shutdown: Arc::new(RwLock::new(false)),
        })
    }

    /// Poll accounts and chain id, emitting an event whenever either changes
    pub fn spawn_change_watcher(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_accounts = self.accounts().await.ok();
            let mut last_chain = self.chain_id().await.ok();
            info!("Watching EVM provider for account and chain changes");

            loop {
                tokio::time::sleep(self.poll_interval).await;
                if *self.shutdown.read().await {
                    break;
                }

                match self.accounts().await {
                    Ok(accounts) => {
                        if last_accounts.as_ref() != Some(&accounts) {
                            debug!("EVM accounts changed: {:?}", accounts);
                            let _ = self.events.send(ProviderEvent::AccountsChanged(accounts.clone()));
                            last_accounts = Some(accounts);
                        }
                    }
                    Err(e) => warn!("Failed to poll EVM accounts: {}", e),
                }

                match self.chain_id().await {
                    Ok(chain_id) => {
                        if last_chain.as_ref() != Some(&chain_id) {
                            debug!("EVM chain changed: {}", chain_id);
                            let _ = self.events.send(ProviderEvent::ChainChanged(chain_id.clone()));
                            last_chain = Some(chain_id);
                        }
                    }
                    Err(e) => warn!("Failed to poll EVM chain id: {}", e),
                }
            }
        })
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }
}

#[async_trait]
impl Eip1193Provider for JsonRpcProvider {
    async fn is_available(&self) -> bool {
        self.chain_id().await.is_ok()
    }

    async fn request_accounts(&self) -> Result<Vec<String>, ConnectionError> {
        self.provider
            .request::<_, Vec<String>>("eth_requestAccounts", ())
            .await
            .map_err(map_provider_error)
    }

    async fn accounts(&self) -> Result<Vec<String>, ConnectionError> {
        self.provider
            .request::<_, Vec<String>>("eth_accounts", ())
            .await
            .map_err(map_provider_error)
    }

    async fn chain_id(&self) -> Result<String, ConnectionError> {
        self.provider
            .request::<_, String>("eth_chainId", ())
            .await
            .map_err(map_provider_error)
    }

    async fn switch_chain(&self, chain_id: &str) -> Result<(), ConnectionError> {
        let params = [serde_json::json!({ "chainId": chain_id })];
        match self
            .provider
            .request::<_, serde_json::Value>("wallet_switchEthereumChain", params)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if rpc_code(&e) == Some(UNRECOGNIZED_CHAIN) => {
                Err(ConnectionError::ChainNotAdded(chain_id.to_string()))
            }
            Err(e) => Err(map_provider_error(e)),
        }
    }

    async fn balance(&self, address: &str) -> Result<String, ConnectionError> {
        let wei = self
            .provider
            .request::<_, U256>("eth_getBalance", [address, "latest"])
            .await
            .map_err(map_provider_error)?;
        wei_to_ether(wei)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

fn rpc_code(err: &ProviderError) -> Option<i64> {
    err.as_error_response().map(|resp| resp.code)
}

fn map_provider_error(err: ProviderError) -> ConnectionError {
    if rpc_code(&err) == Some(USER_REJECTED_REQUEST) {
        return ConnectionError::UserDeclined;
    }

    match err {
        ProviderError::HTTPError(_) => ConnectionError::ProviderUnavailable,
        other => ConnectionError::Provider(other.to_string()),
    }
}

fn wei_to_ether(wei: U256) -> Result<String, ConnectionError> {
    let ether = ethers::utils::format_units(wei, "ether")
        .map_err(|e| ConnectionError::Provider(e.to_string()))?;
    let ether = Decimal::from_str(&ether)
        .map_err(|e| ConnectionError::Provider(format!("Unreadable balance {ether}: {e}")))?;
    Ok(format_balance(ether))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wei_to_ether() {
        let one_and_a_half = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(wei_to_ether(one_and_a_half).unwrap(), "1.5000");
        assert_eq!(wei_to_ether(U256::zero()).unwrap(), "0.0000");
        assert_eq!(wei_to_ether(U256::from(123_456_789u64)).unwrap(), "0.0000");
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let provider = JsonRpcProvider::new(&EvmConfig {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            event_poll_interval_ms: 1000,
        })
        .unwrap();

        let mut rx = provider.subscribe();
        provider
            .events
            .send(ProviderEvent::ChainChanged("0x89".to_string()))
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ProviderEvent::ChainChanged("0x89".to_string())
        );
    }

    #[test]
    fn test_invalid_rpc_url() {
        let result = JsonRpcProvider::new(&EvmConfig {
            rpc_url: "not a url".to_string(),
            event_poll_interval_ms: 1000,
        });
        assert!(matches!(result, Err(ConnectionError::Provider(_))));
    }
}
