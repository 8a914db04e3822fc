//! Source-chain wallet over an EIP-1193 provider

use super::{Eip1193Provider, ProviderEvent, WalletAdapter, WalletChain, WalletDetails, WalletSnapshot};
use crate::error::ConnectionError;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Human readable name for a hex chain id
pub fn chain_name(chain_id: &str) -> String {
    match chain_id.to_lowercase().as_str() {
        "0x1" => "Ethereum Mainnet".to_string(),
        "0x89" => "Polygon Mainnet".to_string(),
        "0xaa36a7" => "Sepolia Testnet".to_string(),
        "0x5" => "Goerli Testnet".to_string(),
        _ => format!("Chain {}", chain_id),
    }
}

/// Ethereum-compatible wallet (MetaMask and friends)
pub struct EvmWallet {
    provider: Arc<dyn Eip1193Provider>,
}

impl EvmWallet {
    pub fn new(provider: Arc<dyn Eip1193Provider>) -> Self {
        Self { provider }
    }

    /// Ask the wallet to switch to another chain
    pub async fn switch_chain(&self, chain_id: &str) -> Result<(), ConnectionError> {
        info!("Requesting switch to chain {}", chain_id);
        self.provider.switch_chain(chain_id).await
    }

    /// Account and chain change notifications from the provider
    pub fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.provider.subscribe()
    }
}

#[async_trait]
impl WalletAdapter for EvmWallet {
    fn chain(&self) -> WalletChain {
        WalletChain::Evm
    }

    async fn detect_availability(&self) -> bool {
        self.provider.is_available().await
    }

    async fn query_state(&self) -> WalletSnapshot {
        let accounts = match self.provider.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                debug!("EVM wallet unavailable: {}", e);
                return WalletSnapshot::disconnected();
            }
        };

        // Connected iff the wallet exposes an account
        let Some(address) = accounts.into_iter().next() else {
            return WalletSnapshot::disconnected();
        };

        let network_id = match self.provider.chain_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to read chain id: {}", e);
                None
            }
        };

        let balance = match self.provider.balance(&address).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("Failed to read balance of {}: {}", address, e);
                None
            }
        };

        WalletSnapshot::connected(WalletDetails {
            permission_granted: true,
            network_name: network_id.as_deref().map(chain_name),
            address: Some(address),
            network_id,
            balance,
        })
    }

    async fn request_connection(&self) -> Result<String, ConnectionError> {
        if !self.provider.is_available().await {
            return Err(ConnectionError::ProviderUnavailable);
        }

        let accounts = self.provider.request_accounts().await?;
        let address = accounts.into_iter().next().ok_or(ConnectionError::NoAccounts)?;
        info!("EVM wallet connected: {}", address);
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::eip1193::MockEip1193Provider;

    fn connected_provider() -> MockEip1193Provider {
        let mut provider = MockEip1193Provider::new();
        provider
            .expect_accounts()
            .returning(|| Ok(vec!["0xabc".to_string()]));
        provider
            .expect_chain_id()
            .returning(|| Ok("0x89".to_string()));
        provider
            .expect_balance()
            .returning(|_| Ok("2.5000".to_string()));
        provider
    }

    #[test]
    fn test_chain_names() {
        assert_eq!(chain_name("0x1"), "Ethereum Mainnet");
        assert_eq!(chain_name("0x89"), "Polygon Mainnet");
        assert_eq!(chain_name("0xAA36A7"), "Sepolia Testnet");
        assert_eq!(chain_name("0x5"), "Goerli Testnet");
        assert_eq!(chain_name("0xa4b1"), "Chain 0xa4b1");
    }

    #[tokio::test]
    async fn test_query_state_connected() {
        let wallet = EvmWallet::new(Arc::new(connected_provider()));
        let snapshot = wallet.query_state().await;

        assert!(snapshot.is_connected());
        assert_eq!(snapshot.address(), Some("0xabc"));
        assert_eq!(snapshot.network_id(), Some("0x89"));
        assert_eq!(snapshot.network_name(), Some("Polygon Mainnet"));
        assert_eq!(snapshot.balance(), Some("2.5000"));
    }

    #[tokio::test]
    async fn test_no_accounts_is_disconnected() {
        let mut provider = MockEip1193Provider::new();
        provider.expect_accounts().returning(|| Ok(vec![]));
        provider.expect_chain_id().times(0);
        provider.expect_balance().times(0);

        let snapshot = EvmWallet::new(Arc::new(provider)).query_state().await;
        assert!(!snapshot.is_connected());
        assert!(snapshot.address().is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_is_disconnected() {
        let mut provider = MockEip1193Provider::new();
        provider
            .expect_accounts()
            .returning(|| Err(ConnectionError::ProviderUnavailable));

        let snapshot = EvmWallet::new(Arc::new(provider)).query_state().await;
        assert!(!snapshot.is_connected());
    }

    #[tokio::test]
    async fn test_request_connection_without_provider() {
        let mut provider = MockEip1193Provider::new();
        provider.expect_is_available().returning(|| false);
        provider.expect_request_accounts().times(0);

        let result = EvmWallet::new(Arc::new(provider)).request_connection().await;
        assert_eq!(result, Err(ConnectionError::ProviderUnavailable));
    }

    #[tokio::test]
    async fn test_request_connection_declined() {
        let mut provider = MockEip1193Provider::new();
        provider.expect_is_available().returning(|| true);
        provider
            .expect_request_accounts()
            .returning(|| Err(ConnectionError::UserDeclined));

        let result = EvmWallet::new(Arc::new(provider)).request_connection().await;
        assert_eq!(result, Err(ConnectionError::UserDeclined));
    }

    #[tokio::test]
    async fn test_request_connection_returns_first_account() {
        let mut provider = MockEip1193Provider::new();
        provider.expect_is_available().returning(|| true);
        provider
            .expect_request_accounts()
            .returning(|| Ok(vec!["0xfirst".to_string(), "0xsecond".to_string()]));

        let result = EvmWallet::new(Arc::new(provider)).request_connection().await;
        assert_eq!(result, Ok("0xfirst".to_string()));
    }

    #[tokio::test]
    async fn test_switch_chain_not_added() {
        let mut provider = MockEip1193Provider::new();
        provider
            .expect_switch_chain()
            .returning(|id| Err(ConnectionError::ChainNotAdded(id.to_string())));

        let result = EvmWallet::new(Arc::new(provider)).switch_chain("0xa4b1").await;
        assert_eq!(result, Err(ConnectionError::ChainNotAdded("0xa4b1".to_string())));
    }
}
