//! Destination-chain wallet: the Freighter extension plus Horizon balances

use super::freighter::{ExtensionError, FreighterApi, SignOptions};
use super::{
    format_balance, NetworkHint, SigningResult, TransactionSigner, WalletAdapter, WalletChain,
    WalletDetails, WalletSnapshot,
};
use crate::config::StellarNetwork;
use crate::error::{ConnectionError, SigningError};
use crate::ledger::Ledger;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StellarWallet {
    api: Arc<dyn FreighterApi>,
    /// Balance lookups, one endpoint per network the extension may be on
    ledgers: HashMap<StellarNetwork, Arc<dyn Ledger>>,
}

impl StellarWallet {
    pub fn new(api: Arc<dyn FreighterApi>) -> Self {
        Self {
            api,
            ledgers: HashMap::new(),
        }
    }

    pub fn with_ledger(mut self, network: StellarNetwork, ledger: Arc<dyn Ledger>) -> Self {
        self.ledgers.insert(network, ledger);
        self
    }

    /// Native balance of `address` with four decimal places.
    ///
    /// Unfunded accounts, unknown networks and lookup failures all read as zero.
    pub async fn query_balance(&self, address: &str, hint: &NetworkHint) -> String {
        let zero = format_balance(Decimal::ZERO);

        let Some(ledger) = StellarNetwork::from_name(&hint.network)
            .and_then(|network| self.ledgers.get(&network))
        else {
            debug!("No ledger configured for network {}", hint.network);
            return zero;
        };

        match ledger.load_account(address).await {
            Ok(Some(account)) => format_balance(account.native_balance()),
            Ok(None) => zero,
            Err(e) => {
                warn!("Balance lookup for {} failed: {}", address, e);
                zero
            }
        }
    }

    async fn ensure_available(&self) -> Result<(), SigningError> {
        match self.api.is_connected().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SigningError::NotConnected),
            Err(e) => Err(signing_error(e)),
        }
    }
}

fn signing_error(err: ExtensionError) -> SigningError {
    match err {
        ExtensionError::Unreachable(_) => SigningError::NotConnected,
        ExtensionError::Api(message) => SigningError::from_provider_message(&message),
    }
}

fn connection_error(err: ExtensionError) -> ConnectionError {
    match err {
        ExtensionError::Unreachable(_) => ConnectionError::ProviderUnavailable,
        ExtensionError::Api(message) => match SigningError::from_provider_message(&message) {
            SigningError::UserDeclined => ConnectionError::UserDeclined,
            SigningError::WalletLocked => ConnectionError::WalletLocked,
            SigningError::NotConnected => ConnectionError::ProviderUnavailable,
            _ => ConnectionError::Provider(message),
        },
    }
}

#[async_trait]
impl WalletAdapter for StellarWallet {
    fn chain(&self) -> WalletChain {
        WalletChain::Stellar
    }

    async fn detect_availability(&self) -> bool {
        matches!(self.api.is_connected().await, Ok(true))
    }

    async fn query_state(&self) -> WalletSnapshot {
        if !self.detect_availability().await {
            return WalletSnapshot::disconnected();
        }

        match self.api.is_allowed().await {
            Ok(true) => {}
            Ok(false) => return WalletSnapshot::disconnected(),
            Err(e) => {
                debug!("Freighter permission check failed: {}", e);
                return WalletSnapshot::disconnected();
            }
        }

        // Locked wallets report no address
        let address = match self.api.get_address().await {
            Ok(Some(address)) => address,
            Ok(None) => return WalletSnapshot::disconnected(),
            Err(e) => {
                debug!("Freighter address lookup failed: {}", e);
                return WalletSnapshot::disconnected();
            }
        };

        let network = match self.api.get_network().await {
            Ok(network) => Some(network),
            Err(e) => {
                warn!("Failed to read Freighter network: {}", e);
                None
            }
        };

        let balance = match &network {
            Some(network) => {
                let hint = NetworkHint {
                    network: network.network.clone(),
                    passphrase: network.network_passphrase.clone(),
                };
                Some(self.query_balance(&address, &hint).await)
            }
            None => None,
        };

        WalletSnapshot::connected(WalletDetails {
            permission_granted: true,
            address: Some(address),
            network_id: network.as_ref().map(|n| n.network_passphrase.clone()),
            network_name: network.map(|n| n.network),
            balance,
        })
    }

    async fn request_connection(&self) -> Result<String, ConnectionError> {
        if !self.detect_availability().await {
            return Err(ConnectionError::ProviderUnavailable);
        }

        let address = self.api.request_access().await.map_err(connection_error)?;
        if address.is_empty() {
            return Err(ConnectionError::NoAccounts);
        }

        info!("Freighter connected: {}", address);
        Ok(address)
    }
}

#[async_trait]
impl TransactionSigner for StellarWallet {
    async fn sign(
        &self,
        unsigned_payload: &str,
        hint: &NetworkHint,
    ) -> Result<SigningResult, SigningError> {
        if unsigned_payload.is_empty() {
            return Err(SigningError::Unknown("empty transaction payload".to_string()));
        }

        self.ensure_available().await?;

        let current = self
            .api
            .get_network()
            .await
            .map_err(signing_error)?;
        if current.network_passphrase != hint.passphrase {
            return Err(SigningError::NetworkMismatch(format!(
                "wallet is on {}, transaction is for {}",
                current.network, hint.network
            )));
        }

        self.api
            .request_focus()
            .await
            .map_err(|_| SigningError::PopupBlocked)?;

        let signed = self
            .api
            .sign_transaction(
                unsigned_payload,
                &SignOptions {
                    network_passphrase: hint.passphrase.clone(),
                    address: None,
                },
            )
            .await
            .map_err(signing_error)?;

        if signed.signed_tx_xdr.is_empty() {
            return Err(SigningError::Unknown("wallet returned no signature".to_string()));
        }

        debug!("Transaction signed by {}", signed.signer_address);
        Ok(SigningResult {
            signed_payload: signed.signed_tx_xdr,
            signer_address: signed.signer_address,
        })
    }
}
