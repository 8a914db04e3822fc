//! Wallet module - adapters over the user's browser wallets
//!
//! This module provides:
//! - The common [`WalletAdapter`] capability set and [`WalletSnapshot`]
//! - An EIP-1193 source-chain wallet (`evm`)
//! - A Freighter destination-chain wallet that can sign (`stellar`)
//! - A local key signer for headless operation (`local`)

pub mod eip1193;
pub mod evm;
pub mod freighter;
pub mod local;
pub mod stellar;

pub use eip1193::{Eip1193Provider, JsonRpcProvider, ProviderEvent};
pub use evm::EvmWallet;
pub use freighter::{FreighterApi, FreighterBridgeClient};
pub use local::LocalKeySigner;
pub use stellar::StellarWallet;

use crate::config::StellarNetwork;
use crate::error::{BridgeError, ConnectionError, SigningError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two wallets the bridge keeps in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletChain {
    /// Ethereum-style injected provider (source side)
    Evm,
    /// Stellar extension (destination side)
    Stellar,
}

impl WalletChain {
    pub const ALL: [WalletChain; 2] = [WalletChain::Evm, WalletChain::Stellar];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletChain::Evm => "evm",
            WalletChain::Stellar => "stellar",
        }
    }
}

impl fmt::Display for WalletChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletChain {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evm" | "ethereum" => Ok(WalletChain::Evm),
            "stellar" => Ok(WalletChain::Stellar),
            other => Err(BridgeError::UnknownChain(other.to_string())),
        }
    }
}

/// Details of a connected wallet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletDetails {
    pub permission_granted: bool,
    pub address: Option<String>,
    pub network_id: Option<String>,
    pub network_name: Option<String>,
    pub balance: Option<String>,
}

/// Point-in-time view of one wallet, replaced wholesale on every refresh.
///
/// A disconnected snapshot never carries an address, network or balance.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSnapshot {
    connected: bool,
    permission_granted: bool,
    address: Option<String>,
    network_id: Option<String>,
    network_name: Option<String>,
    balance: Option<String>,
    refreshed_at: DateTime<Utc>,
}

impl WalletSnapshot {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            permission_granted: false,
            address: None,
            network_id: None,
            network_name: None,
            balance: None,
            refreshed_at: Utc::now(),
        }
    }

    pub fn connected(details: WalletDetails) -> Self {
        Self {
            connected: true,
            permission_granted: details.permission_granted,
            address: details.address,
            network_id: details.network_id,
            network_name: details.network_name,
            balance: details.balance,
            refreshed_at: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn network_id(&self) -> Option<&str> {
        self.network_id.as_deref()
    }

    pub fn network_name(&self) -> Option<&str> {
        self.network_name.as_deref()
    }

    pub fn balance(&self) -> Option<&str> {
        self.balance.as_deref()
    }

    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    /// Balance as a decimal, if present and well formed
    pub fn balance_decimal(&self) -> Option<Decimal> {
        self.balance.as_deref().and_then(|b| Decimal::from_str(b).ok())
    }
}

/// Format a balance for display with four decimal places.
///
/// Truncates rather than rounds so that a displayed balance is never more
/// than what the account holds.
pub fn format_balance(amount: Decimal) -> String {
    let truncated = amount.round_dp_with_strategy(4, RoundingStrategy::ToZero);
    format!("{:.4}", truncated)
}

/// Network a payload was built for, handed to the signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHint {
    /// Network name as the extension reports it, e.g. `TESTNET`
    pub network: String,
    pub passphrase: String,
}

impl From<StellarNetwork> for NetworkHint {
    fn from(network: StellarNetwork) -> Self {
        Self {
            network: network.name().to_string(),
            passphrase: network.passphrase().to_string(),
        }
    }
}

/// Output of a signing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningResult {
    pub signed_payload: String,
    pub signer_address: String,
}

/// Capability set shared by every wallet adapter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    fn chain(&self) -> WalletChain;

    /// Whether the wallet provider is present at all
    async fn detect_availability(&self) -> bool;

    /// Current wallet state. Never fails: an absent or unauthorized wallet is
    /// reported as a disconnected snapshot.
    async fn query_state(&self) -> WalletSnapshot;

    /// Ask the user to grant access, returning the exposed address
    async fn request_connection(&self) -> Result<String, ConnectionError>;
}

/// Signs Stellar transaction envelopes.
///
/// Callers must invoke `sign` directly from the user action that triggered
/// it; implementations backed by a browser extension request foreground
/// focus immediately before prompting.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(
        &self,
        unsigned_payload: &str,
        hint: &NetworkHint,
    ) -> Result<SigningResult, SigningError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_snapshot_has_no_fields() {
        let snapshot = WalletSnapshot::disconnected();
        assert!(!snapshot.is_connected());
        assert!(!snapshot.permission_granted());
        assert!(snapshot.address().is_none());
        assert!(snapshot.network_id().is_none());
        assert!(snapshot.network_name().is_none());
        assert!(snapshot.balance().is_none());
    }

    #[test]
    fn test_connected_snapshot_keeps_details() {
        let snapshot = WalletSnapshot::connected(WalletDetails {
            permission_granted: true,
            address: Some("0xabc".to_string()),
            network_id: Some("0x1".to_string()),
            network_name: Some("Ethereum Mainnet".to_string()),
            balance: Some("1.2500".to_string()),
        });
        assert!(snapshot.is_connected());
        assert_eq!(snapshot.address(), Some("0xabc"));
        assert_eq!(snapshot.balance_decimal(), Some(Decimal::new(125, 2)));
    }

    #[test]
    fn test_format_balance_truncates() {
        assert_eq!(format_balance(Decimal::new(123_456_789, 7)), "12.3456");
        assert_eq!(format_balance(Decimal::ZERO), "0.0000");
        assert_eq!(format_balance(Decimal::new(5, 0)), "5.0000");
    }

    #[test]
    fn test_wallet_chain_parsing() {
        assert_eq!("evm".parse::<WalletChain>().unwrap(), WalletChain::Evm);
        assert_eq!("stellar".parse::<WalletChain>().unwrap(), WalletChain::Stellar);
        assert!("solana".parse::<WalletChain>().is_err());
    }

    #[test]
    fn test_network_hint_from_network() {
        let hint = NetworkHint::from(StellarNetwork::Testnet);
        assert_eq!(hint.network, "TESTNET");
        assert_eq!(hint.passphrase, "Test SDF Network ; September 2015");
    }
}
