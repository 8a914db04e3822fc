//! Swap module - one bridge transfer from request to classified outcome
//!
//! This module provides:
//! - Request and outcome types shared with the API
//! - The orchestrator running validation, build, signing and submission
//! - A simulated settlement path for pairs that never touch Stellar
//! - An in-memory tracker of attempts and their stage

pub mod orchestrator;
pub mod simulated;
pub mod tracker;

pub use orchestrator::SwapOrchestrator;
pub use simulated::SimulatedSettlement;
pub use tracker::{SwapAttempt, SwapStage, SwapTracker};

use crate::error::SwapFailure;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Networks a swap can be requested between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Polygon,
    Stellar,
    Solana,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Polygon => "polygon",
            Network::Stellar => "stellar",
            Network::Solana => "solana",
        }
    }

    pub fn is_stellar(&self) -> bool {
        matches!(self, Network::Stellar)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested transfer. Immutable: a retry builds a new request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRequest {
    from_network: Network,
    to_network: Network,
    token_code: String,
    amount: Decimal,
    /// Account the payment is sent from (the connected Stellar wallet)
    source_address: String,
}

impl SwapRequest {
    pub fn new(
        from_network: Network,
        to_network: Network,
        token_code: impl Into<String>,
        amount: Decimal,
        source_address: impl Into<String>,
    ) -> Self {
        Self {
            from_network,
            to_network,
            token_code: token_code.into(),
            amount,
            source_address: source_address.into(),
        }
    }

    pub fn from_network(&self) -> Network {
        self.from_network
    }

    pub fn to_network(&self) -> Network {
        self.to_network
    }

    pub fn token_code(&self) -> &str {
        &self.token_code
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    /// Whether settlement happens on the Stellar ledger
    pub fn involves_stellar(&self) -> bool {
        self.from_network.is_stellar() || self.to_network.is_stellar()
    }

    /// Memo text identifying the route, e.g. `ethereum>stellar:XLM`
    pub fn memo(&self) -> String {
        format!("{}>{}:{}", self.from_network, self.to_network, self.token_code)
    }
}

/// Result of one swap attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    Success {
        attempt_id: Uuid,
        tx_hash: String,
        /// Settled by the simulated path rather than the ledger
        simulated: bool,
    },
    Failure {
        attempt_id: Uuid,
        reason: String,
        classification: SwapFailure,
    },
}

impl SwapOutcome {
    pub fn attempt_id(&self) -> Uuid {
        match self {
            SwapOutcome::Success { attempt_id, .. } | SwapOutcome::Failure { attempt_id, .. } => {
                *attempt_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SwapOutcome::Success { .. })
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            SwapOutcome::Success { tx_hash, .. } => Some(tx_hash),
            SwapOutcome::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&SwapFailure> {
        match self {
            SwapOutcome::Success { .. } => None,
            SwapOutcome::Failure { classification, .. } => Some(classification),
        }
    }

    /// User-facing failure message
    pub fn reason(&self) -> Option<&str> {
        match self {
            SwapOutcome::Success { .. } => None,
            SwapOutcome::Failure { reason, .. } => Some(reason),
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, SwapOutcome::Success { simulated: true, .. })
    }
}

/// Spendable balance of the wallet backing a network, for pre-flight checks
#[cfg_attr(test, mockall::automock)]
pub trait BalanceSource: Send + Sync {
    /// `None` when the balance is unknown (wallet disconnected or unsupported)
    fn available_balance(&self, network: Network) -> Option<Decimal>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_memo_format() {
        let request = SwapRequest::new(
            Network::Ethereum,
            Network::Stellar,
            "XLM",
            Decimal::ONE,
            "GABC",
        );
        assert_eq!(request.memo(), "ethereum>stellar:XLM");
        assert!(request.involves_stellar());
    }

    #[test]
    fn test_request_deserialization() {
        let json = r#"{
            "from_network": "polygon",
            "to_network": "solana",
            "token_code": "USDC",
            "amount": "12.5",
            "source_address": "0xabc"
        }"#;
        let request: SwapRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.from_network(), Network::Polygon);
        assert_eq!(request.amount(), Decimal::from_str("12.5").unwrap());
        assert!(!request.involves_stellar());
    }

    #[test]
    fn test_unknown_network_rejected() {
        let json = r#"{
            "from_network": "bitcoin",
            "to_network": "stellar",
            "token_code": "XLM",
            "amount": "1",
            "source_address": "GABC"
        }"#;
        assert!(serde_json::from_str::<SwapRequest>(json).is_err());
    }
}
