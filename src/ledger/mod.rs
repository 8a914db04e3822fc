//! Ledger module - the Stellar network as seen by the bridge
//!
//! This module provides:
//! - The [`Ledger`] seam used for account lookup and transaction submission
//! - A Horizon REST implementation
//! - Transaction envelope construction and signature handling

pub mod envelope;
pub mod horizon;

pub use horizon::HorizonClient;

use crate::error::{LedgerError, SubmissionError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Account state needed to build a transaction
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountState {
    #[serde(rename = "id")]
    pub account_id: String,
    #[serde(deserialize_with = "sequence_from_str")]
    pub sequence: i64,
    #[serde(default)]
    pub balances: Vec<AccountBalance>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountBalance {
    pub asset_type: String,
    pub asset_code: Option<String>,
    pub asset_issuer: Option<String>,
    pub balance: Decimal,
}

impl AccountState {
    /// Native XLM balance
    pub fn native_balance(&self) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset_type == "native")
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO)
    }
}

// Horizon encodes the 64-bit sequence number as a string
fn sequence_from_str<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// Query and submission endpoint of a Stellar network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Load an account; `Ok(None)` when the account does not exist (unfunded)
    async fn load_account(&self, address: &str) -> Result<Option<AccountState>, LedgerError>;

    /// Submit a signed base64 envelope, returning the transaction hash
    async fn submit_transaction(&self, signed_xdr: &str) -> Result<String, SubmissionError>;
}
