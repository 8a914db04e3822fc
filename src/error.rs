//! Error types for the Stellar bridge service
//!
//! Wallet, signing and submission errors are classified here so that the
//! orchestrator can turn every failure into a [`SwapFailure`] with its own
//! user-facing message.

use rust_decimal::Decimal;
use thiserror::Error;

/// Input rejected before any wallet or network call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Source and destination networks must be different")]
    SameNetwork,

    #[error("Amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Amount {0} has more than 7 decimal places")]
    ExcessPrecision(Decimal),

    #[error("Insufficient balance: have {available}, need {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Balance on {network} is not available")]
    BalanceUnavailable { network: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Amount {0} is too large to transfer")]
    AmountOutOfRange(Decimal),
}

/// Failure to reach or authorize a wallet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Wallet provider not detected")]
    ProviderUnavailable,

    #[error("User rejected the connection request")]
    UserDeclined,

    #[error("Wallet is locked")]
    WalletLocked,

    #[error("No accounts found")]
    NoAccounts,

    #[error("Chain {0} not added to wallet")]
    ChainNotAdded(String),

    #[error("Wallet provider error: {0}")]
    Provider(String),
}

/// Failure reported by the signing extension
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("User declined to sign the transaction")]
    UserDeclined,

    #[error("Wallet is locked")]
    WalletLocked,

    #[error("Network mismatch: {0}")]
    NetworkMismatch(String),

    #[error("Signature popup was blocked")]
    PopupBlocked,

    #[error("Transaction signed by {actual}, expected {expected}")]
    WrongAccount { expected: String, actual: String },

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Signing failed: {0}")]
    Unknown(String),
}

impl SigningError {
    /// Classify a raw error string returned by a signing extension
    pub fn from_provider_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("user declined") || lower.contains("rejected") {
            SigningError::UserDeclined
        } else if lower.contains("popup") || lower.contains("blocked") {
            // checked before "locked", which is a substring of "blocked"
            SigningError::PopupBlocked
        } else if lower.contains("locked") {
            SigningError::WalletLocked
        } else if lower.contains("network") {
            SigningError::NetworkMismatch(message.to_string())
        } else if lower.contains("not connected") || lower.contains("not installed") {
            SigningError::NotConnected
        } else {
            SigningError::Unknown(message.to_string())
        }
    }
}

/// Rejection from the ledger submission endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Sequence number conflict")]
    SequenceConflict,

    #[error("Insufficient balance to cover the transfer")]
    InsufficientBalance,

    #[error("Transaction authentication failed")]
    BadAuth,

    #[error("Transaction validity window has expired")]
    Expired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Submission failed: {0}")]
    Unknown(String),
}

impl SubmissionError {
    /// Map a Horizon result code to a submission error
    pub fn from_result_code(code: &str, raw: &str) -> Self {
        match code {
            "tx_bad_seq" => SubmissionError::SequenceConflict,
            "tx_insufficient_balance" | "op_underfunded" => SubmissionError::InsufficientBalance,
            "tx_bad_auth" | "tx_bad_auth_extra" => SubmissionError::BadAuth,
            "tx_too_late" => SubmissionError::Expired,
            _ => SubmissionError::Unknown(raw.to_string()),
        }
    }

    /// Only a sequence conflict can succeed when rebuilt and resubmitted
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::SequenceConflict)
    }
}

/// Ledger query failures other than a missing account
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Transport(String),

    #[error("Ledger returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed ledger response: {0}")]
    Decode(String),
}

/// Classification attached to a failed swap
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapFailure {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Unsupported token: {0}")]
    UnsupportedToken(String),

    #[error("Failed to build transaction: {0}")]
    Payload(String),

    #[error("Stellar account {address} not found")]
    AccountNotFunded { address: String, remediation: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SwapFailure {
    /// Whether a fresh attempt with rebuilt account state may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapFailure::Submission(e) if e.is_retryable())
    }

    /// Stable label used by metrics and the API
    pub fn kind(&self) -> &'static str {
        match self {
            SwapFailure::Validation(ValidationError::SameNetwork) => "same_network",
            SwapFailure::Validation(ValidationError::NonPositiveAmount) => "non_positive_amount",
            SwapFailure::Validation(ValidationError::ExcessPrecision(_)) => "excess_precision",
            SwapFailure::Validation(ValidationError::InsufficientBalance { .. }) => {
                "insufficient_balance"
            }
            SwapFailure::Validation(ValidationError::BalanceUnavailable { .. }) => {
                "balance_unavailable"
            }
            SwapFailure::Validation(ValidationError::InvalidAddress(_)) => "invalid_address",
            SwapFailure::Validation(ValidationError::AmountOutOfRange(_)) => "amount_out_of_range",
            SwapFailure::Connection(_) => "connection",
            SwapFailure::Signing(SigningError::UserDeclined) => "user_declined",
            SwapFailure::Signing(SigningError::WalletLocked) => "wallet_locked",
            SwapFailure::Signing(SigningError::NetworkMismatch(_)) => "network_mismatch",
            SwapFailure::Signing(SigningError::PopupBlocked) => "popup_blocked",
            SwapFailure::Signing(SigningError::WrongAccount { .. }) => "wrong_account",
            SwapFailure::Signing(SigningError::NotConnected) => "not_connected",
            SwapFailure::Signing(SigningError::Unknown(_)) => "signing_failed",
            SwapFailure::Submission(SubmissionError::SequenceConflict) => "sequence_conflict",
            SwapFailure::Submission(SubmissionError::InsufficientBalance) => {
                "submission_insufficient_balance"
            }
            SwapFailure::Submission(SubmissionError::BadAuth) => "bad_auth",
            SwapFailure::Submission(SubmissionError::Expired) => "expired",
            SwapFailure::Submission(SubmissionError::Network(_)) => "network_error",
            SwapFailure::Submission(SubmissionError::Unknown(_)) => "submission_failed",
            SwapFailure::UnsupportedToken(_) => "unsupported_token",
            SwapFailure::Payload(_) => "payload_error",
            SwapFailure::AccountNotFunded { .. } => "account_not_funded",
            SwapFailure::Ledger(_) => "ledger_unavailable",
        }
    }

    /// Remediation text shown to the user
    pub fn user_message(&self) -> String {
        match self {
            SwapFailure::Validation(ValidationError::SameNetwork) => {
                "Choose different source and destination networks.".to_string()
            }
            SwapFailure::Validation(ValidationError::NonPositiveAmount) => {
                "Please enter a valid amount.".to_string()
            }
            SwapFailure::Validation(ValidationError::ExcessPrecision(_)) => {
                "Amounts support at most 7 decimal places.".to_string()
            }
            SwapFailure::Validation(ValidationError::InsufficientBalance { available, .. }) => {
                format!("Insufficient balance. You have {available} available.")
            }
            SwapFailure::Validation(ValidationError::BalanceUnavailable { network }) => {
                format!("Connect your {network} wallet so its balance can be checked.")
            }
            SwapFailure::Validation(ValidationError::InvalidAddress(address)) => {
                format!("{address} is not a valid account address.")
            }
            SwapFailure::Validation(ValidationError::AmountOutOfRange(amount)) => {
                format!("{amount} exceeds the largest transferable amount.")
            }
            SwapFailure::Connection(ConnectionError::ProviderUnavailable) => {
                "Wallet extension not detected. Please install it and reload.".to_string()
            }
            SwapFailure::Connection(ConnectionError::UserDeclined) => {
                "You rejected the connection request.".to_string()
            }
            SwapFailure::Connection(ConnectionError::WalletLocked) => {
                "Please unlock your wallet and try again.".to_string()
            }
            SwapFailure::Connection(other) => format!("Failed to connect wallet: {other}"),
            SwapFailure::Signing(SigningError::UserDeclined) => {
                "You declined to sign the transaction.".to_string()
            }
            SwapFailure::Signing(SigningError::WalletLocked) => {
                "Please unlock your Freighter wallet and try again.".to_string()
            }
            SwapFailure::Signing(SigningError::NetworkMismatch(_)) => {
                "Please switch Freighter to the network shown in the bridge.".to_string()
            }
            SwapFailure::Signing(SigningError::PopupBlocked) => {
                "Please allow popups for this site and try again.".to_string()
            }
            SwapFailure::Signing(SigningError::WrongAccount { expected, .. }) => {
                format!("Please select account {expected} in Freighter and try again.")
            }
            SwapFailure::Signing(SigningError::NotConnected) => {
                "Please install and unlock the Freighter extension.".to_string()
            }
            SwapFailure::Signing(SigningError::Unknown(raw)) => {
                format!("Failed to sign transaction: {raw}")
            }
            SwapFailure::Submission(SubmissionError::SequenceConflict) => {
                "The account changed while signing. Please submit the swap again.".to_string()
            }
            SwapFailure::Submission(SubmissionError::InsufficientBalance) => {
                "The ledger rejected the transfer for insufficient balance.".to_string()
            }
            SwapFailure::Submission(SubmissionError::BadAuth) => {
                "The transaction signature was not accepted by the ledger.".to_string()
            }
            SwapFailure::Submission(SubmissionError::Expired) => {
                "The signed transaction expired before submission. Please try again.".to_string()
            }
            SwapFailure::Submission(SubmissionError::Network(raw)) => {
                format!("Network error while settling the swap: {raw}")
            }
            SwapFailure::Submission(SubmissionError::Unknown(raw)) => {
                format!("Unknown error: {raw}")
            }
            SwapFailure::UnsupportedToken(code) => {
                format!("{code} cannot be bridged to Stellar.")
            }
            SwapFailure::Payload(raw) => format!("Could not prepare the transaction: {raw}"),
            SwapFailure::AccountNotFunded { remediation, .. } => remediation.clone(),
            SwapFailure::Ledger(e) => format!("Stellar network unavailable: {e}"),
        }
    }
}

/// Service-level error type
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown wallet chain: {0}")]
    UnknownChain(String),

    #[error("Swap attempt {id} not found")]
    SwapNotFound { id: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for service operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_error_classification() {
        assert_eq!(
            SigningError::from_provider_message("User declined access"),
            SigningError::UserDeclined
        );
        assert_eq!(
            SigningError::from_provider_message("Wallet is Locked"),
            SigningError::WalletLocked
        );
        assert!(matches!(
            SigningError::from_provider_message("wrong network passphrase"),
            SigningError::NetworkMismatch(_)
        ));
        assert_eq!(
            SigningError::from_provider_message("Popup was blocked by the browser"),
            SigningError::PopupBlocked
        );
        assert_eq!(
            SigningError::from_provider_message("Freighter is not connected"),
            SigningError::NotConnected
        );
        assert_eq!(
            SigningError::from_provider_message("boom"),
            SigningError::Unknown("boom".to_string())
        );
    }

    #[test]
    fn test_result_code_classification() {
        let bad_seq = SubmissionError::from_result_code("tx_bad_seq", "raw");
        let underfunded = SubmissionError::from_result_code("tx_insufficient_balance", "raw");

        assert_eq!(bad_seq, SubmissionError::SequenceConflict);
        assert!(bad_seq.is_retryable());
        assert_eq!(underfunded, SubmissionError::InsufficientBalance);
        assert!(!underfunded.is_retryable());
        assert_eq!(
            SubmissionError::from_result_code("tx_bad_auth", "raw"),
            SubmissionError::BadAuth
        );
        assert_eq!(
            SubmissionError::from_result_code("tx_malformed", "tx_malformed"),
            SubmissionError::Unknown("tx_malformed".to_string())
        );
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let failures = vec![
            SwapFailure::from(ValidationError::SameNetwork),
            SwapFailure::from(ValidationError::NonPositiveAmount),
            SwapFailure::from(SigningError::UserDeclined),
            SwapFailure::from(SigningError::WalletLocked),
            SwapFailure::from(SigningError::NetworkMismatch("x".into())),
            SwapFailure::from(SigningError::PopupBlocked),
            SwapFailure::from(SigningError::WrongAccount {
                expected: "GSOURCE".into(),
                actual: "GOTHER".into(),
            }),
            SwapFailure::from(SigningError::NotConnected),
            SwapFailure::from(SubmissionError::SequenceConflict),
            SwapFailure::from(SubmissionError::InsufficientBalance),
            SwapFailure::from(SubmissionError::BadAuth),
            SwapFailure::from(SubmissionError::Expired),
            SwapFailure::UnsupportedToken("PYPL".into()),
        ];

        let mut messages: Vec<String> = failures.iter().map(|f| f.user_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), failures.len());
        assert!(messages.iter().all(|m| !m.starts_with("Unknown error")));
    }

    #[test]
    fn test_only_sequence_conflict_is_retryable() {
        assert!(SwapFailure::from(SubmissionError::SequenceConflict).is_retryable());
        assert!(!SwapFailure::from(SubmissionError::BadAuth).is_retryable());
        assert!(!SwapFailure::from(SigningError::UserDeclined).is_retryable());
    }
}
