//! Horizon REST client

use super::{AccountState, Ledger};
use crate::error::{LedgerError, SubmissionError};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Horizon answers submissions synchronously but may hold them for ~30s
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for a single Horizon instance
pub struct HorizonClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitSuccess {
    hash: String,
}

/// Horizon problem document returned for rejected requests
#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    extras: Option<ProblemExtras>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemExtras {
    result_codes: Option<ResultCodes>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    transaction: Option<String>,
    #[serde(default)]
    operations: Vec<String>,
}

impl HorizonClient {
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Ledger for HorizonClient {
    async fn load_account(&self, address: &str) -> Result<Option<AccountState>, LedgerError> {
        let url = format!("{}/accounts/{}", self.base_url, address);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Account {} not found on {}", address, self.base_url);
                Ok(None)
            }
            status if status.is_success() => response
                .json::<AccountState>()
                .await
                .map(Some)
                .map_err(|e| LedgerError::Decode(e.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(LedgerError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn submit_transaction(&self, signed_xdr: &str) -> Result<String, SubmissionError> {
        let url = format!("{}/transactions", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[("tx", signed_xdr)])
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        if status.is_success() {
            let success: SubmitSuccess = serde_json::from_str(&body)
                .map_err(|e| SubmissionError::Unknown(format!("unreadable response: {e}")))?;
            info!("Transaction accepted: {}", success.hash);
            return Ok(success.hash);
        }

        let error = classify_rejection(status, &body);
        warn!("Transaction rejected with HTTP {}: {}", status, error);
        Err(error)
    }
}

/// Classify a rejected submission by its structured result codes
fn classify_rejection(status: StatusCode, body: &str) -> SubmissionError {
    let problem: Problem = serde_json::from_str(body).unwrap_or_default();
    let codes = problem
        .extras
        .and_then(|extras| extras.result_codes)
        .unwrap_or_default();

    let Some(tx_code) = codes.transaction else {
        let raw = if problem.detail.is_empty() {
            format!("HTTP {}: {}", status.as_u16(), problem.title)
        } else {
            problem.detail
        };
        return SubmissionError::Unknown(raw);
    };

    let raw = if codes.operations.is_empty() {
        tx_code.clone()
    } else {
        format!("{} [{}]", tx_code, codes.operations.join(", "))
    };

    // tx_failed means an operation failed; its code carries the reason
    if tx_code == "tx_failed" {
        if let Some(op_code) = codes
            .operations
            .iter()
            .find(|code| code.as_str() != "op_success")
        {
            return SubmissionError::from_result_code(op_code, &raw);
        }
    }

    SubmissionError::from_result_code(&tx_code, &raw)
}
