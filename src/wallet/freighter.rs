//! Freighter extension API and an HTTP bridge to it
//!
//! The extension lives in the user's browser. A companion page relays the
//! requests below to `window.freighterApi` and posts the replies back.

use crate::config::FreighterConfig;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    /// The bridge page or extension could not be reached
    #[error("Extension unreachable: {0}")]
    Unreachable(String),

    /// The extension answered with an error string
    #[error("{0}")]
    Api(String),
}

/// Network the extension is currently set to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreighterNetwork {
    pub network: String,
    pub network_passphrase: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOptions {
    pub network_passphrase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub signed_tx_xdr: String,
    pub signer_address: String,
}

/// Operations exposed by the Freighter extension
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FreighterApi: Send + Sync {
    /// Whether the extension is installed
    async fn is_connected(&self) -> Result<bool, ExtensionError>;

    /// Whether this site was already granted access
    async fn is_allowed(&self) -> Result<bool, ExtensionError>;

    /// Prompt the user for access, returning the exposed address
    async fn request_access(&self) -> Result<String, ExtensionError>;

    /// Exposed address, `None` when locked or not allowed
    async fn get_address(&self) -> Result<Option<String>, ExtensionError>;

    async fn get_network(&self) -> Result<FreighterNetwork, ExtensionError>;

    async fn sign_transaction(
        &self,
        xdr: &str,
        options: &SignOptions,
    ) -> Result<SignedTransaction, ExtensionError>;

    /// Bring the extension window to the foreground before a prompt
    async fn request_focus(&self) -> Result<(), ExtensionError> {
        Ok(())
    }
}

/// Requests relayed to the extension
#[derive(Debug, Serialize)]
#[serde(tag = "method", rename_all = "camelCase")]
enum BridgeRequest<'a> {
    IsConnected,
    IsAllowed,
    RequestAccess,
    GetAddress,
    GetNetwork,
    #[serde(rename_all = "camelCase")]
    SignTransaction {
        xdr: &'a str,
        network_passphrase: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<&'a str>,
    },
    RequestFocus,
}

/// Reply envelope; `error` is set when the extension call failed
#[derive(Debug, Deserialize)]
struct BridgeReply<T> {
    #[serde(default)]
    error: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedReply {
    is_connected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowedReply {
    is_allowed: bool,
}

#[derive(Debug, Deserialize)]
struct AddressReply {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// [`FreighterApi`] over the companion bridge's HTTP endpoint
pub struct FreighterBridgeClient {
    http: reqwest::Client,
    endpoint: String,
}

impl FreighterBridgeClient {
    pub fn new(config: &FreighterConfig) -> Result<Self, ExtensionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExtensionError::Unreachable(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/freighter", config.endpoint.trim_end_matches('/')),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: &BridgeRequest<'_>,
    ) -> Result<T, ExtensionError> {
        debug!("Freighter request: {:?}", request);
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ExtensionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtensionError::Unreachable(format!(
                "bridge returned HTTP {}",
                status
            )));
        }

        let reply: BridgeReply<T> = response
            .json()
            .await
            .map_err(|e| ExtensionError::Api(format!("malformed bridge reply: {e}")))?;
        into_result(reply)
    }
}

fn into_result<T>(reply: BridgeReply<T>) -> Result<T, ExtensionError> {
    if let Some(error) = reply.error.filter(|e| !e.is_empty()) {
        return Err(ExtensionError::Api(error));
    }
    reply
        .result
        .ok_or_else(|| ExtensionError::Api("empty bridge reply".to_string()))
}

#[async_trait]
impl FreighterApi for FreighterBridgeClient {
    async fn is_connected(&self) -> Result<bool, ExtensionError> {
        let reply: ConnectedReply = self.call(&BridgeRequest::IsConnected).await?;
        Ok(reply.is_connected)
    }

    async fn is_allowed(&self) -> Result<bool, ExtensionError> {
        let reply: AllowedReply = self.call(&BridgeRequest::IsAllowed).await?;
        Ok(reply.is_allowed)
    }

    async fn request_access(&self) -> Result<String, ExtensionError> {
        let reply: AddressReply = self.call(&BridgeRequest::RequestAccess).await?;
        Ok(reply.address)
    }

    async fn get_address(&self) -> Result<Option<String>, ExtensionError> {
        let reply: AddressReply = self.call(&BridgeRequest::GetAddress).await?;
        Ok(Some(reply.address).filter(|a| !a.is_empty()))
    }

    async fn get_network(&self) -> Result<FreighterNetwork, ExtensionError> {
        self.call(&BridgeRequest::GetNetwork).await
    }

    async fn sign_transaction(
        &self,
        xdr: &str,
        options: &SignOptions,
    ) -> Result<SignedTransaction, ExtensionError> {
        self.call(&BridgeRequest::SignTransaction {
            xdr,
            network_passphrase: &options.network_passphrase,
            address: options.address.as_deref(),
        })
        .await
    }

    async fn request_focus(&self) -> Result<(), ExtensionError> {
        let _: Empty = self.call(&BridgeRequest::RequestFocus).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_value(BridgeRequest::GetNetwork).unwrap();
        assert_eq!(json, serde_json::json!({ "method": "getNetwork" }));

        let json = serde_json::to_value(BridgeRequest::SignTransaction {
            xdr: "AAAA",
            network_passphrase: "Test SDF Network ; September 2015",
            address: None,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "method": "signTransaction",
                "xdr": "AAAA",
                "networkPassphrase": "Test SDF Network ; September 2015"
            })
        );
    }

    #[test]
    fn test_reply_with_error() {
        let reply: BridgeReply<SignedTransaction> =
            serde_json::from_str(r#"{"error": "User declined access"}"#).unwrap();
        assert_eq!(
            into_result(reply),
            Err(ExtensionError::Api("User declined access".to_string()))
        );
    }

    #[test]
    fn test_reply_with_result() {
        let reply: BridgeReply<SignedTransaction> = serde_json::from_str(
            r#"{"result": {"signedTxXdr": "AAAB", "signerAddress": "GABC"}}"#,
        )
        .unwrap();
        let signed = into_result(reply).unwrap();
        assert_eq!(signed.signed_tx_xdr, "AAAB");
        assert_eq!(signed.signer_address, "GABC");
    }

    #[test]
    fn test_network_reply() {
        let reply: BridgeReply<FreighterNetwork> = serde_json::from_str(
            r#"{"result": {"network": "TESTNET", "networkPassphrase": "Test SDF Network ; September 2015"}}"#,
        )
        .unwrap();
        assert_eq!(into_result(reply).unwrap().network, "TESTNET");
    }

    #[test]
    fn test_empty_reply_is_error() {
        let reply: BridgeReply<AddressReply> = serde_json::from_str("{}").unwrap();
        assert!(matches!(into_result(reply), Err(ExtensionError::Api(_))));
    }
}
