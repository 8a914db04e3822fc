//! Signer holding a Stellar secret seed in process memory

use super::{NetworkHint, SigningResult, TransactionSigner};
use crate::error::{BridgeError, BridgeResult, SigningError};
use crate::ledger::envelope;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::env;

/// Headless signer for operator-run deployments and tests
pub struct LocalKeySigner {
    signing_key: SigningKey,
    address: String,
}

impl LocalKeySigner {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = envelope::account_address(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Parse an `S...` secret seed
    pub fn from_secret_seed(seed: &str) -> BridgeResult<Self> {
        let secret = stellar_strkey::ed25519::PrivateKey::from_string(seed.trim())
            .map_err(|_| BridgeError::Wallet("invalid Stellar secret seed".to_string()))?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret.0)))
    }

    /// Read the secret seed from an environment variable
    pub fn from_env(var: &str) -> BridgeResult<Self> {
        let seed = env::var(var)
            .map_err(|_| BridgeError::Wallet(format!("environment variable {var} is not set")))?;
        Self::from_secret_seed(&seed)
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    async fn sign(
        &self,
        unsigned_payload: &str,
        hint: &NetworkHint,
    ) -> Result<SigningResult, SigningError> {
        let signed_payload =
            envelope::sign_envelope(unsigned_payload, &hint.passphrase, &self.signing_key)
                .map_err(|e| SigningError::Unknown(e.to_string()))?;

        Ok(SigningResult {
            signed_payload,
            signer_address: self.address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secret_seed() {
        let seed = stellar_strkey::ed25519::PrivateKey([3u8; 32]).to_string();
        let signer = LocalKeySigner::from_secret_seed(&seed).unwrap();

        let expected = SigningKey::from_bytes(&[3u8; 32]).verifying_key().to_bytes();
        assert_eq!(signer.address(), envelope::account_address(&expected));
        assert!(signer.address().starts_with('G'));
    }

    #[test]
    fn test_rejects_public_key_as_seed() {
        let public = stellar_strkey::ed25519::PublicKey([3u8; 32]).to_string();
        assert!(matches!(
            LocalKeySigner::from_secret_seed(&public),
            Err(BridgeError::Wallet(_))
        ));
    }

    #[test]
    fn test_from_missing_env() {
        assert!(LocalKeySigner::from_env("STELLAR_BRIDGE_TEST_MISSING_SEED").is_err());
    }

    #[tokio::test]
    async fn test_sign_garbage_payload() {
        let signer = LocalKeySigner::from_signing_key(SigningKey::from_bytes(&[1u8; 32]));
        let result = signer
            .sign("not xdr", &NetworkHint::from(crate::config::StellarNetwork::Testnet))
            .await;
        assert!(matches!(result, Err(SigningError::Unknown(_))));
    }
}
