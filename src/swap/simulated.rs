//! Simulated settlement for pairs that never touch the Stellar ledger

use crate::config::SimulationConfig;
use crate::error::SubmissionError;

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Stands in for settlement on networks the bridge cannot reach yet.
///
/// Makes no network call. Kept apart from the ledger path so a simulated
/// hash can never be mistaken for a submitted transaction.
#[derive(Debug, Clone)]
pub struct SimulatedSettlement {
    success_rate: f64,
    latency: Duration,
}

impl SimulatedSettlement {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            success_rate: config.success_rate.clamp(0.0, 1.0),
            latency: Duration::from_millis(config.latency_ms),
        }
    }

    /// Wait out the configured latency, then succeed with the configured
    /// probability, returning a random `0x`-prefixed 32-byte hash
    pub async fn settle(&self) -> Result<String, SubmissionError> {
        tokio::time::sleep(self.latency).await;

        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.success_rate) {
            debug!("Simulated settlement failed");
            return Err(SubmissionError::Network("simulated network error".to_string()));
        }

        let hash: [u8; 32] = rng.gen();
        Ok(format!("0x{}", hex::encode(hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settlement(success_rate: f64) -> SimulatedSettlement {
        SimulatedSettlement::new(&SimulationConfig {
            success_rate,
            latency_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_always_succeeds() {
        let hash = settlement(1.0).settle().await.unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);
        assert!(hash[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_always_fails() {
        let err = settlement(0.0).settle().await.unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Network("simulated network error".to_string())
        );
    }

    #[tokio::test]
    async fn test_hashes_differ() {
        let settlement = settlement(1.0);
        let first = settlement.settle().await.unwrap();
        let second = settlement.settle().await.unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_defaults() {
        let settlement = SimulatedSettlement::new(&SimulationConfig::default());
        assert_eq!(settlement.success_rate, 0.8);
        assert_eq!(settlement.latency, Duration::from_millis(2000));
    }
}
