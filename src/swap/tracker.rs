//! In-memory record of swap attempts and their stage

use super::SwapRequest;
use crate::error::{BridgeError, BridgeResult};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Stage of a swap attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStage {
    Idle,
    Validating,
    /// Refused by validation, nothing was built or signed
    Rejected,
    Building,
    Signing,
    Submitting,
    Succeeded,
    Failed,
}

impl SwapStage {
    pub fn can_transition_to(&self, next: SwapStage) -> bool {
        use SwapStage::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Rejected)
                | (Validating, Building)
                // simulated settlement skips building and signing
                | (Validating, Submitting)
                | (Building, Signing)
                | (Building, Failed)
                | (Signing, Submitting)
                | (Signing, Failed)
                | (Submitting, Succeeded)
                | (Submitting, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapStage::Rejected | SwapStage::Succeeded | SwapStage::Failed
        )
    }
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapAttempt {
    pub id: Uuid,
    pub request: SwapRequest,
    pub stage: SwapStage,
    pub tx_hash: Option<String>,
    /// Failure classification label
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tracks attempts so the UI can poll them by id
pub struct SwapTracker {
    attempts: DashMap<Uuid, SwapAttempt>,
}

impl SwapTracker {
    pub fn new() -> Self {
        Self {
            attempts: DashMap::new(),
        }
    }

    /// Record a new attempt in the `Idle` stage
    pub fn begin(&self, request: SwapRequest) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.attempts.insert(
            id,
            SwapAttempt {
                id,
                request,
                stage: SwapStage::Idle,
                tx_hash: None,
                failure: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn advance(&self, id: Uuid, next: SwapStage) -> BridgeResult<()> {
        let mut attempt = self
            .attempts
            .get_mut(&id)
            .ok_or_else(|| BridgeError::SwapNotFound { id: id.to_string() })?;

        if !attempt.stage.can_transition_to(next) {
            return Err(BridgeError::InvalidStateTransition {
                from: attempt.stage.to_string(),
                to: next.to_string(),
            });
        }

        attempt.stage = next;
        attempt.updated_at = Utc::now();
        Ok(())
    }

    pub fn succeed(&self, id: Uuid, tx_hash: &str) -> BridgeResult<()> {
        self.advance(id, SwapStage::Succeeded)?;
        if let Some(mut attempt) = self.attempts.get_mut(&id) {
            attempt.tx_hash = Some(tx_hash.to_string());
        }
        Ok(())
    }

    /// Close an attempt as `Rejected` during validation, `Failed` afterwards
    pub fn fail(&self, id: Uuid, classification: &str) -> BridgeResult<SwapStage> {
        let stage = self
            .attempts
            .get(&id)
            .map(|attempt| attempt.stage)
            .ok_or_else(|| BridgeError::SwapNotFound { id: id.to_string() })?;

        let terminal = match stage {
            SwapStage::Idle | SwapStage::Validating => SwapStage::Rejected,
            _ => SwapStage::Failed,
        };
        if stage == SwapStage::Idle {
            self.advance(id, SwapStage::Validating)?;
        }
        self.advance(id, terminal)?;

        if let Some(mut attempt) = self.attempts.get_mut(&id) {
            attempt.failure = Some(classification.to_string());
        }
        Ok(terminal)
    }

    pub fn get(&self, id: &Uuid) -> Option<SwapAttempt> {
        self.attempts.get(id).map(|attempt| attempt.clone())
    }

    /// Number of attempts not yet in a terminal stage
    pub fn in_flight(&self) -> usize {
        self.attempts
            .iter()
            .filter(|entry| !entry.stage.is_terminal())
            .count()
    }

    /// Drop finished attempts last updated more than `max_age_secs` ago
    pub fn cleanup(&self, max_age_secs: u64) -> usize {
        // A window reaching past the representable range keeps everything
        let Some(cutoff) = i64::try_from(max_age_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };
        let before = self.attempts.len();
        self.attempts
            .retain(|_, attempt| !(attempt.stage.is_terminal() && attempt.updated_at <= cutoff));
        before - self.attempts.len()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl Default for SwapTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::Network;
    use rust_decimal::Decimal;

    fn request() -> SwapRequest {
        SwapRequest::new(Network::Ethereum, Network::Stellar, "XLM", Decimal::ONE, "GABC")
    }

    #[test]
    fn test_full_lifecycle() {
        let tracker = SwapTracker::new();
        let id = tracker.begin(request());
        assert_eq!(tracker.get(&id).unwrap().stage, SwapStage::Idle);

        for stage in [
            SwapStage::Validating,
            SwapStage::Building,
            SwapStage::Signing,
            SwapStage::Submitting,
        ] {
            tracker.advance(id, stage).unwrap();
        }
        assert_eq!(tracker.in_flight(), 1);

        tracker.succeed(id, "abc123").unwrap();
        let attempt = tracker.get(&id).unwrap();
        assert_eq!(attempt.stage, SwapStage::Succeeded);
        assert_eq!(attempt.tx_hash.as_deref(), Some("abc123"));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_invalid_transition() {
        let tracker = SwapTracker::new();
        let id = tracker.begin(request());
        tracker.advance(id, SwapStage::Validating).unwrap();

        let err = tracker.advance(id, SwapStage::Succeeded).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidStateTransition { .. }));
        assert_eq!(tracker.get(&id).unwrap().stage, SwapStage::Validating);
    }

    #[test]
    fn test_fail_during_validation_is_rejected() {
        let tracker = SwapTracker::new();
        let id = tracker.begin(request());
        tracker.advance(id, SwapStage::Validating).unwrap();

        assert_eq!(tracker.fail(id, "same_network").unwrap(), SwapStage::Rejected);
        assert_eq!(
            tracker.get(&id).unwrap().failure.as_deref(),
            Some("same_network")
        );
    }

    #[test]
    fn test_fail_after_signing_is_failed() {
        let tracker = SwapTracker::new();
        let id = tracker.begin(request());
        tracker.advance(id, SwapStage::Validating).unwrap();
        tracker.advance(id, SwapStage::Building).unwrap();
        tracker.advance(id, SwapStage::Signing).unwrap();

        assert_eq!(tracker.fail(id, "user_declined").unwrap(), SwapStage::Failed);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(SwapStage::Rejected.is_terminal());
        assert!(SwapStage::Failed.is_terminal());
        assert!(!SwapStage::Signing.is_terminal());
        assert!(!SwapStage::Succeeded.can_transition_to(SwapStage::Failed));
    }

    #[test]
    fn test_unknown_attempt() {
        let tracker = SwapTracker::new();
        assert!(matches!(
            tracker.advance(Uuid::new_v4(), SwapStage::Validating),
            Err(BridgeError::SwapNotFound { .. })
        ));
    }

    #[test]
    fn test_cleanup_keeps_in_flight() {
        let tracker = SwapTracker::new();
        let done = tracker.begin(request());
        tracker.fail(done, "same_network").unwrap();
        let running = tracker.begin(request());
        tracker.advance(running, SwapStage::Validating).unwrap();

        assert_eq!(tracker.cleanup(3600), 0);
        assert_eq!(tracker.cleanup(0), 1);
        assert!(tracker.get(&done).is_none());
        assert!(tracker.get(&running).is_some());
    }

    #[test]
    fn test_cleanup_with_unbounded_retention() {
        let tracker = SwapTracker::new();
        let done = tracker.begin(request());
        tracker.fail(done, "same_network").unwrap();

        assert_eq!(tracker.cleanup(u64::MAX), 0);
        assert_eq!(tracker.cleanup(u64::MAX / 2), 0);
        assert_eq!(tracker.cleanup(i64::MAX as u64 / 1000), 0);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&done).is_some());
    }
}
