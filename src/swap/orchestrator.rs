//! Swap orchestrator: validation, payload build, signing, submission and
//! classification of a single bridge transfer

use super::{BalanceSource, SimulatedSettlement, SwapOutcome, SwapRequest, SwapStage, SwapTracker};
use crate::config::{Settings, StellarNetwork};
use crate::error::{SigningError, SubmissionError, SwapFailure, ValidationError};
use crate::ledger::envelope::{self, EnvelopeError, PaymentParams};
use crate::ledger::Ledger;
use crate::metrics;
use crate::tokens::{self, TokenDescriptor};
use crate::wallet::{NetworkHint, SigningResult, TransactionSigner};

use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use stellar_xdr::curr::{Transaction, TransactionEnvelope};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Stellar amounts carry at most 7 fractional digits
const MAX_FRACTION_DIGITS: u32 = 7;

/// Source of unix time in seconds
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Payment resolved during validation for a ledger-settled swap
struct LedgerPayment {
    token: &'static TokenDescriptor,
    stroops: i64,
}

/// Runs swap attempts end to end.
///
/// Each attempt is strictly sequential and makes no internal retries. Any
/// number of attempts may run concurrently.
pub struct SwapOrchestrator {
    ledger: Arc<dyn Ledger>,
    balances: Arc<dyn BalanceSource>,
    tracker: Arc<SwapTracker>,
    simulated: SimulatedSettlement,
    network: StellarNetwork,
    receiving_address: String,
    base_fee: u32,
    tx_timeout_secs: u64,
    clock: Clock,
}

impl fmt::Debug for SwapOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapOrchestrator")
            .field("network", &self.network)
            .field("receiving_address", &self.receiving_address)
            .finish_non_exhaustive()
    }
}

impl SwapOrchestrator {
    pub fn new(
        settings: &Settings,
        ledger: Arc<dyn Ledger>,
        balances: Arc<dyn BalanceSource>,
        tracker: Arc<SwapTracker>,
    ) -> Self {
        Self {
            ledger,
            balances,
            tracker,
            simulated: SimulatedSettlement::new(&settings.simulation),
            network: settings.stellar.network,
            receiving_address: settings.bridge.receiving_address.clone(),
            base_fee: settings.stellar.base_fee,
            tx_timeout_secs: settings.stellar.tx_timeout_secs,
            clock: Arc::new(system_clock),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn network(&self) -> StellarNetwork {
        self.network
    }

    pub fn tracker(&self) -> &Arc<SwapTracker> {
        &self.tracker
    }

    /// Run one swap attempt. Never fails: every error becomes a classified
    /// [`SwapOutcome::Failure`].
    pub async fn execute_swap(
        &self,
        request: &SwapRequest,
        signer: &dyn TransactionSigner,
    ) -> SwapOutcome {
        let attempt_id = self.tracker.begin(request.clone());
        let span = info_span!(
            "swap",
            attempt_id = %attempt_id,
            from = %request.from_network(),
            to = %request.to_network()
        );

        self.run_attempt(attempt_id, request, signer)
            .instrument(span)
            .await
    }

    async fn run_attempt(
        &self,
        attempt_id: Uuid,
        request: &SwapRequest,
        signer: &dyn TransactionSigner,
    ) -> SwapOutcome {
        let started = Instant::now();
        let settlement = if request.involves_stellar() {
            "ledger"
        } else {
            "simulated"
        };

        info!(
            "Swap requested: {} {} via {} settlement",
            request.amount(),
            request.token_code(),
            settlement
        );
        metrics::record_swap_started(settlement);
        self.track(attempt_id, SwapStage::Validating);
        metrics::record_swaps_in_flight(self.tracker.in_flight());

        let result = match self.validate(request) {
            Ok(Some(payment)) => {
                self.settle_on_ledger(attempt_id, request, payment, signer)
                    .await
            }
            Ok(None) => self.settle_simulated(attempt_id).await,
            Err(failure) => Err(failure),
        };

        let latency = started.elapsed().as_secs_f64();
        let outcome = match result {
            Ok(tx_hash) => {
                if let Err(e) = self.tracker.succeed(attempt_id, &tx_hash) {
                    warn!("Failed to record swap success: {}", e);
                }
                metrics::record_swap_succeeded(settlement, latency);
                info!("Swap settled: {}", tx_hash);

                SwapOutcome::Success {
                    attempt_id,
                    tx_hash,
                    simulated: !request.involves_stellar(),
                }
            }
            Err(failure) => {
                let kind = failure.kind();
                if let Err(e) = self.tracker.fail(attempt_id, kind) {
                    warn!("Failed to record swap failure: {}", e);
                }
                metrics::record_swap_failed(settlement, kind, latency);
                warn!("Swap failed ({}): {}", kind, failure);

                SwapOutcome::Failure {
                    attempt_id,
                    reason: failure.user_message(),
                    classification: failure,
                }
            }
        };

        metrics::record_swaps_in_flight(self.tracker.in_flight());
        outcome
    }

    /// Checks that need no external call. Returns the resolved payment for
    /// ledger-settled swaps, `None` for simulated ones.
    fn validate(&self, request: &SwapRequest) -> Result<Option<LedgerPayment>, SwapFailure> {
        if request.from_network() == request.to_network() {
            return Err(ValidationError::SameNetwork.into());
        }

        let amount = request.amount();
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        if amount.normalize().scale() > MAX_FRACTION_DIGITS {
            return Err(ValidationError::ExcessPrecision(amount).into());
        }

        match self.balances.available_balance(request.from_network()) {
            None => {
                return Err(ValidationError::BalanceUnavailable {
                    network: request.from_network().to_string(),
                }
                .into())
            }
            Some(available) if amount > available => {
                return Err(ValidationError::InsufficientBalance {
                    available,
                    requested: amount,
                }
                .into())
            }
            Some(_) => {}
        }

        if !request.involves_stellar() {
            return Ok(None);
        }

        let token = tokens::lookup(request.token_code())
            .ok_or_else(|| SwapFailure::UnsupportedToken(request.token_code().to_string()))?;

        envelope::account_key(request.source_address())
            .map_err(|_| ValidationError::InvalidAddress(request.source_address().to_string()))?;

        let stroops =
            envelope::to_stroops(amount).map_err(|_| ValidationError::AmountOutOfRange(amount))?;

        Ok(Some(LedgerPayment { token, stroops }))
    }

    async fn settle_simulated(&self, attempt_id: Uuid) -> Result<String, SwapFailure> {
        self.track(attempt_id, SwapStage::Submitting);
        Ok(self.simulated.settle().await?)
    }

    async fn settle_on_ledger(
        &self,
        attempt_id: Uuid,
        request: &SwapRequest,
        payment: LedgerPayment,
        signer: &dyn TransactionSigner,
    ) -> Result<String, SwapFailure> {
        self.track(attempt_id, SwapStage::Building);
        let source = request.source_address();

        let account = self
            .ledger
            .load_account(source)
            .await?
            .ok_or_else(|| self.not_funded(source))?;

        let asset = envelope::classic_asset(payment.token)
            .ok()
            .flatten()
            .ok_or_else(|| SwapFailure::UnsupportedToken(payment.token.code.to_string()))?;

        let sequence = account
            .sequence
            .checked_add(1)
            .ok_or_else(|| SwapFailure::Payload("sequence number exhausted".to_string()))?;
        let memo = request.memo();
        let max_time = (self.clock)() + self.tx_timeout_secs;

        let tx = envelope::build_payment(&PaymentParams {
            source,
            sequence,
            destination: &self.receiving_address,
            asset,
            amount_stroops: payment.stroops,
            memo: &memo,
            fee: self.base_fee,
            max_time,
        })
        .map_err(payload_error)?;
        let unsigned =
            envelope::encode(&envelope::unsigned_envelope(tx.clone())).map_err(payload_error)?;
        let expected_hash =
            envelope::transaction_hash(&tx, self.network.passphrase()).map_err(payload_error)?;
        debug!(
            "Built payment {} with sequence {} valid until {}",
            expected_hash, sequence, max_time
        );

        self.track(attempt_id, SwapStage::Signing);
        let hint = NetworkHint::from(self.network);
        let signed = match signer.sign(&unsigned, &hint).await {
            Ok(signed) => {
                metrics::record_signing("signed");
                signed
            }
            Err(e) => {
                let failure = SwapFailure::from(e);
                metrics::record_signing(failure.kind());
                return Err(failure);
            }
        };
        self.verify_signature(&signed, &tx, source)?;

        if (self.clock)() > max_time {
            return Err(SubmissionError::Expired.into());
        }

        self.track(attempt_id, SwapStage::Submitting);
        let hash = self
            .ledger
            .submit_transaction(&signed.signed_payload)
            .await?;
        if hash != expected_hash {
            warn!("Ledger reported hash {} for payment {}", hash, expected_hash);
        }
        Ok(hash)
    }

    /// The signed envelope must carry the built transaction unchanged, signed
    /// by the source account over the build network
    fn verify_signature(
        &self,
        signed: &SigningResult,
        expected: &Transaction,
        source: &str,
    ) -> Result<(), SwapFailure> {
        let envelope = envelope::decode(&signed.signed_payload).map_err(|e| {
            SigningError::Unknown(format!("wallet returned an unreadable transaction: {e}"))
        })?;
        let key = envelope::account_key(source).map_err(payload_error)?;

        match envelope::verify_signed(&envelope, expected, self.network.passphrase(), &key) {
            Ok(()) => Ok(()),
            Err(EnvelopeError::NoValidSignature) => {
                Err(self.classify_bad_signature(&envelope, expected, signed, source, &key))
            }
            Err(e) => Err(SigningError::Unknown(e.to_string()).into()),
        }
    }

    /// A signature from the source key over another network is a network
    /// mismatch; a signature by some other account is the wrong account.
    fn classify_bad_signature(
        &self,
        envelope: &TransactionEnvelope,
        expected: &Transaction,
        signed: &SigningResult,
        source: &str,
        key: &[u8; 32],
    ) -> SwapFailure {
        let signed_on = StellarNetwork::ALL
            .into_iter()
            .filter(|network| *network != self.network)
            .find(|network| {
                envelope::verify_signed(envelope, expected, network.passphrase(), key).is_ok()
            });

        if let Some(other) = signed_on {
            return SigningError::NetworkMismatch(format!(
                "signed for {}, expected {}",
                other.name(),
                self.network.name()
            ))
            .into();
        }

        if signed.signer_address != source {
            return SigningError::WrongAccount {
                expected: source.to_string(),
                actual: signed.signer_address.clone(),
            }
            .into();
        }

        SigningError::Unknown(format!(
            "signature does not verify for {} on {}",
            source,
            self.network.name()
        ))
        .into()
    }

    fn not_funded(&self, address: &str) -> SwapFailure {
        let remediation = match self.network {
            StellarNetwork::Testnet => format!(
                "Stellar account {address} not found. Please fund your Stellar wallet first. \
                 Visit https://laboratory.stellar.org/#account-creator?network=test to create \
                 and fund a testnet account."
            ),
            StellarNetwork::Futurenet => format!(
                "Stellar account {address} not found. Please fund your Stellar wallet first. \
                 Visit https://laboratory.stellar.org/#account-creator?network=futurenet to \
                 create and fund a futurenet account."
            ),
            StellarNetwork::Public => format!(
                "Stellar account {address} not found. Send at least 1 XLM to it to create \
                 the account, then try again."
            ),
        };

        SwapFailure::AccountNotFunded {
            address: address.to_string(),
            remediation,
        }
    }

    fn track(&self, attempt_id: Uuid, stage: SwapStage) {
        if let Err(e) = self.tracker.advance(attempt_id, stage) {
            warn!("Failed to track swap stage: {}", e);
        }
    }
}

fn payload_error(e: EnvelopeError) -> SwapFailure {
    SwapFailure::Payload(e.to_string())
}
