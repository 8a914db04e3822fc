//! Stellar transaction envelopes: building, hashing, signing and verification

use crate::tokens::TokenDescriptor;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    AccountId, AlphaNum12, AlphaNum4, Asset, AssetCode12, AssetCode4, DecoratedSignature, Hash,
    Limits, Memo, MuxedAccount, Operation, OperationBody, PaymentOp, Preconditions, PublicKey,
    ReadXdr, SequenceNumber, Signature as XdrSignature, SignatureHint, StringM, TimeBounds,
    TimePoint, Transaction, TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV1Envelope, Uint256, VecM, WriteXdr,
};
use thiserror::Error;

/// Memo text is limited to 28 bytes by the protocol
pub const MAX_MEMO_TEXT_LEN: usize = 28;

/// One unit of any Stellar asset is 10^7 stroops
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Invalid account address: {0}")]
    Address(String),

    #[error("Invalid amount: {0}")]
    Amount(String),

    #[error("XDR error: {0}")]
    Xdr(String),

    #[error("Only v1 transaction envelopes are supported")]
    UnsupportedEnvelope,

    #[error("Signed transaction differs from the built payload")]
    BodyMismatch,

    #[error("No signature verifies for this network and signer")]
    NoValidSignature,
}

impl From<stellar_xdr::curr::Error> for EnvelopeError {
    fn from(e: stellar_xdr::curr::Error) -> Self {
        EnvelopeError::Xdr(e.to_string())
    }
}

/// Parameters of a single-payment transaction
#[derive(Debug, Clone)]
pub struct PaymentParams<'a> {
    pub source: &'a str,
    /// Sequence number the transaction consumes (account sequence + 1)
    pub sequence: i64,
    pub destination: &'a str,
    pub asset: Asset,
    pub amount_stroops: i64,
    pub memo: &'a str,
    pub fee: u32,
    /// Unix time after which the transaction is invalid
    pub max_time: u64,
}

/// Decode a `G...` account address into its ed25519 key
pub fn account_key(address: &str) -> Result<[u8; 32], EnvelopeError> {
    stellar_strkey::ed25519::PublicKey::from_string(address)
        .map(|pk| pk.0)
        .map_err(|_| EnvelopeError::Address(address.to_string()))
}

/// Encode an ed25519 key as a `G...` account address
pub fn account_address(key: &[u8; 32]) -> String {
    stellar_strkey::ed25519::PublicKey(*key).to_string()
}

/// Convert a decimal amount into stroops, rejecting sub-stroop precision
pub fn to_stroops(amount: Decimal) -> Result<i64, EnvelopeError> {
    let scaled = amount
        .checked_mul(Decimal::from(STROOPS_PER_UNIT))
        .ok_or_else(|| EnvelopeError::Amount(format!("{amount} is out of range")))?;
    if !scaled.fract().is_zero() {
        return Err(EnvelopeError::Amount(format!(
            "{amount} has more than 7 decimal places"
        )));
    }

    match scaled.to_i64() {
        Some(stroops) if stroops > 0 => Ok(stroops),
        _ => Err(EnvelopeError::Amount(format!("{amount} is out of range"))),
    }
}

/// Classic asset for a registry token, if it can be moved with a payment
pub fn classic_asset(token: &TokenDescriptor) -> Result<Option<Asset>, EnvelopeError> {
    if token.is_native {
        return Ok(Some(Asset::Native));
    }

    let Some(issuer) = token.issuer else {
        return Ok(None);
    };
    let issuer = AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(account_key(issuer)?)));
    let code = token.code.as_bytes();

    let asset = match code.len() {
        1..=4 => {
            let mut buf = [0u8; 4];
            buf[..code.len()].copy_from_slice(code);
            Asset::CreditAlphanum4(AlphaNum4 {
                asset_code: AssetCode4(buf),
                issuer,
            })
        }
        5..=12 => {
            let mut buf = [0u8; 12];
            buf[..code.len()].copy_from_slice(code);
            Asset::CreditAlphanum12(AlphaNum12 {
                asset_code: AssetCode12(buf),
                issuer,
            })
        }
        _ => return Ok(None),
    };

    Ok(Some(asset))
}

/// Build an unsigned single-payment transaction
pub fn build_payment(params: &PaymentParams<'_>) -> Result<Transaction, EnvelopeError> {
    let source = MuxedAccount::Ed25519(Uint256(account_key(params.source)?));
    let destination = MuxedAccount::Ed25519(Uint256(account_key(params.destination)?));

    let memo = truncate_memo(params.memo);
    let memo = Memo::Text(StringM::<28>::try_from(memo.as_bytes().to_vec())?);

    let payment = Operation {
        source_account: None,
        body: OperationBody::Payment(PaymentOp {
            destination,
            asset: params.asset.clone(),
            amount: params.amount_stroops,
        }),
    };
    let operations: VecM<Operation, 100> = vec![payment].try_into()?;

    Ok(Transaction {
        source_account: source,
        fee: params.fee,
        seq_num: SequenceNumber(params.sequence),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(params.max_time),
        }),
        memo,
        operations,
        ext: TransactionExt::V0,
    })
}

fn truncate_memo(memo: &str) -> &str {
    if memo.len() <= MAX_MEMO_TEXT_LEN {
        return memo;
    }
    let mut end = MAX_MEMO_TEXT_LEN;
    while !memo.is_char_boundary(end) {
        end -= 1;
    }
    &memo[..end]
}

/// Upper time bound of a transaction, if it has one
#[cfg(test)]
pub fn max_time(tx: &Transaction) -> Option<u64> {
    match &tx.cond {
        Preconditions::Time(bounds) if bounds.max_time.0 > 0 => Some(bounds.max_time.0),
        _ => None,
    }
}

/// Wrap a transaction in an envelope without signatures
pub fn unsigned_envelope(tx: Transaction) -> TransactionEnvelope {
    TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: VecM::default(),
    })
}

pub fn encode(envelope: &TransactionEnvelope) -> Result<String, EnvelopeError> {
    Ok(envelope.to_xdr_base64(Limits::none())?)
}

pub fn decode(xdr: &str) -> Result<TransactionEnvelope, EnvelopeError> {
    Ok(TransactionEnvelope::from_xdr_base64(xdr, Limits::none())?)
}

fn v1(envelope: &TransactionEnvelope) -> Result<&TransactionV1Envelope, EnvelopeError> {
    match envelope {
        TransactionEnvelope::Tx(v1) => Ok(v1),
        _ => Err(EnvelopeError::UnsupportedEnvelope),
    }
}

/// Network id: SHA-256 of the network passphrase
pub fn network_id(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Hash that signers sign: SHA-256 of the network-tagged transaction
pub fn signature_hash(tx: &Transaction, passphrase: &str) -> Result<[u8; 32], EnvelopeError> {
    let payload = TransactionSignaturePayload {
        network_id: Hash(network_id(passphrase)),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Sha256::digest(&bytes).into())
}

/// Hex transaction hash as reported by Horizon
pub fn transaction_hash(tx: &Transaction, passphrase: &str) -> Result<String, EnvelopeError> {
    Ok(hex::encode(signature_hash(tx, passphrase)?))
}

/// Add a signature over `passphrase`'s network to a base64 envelope
pub fn sign_envelope(
    xdr: &str,
    passphrase: &str,
    key: &SigningKey,
) -> Result<String, EnvelopeError> {
    let envelope = decode(xdr)?;
    let v1 = v1(&envelope)?;

    let hash = signature_hash(&v1.tx, passphrase)?;
    let signature = key.sign(&hash).to_bytes();
    let public = key.verifying_key().to_bytes();

    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public[28..]);

    let mut signatures: Vec<DecoratedSignature> = v1.signatures.iter().cloned().collect();
    signatures.push(DecoratedSignature {
        hint: SignatureHint(hint),
        signature: XdrSignature(signature.to_vec().try_into()?),
    });

    let signed = TransactionEnvelope::Tx(TransactionV1Envelope {
        tx: v1.tx.clone(),
        signatures: signatures.try_into()?,
    });
    encode(&signed)
}

/// Check that a signed envelope carries `expected` unchanged and a valid
/// signature from `signer` over `passphrase`'s network
pub fn verify_signed(
    envelope: &TransactionEnvelope,
    expected: &Transaction,
    passphrase: &str,
    signer: &[u8; 32],
) -> Result<(), EnvelopeError> {
    let v1 = v1(envelope)?;
    if &v1.tx != expected {
        return Err(EnvelopeError::BodyMismatch);
    }

    let key = VerifyingKey::from_bytes(signer)
        .map_err(|e| EnvelopeError::Address(e.to_string()))?;
    let hash = signature_hash(expected, passphrase)?;

    let verified = v1.signatures.iter().any(|decorated| {
        let Ok(bytes) = <[u8; 64]>::try_from(decorated.signature.0.as_slice()) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        key.verify(&hash, &signature).is_ok()
    });

    if verified {
        Ok(())
    } else {
        Err(EnvelopeError::NoValidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens;
    use std::str::FromStr;

    const TESTNET: &str = "Test SDF Network ; September 2015";
    const PUBNET: &str = "Public Global Stellar Network ; September 2015";

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn address_of(key: &SigningKey) -> String {
        account_address(&key.verifying_key().to_bytes())
    }

    fn sample_tx(source: &str) -> Transaction {
        let destination = account_address(&[9u8; 32]);
        build_payment(&PaymentParams {
            source,
            sequence: 42,
            destination: &destination,
            asset: Asset::Native,
            amount_stroops: 15_000_000,
            memo: "ethereum>stellar:XLM",
            fee: 100,
            max_time: 1_700_000_180,
        })
        .unwrap()
    }

    #[test]
    fn test_to_stroops() {
        assert_eq!(to_stroops(Decimal::from_str("1.5").unwrap()), Ok(15_000_000));
        assert_eq!(to_stroops(Decimal::from_str("0.0000001").unwrap()), Ok(1));
        assert!(to_stroops(Decimal::from_str("0.00000001").unwrap()).is_err());
        assert!(to_stroops(Decimal::ZERO).is_err());
        assert!(to_stroops(Decimal::from_str("-1").unwrap()).is_err());
    }

    #[test]
    fn test_classic_assets() {
        let xlm = classic_asset(tokens::lookup("XLM").unwrap()).unwrap();
        assert_eq!(xlm, Some(Asset::Native));

        let dbtk = classic_asset(tokens::lookup("DBTK").unwrap()).unwrap();
        match dbtk {
            Some(Asset::CreditAlphanum4(a)) => assert_eq!(&a.asset_code.0, b"DBTK"),
            other => panic!("unexpected asset {other:?}"),
        }

        // contract-only tokens have no classic representation
        assert_eq!(classic_asset(tokens::lookup("USDC").unwrap()).unwrap(), None);
    }

    #[test]
    fn test_build_payment_fields() {
        let source = address_of(&key(1));
        let tx = sample_tx(&source);

        assert_eq!(tx.seq_num, SequenceNumber(42));
        assert_eq!(tx.fee, 100);
        assert_eq!(max_time(&tx), Some(1_700_000_180));
        assert_eq!(tx.operations.len(), 1);
        match &tx.memo {
            Memo::Text(text) => assert_eq!(text.as_slice(), b"ethereum>stellar:XLM"),
            other => panic!("unexpected memo {other:?}"),
        }
    }

    #[test]
    fn test_long_memo_is_truncated() {
        assert_eq!(truncate_memo("short"), "short");
        let long = "a".repeat(40);
        assert_eq!(truncate_memo(&long).len(), MAX_MEMO_TEXT_LEN);
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = key(3);
        let source = address_of(&signer);
        let tx = sample_tx(&source);
        let unsigned = encode(&unsigned_envelope(tx.clone())).unwrap();

        let signed = sign_envelope(&unsigned, TESTNET, &signer).unwrap();
        let envelope = decode(&signed).unwrap();
        let signer_key = account_key(&source).unwrap();

        assert_eq!(verify_signed(&envelope, &tx, TESTNET, &signer_key), Ok(()));
        assert_eq!(
            verify_signed(&envelope, &tx, PUBNET, &signer_key),
            Err(EnvelopeError::NoValidSignature)
        );
    }

    #[test]
    fn test_verify_detects_modified_body() {
        let signer = key(4);
        let source = address_of(&signer);
        let tx = sample_tx(&source);
        let unsigned = encode(&unsigned_envelope(tx.clone())).unwrap();
        let signed = decode(&sign_envelope(&unsigned, TESTNET, &signer).unwrap()).unwrap();

        let mut other = tx;
        other.fee = 10_000;
        assert_eq!(
            verify_signed(&signed, &other, TESTNET, &account_key(&source).unwrap()),
            Err(EnvelopeError::BodyMismatch)
        );
    }

    #[test]
    fn test_unsigned_envelope_fails_verification() {
        let source = address_of(&key(5));
        let tx = sample_tx(&source);
        let envelope = unsigned_envelope(tx.clone());
        assert_eq!(
            verify_signed(&envelope, &tx, TESTNET, &account_key(&source).unwrap()),
            Err(EnvelopeError::NoValidSignature)
        );
    }

    #[test]
    fn test_transaction_hash_depends_on_network() {
        let tx = sample_tx(&address_of(&key(6)));
        let testnet = transaction_hash(&tx, TESTNET).unwrap();
        let pubnet = transaction_hash(&tx, PUBNET).unwrap();
        assert_eq!(testnet.len(), 64);
        assert_ne!(testnet, pubnet);
    }
}
