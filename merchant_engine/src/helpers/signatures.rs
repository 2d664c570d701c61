//! # Purpose-tagged signatures
//!
//! Every signature the merchant makes or checks is over a [`SignaturePayload`]: a purpose tag followed by a sequence
//! of length-prefixed fields. The tag is part of the signed bytes, so a signature made for one purpose never verifies
//! for another.
//!
//! ```text
//!    {len}{PURPOSE_TAG}{len}{field 1}{len}{field 2}...
//! ```
//!
//! where each `len` is the byte length of what follows it, as a little-endian `u64`. Amounts are encoded in their
//! canonical string form and timestamps as little-endian `i64` seconds.
//!
//! The signature scheme is a domain-separated Ristretto Schnorr signature. Signatures are serialized as 128 hex
//! characters: the public nonce followed by the signature scalar.
use std::fmt::Display;

use merchant_common::{Amount, Secret, Timestamp};
use mint_client::TransferDeposit;
use rand::thread_rng;
use tari_crypto::{
    hash_domain,
    keys::PublicKey,
    ristretto::{RistrettoPublicKey, RistrettoSchnorrWithDomain, RistrettoSecretKey},
    tari_utilities::hex::Hex,
};
use thiserror::Error;

hash_domain!(MerchantSignatureDomain, "MerchantCore.Signatures");

pub type PurposeSchnorr = RistrettoSchnorrWithDomain<MerchantSignatureDomain>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePurpose {
    MerchantContract,
    PaymentOk,
    RefundOk,
    PayDeposit,
    RefundApproval,
    WireDeposit,
    DenominationCoin,
    TransferDetails,
}

impl SignaturePurpose {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MerchantContract => "MERCHANT_CONTRACT",
            Self::PaymentOk => "PAYMENT_OK",
            Self::RefundOk => "REFUND_OK",
            Self::PayDeposit => "PAY_DEPOSIT",
            Self::RefundApproval => "REFUND_APPROVAL",
            Self::WireDeposit => "WIRE_DEPOSIT",
            Self::DenominationCoin => "DENOMINATION_COIN",
            Self::TransferDetails => "TRANSFER_DETAILS",
        }
    }
}

impl Display for SignaturePurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("The {0} signature is not valid")]
    InvalidSignature(SignaturePurpose),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Malformed key: {0}")]
    MalformedKey(String),
    #[error("Could not create a signature: {0}")]
    SigningFailed(String),
}

impl From<String> for CryptoError {
    fn from(e: String) -> Self {
        Self::MalformedSignature(e)
    }
}

//--------------------------------------       Payload       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePayload {
    purpose: SignaturePurpose,
    bytes: Vec<u8>,
}

impl SignaturePayload {
    pub fn new(purpose: SignaturePurpose) -> Self {
        Self { purpose, bytes: Vec::with_capacity(256) }.push_str(purpose.tag())
    }

    pub fn purpose(&self) -> SignaturePurpose {
        self.purpose
    }

    pub fn push_bytes(mut self, field: &[u8]) -> Self {
        self.bytes.extend_from_slice(&(field.len() as u64).to_le_bytes());
        self.bytes.extend_from_slice(field);
        self
    }

    pub fn push_str(self, field: &str) -> Self {
        self.push_bytes(field.as_bytes())
    }

    pub fn push_amount(self, amount: &Amount) -> Self {
        self.push_str(&amount.to_string())
    }

    pub fn push_time(self, t: Timestamp) -> Self {
        self.push_i64(t.as_secs())
    }

    pub fn push_i64(self, v: i64) -> Self {
        self.push_bytes(&v.to_le_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

//--------------------------------------      Signature      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct PurposeSignature(PurposeSchnorr);

impl PurposeSignature {
    pub fn sign(payload: &SignaturePayload, key: &RistrettoSecretKey) -> Result<Self, CryptoError> {
        let mut rng = thread_rng();
        let sig = PurposeSchnorr::sign(key, payload.as_bytes(), &mut rng)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(Self(sig))
    }

    pub fn verify(&self, payload: &SignaturePayload, pubkey: &RistrettoPublicKey) -> bool {
        self.0.verify(pubkey, payload.as_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        hex_to_schnorr(s).map(Self)
    }

    pub fn to_hex(&self) -> String {
        let nonce = self.0.get_public_nonce().to_hex();
        let sig = self.0.get_signature().to_hex();
        format!("{nonce}{sig}")
    }
}

fn hex_to_schnorr(s: &str) -> Result<PurposeSchnorr, CryptoError> {
    if s.len() != 128 {
        return Err(CryptoError::MalformedSignature("Invalid signature length".into()));
    }
    let nonce = RistrettoPublicKey::from_hex(&s[..64])
        .map_err(|e| CryptoError::MalformedSignature(format!("Signature contains an invalid public nonce. {e}")))?;
    let sig = RistrettoSecretKey::from_hex(&s[64..])
        .map_err(|e| CryptoError::MalformedSignature(format!("Signature contains an invalid signature key. {e}")))?;
    Ok(PurposeSchnorr::new(nonce, sig))
}

pub fn parse_public_key(s: &str) -> Result<RistrettoPublicKey, CryptoError> {
    RistrettoPublicKey::from_hex(s).map_err(|e| CryptoError::MalformedKey(format!("{s}: {e}")))
}

/// A statement that can be signed for a fixed purpose.
pub trait SignedPurpose {
    const PURPOSE: SignaturePurpose;

    fn payload(&self) -> SignaturePayload;

    fn sign(&self, key: &RistrettoSecretKey) -> Result<PurposeSignature, CryptoError> {
        PurposeSignature::sign(&self.payload(), key)
    }

    fn sign_hex(&self, key: &RistrettoSecretKey) -> Result<String, CryptoError> {
        self.sign(key).map(|s| s.to_hex())
    }

    /// Checks a hex-encoded signature over this statement. A malformed signature is reported as invalid.
    fn verify_hex(&self, sig: &str, pubkey: &RistrettoPublicKey) -> Result<(), CryptoError> {
        let sig = PurposeSignature::from_hex(sig).map_err(|_| CryptoError::InvalidSignature(Self::PURPOSE))?;
        if sig.verify(&self.payload(), pubkey) {
            Ok(())
        } else {
            Err(CryptoError::InvalidSignature(Self::PURPOSE))
        }
    }
}

//--------------------------------------     Merchant keys   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct MerchantKeys {
    secret: Secret<RistrettoSecretKey>,
    public: RistrettoPublicKey,
}

impl MerchantKeys {
    pub fn random() -> Self {
        let (sk, pk) = RistrettoPublicKey::random_keypair(&mut thread_rng());
        Self { secret: Secret::new(sk), public: pk }
    }

    pub fn from_secret_hex(hex: &str) -> Result<Self, CryptoError> {
        let sk = RistrettoSecretKey::from_hex(hex).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let public = RistrettoPublicKey::from_secret_key(&sk);
        Ok(Self { secret: Secret::new(sk), public })
    }

    pub fn secret(&self) -> &RistrettoSecretKey {
        self.secret.reveal()
    }

    pub fn public(&self) -> &RistrettoPublicKey {
        &self.public
    }

    pub fn public_hex(&self) -> String {
        self.public.to_hex()
    }

    pub fn secret_hex(&self) -> String {
        self.secret.reveal().to_hex()
    }
}

//--------------------------------------     Statements      ---------------------------------------------------------
/// The merchant's signature over a freshly created contract.
pub struct ContractStatement<'a> {
    pub h_contract: &'a str,
}

impl SignedPurpose for ContractStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::MerchantContract;

    fn payload(&self) -> SignaturePayload {
        SignaturePayload::new(Self::PURPOSE).push_str(self.h_contract)
    }
}

/// The merchant's receipt: the contract has been paid in full.
pub struct PaymentOkStatement<'a> {
    pub h_contract: &'a str,
}

impl SignedPurpose for PaymentOkStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::PaymentOk;

    fn payload(&self) -> SignaturePayload {
        SignaturePayload::new(Self::PURPOSE).push_str(self.h_contract)
    }
}

/// A wallet's authorisation to deposit one coin towards a contract.
pub struct DepositPermissionStatement<'a> {
    pub h_contract: &'a str,
    pub h_wire: &'a str,
    pub amount_with_fee: &'a Amount,
    pub amount_without_fee: &'a Amount,
    pub refund_fee: &'a Amount,
    pub coin_pub: &'a str,
    pub merchant_pub: &'a str,
    pub timestamp: Timestamp,
    pub refund_deadline: Timestamp,
}

impl SignedPurpose for DepositPermissionStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::PayDeposit;

    fn payload(&self) -> SignaturePayload {
        SignaturePayload::new(Self::PURPOSE)
            .push_str(self.h_contract)
            .push_str(self.h_wire)
            .push_amount(self.amount_with_fee)
            .push_amount(self.amount_without_fee)
            .push_amount(self.refund_fee)
            .push_str(self.coin_pub)
            .push_str(self.merchant_pub)
            .push_time(self.timestamp)
            .push_time(self.refund_deadline)
    }
}

/// The merchant's permission for the mint to refund (part of) a deposited coin.
pub struct RefundApprovalStatement<'a> {
    pub coin_pub: &'a str,
    pub h_contract: &'a str,
    pub rtransaction_id: i64,
    pub refund_amount: &'a Amount,
}

impl SignedPurpose for RefundApprovalStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::RefundApproval;

    fn payload(&self) -> SignaturePayload {
        SignaturePayload::new(Self::PURPOSE)
            .push_str(self.coin_pub)
            .push_str(self.h_contract)
            .push_i64(self.rtransaction_id)
            .push_amount(self.refund_amount)
    }
}

/// The mint's acknowledgement that a refund permission was executed.
pub struct RefundOkStatement<'a> {
    pub coin_pub: &'a str,
    pub h_contract: &'a str,
    pub rtransaction_id: i64,
    pub refund_amount: &'a Amount,
    pub merchant_pub: &'a str,
}

impl SignedPurpose for RefundOkStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::RefundOk;

    fn payload(&self) -> SignaturePayload {
        SignaturePayload::new(Self::PURPOSE)
            .push_str(self.coin_pub)
            .push_str(self.h_contract)
            .push_i64(self.rtransaction_id)
            .push_amount(self.refund_amount)
            .push_str(self.merchant_pub)
    }
}

/// The mint's confirmation that a coin was deposited in favour of the merchant.
pub struct WireDepositStatement<'a> {
    pub h_contract: &'a str,
    pub h_wire: &'a str,
    pub timestamp: Timestamp,
    pub refund_deadline: Timestamp,
    pub transaction_id: &'a str,
    pub amount_without_fee: &'a Amount,
    pub coin_pub: &'a str,
    pub merchant_pub: &'a str,
}

impl SignedPurpose for WireDepositStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::WireDeposit;

    fn payload(&self) -> SignaturePayload {
        SignaturePayload::new(Self::PURPOSE)
            .push_str(self.h_contract)
            .push_str(self.h_wire)
            .push_time(self.timestamp)
            .push_time(self.refund_deadline)
            .push_str(self.transaction_id)
            .push_amount(self.amount_without_fee)
            .push_str(self.coin_pub)
            .push_str(self.merchant_pub)
    }
}

/// A denomination key's signature over a coin. This is what makes a coin a coin.
pub struct DenominationStatement<'a> {
    pub coin_pub: &'a str,
}

impl SignedPurpose for DenominationStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::DenominationCoin;

    fn payload(&self) -> SignaturePayload {
        SignaturePayload::new(Self::PURPOSE).push_str(self.coin_pub)
    }
}

/// The mint's report of an aggregated wire transfer.
pub struct TransferStatement<'a> {
    pub wtid: &'a str,
    pub total: &'a Amount,
    pub wire_fee: &'a Amount,
    pub h_wire: &'a str,
    pub execution_time: Timestamp,
    pub deposits: &'a [TransferDeposit],
}

impl SignedPurpose for TransferStatement<'_> {
    const PURPOSE: SignaturePurpose = SignaturePurpose::TransferDetails;

    fn payload(&self) -> SignaturePayload {
        let payload = SignaturePayload::new(Self::PURPOSE)
            .push_str(self.wtid)
            .push_amount(self.total)
            .push_amount(self.wire_fee)
            .push_str(self.h_wire)
            .push_time(self.execution_time)
            .push_i64(self.deposits.len() as i64);
        self.deposits.iter().fold(payload, |p, d| {
            p.push_str(&d.h_contract_terms)
                .push_str(&d.coin_pub)
                .push_amount(&d.deposit_value)
                .push_amount(&d.deposit_fee)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eur(s: &str) -> Amount {
        format!("EUR:{s}").parse().unwrap()
    }

    #[test]
    fn sign_and_verify() {
        let keys = MerchantKeys::random();
        let statement = PaymentOkStatement { h_contract: "abcd" };
        let sig = statement.sign_hex(keys.secret()).unwrap();
        assert_eq!(sig.len(), 128);
        assert!(statement.verify_hex(&sig, keys.public()).is_ok());
        let other = PaymentOkStatement { h_contract: "abce" };
        let err = other.verify_hex(&sig, keys.public());
        assert_eq!(err, Err(CryptoError::InvalidSignature(SignaturePurpose::PaymentOk)));
    }

    #[test]
    fn wrong_purpose_is_rejected() {
        let keys = MerchantKeys::random();
        let sig = ContractStatement { h_contract: "abcd" }.sign_hex(keys.secret()).unwrap();
        let err = PaymentOkStatement { h_contract: "abcd" }.verify_hex(&sig, keys.public()).unwrap_err();
        assert_eq!(err, CryptoError::InvalidSignature(SignaturePurpose::PaymentOk));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let keys = MerchantKeys::random();
        let other = MerchantKeys::random();
        let amount = eur("5");
        let statement =
            RefundApprovalStatement { coin_pub: "c0", h_contract: "h", rtransaction_id: 1, refund_amount: &amount };
        let sig = statement.sign_hex(keys.secret()).unwrap();
        assert!(statement.verify_hex(&sig, keys.public()).is_ok());
        assert!(statement.verify_hex(&sig, other.public()).is_err());
    }

    #[test]
    fn length_prefixes_prevent_field_shifting() {
        let a = SignaturePayload::new(SignaturePurpose::PaymentOk).push_str("ab").push_str("c");
        let b = SignaturePayload::new(SignaturePurpose::PaymentOk).push_str("a").push_str("bc");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn keys_round_trip_through_hex() {
        let keys = MerchantKeys::random();
        let restored = MerchantKeys::from_secret_hex(&keys.secret_hex()).unwrap();
        assert_eq!(restored.public_hex(), keys.public_hex());
        assert!(PurposeSignature::from_hex("00").is_err());
    }
}
