use std::fmt::Display;

use merchant_common::{Amount, AmountError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    db_types::OrderId,
    helpers::CryptoError,
    traits::{InstanceError, InventoryError, MerchantDbError},
};

/// The stable, client-visible classification of every error the engine can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    BadRequest,
    ParameterMalformed,
    ParameterMissing,
    CurrencyMismatch,
    InstanceUnknown,
    InstanceConflict,
    InstanceHasNoWire,
    ContractNotFound,
    OrderAlreadyExists,
    AlreadyClaimed,
    OrderNotClaimed,
    AlreadyPaid,
    PartialPayment,
    CoinSignatureInvalid,
    MintRejected,
    MintUnreachable,
    MintNotTrusted,
    OrderAborted,
    DeadlineExceeded,
    RefundExceedsPayment,
    RefundInconsistentAmount,
    RefundNotPermittedAfterDeadline,
    OrderUnpaid,
    ProductNotFound,
    ProductConflict,
    InventoryInsufficient,
    DbSoft,
    DbHard,
    SignatureInvariantFailure,
    FailedDependency,
    TransferPending,
}

impl ErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            Self::BadRequest => 1000,
            Self::ParameterMalformed => 1001,
            Self::ParameterMissing => 1002,
            Self::CurrencyMismatch => 1003,
            Self::InstanceUnknown => 1100,
            Self::InstanceConflict => 1101,
            Self::InstanceHasNoWire => 1102,
            Self::ContractNotFound => 1200,
            Self::OrderAlreadyExists => 1201,
            Self::AlreadyClaimed => 1202,
            Self::OrderNotClaimed => 1203,
            Self::AlreadyPaid => 1300,
            Self::PartialPayment => 1301,
            Self::CoinSignatureInvalid => 1302,
            Self::MintRejected => 1303,
            Self::MintUnreachable => 1304,
            Self::MintNotTrusted => 1305,
            Self::OrderAborted => 1306,
            Self::DeadlineExceeded => 1307,
            Self::RefundExceedsPayment => 1400,
            Self::RefundInconsistentAmount => 1401,
            Self::RefundNotPermittedAfterDeadline => 1402,
            Self::OrderUnpaid => 1403,
            Self::ProductNotFound => 1500,
            Self::ProductConflict => 1501,
            Self::InventoryInsufficient => 1502,
            Self::DbSoft => 1600,
            Self::DbHard => 1601,
            Self::SignatureInvariantFailure => 1700,
            Self::FailedDependency => 1701,
            Self::TransferPending => 1702,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::ParameterMalformed => "PARAMETER_MALFORMED",
            Self::ParameterMissing => "PARAMETER_MISSING",
            Self::CurrencyMismatch => "CURRENCY_MISMATCH",
            Self::InstanceUnknown => "INSTANCE_UNKNOWN",
            Self::InstanceConflict => "INSTANCE_CONFLICT",
            Self::InstanceHasNoWire => "INSTANCE_HAS_NO_WIRE",
            Self::ContractNotFound => "CONTRACT_NOT_FOUND",
            Self::OrderAlreadyExists => "ORDER_ALREADY_EXISTS",
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::OrderNotClaimed => "ORDER_NOT_CLAIMED",
            Self::AlreadyPaid => "ALREADY_PAID",
            Self::PartialPayment => "PARTIAL_PAYMENT",
            Self::CoinSignatureInvalid => "COIN_SIGNATURE_INVALID",
            Self::MintRejected => "MINT_REJECTED",
            Self::MintUnreachable => "MINT_UNREACHABLE",
            Self::MintNotTrusted => "MINT_NOT_TRUSTED",
            Self::OrderAborted => "ORDER_ABORTED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::RefundExceedsPayment => "REFUND_EXCEEDS_PAYMENT",
            Self::RefundInconsistentAmount => "REFUND_INCONSISTENT_AMOUNT",
            Self::RefundNotPermittedAfterDeadline => "REFUND_NOT_PERMITTED_AFTER_DEADLINE",
            Self::OrderUnpaid => "ORDER_UNPAID",
            Self::ProductNotFound => "PRODUCT_NOT_FOUND",
            Self::ProductConflict => "PRODUCT_CONFLICT",
            Self::InventoryInsufficient => "INVENTORY_INSUFFICIENT",
            Self::DbSoft => "DB_SOFT",
            Self::DbHard => "DB_HARD",
            Self::SignatureInvariantFailure => "SIGNATURE_INVARIANT_FAILURE",
            Self::FailedDependency => "FAILED_DEPENDENCY",
            Self::TransferPending => "TRANSFER_PENDING",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every error the engine APIs return.
///
/// The `Display` text is safe to show to clients. Internal details (SQL, store messages) are logged where the error
/// is created and replaced by a generic message here.
#[derive(Debug, Clone, Error)]
pub enum MerchantError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Parameter '{field}' is malformed. {reason}")]
    ParameterMalformed { field: String, reason: String },
    #[error("Parameter '{0}' is missing")]
    ParameterMissing(String),
    #[error("Expected an amount in {expected}, but got {found}")]
    CurrencyMismatch { expected: String, found: String },
    #[error("Instance '{0}' is unknown")]
    InstanceUnknown(String),
    #[error("Instance '{0}' already exists with different settings")]
    InstanceConflict(String),
    #[error("Instance '{0}' has no usable bank account")]
    InstanceHasNoWire(String),
    #[error("No contract found for {0}")]
    ContractNotFound(String),
    #[error("Order {0} already exists")]
    OrderAlreadyExists(OrderId),
    #[error("Order {0} has already been claimed")]
    AlreadyClaimed(OrderId),
    #[error("Order {0} must be claimed before it can be paid")]
    OrderNotClaimed(OrderId),
    #[error("Order {0} has already been paid")]
    AlreadyPaid(OrderId),
    #[error("The signature of coin {coin_pub} is invalid")]
    CoinSignatureInvalid { coin_pub: String, reason: String },
    #[error("The mint rejected the deposit of coin {coin_pub}")]
    MintRejected { coin_pub: String, status: u16, proof: Value },
    #[error("The mint at {0} could not be reached")]
    MintUnreachable(String),
    #[error("The mint at {0} is not trusted by this merchant")]
    MintNotTrusted(String),
    #[error("Order {0} was aborted")]
    OrderAborted(OrderId),
    #[error("The deadline has passed. {0}")]
    DeadlineExceeded(String),
    #[error("The refund exceeds the payment by {0}")]
    RefundExceedsPayment(Amount),
    #[error("Refunds may only increase. The current refund is {current}, but {requested} was requested")]
    RefundInconsistentAmount { current: Amount, requested: Amount },
    #[error("The refund deadline of order {0} has passed")]
    RefundNotPermittedAfterDeadline(OrderId),
    #[error("Order {0} has not been paid")]
    OrderUnpaid(OrderId),
    #[error("Product '{0}' does not exist")]
    ProductNotFound(String),
    #[error("{0}")]
    ProductConflict(String),
    #[error("Not enough stock of product '{0}'")]
    InventoryInsufficient(String),
    #[error("The database is busy. Please try again")]
    DbSoft,
    #[error("Internal database error")]
    DbHard,
    #[error("Internal signature or state invariant failure")]
    SignatureInvariantFailure,
    #[error("{reason}")]
    FailedDependency { reason: String, detail: Value },
}

impl MerchantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::ParameterMalformed { .. } => ErrorKind::ParameterMalformed,
            Self::ParameterMissing(_) => ErrorKind::ParameterMissing,
            Self::CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
            Self::InstanceUnknown(_) => ErrorKind::InstanceUnknown,
            Self::InstanceConflict(_) => ErrorKind::InstanceConflict,
            Self::InstanceHasNoWire(_) => ErrorKind::InstanceHasNoWire,
            Self::ContractNotFound(_) => ErrorKind::ContractNotFound,
            Self::OrderAlreadyExists(_) => ErrorKind::OrderAlreadyExists,
            Self::AlreadyClaimed(_) => ErrorKind::AlreadyClaimed,
            Self::OrderNotClaimed(_) => ErrorKind::OrderNotClaimed,
            Self::AlreadyPaid(_) => ErrorKind::AlreadyPaid,
            Self::CoinSignatureInvalid { .. } => ErrorKind::CoinSignatureInvalid,
            Self::MintRejected { .. } => ErrorKind::MintRejected,
            Self::MintUnreachable(_) => ErrorKind::MintUnreachable,
            Self::MintNotTrusted(_) => ErrorKind::MintNotTrusted,
            Self::OrderAborted(_) => ErrorKind::OrderAborted,
            Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Self::RefundExceedsPayment(_) => ErrorKind::RefundExceedsPayment,
            Self::RefundInconsistentAmount { .. } => ErrorKind::RefundInconsistentAmount,
            Self::RefundNotPermittedAfterDeadline(_) => ErrorKind::RefundNotPermittedAfterDeadline,
            Self::OrderUnpaid(_) => ErrorKind::OrderUnpaid,
            Self::ProductNotFound(_) => ErrorKind::ProductNotFound,
            Self::ProductConflict(_) => ErrorKind::ProductConflict,
            Self::InventoryInsufficient(_) => ErrorKind::InventoryInsufficient,
            Self::DbSoft => ErrorKind::DbSoft,
            Self::DbHard => ErrorKind::DbHard,
            Self::SignatureInvariantFailure => ErrorKind::SignatureInvariantFailure,
            Self::FailedDependency { .. } => ErrorKind::FailedDependency,
        }
    }

    /// Structured information for the client, where there is any. Mint proofs are passed through verbatim.
    pub fn detail(&self) -> Option<Value> {
        match self {
            Self::MintRejected { coin_pub, status, proof } => Some(serde_json::json!({
                "coin_pub": coin_pub,
                "mint_http_status": status,
                "mint_proof": proof,
            })),
            Self::FailedDependency { detail, .. } => Some(detail.clone()),
            Self::ParameterMalformed { field, .. } => Some(serde_json::json!({ "field": field })),
            Self::CoinSignatureInvalid { coin_pub, reason } => {
                Some(serde_json::json!({ "coin_pub": coin_pub, "reason": reason }))
            },
            _ => None,
        }
    }

    pub fn malformed<F: Into<String>, R: Display>(field: F, reason: R) -> Self {
        Self::ParameterMalformed { field: field.into(), reason: reason.to_string() }
    }
}

impl From<AmountError> for MerchantError {
    fn from(e: AmountError) -> Self {
        match e {
            AmountError::CurrencyMismatch(expected, found) => Self::CurrencyMismatch { expected, found },
            e => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<CryptoError> for MerchantError {
    fn from(e: CryptoError) -> Self {
        log::error!("🔏️ Unexpected cryptographic failure: {e}");
        Self::SignatureInvariantFailure
    }
}

impl From<MerchantDbError> for MerchantError {
    fn from(e: MerchantDbError) -> Self {
        use MerchantDbError::*;
        match e {
            SoftError(msg) => {
                log::warn!("🗃️ Soft database error surfaced to the API: {msg}");
                Self::DbSoft
            },
            SerializationFailure => Self::DbSoft,
            DatabaseError(msg) => {
                log::error!("🗃️ Database error: {msg}");
                Self::DbHard
            },
            OrderAlreadyExists(id) => Self::OrderAlreadyExists(id),
            ContractNotFound(s) => Self::ContractNotFound(s),
            AlreadyClaimed(id) => Self::AlreadyClaimed(id),
            AlreadyPaid(id) => Self::AlreadyPaid(id),
            OrderAborted(id) => Self::OrderAborted(id),
            OrderUnpaid(id) => Self::OrderUnpaid(id),
            RefundDecrease { current, requested } => Self::RefundInconsistentAmount { current, requested },
            RefundExceedsPayment(excess) => Self::RefundExceedsPayment(excess),
            InsufficientStock(p) => Self::InventoryInsufficient(p),
            ProductNotFound(p) => Self::ProductNotFound(p),
            Amount(e) => e.into(),
            Crypto(e) => e.into(),
            InconsistentState(msg) | Encoding(msg) => {
                log::error!("🗃️ Inconsistent stored state: {msg}");
                Self::SignatureInvariantFailure
            },
        }
    }
}

impl From<InstanceError> for MerchantError {
    fn from(e: InstanceError) -> Self {
        match e {
            InstanceError::SoftError(_) | InstanceError::SerializationFailure => Self::DbSoft,
            InstanceError::DatabaseError(msg) => {
                log::error!("🗃️ Database error: {msg}");
                Self::DbHard
            },
            InstanceError::InstanceConflict(id) => Self::InstanceConflict(id),
            InstanceError::InstanceNotFound(id) => Self::InstanceUnknown(id),
            InstanceError::InvalidPaytoUri(uri) => Self::malformed("payto_uris", format!("'{uri}' is not a payto URI")),
        }
    }
}

impl From<InventoryError> for MerchantError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::SoftError(_) | InventoryError::SerializationFailure => Self::DbSoft,
            InventoryError::DatabaseError(msg) => {
                log::error!("🗃️ Database error: {msg}");
                Self::DbHard
            },
            InventoryError::ProductNotFound(p) => Self::ProductNotFound(p),
            InventoryError::ProductConflict(msg) => Self::ProductConflict(msg),
            InventoryError::InsufficientStock(p) => Self::InventoryInsufficient(p),
            InventoryError::InvalidUpdate(msg) => Self::BadRequest(msg),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::RefundExceedsPayment.code(), 1400);
        assert_eq!(ErrorKind::FailedDependency.code(), 1701);
        assert_eq!(MerchantError::DbSoft.kind().name(), "DB_SOFT");
        let json = serde_json::to_value(ErrorKind::RefundNotPermittedAfterDeadline).unwrap();
        assert_eq!(json, "REFUND_NOT_PERMITTED_AFTER_DEADLINE");
    }

    #[test]
    fn store_errors_hide_internals() {
        let e: MerchantError = MerchantDbError::DatabaseError("no such table: orders".into()).into();
        assert!(matches!(e, MerchantError::DbHard));
        assert!(!e.to_string().contains("orders"));
        let e: MerchantError = MerchantDbError::RefundDecrease {
            current: "EUR:0.1".parse().unwrap(),
            requested: "EUR:0.05".parse().unwrap(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::RefundInconsistentAmount);
    }

    #[test]
    fn mint_proofs_are_passed_through() {
        let proof = serde_json::json!({"history": [{"mint_sig": "abc"}]});
        let e = MerchantError::MintRejected { coin_pub: "c0".into(), status: 409, proof: proof.clone() };
        assert_eq!(e.detail().unwrap()["mint_proof"], proof);
    }
}
