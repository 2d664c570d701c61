use merchant_common::{Amount, AmountError};
use mint_client::TransferDetails;
use thiserror::Error;

use crate::{
    db_types::{
        ClaimRecord,
        DepositRecord,
        DepositTrackingRecord,
        NewDeposit,
        NewOrder,
        OrderId,
        OrderRecord,
        ProductQuantity,
        RefundRecord,
    },
    helpers::{CryptoError, MerchantKeys, RefundDistributionError},
    traits::{
        is_soft_sqlx_error,
        InsertedTransfer,
        InstanceManagement,
        InventoryManagement,
        OrderQueryFilter,
        PaymentOutcome,
        PaymentSettlement,
        RefundIncrease,
        RetryableError,
    },
};

#[derive(Debug, Clone, Error)]
pub enum MerchantDbError {
    #[error("Transient database error: {0}")]
    SoftError(String),
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Could not complete the transaction after several attempts. Maybe try again?")]
    SerializationFailure,
    #[error("Order {0} already exists")]
    OrderAlreadyExists(OrderId),
    #[error("No contract matches {0}")]
    ContractNotFound(String),
    #[error("Order {0} has already been claimed by another wallet")]
    AlreadyClaimed(OrderId),
    #[error("Order {0} has already been paid")]
    AlreadyPaid(OrderId),
    #[error("Order {0} was aborted")]
    OrderAborted(OrderId),
    #[error("Order {0} has not been paid")]
    OrderUnpaid(OrderId),
    #[error("Refunds can only increase. The current refund total is {current}, but {requested} was requested")]
    RefundDecrease { current: Amount, requested: Amount },
    #[error("The refund exceeds the amount paid by {0}")]
    RefundExceedsPayment(Amount),
    #[error("Not enough stock of product '{0}'")]
    InsufficientStock(String),
    #[error("Product '{0}' does not exist")]
    ProductNotFound(String),
    #[error("Inconsistent database state: {0}")]
    InconsistentState(String),
    #[error("{0}")]
    Crypto(#[from] CryptoError),
    #[error("{0}")]
    Amount(#[from] AmountError),
    #[error("Could not encode or decode stored data: {0}")]
    Encoding(String),
}

impl From<sqlx::Error> for MerchantDbError {
    fn from(e: sqlx::Error) -> Self {
        if is_soft_sqlx_error(&e) {
            Self::SoftError(e.to_string())
        } else {
            Self::DatabaseError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for MerchantDbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<RefundDistributionError> for MerchantDbError {
    fn from(e: RefundDistributionError) -> Self {
        match e {
            RefundDistributionError::ExceedsPayment(excess) => Self::RefundExceedsPayment(excess),
            RefundDistributionError::Amount(e) => Self::Amount(e),
        }
    }
}

impl RetryableError for MerchantDbError {
    fn is_soft(&self) -> bool {
        matches!(self, Self::SoftError(_))
    }

    fn serialization_failure() -> Self {
        Self::SerializationFailure
    }
}

/// Storage of contracts and everything that happens to them: claims, deposits, refunds and wire transfer reports.
///
/// Contracts are write-once. All the state transitions of an order (claimed, paid, aborted, refunded, wired) happen
/// inside single transactions, so that concurrent requests on the same order serialize.
#[allow(async_fn_in_trait)]
pub trait MerchantDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new contract and moves inventory into order locks, in one transaction.
    ///
    /// The wallet locks named in `lock_uuids` are released first (missing ones are ignored), then `products` are
    /// locked for the order until its pay deadline. If the stock does not allow it, nothing is written and
    /// [`MerchantDbError::InsufficientStock`] is returned.
    async fn insert_order(
        &self,
        order: NewOrder,
        products: Vec<ProductQuantity>,
        lock_uuids: Vec<String>,
    ) -> Result<OrderRecord, MerchantDbError>;

    async fn fetch_order(&self, instance_id: &str, order_id: &OrderId) -> Result<Option<OrderRecord>, MerchantDbError>;

    async fn fetch_order_by_hash(&self, h_contract: &str) -> Result<Option<OrderRecord>, MerchantDbError>;

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<OrderRecord>, MerchantDbError>;

    /// Binds `nonce` to the order, unless it is already bound. Claiming again with the same nonce succeeds; with a
    /// different nonce it fails with [`MerchantDbError::AlreadyClaimed`].
    async fn claim_order(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        nonce: &str,
    ) -> Result<OrderRecord, MerchantDbError>;

    async fn fetch_claim(&self, order_serial: i64) -> Result<Option<ClaimRecord>, MerchantDbError>;

    async fn fetch_deposits(&self, order_serial: i64) -> Result<Vec<DepositRecord>, MerchantDbError>;

    /// Records mint-confirmed deposits and, if the deposits of the order now cover the contract, marks it paid with
    /// the receipt signature from `settlement`. Deposits already recorded for the same coin are left untouched. If the
    /// order is already paid, its original receipt is returned.
    ///
    /// The mint has already accepted these coins, so they are recorded even when the order was aborted in the
    /// meantime. In that case they are refunded in full straight away and the outcome is flagged as `aborted`.
    async fn record_deposits(
        &self,
        order_serial: i64,
        deposits: Vec<NewDeposit>,
        settlement: PaymentSettlement,
        keys: &MerchantKeys,
    ) -> Result<PaymentOutcome, MerchantDbError>;

    /// Aborts an unpaid order. Every deposited coin gets a refund permission for whatever is still refundable on it.
    /// Returns all the refund permissions of the order, so aborting again returns the same permissions.
    async fn abort_order(&self, order_serial: i64, keys: &MerchantKeys) -> Result<Vec<RefundRecord>, MerchantDbError>;

    /// Raises the refund total of an order to `new_total`, spreading the increase over its coins.
    async fn increase_refund(
        &self,
        order_serial: i64,
        new_total: Amount,
        reason: &str,
        keys: &MerchantKeys,
    ) -> Result<RefundIncrease, MerchantDbError>;

    async fn fetch_refunds(&self, order_serial: i64) -> Result<Vec<RefundRecord>, MerchantDbError>;

    /// Records the mint's acknowledgement of a refund. The refund's state becomes `gone`.
    async fn mark_refund_redeemed(&self, refund_id: i64, mint_pub: &str, mint_sig: &str)
        -> Result<(), MerchantDbError>;

    async fn fetch_deposit_tracking(&self, order_serial: i64) -> Result<Vec<DepositTrackingRecord>, MerchantDbError>;

    async fn fetch_transfer(
        &self,
        instance_id: &str,
        wtid: &str,
        mint_url: &str,
    ) -> Result<Option<InsertedTransfer>, MerchantDbError>;

    /// Stores a verified transfer report and links its deposits to this instance's orders.
    async fn insert_transfer(
        &self,
        instance_id: &str,
        mint_url: &str,
        details: TransferDetails,
    ) -> Result<InsertedTransfer, MerchantDbError>;

    /// Closes the database connection pool.
    async fn close(&mut self) -> Result<(), MerchantDbError> {
        Ok(())
    }
}

/// Everything the merchant engine needs from a backend.
pub trait MerchantBackend: MerchantDatabase + InstanceManagement + InventoryManagement {}

impl<T> MerchantBackend for T where T: MerchantDatabase + InstanceManagement + InventoryManagement {}
