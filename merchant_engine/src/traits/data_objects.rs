use merchant_common::{Amount, RelativeTime, Timestamp};
use serde::{Deserialize, Serialize};

use crate::db_types::{DepositRecord, RefundRecord, TransferDepositRecord, TransferRecord};

/// Orders are listed 20 at a time unless the caller asks otherwise.
pub const DEFAULT_ORDER_LIMIT: i64 = 20;

/// Filters for listing the orders of an instance. `delta` sets both the page size and the direction: a negative delta
/// walks backwards from `start` (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub instance_id: String,
    pub paid: Option<bool>,
    pub refunded: Option<bool>,
    pub wired: Option<bool>,
    pub date: Option<Timestamp>,
    pub start: Option<i64>,
    pub delta: i64,
}

impl OrderQueryFilter {
    pub fn new<S: Into<String>>(instance_id: S) -> Self {
        Self {
            instance_id: instance_id.into(),
            paid: None,
            refunded: None,
            wired: None,
            date: None,
            start: None,
            delta: DEFAULT_ORDER_LIMIT,
        }
    }

    pub fn with_paid(mut self, paid: bool) -> Self {
        self.paid = Some(paid);
        self
    }

    pub fn with_delta(mut self, delta: i64) -> Self {
        self.delta = delta;
        self
    }

    pub fn is_descending(&self) -> bool {
        self.delta < 0
    }

    pub fn limit(&self) -> i64 {
        self.delta.abs()
    }
}

/// What the payment transaction needs to decide whether an order is now paid.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub amount: Amount,
    pub max_fee: Amount,
    /// The `PAYMENT_OK` signature to store if the deposits turn out to be sufficient.
    pub payment_sig: String,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentOutcome {
    /// Every deposit recorded for the order, including earlier ones.
    pub deposits: Vec<DepositRecord>,
    /// The stored receipt signature, if the order is paid.
    pub payment_sig: Option<String>,
    /// True if this call moved the order into the paid state.
    pub newly_paid: bool,
    /// True if the order had been aborted. The deposits were still recorded, and refunded in full.
    pub aborted: bool,
}

#[derive(Debug, Clone)]
pub struct RefundIncrease {
    /// All refunds of the order after the increase.
    pub refunds: Vec<RefundRecord>,
    /// The refunds created by this increase. Empty if the total did not change.
    pub issued: Vec<RefundRecord>,
    pub total: Amount,
}

/// A wallet's request to hold stock of a product for a while.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLock {
    pub product_id: String,
    pub lock_uuid: String,
    pub quantity: i64,
    pub duration: RelativeTime,
}

#[derive(Debug, Clone)]
pub struct InsertedTransfer {
    pub transfer: TransferRecord,
    pub deposits: Vec<TransferDepositRecord>,
}
