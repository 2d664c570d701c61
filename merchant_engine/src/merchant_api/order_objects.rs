use merchant_common::{Amount, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{ContractProduct, OrderId, OrderRecord, OrderStatus, ProductQuantity};

/// An order as the storefront submits it. Only `amount` and `summary` are required. Everything else is filled in
/// from the instance's defaults when the contract is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrder {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub amount: Amount,
    pub summary: String,
    #[serde(default)]
    pub products: Vec<ContractProduct>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub refund_deadline: Option<Timestamp>,
    #[serde(default)]
    pub pay_deadline: Option<Timestamp>,
    #[serde(default)]
    pub wire_transfer_deadline: Option<Timestamp>,
    #[serde(default)]
    pub fulfillment_url: Option<String>,
    #[serde(default)]
    pub max_fee: Option<Amount>,
    #[serde(default)]
    pub max_wire_fee: Option<Amount>,
    #[serde(default)]
    pub wire_fee_amortization: Option<u32>,
    #[serde(default)]
    pub extra: Option<Value>,
}

impl RawOrder {
    pub fn new<S: Into<String>>(amount: Amount, summary: S) -> Self {
        Self {
            order_id: None,
            amount,
            summary: summary.into(),
            products: vec![],
            timestamp: None,
            refund_deadline: None,
            pay_deadline: None,
            wire_transfer_deadline: None,
            fulfillment_url: None,
            max_fee: None,
            max_wire_fee: None,
            wire_fee_amortization: None,
            extra: None,
        }
    }

    pub fn with_order_id<S: Into<OrderId>>(mut self, order_id: S) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_refund_deadline(mut self, t: Timestamp) -> Self {
        self.refund_deadline = Some(t);
        self
    }

    pub fn with_pay_deadline(mut self, t: Timestamp) -> Self {
        self.pay_deadline = Some(t);
        self
    }

}

/// The body of `POST /private/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostOrderRequest {
    pub order: RawOrder,
    /// Products taken from the inventory. They are locked for the order until its pay deadline.
    #[serde(default)]
    pub inventory_products: Vec<ProductQuantity>,
    /// Wallet locks to convert into order locks.
    #[serde(default)]
    pub lock_uuids: Vec<String>,
    /// Restricts the choice of bank account to this wire method.
    #[serde(default)]
    pub payment_target: Option<String>,
}

impl From<RawOrder> for PostOrderRequest {
    fn from(order: RawOrder) -> Self {
        Self { order, inventory_products: vec![], lock_uuids: vec![], payment_target: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOrderResponse {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// An ephemeral public key chosen by the wallet.
    pub nonce: String,
}

/// The signed contract, as handed to the wallet that claimed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub contract_terms: Value,
    pub sig: String,
    pub h_contract: String,
}

/// Optional long-poll parameters for an order status query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    /// Wait up to this long for the order to be paid.
    pub timeout_ms: Option<u64>,
    /// When waiting, keep waiting until the refund total reaches at least this amount.
    pub refund: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub paid: bool,
    pub refunded: bool,
    pub refund_amount: Amount,
    pub deposit_total: Amount,
    pub wired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_terms: Option<Value>,
}

/// One row of `GET /private/orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderListEntry {
    pub row_id: i64,
    pub order_id: OrderId,
    pub amount: Amount,
    pub summary: String,
    pub timestamp: Timestamp,
    pub paid: bool,
    pub aborted: bool,
    pub wired: bool,
}

impl From<OrderRecord> for OrderListEntry {
    fn from(order: OrderRecord) -> Self {
        Self {
            row_id: order.id,
            order_id: order.order_id,
            amount: order.amount,
            summary: order.summary,
            timestamp: order.timestamp,
            paid: order.paid,
            aborted: order.aborted,
            wired: order.wired,
        }
    }
}
