use merchant_common::Amount;
use serde::{Deserialize, Serialize};

use crate::db_types::OrderId;

/// What happened to an order. Events are published after the transaction that caused them has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEventKind {
    Claimed,
    Paid,
    /// The authorized refund total of the order was raised to `total`.
    Refunded { total: Amount },
    Aborted,
    /// Every deposit of the order has been matched to a wire transfer.
    Wired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub instance_id: String,
    pub order_id: OrderId,
    #[serde(flatten)]
    pub kind: OrderEventKind,
}

impl OrderEvent {
    pub fn new<S: Into<String>>(instance_id: S, order_id: OrderId, kind: OrderEventKind) -> Self {
        Self { instance_id: instance_id.into(), order_id, kind }
    }

    pub fn is_for(&self, instance_id: &str, order_id: &OrderId) -> bool {
        self.instance_id == instance_id && &self.order_id == order_id
    }
}
