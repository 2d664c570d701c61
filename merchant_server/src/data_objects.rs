use merchant_common::{Amount, Timestamp};
use merchant_engine::{
    db_types::OrderId,
    merchant_api::payment_objects::TrackTransactionResult,
    traits::{OrderQueryFilter, DEFAULT_ORDER_LIMIT},
};
use serde::{Deserialize, Serialize};

use crate::helpers::yes_no;

#[derive(Debug, Clone, Deserialize)]
pub struct InstancePath {
    pub id: String,
}

/// Order routes may also carry the `{instance}` segment, which is read separately.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPath {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductPath {
    pub product_id: String,
}

/// Query parameters of `GET /private/orders`. The flags take `yes`, `no` or `all`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersParams {
    pub paid: Option<String>,
    pub refunded: Option<String>,
    pub wired: Option<String>,
    pub date_s: Option<i64>,
    pub start: Option<i64>,
    pub delta: Option<i64>,
}

impl ListOrdersParams {
    pub fn into_filter(self, instance_id: &str) -> OrderQueryFilter {
        let mut filter = OrderQueryFilter::new(instance_id).with_delta(self.delta.unwrap_or(DEFAULT_ORDER_LIMIT));
        filter.paid = yes_no(self.paid.as_deref());
        filter.refunded = yes_no(self.refunded.as_deref());
        filter.wired = yes_no(self.wired.as_deref());
        filter.date = self.date_s.map(Timestamp::from_secs);
        filter.start = self.start;
        filter
    }
}

/// Query parameters of `GET /private/transfers`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferParams {
    pub wtid: String,
    pub exchange: String,
}

/// The `202` reply of `GET /private/orders/{id}/transactions` while deposits still await aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct PendingTransactionResponse {
    pub code: u16,
    #[serde(flatten)]
    pub result: TrackTransactionResult,
}

/// The reply to a refund increase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundIncreaseResponse {
    pub order_id: OrderId,
    pub h_contract: String,
    pub refund_amount: Amount,
    pub taler_refund_uri: String,
}

/// The reply of `GET /config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub name: String,
    pub version: String,
    pub currency: String,
    pub exchanges: Vec<ExchangeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub url: String,
    pub master_pub: String,
}
