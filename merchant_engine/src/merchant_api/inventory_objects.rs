use merchant_common::{Amount, RelativeTime, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{ProductDetails, ProductRecord};

/// The body of `POST /private/products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductRequest {
    pub product_id: String,
    #[serde(flatten)]
    pub details: ProductDetails,
}

/// The body of `POST /private/products/{id}/lock`. A quantity of zero releases the lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub lock_uuid: String,
    pub quantity: i64,
    pub duration: RelativeTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: String,
    pub description: String,
    pub unit: String,
    pub price: Amount,
    pub image: String,
    pub taxes: Vec<Value>,
    pub total_stocked: i64,
    pub total_sold: i64,
    pub total_lost: i64,
    pub total_locked: i64,
    pub next_restock: Timestamp,
    pub address: Value,
}

impl ProductInfo {
    pub fn new(product: ProductRecord, total_locked: i64) -> Self {
        Self {
            product_id: product.product_id,
            description: product.description,
            unit: product.unit,
            price: product.price,
            image: product.image,
            taxes: product.taxes.0,
            total_stocked: product.total_stocked,
            total_sold: product.total_sold,
            total_lost: product.total_lost,
            total_locked,
            next_restock: product.next_restock,
            address: product.address.0,
        }
    }
}
