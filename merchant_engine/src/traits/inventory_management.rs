use merchant_common::Timestamp;
use thiserror::Error;

use crate::{
    db_types::{ProductDetails, ProductRecord},
    traits::{is_soft_sqlx_error, is_unique_violation, ProductLock, RetryableError},
};

#[derive(Debug, Clone, Error)]
pub enum InventoryError {
    #[error("Transient database error: {0}")]
    SoftError(String),
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Could not complete the transaction after several attempts. Maybe try again?")]
    SerializationFailure,
    #[error("Product '{0}' does not exist")]
    ProductNotFound(String),
    #[error("Product conflict: {0}")]
    ProductConflict(String),
    #[error("Not enough stock of product '{0}'")]
    InsufficientStock(String),
    #[error("Invalid product update: {0}")]
    InvalidUpdate(String),
}

impl From<sqlx::Error> for InventoryError {
    fn from(e: sqlx::Error) -> Self {
        if is_soft_sqlx_error(&e) {
            Self::SoftError(e.to_string())
        } else if is_unique_violation(&e) {
            Self::ProductConflict(e.to_string())
        } else {
            Self::DatabaseError(e.to_string())
        }
    }
}

impl RetryableError for InventoryError {
    fn is_soft(&self) -> bool {
        matches!(self, Self::SoftError(_))
    }

    fn serialization_failure() -> Self {
        Self::SerializationFailure
    }
}

/// Storage of products and of the locks held against their stock.
///
/// For every product with limited stock, `total_sold + total_lost + Σ(unexpired lock quantities) ≤ total_stocked`
/// holds after every committed call.
#[allow(async_fn_in_trait)]
pub trait InventoryManagement {
    async fn insert_product(
        &self,
        instance_id: &str,
        product_id: &str,
        details: ProductDetails,
    ) -> Result<ProductRecord, InventoryError>;

    /// Fetches a product together with the quantity currently held by unexpired locks.
    async fn fetch_product(
        &self,
        instance_id: &str,
        product_id: &str,
    ) -> Result<Option<(ProductRecord, i64)>, InventoryError>;

    async fn fetch_product_ids(&self, instance_id: &str) -> Result<Vec<String>, InventoryError>;

    /// Replaces the details of a product. Stock may not drop below what is sold, lost and locked, and `total_lost`
    /// may not decrease.
    async fn update_product(
        &self,
        instance_id: &str,
        product_id: &str,
        details: ProductDetails,
    ) -> Result<ProductRecord, InventoryError>;

    /// Deletes a product. Fails with [`InventoryError::ProductConflict`] while any lock is held on it.
    async fn delete_product(&self, instance_id: &str, product_id: &str) -> Result<(), InventoryError>;

    /// Reserves (or, with a quantity of zero, releases) stock under a wallet-chosen UUID. Locking again under the same
    /// UUID replaces the earlier quantity and expiry.
    async fn lock_product(&self, instance_id: &str, lock: ProductLock) -> Result<(), InventoryError>;

    /// Removes wallet locks that have expired, and order locks of unpaid orders whose pay deadline has passed.
    /// Returns the number of locks removed.
    async fn expire_locks(&self, now: Timestamp) -> Result<u64, InventoryError>;
}
