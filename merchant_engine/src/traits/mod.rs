//! #  Backend interfaces
//!
//! This module defines what a storage backend has to provide for the merchant engine. The engine's public APIs are
//! generic over these traits, and [`crate::SqliteDatabase`] is the implementation that ships with the crate.
//!
//! * [`InstanceManagement`] stores merchant instances and their bank accounts.
//! * [`InventoryManagement`] stores products and the locks held against their stock.
//! * [`MerchantDatabase`] stores contracts, claims, deposits, refunds and wire transfer reports.
//! * [`MerchantBackend`] is the combination of all three.
//!
//! Every method that writes does so inside a single transaction, retried on soft failures. Each trait has its own
//! error type; they all distinguish soft failures (worth retrying) from hard ones through [`RetryableError`].
mod data_objects;
mod instance_management;
mod inventory_management;
mod merchant_database;

pub use data_objects::{
    InsertedTransfer,
    OrderQueryFilter,
    DEFAULT_ORDER_LIMIT,
    PaymentOutcome,
    PaymentSettlement,
    ProductLock,
    RefundIncrease,
};
pub use instance_management::{InstanceError, InstanceManagement};
pub use inventory_management::{InventoryError, InventoryManagement};
pub use merchant_database::{MerchantBackend, MerchantDatabase, MerchantDbError};

/// SQLite result codes that indicate contention rather than a real failure: `BUSY`, `LOCKED` and their extended
/// variants (`BUSY_RECOVERY`, `BUSY_SNAPSHOT`, `LOCKED_SHAREDCACHE`).
const SOFT_SQLITE_CODES: [&str; 5] = ["5", "6", "261", "517", "262"];

/// Classification of store errors for the retry coordinator.
pub trait RetryableError: std::fmt::Display {
    /// Soft errors (serialization conflicts, lock contention) roll back and retry the whole attempt.
    fn is_soft(&self) -> bool;

    /// The error to surface when every attempt failed softly.
    fn serialization_failure() -> Self;
}

/// True if the error is due to contention, and the transaction may succeed if it is attempted again.
pub fn is_soft_sqlx_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db.code().map(|c| SOFT_SQLITE_CODES.contains(&c.as_ref())).unwrap_or(false),
        _ => false,
    }
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
