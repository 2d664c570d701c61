//! SQLite storage for the merchant engine.
//!
//! [`db`] holds the low-level query functions, [`retry`] the transaction coordinator, and [`SqliteDatabase`] puts them
//! together behind the backend traits.
mod retry;
mod sqlite_impl;

pub mod db;
pub use retry::{run_in_transaction, MAX_RETRIES};
pub use sqlite_impl::{SqliteDatabase, ABORT_REFUND_REASON};
