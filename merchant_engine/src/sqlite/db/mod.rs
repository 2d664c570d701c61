//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. None of them opens a transaction of its own: callers obtain a connection from a pool, or run them inside
//! [`crate::sqlite::run_in_transaction`] when several of them must be atomic.
use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod accounts;
pub mod claims;
pub mod deposits;
pub mod instances;
pub mod inventory;
pub mod orders;
pub mod refunds;
pub mod transfers;

/// Opens a pool on `url`, creating the database file if it does not exist yet. Its directory must exist.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
