use sqlx::SqliteConnection;

use crate::db_types::ClaimRecord;

pub async fn fetch_claim(order_serial: i64, conn: &mut SqliteConnection) -> Result<Option<ClaimRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM claims WHERE order_serial = $1").bind(order_serial).fetch_optional(conn).await
}

/// Binds a nonce to an order. An order can only be claimed once, so a second insert is a unique violation.
pub async fn insert_claim(
    order_serial: i64,
    nonce: &str,
    conn: &mut SqliteConnection,
) -> Result<ClaimRecord, sqlx::Error> {
    sqlx::query_as("INSERT INTO claims (order_serial, nonce) VALUES ($1, $2) RETURNING *")
        .bind(order_serial)
        .bind(nonce)
        .fetch_one(conn)
        .await
}
