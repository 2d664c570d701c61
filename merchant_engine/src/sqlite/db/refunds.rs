use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{NewRefund, RefundRecord};

pub async fn insert_refund(
    order_serial: i64,
    refund: &NewRefund,
    conn: &mut SqliteConnection,
) -> Result<RefundRecord, sqlx::Error> {
    let record: RefundRecord = sqlx::query_as(
        r#"
            INSERT INTO refunds (order_serial, coin_pub, rtransaction_id, amount, reason, merchant_sig)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_serial)
    .bind(&refund.coin_pub)
    .bind(refund.rtransaction_id)
    .bind(&refund.amount)
    .bind(&refund.reason)
    .bind(&refund.merchant_sig)
    .fetch_one(conn)
    .await?;
    debug!(
        "↩️ Refund #{} of {} on coin {} issued for order #{order_serial}",
        record.rtransaction_id, record.amount, record.coin_pub
    );
    Ok(record)
}

pub async fn fetch_refunds(order_serial: i64, conn: &mut SqliteConnection) -> Result<Vec<RefundRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM refunds WHERE order_serial = $1 ORDER BY id").bind(order_serial).fetch_all(conn).await
}

/// Records the mint's acknowledgement of a refund. Returns false if the refund was already marked as redeemed.
pub async fn mark_redeemed(
    refund_id: i64,
    mint_pub: &str,
    mint_sig: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query(
            "UPDATE refunds SET state = 'gone', mint_pub = $1, mint_sig = $2 WHERE id = $3 AND state = 'pending'",
        )
            .bind(mint_pub)
            .bind(mint_sig)
            .bind(refund_id)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}
