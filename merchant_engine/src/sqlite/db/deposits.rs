use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{DepositRecord, NewDeposit};

/// Inserts a deposit. If the coin was already deposited for this order, nothing is written and `None` is returned.
pub async fn insert_deposit(
    order_serial: i64,
    deposit: &NewDeposit,
    conn: &mut SqliteConnection,
) -> Result<Option<DepositRecord>, sqlx::Error> {
    let record: Option<DepositRecord> = sqlx::query_as(
        r#"
            INSERT INTO deposits (
                order_serial,
                coin_pub,
                denom_pub,
                denom_sig,
                coin_sig,
                amount_with_fee,
                amount_without_fee,
                deposit_fee,
                refund_fee,
                mint_url,
                mint_pub,
                mint_sig,
                h_wire
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (order_serial, coin_pub) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order_serial)
    .bind(&deposit.coin_pub)
    .bind(&deposit.denom_pub)
    .bind(&deposit.denom_sig)
    .bind(&deposit.coin_sig)
    .bind(&deposit.amount_with_fee)
    .bind(&deposit.amount_without_fee)
    .bind(&deposit.deposit_fee)
    .bind(&deposit.refund_fee)
    .bind(&deposit.mint_url)
    .bind(&deposit.mint_pub)
    .bind(&deposit.mint_sig)
    .bind(&deposit.h_wire)
    .fetch_optional(conn)
    .await?;
    if let Some(d) = &record {
        debug!("💰️ Deposit of {} with coin {} recorded for order #{order_serial}", d.amount_with_fee, d.coin_pub);
    }
    Ok(record)
}

pub async fn fetch_deposits(order_serial: i64, conn: &mut SqliteConnection) -> Result<Vec<DepositRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM deposits WHERE order_serial = $1 ORDER BY id")
        .bind(order_serial)
        .fetch_all(conn)
        .await
}

/// Finds the deposit of a coin towards a contract, whichever instance it belongs to.
pub async fn fetch_deposit_by_contract(
    h_contract: &str,
    coin_pub: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<DepositRecord>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT deposits.* FROM deposits
            JOIN orders ON orders.id = deposits.order_serial
            WHERE orders.h_contract = $1 AND deposits.coin_pub = $2
        "#,
    )
    .bind(h_contract)
    .bind(coin_pub)
    .fetch_optional(conn)
    .await
}
