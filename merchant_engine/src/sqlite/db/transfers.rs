use log::debug;
use mint_client::{TransferDeposit, TransferDetails};
use sqlx::SqliteConnection;

use crate::db_types::{DepositTrackingRecord, OrderId, TransferDepositRecord, TransferRecord};

pub async fn fetch_transfer(
    instance_id: &str,
    wtid: &str,
    mint_url: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<TransferRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transfers WHERE instance_id = $1 AND wtid = $2 AND mint_url = $3")
        .bind(instance_id)
        .bind(wtid)
        .bind(mint_url)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_transfer_deposits(
    transfer_serial: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransferDepositRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transfer_deposits WHERE transfer_serial = $1 ORDER BY id")
        .bind(transfer_serial)
        .fetch_all(conn)
        .await
}

pub async fn insert_transfer(
    instance_id: &str,
    mint_url: &str,
    details: &TransferDetails,
    conn: &mut SqliteConnection,
) -> Result<TransferRecord, sqlx::Error> {
    let record: TransferRecord = sqlx::query_as(
        r#"
            INSERT INTO transfers (
                instance_id, wtid, mint_url, total, wire_fee, h_wire, execution_time, mint_pub, mint_sig
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(instance_id)
    .bind(&details.wtid)
    .bind(mint_url)
    .bind(&details.total)
    .bind(&details.wire_fee)
    .bind(&details.h_wire)
    .bind(details.execution_time)
    .bind(&details.mint_pub)
    .bind(&details.mint_sig)
    .fetch_one(conn)
    .await?;
    debug!("🛰️ Transfer {} of {} from {mint_url} stored for instance '{instance_id}'", record.wtid, record.total);
    Ok(record)
}

pub async fn insert_transfer_deposit(
    transfer_serial: i64,
    order_id: Option<&OrderId>,
    deposit: &TransferDeposit,
    conn: &mut SqliteConnection,
) -> Result<TransferDepositRecord, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO transfer_deposits (transfer_serial, order_id, h_contract, coin_pub, deposit_value, deposit_fee)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(transfer_serial)
    .bind(order_id.map(|o| o.as_str()))
    .bind(&deposit.h_contract_terms)
    .bind(&deposit.coin_pub)
    .bind(&deposit.deposit_value)
    .bind(&deposit.deposit_fee)
    .fetch_one(conn)
    .await
}

/// Remembers the wire transfer that settled a deposit. The first report wins.
pub async fn insert_deposit_tracking(
    tracking: &DepositTrackingRecord,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO deposit_tracking (deposit_serial, coin_pub, wtid, mint_url, execution_time, coin_contribution)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (deposit_serial) DO NOTHING
        "#,
    )
    .bind(tracking.deposit_serial)
    .bind(&tracking.coin_pub)
    .bind(&tracking.wtid)
    .bind(&tracking.mint_url)
    .bind(tracking.execution_time)
    .bind(&tracking.coin_contribution)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_deposit_tracking(
    order_serial: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<DepositTrackingRecord>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT deposit_tracking.* FROM deposit_tracking
            JOIN deposits ON deposits.id = deposit_tracking.deposit_serial
            WHERE deposits.order_serial = $1
            ORDER BY deposit_tracking.deposit_serial
        "#,
    )
    .bind(order_serial)
    .fetch_all(conn)
    .await
}

/// True if the order has deposits and every one of them has been matched to a wire transfer.
pub async fn all_deposits_tracked(order_serial: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let (total, tracked): (i64, i64) = sqlx::query_as(
        r#"
            SELECT COUNT(deposits.id), COUNT(deposit_tracking.deposit_serial) FROM deposits
            LEFT JOIN deposit_tracking ON deposit_tracking.deposit_serial = deposits.id
            WHERE deposits.order_serial = $1
        "#,
    )
    .bind(order_serial)
    .fetch_one(conn)
    .await?;
    Ok(total > 0 && total == tracked)
}
