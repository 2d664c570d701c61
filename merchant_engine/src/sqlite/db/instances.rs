use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{InstanceRecord, InstanceSettings};

pub async fn insert_instance(
    settings: &InstanceSettings,
    merchant_pub: &str,
    merchant_priv: &str,
    conn: &mut SqliteConnection,
) -> Result<InstanceRecord, sqlx::Error> {
    let record: InstanceRecord = sqlx::query_as(
        r#"
            INSERT INTO instances (
                instance_id,
                name,
                address,
                jurisdiction,
                merchant_pub,
                merchant_priv,
                default_max_deposit_fee,
                default_max_wire_fee,
                default_wire_fee_amortization,
                default_wire_transfer_delay,
                default_pay_delay
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(&settings.id)
    .bind(&settings.name)
    .bind(Json(&settings.address))
    .bind(Json(&settings.jurisdiction))
    .bind(merchant_pub)
    .bind(merchant_priv)
    .bind(&settings.default_max_deposit_fee)
    .bind(&settings.default_max_wire_fee)
    .bind(i64::from(settings.default_wire_fee_amortization))
    .bind(settings.default_wire_transfer_delay)
    .bind(settings.default_pay_delay)
    .fetch_one(conn)
    .await?;
    debug!("🏪️ Instance '{}' inserted with id {}", record.instance_id, record.id);
    Ok(record)
}

/// Fetches an instance by its id. Deleted instances are included.
pub async fn fetch_instance(
    instance_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<InstanceRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM instances WHERE instance_id = $1").bind(instance_id).fetch_optional(conn).await
}

pub async fn fetch_live_instances(conn: &mut SqliteConnection) -> Result<Vec<InstanceRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM instances WHERE deleted = FALSE ORDER BY id").fetch_all(conn).await
}

/// Overwrites the settings of a live instance. Returns false if no live instance has this id.
pub async fn update_settings(settings: &InstanceSettings, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE instances SET
                name = $1,
                address = $2,
                jurisdiction = $3,
                default_max_deposit_fee = $4,
                default_max_wire_fee = $5,
                default_wire_fee_amortization = $6,
                default_wire_transfer_delay = $7,
                default_pay_delay = $8,
                updated_at = CURRENT_TIMESTAMP
            WHERE instance_id = $9 AND deleted = FALSE
        "#,
    )
    .bind(&settings.name)
    .bind(Json(&settings.address))
    .bind(Json(&settings.jurisdiction))
    .bind(&settings.default_max_deposit_fee)
    .bind(&settings.default_max_wire_fee)
    .bind(i64::from(settings.default_wire_fee_amortization))
    .bind(settings.default_wire_transfer_delay)
    .bind(settings.default_pay_delay)
    .bind(&settings.id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn soft_delete(instance_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE instances SET deleted = TRUE, updated_at = CURRENT_TIMESTAMP \
         WHERE instance_id = $1 AND deleted = FALSE",
    )
    .bind(instance_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
