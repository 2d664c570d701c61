use log::{debug, trace};
use merchant_common::Timestamp;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{ProductDetails, ProductRecord};

pub async fn insert_product(
    instance_id: &str,
    product_id: &str,
    details: &ProductDetails,
    conn: &mut SqliteConnection,
) -> Result<ProductRecord, sqlx::Error> {
    let record: ProductRecord = sqlx::query_as(
        r#"
            INSERT INTO products (
                instance_id,
                product_id,
                description,
                unit,
                price,
                image,
                taxes,
                total_stocked,
                total_lost,
                next_restock,
                address
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(instance_id)
    .bind(product_id)
    .bind(&details.description)
    .bind(&details.unit)
    .bind(&details.price)
    .bind(&details.image)
    .bind(Json(&details.taxes))
    .bind(details.total_stocked)
    .bind(details.total_lost)
    .bind(details.next_restock)
    .bind(Json(&details.address))
    .fetch_one(conn)
    .await?;
    debug!("🔒️ Product '{product_id}' added to instance '{instance_id}'");
    Ok(record)
}

pub async fn fetch_product(
    instance_id: &str,
    product_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ProductRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE instance_id = $1 AND product_id = $2")
        .bind(instance_id)
        .bind(product_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_product_ids(instance_id: &str, conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT product_id FROM products WHERE instance_id = $1 ORDER BY id")
        .bind(instance_id)
        .fetch_all(conn)
        .await
}

pub async fn update_product(
    product_serial: i64,
    details: &ProductDetails,
    conn: &mut SqliteConnection,
) -> Result<ProductRecord, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE products SET
                description = $1,
                unit = $2,
                price = $3,
                image = $4,
                taxes = $5,
                total_stocked = $6,
                total_lost = $7,
                next_restock = $8,
                address = $9,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $10
            RETURNING *;
        "#,
    )
    .bind(&details.description)
    .bind(&details.unit)
    .bind(&details.price)
    .bind(&details.image)
    .bind(Json(&details.taxes))
    .bind(details.total_stocked)
    .bind(details.total_lost)
    .bind(details.next_restock)
    .bind(Json(&details.address))
    .bind(product_serial)
    .fetch_one(conn)
    .await
}

pub async fn delete_product(product_serial: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM products WHERE id = $1").bind(product_serial).execute(conn).await?;
    Ok(())
}

/// The quantity of a product held by locks that have not expired at `now`.
pub async fn locked_quantity(
    product_serial: i64,
    now: Timestamp,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM inventory_locks WHERE product_serial = $1 AND expiration > $2",
    )
    .bind(product_serial)
    .bind(now)
    .fetch_one(conn)
    .await
}

/// The quantity held by unexpired locks, excluding the wallet lock `lock_uuid`.
pub async fn locked_quantity_excluding(
    product_serial: i64,
    lock_uuid: &str,
    now: Timestamp,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(quantity), 0) FROM inventory_locks
            WHERE product_serial = $1 AND expiration > $2 AND (lock_uuid IS NULL OR lock_uuid <> $3)
        "#,
    )
    .bind(product_serial)
    .bind(now)
    .bind(lock_uuid)
    .fetch_one(conn)
    .await
}

pub async fn count_locks(product_serial: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM inventory_locks WHERE product_serial = $1")
        .bind(product_serial)
        .fetch_one(conn)
        .await
}

/// Creates or replaces the wallet lock `lock_uuid` on a product.
pub async fn upsert_wallet_lock(
    product_serial: i64,
    lock_uuid: &str,
    quantity: i64,
    expiration: Timestamp,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO inventory_locks (product_serial, lock_uuid, quantity, expiration) VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_serial, lock_uuid) DO UPDATE SET quantity = excluded.quantity,
                expiration = excluded.expiration
        "#,
    )
    .bind(product_serial)
    .bind(lock_uuid)
    .bind(quantity)
    .bind(expiration)
    .execute(conn)
    .await?;
    trace!("🔒️ Lock {lock_uuid} holds {quantity} of product #{product_serial} until {expiration}");
    Ok(())
}

pub async fn release_wallet_lock(
    product_serial: i64,
    lock_uuid: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM inventory_locks WHERE product_serial = $1 AND lock_uuid = $2")
        .bind(product_serial)
        .bind(lock_uuid)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Releases every lock held under `lock_uuid` on the products of an instance.
pub async fn release_wallet_locks(
    instance_id: &str,
    lock_uuid: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            DELETE FROM inventory_locks
            WHERE lock_uuid = $1 AND product_serial IN (SELECT id FROM products WHERE instance_id = $2)
        "#,
    )
    .bind(lock_uuid)
    .bind(instance_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_order_lock(
    product_serial: i64,
    order_serial: i64,
    quantity: i64,
    expiration: Timestamp,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO inventory_locks (product_serial, order_serial, quantity, expiration) VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_serial, order_serial) DO UPDATE SET quantity = quantity + excluded.quantity
        "#,
    )
    .bind(product_serial)
    .bind(order_serial)
    .bind(quantity)
    .bind(expiration)
    .execute(conn)
    .await?;
    trace!("🔒️ Order #{order_serial} holds {quantity} of product #{product_serial} until {expiration}");
    Ok(())
}

/// Turns the locks of a paid order into sales.
pub async fn consume_order_locks(order_serial: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE products SET
                total_sold = total_sold + (
                    SELECT quantity FROM inventory_locks l WHERE l.product_serial = products.id AND l.order_serial = $1
                ),
                updated_at = CURRENT_TIMESTAMP
            WHERE id IN (SELECT product_serial FROM inventory_locks WHERE order_serial = $1)
        "#,
    )
    .bind(order_serial)
    .execute(&mut *conn)
    .await?;
    release_order_locks(order_serial, conn).await
}

pub async fn release_order_locks(order_serial: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM inventory_locks WHERE order_serial = $1").bind(order_serial).execute(conn).await?;
    Ok(result.rows_affected())
}

/// Deletes every lock whose expiration is at or before `now`. Locks of paid orders never reach this point, since
/// payment consumes them.
pub async fn delete_expired_locks(now: Timestamp, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM inventory_locks WHERE expiration <= $1").bind(now).execute(conn).await?;
    Ok(result.rows_affected())
}
