use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, OrderId, OrderRecord},
    traits::OrderQueryFilter,
};

/// Inserts a new contract. The `(instance_id, order_id)` pair and `h_contract` are unique, so inserting an existing
/// order fails with a unique violation.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<OrderRecord, sqlx::Error> {
    let record: OrderRecord = sqlx::query_as(
        r#"
            INSERT INTO orders (
                instance_id,
                order_id,
                h_contract,
                contract_terms,
                contract_sig,
                amount,
                summary,
                timestamp,
                pay_deadline,
                refund_deadline,
                wire_transfer_deadline
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(&order.instance_id)
    .bind(order.order_id.as_str())
    .bind(&order.h_contract)
    .bind(&order.contract_terms)
    .bind(&order.contract_sig)
    .bind(&order.amount)
    .bind(&order.summary)
    .bind(order.timestamp)
    .bind(order.pay_deadline)
    .bind(order.refund_deadline)
    .bind(order.wire_transfer_deadline)
    .fetch_one(conn)
    .await?;
    debug!("📦️ Order [{}/{}] inserted with id {}", record.instance_id, record.order_id, record.id);
    Ok(record)
}

pub async fn fetch_order(
    instance_id: &str,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE instance_id = $1 AND order_id = $2")
        .bind(instance_id)
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_order_by_serial(
    order_serial: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_serial).fetch_optional(conn).await
}

pub async fn fetch_order_by_hash(
    h_contract: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE h_contract = $1").bind(h_contract).fetch_optional(conn).await
}

/// Fetches orders according to the criteria in the `OrderQueryFilter`.
///
/// Orders are returned by row id, ascending for a positive `delta` and descending for a negative one. `start` is
/// exclusive.
pub async fn search_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderRecord>, sqlx::Error> {
    let descending = query.is_descending();
    let limit = query.limit();
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE ");
    let mut where_clause = builder.separated(" AND ");
    where_clause.push("instance_id = ");
    where_clause.push_bind_unseparated(query.instance_id);
    if let Some(paid) = query.paid {
        where_clause.push("paid = ");
        where_clause.push_bind_unseparated(paid);
    }
    if let Some(wired) = query.wired {
        where_clause.push("wired = ");
        where_clause.push_bind_unseparated(wired);
    }
    if let Some(refunded) = query.refunded {
        let exists =
            "EXISTS (SELECT 1 FROM refunds WHERE refunds.order_serial = orders.id AND refunds.reason <> 'abort')";
        if refunded {
            where_clause.push(exists);
        } else {
            where_clause.push(format!("NOT {exists}"));
        }
    }
    if let Some(date) = query.date {
        where_clause.push(if descending { "timestamp <= " } else { "timestamp >= " });
        where_clause.push_bind_unseparated(date);
    }
    if let Some(start) = query.start {
        where_clause.push(if descending { "id < " } else { "id > " });
        where_clause.push_bind_unseparated(start);
    }
    builder.push(if descending { " ORDER BY id DESC" } else { " ORDER BY id ASC" });
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    trace!("📦️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<OrderRecord>().fetch_all(conn).await?;
    trace!("📦️ Result of search_orders: {} orders", orders.len());
    Ok(orders)
}

pub async fn mark_paid(order_serial: i64, payment_sig: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET paid = TRUE, payment_sig = $1 WHERE id = $2 AND paid = FALSE")
        .bind(payment_sig)
        .bind(order_serial)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_aborted(order_serial: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET aborted = TRUE WHERE id = $1").bind(order_serial).execute(conn).await?;
    Ok(())
}

pub async fn mark_wired(order_serial: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET wired = TRUE WHERE id = $1 AND wired = FALSE")
        .bind(order_serial)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
