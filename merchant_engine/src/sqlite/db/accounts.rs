use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{NewAccount, WireAccount};

pub async fn insert_account(
    instance_serial: i64,
    account: &NewAccount,
    conn: &mut SqliteConnection,
) -> Result<WireAccount, sqlx::Error> {
    let account: WireAccount = sqlx::query_as(
        r#"
            INSERT INTO accounts (instance_serial, payto_uri, salt, h_wire, wire_method)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, instance_serial, payto_uri, salt, h_wire, wire_method, active;
        "#,
    )
    .bind(instance_serial)
    .bind(&account.payto_uri)
    .bind(&account.salt)
    .bind(&account.h_wire)
    .bind(&account.wire_method)
    .fetch_one(conn)
    .await?;
    debug!("🏪️ Account {} added to instance #{instance_serial}", account.payto_uri);
    Ok(account)
}

pub async fn fetch_accounts(
    instance_serial: i64,
    active_only: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<WireAccount>, sqlx::Error> {
    let sql = if active_only {
        "SELECT id, instance_serial, payto_uri, salt, h_wire, wire_method, active FROM accounts WHERE instance_serial = \
         $1 AND active = TRUE ORDER BY id"
    } else {
        "SELECT id, instance_serial, payto_uri, salt, h_wire, wire_method, active FROM accounts WHERE instance_serial = \
         $1 ORDER BY id"
    };
    sqlx::query_as(sql).bind(instance_serial).fetch_all(conn).await
}

pub async fn set_active(account_id: i64, active: bool, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET active = $1 WHERE id = $2").bind(active).bind(account_id).execute(conn).await?;
    Ok(())
}
