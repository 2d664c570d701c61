//! Runs a unit of work inside a transaction, retrying it when the store reports contention.
//!
//! An attempt is a closure over a fresh connection. If it (or the commit) fails softly, the transaction is rolled back
//! and the whole attempt runs again, up to [`MAX_RETRIES`] times. Hard failures roll back and are returned at once. The
//! closure must not have effects outside the transaction, since it may run more than once.
use futures_util::future::BoxFuture;
use log::{trace, warn};
use sqlx::{SqliteConnection, SqlitePool};

use crate::traits::RetryableError;

pub const MAX_RETRIES: usize = 3;

pub async fn run_in_transaction<T, E, F>(pool: &SqlitePool, label: &str, mut attempt: F) -> Result<T, E>
where
    E: RetryableError + From<sqlx::Error>,
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, E>>,
{
    for i in 1..=MAX_RETRIES {
        let mut tx = match pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                let e = E::from(e);
                if e.is_soft() {
                    warn!("🔄️ [{label}] Could not start a transaction (attempt {i}/{MAX_RETRIES}). {e}");
                    continue;
                }
                return Err(e);
            },
        };
        match attempt(&mut *tx).await {
            Ok(value) => match tx.commit().await {
                Ok(()) => {
                    trace!("🔄️ [{label}] Committed on attempt {i}");
                    return Ok(value);
                },
                Err(e) => {
                    let e = E::from(e);
                    if !e.is_soft() {
                        return Err(e);
                    }
                    warn!("🔄️ [{label}] Commit failed softly (attempt {i}/{MAX_RETRIES}). {e}");
                },
            },
            Err(e) => {
                // Rollback failures are irrelevant here; dropping the transaction rolls back anyway.
                let _ = tx.rollback().await;
                if !e.is_soft() {
                    return Err(e);
                }
                warn!("🔄️ [{label}] Soft failure (attempt {i}/{MAX_RETRIES}). {e}");
            },
        }
    }
    warn!("🔄️ [{label}] Giving up after {MAX_RETRIES} attempts");
    Err(E::serialization_failure())
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::traits::MerchantDbError;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER NOT NULL)").execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn soft_failures_are_retried_until_exhausted() {
        let pool = pool().await;
        let count = Arc::new(AtomicUsize::new(0));
        let result: Result<(), MerchantDbError> = run_in_transaction(&pool, "test", |conn| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)").execute(&mut *conn).await?;
                count.fetch_add(1, Ordering::SeqCst);
                Err(MerchantDbError::SoftError("busy".into()))
            })
        })
        .await;
        assert!(matches!(result, Err(MerchantDbError::SerializationFailure)));
        assert_eq!(count.load(Ordering::SeqCst), MAX_RETRIES);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t").fetch_one(&pool).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn hard_failures_roll_back_immediately() {
        let pool = pool().await;
        let count = Arc::new(AtomicUsize::new(0));
        let result: Result<(), MerchantDbError> = run_in_transaction(&pool, "test", |conn| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)").execute(&mut *conn).await?;
                count.fetch_add(1, Ordering::SeqCst);
                Err(MerchantDbError::InconsistentState("nope".into()))
            })
        })
        .await;
        assert!(matches!(result, Err(MerchantDbError::InconsistentState(_))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t").fetch_one(&pool).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn success_after_a_soft_failure_commits_once() {
        let pool = pool().await;
        let count = Arc::new(AtomicUsize::new(0));
        let result: Result<usize, MerchantDbError> = run_in_transaction(&pool, "test", |conn| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)").execute(&mut *conn).await?;
                match count.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(MerchantDbError::SoftError("busy".into())),
                    n => Ok(n),
                }
            })
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t").fetch_one(&pool).await.unwrap();
        assert_eq!(rows, 1);
    }
}
