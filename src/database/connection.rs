use std::future::Future;

use log::warn;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::time::{sleep, Duration};

use crate::error::{HubError, Result};

const MAX_RETRIES: usize = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Open the local reading queue, creating the database file and the
/// `sensordb` table on first run.
pub async fn connect(database_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true);

    // The store is only ever touched from the single loop thread.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sensordb(readingDate TIMESTAMP, sensorIdentifier CHAR, reading NUMERIC, sent INTEGER)",
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Run a storage write, retrying transient lock contention with
/// exponential backoff.
///
/// Contention comes from external tooling reading the same file, not from
/// this process. Exhausting the retry budget, or hitting any
/// non-transient error, is unrecoverable and surfaces to the caller.
pub async fn execute_with_retry<F, Fut>(operation: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<(), sqlx::Error>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(()) => return Ok(()),
            Err(e) if is_busy(&e) => {
                if attempt >= MAX_RETRIES {
                    return Err(HubError::Storage(format!(
                        "storage still busy after {} attempts: {}",
                        attempt, e
                    )));
                }
                warn!(
                    "Storage busy (attempt {}), retrying in {} ms",
                    attempt,
                    backoff.as_millis()
                );
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// SQLite reports lock contention as `database is locked` / `database
/// table is locked` / busy; everything else is treated as non-transient.
fn is_busy(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            let message = db.message().to_lowercase();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn connect_bootstraps_the_schema() {
        let pool = connect(":memory:").await.unwrap();
        // Queryable immediately after connect means the table exists.
        let rows = crate::database::select_unsent(&pool).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn retry_passes_through_success() {
        let calls = AtomicUsize::new(0);
        execute_with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_does_not_mask_non_transient_errors() {
        let calls = AtomicUsize::new(0);
        let result = execute_with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(sqlx::Error::RowNotFound)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
