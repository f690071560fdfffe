/// Storage operations for the local reading queue
use sqlx::SqlitePool;

use crate::database::connection::execute_with_retry;
use crate::error::Result;
use crate::models::{PollReading, SensorReading};
use crate::utils::format_timestamp;

/// Queue one smoothed reading, unsent.
///
/// Retries transient lock contention; an unrecoverable storage error is
/// fatal to the caller.
pub async fn insert_reading(
    pool: &SqlitePool,
    sensor_identifier: &str,
    reading: &PollReading,
) -> Result<()> {
    let reading_date = format_timestamp(&reading.timestamp);

    execute_with_retry(|| async {
        sqlx::query(
            "INSERT INTO sensordb(readingDate, sensorIdentifier, reading, sent) VALUES (?, ?, ?, 0)",
        )
        .bind(&reading_date)
        .bind(sensor_identifier)
        .bind(reading.value)
        .execute(pool)
        .await
        .map(|_| ())
    })
    .await
}

/// All rows not yet pushed to the backend, in insertion order.
pub async fn select_unsent(pool: &SqlitePool) -> Result<Vec<SensorReading>> {
    let rows = sqlx::query_as::<_, SensorReading>(
        "SELECT readingDate, sensorIdentifier, reading, sent FROM sensordb WHERE sent = 0",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Flip every unsent row to sent.
///
/// Called only after the backend has confirmed receipt of the batch; the
/// flush is all-or-nothing, there is no partial-acknowledgment protocol.
pub async fn mark_all_unsent_as_sent(pool: &SqlitePool) -> Result<()> {
    execute_with_retry(|| async {
        sqlx::query("UPDATE sensordb SET sent = 1 WHERE sent = 0")
            .execute(pool)
            .await
            .map(|_| ())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::connect;
    use crate::utils::now_timestamp;

    fn reading(value: f64) -> PollReading {
        PollReading {
            value,
            timestamp: now_timestamp(),
        }
    }

    async fn count_sent(pool: &SqlitePool) -> i64 {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sensordb WHERE sent = 1")
                .fetch_one(pool)
                .await
                .unwrap();
        count
    }

    #[tokio::test]
    async fn inserted_readings_start_unsent() {
        let pool = connect(":memory:").await.unwrap();

        insert_reading(&pool, "temp1", &reading(20.8)).await.unwrap();

        let rows = select_unsent(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sensor_identifier, "temp1");
        assert!((rows[0].reading - 20.8).abs() < 1e-12);
        assert!(!rows[0].sent);
        assert_eq!(count_sent(&pool).await, 0);
    }

    #[tokio::test]
    async fn marking_flushes_every_unsent_row() {
        let pool = connect(":memory:").await.unwrap();

        insert_reading(&pool, "temp1", &reading(20.8)).await.unwrap();
        insert_reading(&pool, "humid1", &reading(55.2)).await.unwrap();

        mark_all_unsent_as_sent(&pool).await.unwrap();

        assert!(select_unsent(&pool).await.unwrap().is_empty());
        assert_eq!(count_sent(&pool).await, 2);
    }

    #[tokio::test]
    async fn sent_rows_stay_sent_as_new_readings_queue_up() {
        let pool = connect(":memory:").await.unwrap();

        insert_reading(&pool, "temp1", &reading(20.8)).await.unwrap();
        mark_all_unsent_as_sent(&pool).await.unwrap();
        insert_reading(&pool, "temp1", &reading(21.3)).await.unwrap();

        let unsent = select_unsent(&pool).await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert!((unsent[0].reading - 21.3).abs() < 1e-12);
        assert_eq!(count_sent(&pool).await, 1);
    }
}
