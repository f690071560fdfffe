use std::collections::HashSet;

use serde::Serialize;
use time::OffsetDateTime;

/// One smoothed value produced by a poll round, before storage.
#[derive(Debug, Clone)]
pub struct PollReading {
    pub value: f64,
    pub timestamp: OffsetDateTime,
}

/// One persisted row of the local reading queue.
///
/// `sent` only ever flips false to true, and only after the backend has
/// confirmed receipt of the batch containing the row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SensorReading {
    #[sqlx(rename = "readingDate")]
    pub reading_date: String,
    #[sqlx(rename = "sensorIdentifier")]
    pub sensor_identifier: String,
    pub reading: f64,
    pub sent: bool,
}

/// One reading as serialized into the sync payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingEntry {
    pub reading_date: String,
    pub reading: f64,
}

/// Process-wide session state, threaded through the control loop instead
/// of living in module globals.
///
/// `valid_sensors` is always a subset of what the backend considers
/// canonical; it is replaced wholesale on every successful sync, never
/// merged.
#[derive(Debug)]
pub struct HubSession {
    pub token: String,
    pub valid_sensors: HashSet<String>,
    pub radio_group: u8,
    pub polls_since_sync: u32,
}
