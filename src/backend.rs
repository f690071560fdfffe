/// Backend synchronization client
use std::collections::{BTreeMap, HashSet};
use std::fs;

use log::info;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::config::HubConfig;
use crate::database;
use crate::error::{HubError, Result};
use crate::models::{ReadingEntry, SensorReading};

/// Request timeout for every backend call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Radio group reported when the backend has not assigned one.
const UNASSIGNED_RADIO_GROUP: u8 = 255;

/// Sensor list and radio group adopted after a successful sync.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub sensors: Vec<String>,
    pub radio_group: u8,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    sensors: Option<Vec<String>>,
    #[serde(rename = "radioGroup")]
    radio_group: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    token: Option<String>,
}

/// HTTP client for the hub endpoints of the backend API.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    hub_identifier: String,
}

impl BackendClient {
    pub fn new(config: &HubConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(BackendClient {
            http,
            base_url: config.base_url(),
            hub_identifier: config.hub_identifier.clone(),
        })
    }

    /// One-time registration handshake: announce this hub's identifier
    /// and receive the shared secret.
    pub async fn register_hub(&self) -> Result<String> {
        let response: RegistrationResponse = self
            .http
            .put(format!("{}/hubs/verifyHubInitialization", self.base_url))
            .json(&serde_json::json!({ "identifierNumber": self.hub_identifier }))
            .send()
            .await?
            .json()
            .await?;

        response
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| HubError::Registration("backend response carried no token".to_string()))
    }

    /// Number of poll rounds between sync cycles, as configured on the
    /// backend for this hub.
    pub async fn fetch_transmission_rate(&self) -> Result<u32> {
        let rate = self
            .http
            .get(format!(
                "{}/hubs/getHubDataTransmissionRate/{}",
                self.base_url, self.hub_identifier
            ))
            .send()
            .await?
            .json::<u32>()
            .await?;
        Ok(rate)
    }

    /// Push every unsent reading for the given sensors, then adopt the
    /// backend's canonical sensor list and radio group.
    ///
    /// The initial call is discovery only: it never flush-marks rows,
    /// because it runs before any readings of interest exist for this
    /// session. Non-initial success flushes all-or-nothing; on any
    /// failure previously-unsent rows are left untouched.
    pub async fn sync_batch(
        &self,
        pool: &SqlitePool,
        valid_sensors: &HashSet<String>,
        token: &str,
        initial_call: bool,
    ) -> Result<SyncOutcome> {
        let rows = database::select_unsent(pool).await?;
        let payload = build_payload(&rows, valid_sensors);
        let payload_string = serde_json::to_string(&payload)?;
        let digest = sign_payload(&payload_string, token);

        let response = self
            .http
            .post(format!(
                "{}/hubs/pushSensorReadings/{}",
                self.base_url, self.hub_identifier
            ))
            .json(&serde_json::json!({
                "jsonPayloadString": payload_string,
                "sha256": digest,
            }))
            .send()
            .await?
            .json::<PushResponse>()
            .await?;

        let sensors = match response.sensors {
            Some(sensors) => sensors,
            None => {
                return Err(HubError::Sync(
                    "backend response carried no sensor list".to_string(),
                ))
            }
        };

        if !initial_call {
            database::mark_all_unsent_as_sent(pool).await?;
        }
        info!("Sent data to server");

        Ok(SyncOutcome {
            sensors,
            radio_group: response.radio_group.unwrap_or(UNASSIGNED_RADIO_GROUP),
        })
    }
}

/// Load the persisted hub secret. An empty or whitespace-only file counts
/// as no token, so a truncated write cannot wedge the hub.
pub fn load_token(path: &str) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let token = contents.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Persist the hub secret for subsequent runs.
pub fn save_token(path: &str, token: &str) -> Result<()> {
    fs::write(path, token)?;
    Ok(())
}

/// Group unsent rows per sensor, restricted to the valid set.
///
/// Sorted keys keep the serialized form canonical, so the digest is
/// reproducible for a given batch.
fn build_payload(
    rows: &[SensorReading],
    valid_sensors: &HashSet<String>,
) -> BTreeMap<String, Vec<ReadingEntry>> {
    let mut payload: BTreeMap<String, Vec<ReadingEntry>> = BTreeMap::new();
    for row in rows {
        if !valid_sensors.contains(&row.sensor_identifier) {
            continue;
        }
        payload
            .entry(row.sensor_identifier.clone())
            .or_default()
            .push(ReadingEntry {
                reading_date: row.reading_date.clone(),
                reading: row.reading,
            });
    }
    payload
}

/// Shared-secret integrity tag: SHA-256 over payload string + token.
///
/// Detects tampering or corruption in transit. It is not transport
/// encryption or mutual authentication; an observer who learns the token
/// can forge valid tags.
fn sign_payload(payload: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
