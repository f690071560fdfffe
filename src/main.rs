mod backend;
mod config;
mod database;
mod error;
mod models;
mod poller;
mod serial;
mod utils;

use std::collections::HashSet;

use log::{error, info, warn};
use tokio::time::{sleep, Duration, Instant};

use backend::BackendClient;
use config::HubConfig;
use error::{HubError, Result};
use models::HubSession;
use poller::poll_round;
use serial::SerialLink;

/// Registration attempts before giving up.
const TOKEN_RETRY_ATTEMPTS: u32 = 3;

/// Spacing between registration attempts.
const TOKEN_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Minimum delay between poll round starts.
const ROUND_INTERVAL: Duration = Duration::from_secs(5);

/// Poll rounds per sync cycle when the backend rate is unavailable.
const DEFAULT_TRANSMISSION_RATE: u32 = 2;

/// Load the persisted token, or run the registration handshake with a
/// bounded retry budget. Exhaustion is fatal: the hub cannot sign batches
/// without a secret.
async fn acquire_token(config: &HubConfig, client: &BackendClient) -> Result<String> {
    if let Some(token) = backend::load_token(&config.secret_path) {
        info!("Loaded persisted hub token");
        return Ok(token);
    }

    for attempt in 1..=TOKEN_RETRY_ATTEMPTS {
        info!(
            "Initializing connection with backend (attempt {}/{})",
            attempt, TOKEN_RETRY_ATTEMPTS
        );
        match client.register_hub().await {
            Ok(token) => {
                backend::save_token(&config.secret_path, &token)?;
                info!("Hub registered with backend");
                return Ok(token);
            }
            Err(e) => warn!("Registration attempt failed: {}", e),
        }
        if attempt < TOKEN_RETRY_ATTEMPTS {
            sleep(TOKEN_RETRY_DELAY).await;
        }
    }

    Err(HubError::Registration(format!(
        "no token obtained after {} attempts",
        TOKEN_RETRY_ATTEMPTS
    )))
}

async fn main_loop(config: HubConfig) -> Result<()> {
    info!("Starting sensor hub");

    let pool = database::connect(&config.database_path).await?;
    let mut link = SerialLink::open(config.serial_port.as_deref())?;
    let client = BackendClient::new(&config)?;

    let token = acquire_token(&config, &client).await?;

    // Discovery call: learn the canonical sensor list and radio group
    // before any readings of interest exist for this session. Without a
    // sensor list the hub has nothing to poll, so failure here is fatal.
    let initial = client.sync_batch(&pool, &HashSet::new(), &token, true).await?;

    let mut session = HubSession {
        token,
        valid_sensors: initial.sensors.into_iter().collect(),
        radio_group: initial.radio_group,
        polls_since_sync: 0,
    };
    info!(
        "Initial sync complete: {} sensors, radio group {}",
        session.valid_sensors.len(),
        session.radio_group
    );

    let transmission_rate = match client.fetch_transmission_rate().await {
        Ok(rate) if rate > 0 => rate,
        Ok(rate) => {
            warn!(
                "Backend reported transmission rate {}, using default {}",
                rate, DEFAULT_TRANSMISSION_RATE
            );
            DEFAULT_TRANSMISSION_RATE
        }
        Err(e) => {
            warn!(
                "Failed to fetch transmission rate, using default {}: {}",
                DEFAULT_TRANSMISSION_RATE, e
            );
            DEFAULT_TRANSMISSION_RATE
        }
    };
    info!("Syncing to backend every {} poll rounds", transmission_rate);

    loop {
        let round_start = Instant::now();

        let readings = poll_round(&mut link, &session.valid_sensors, session.radio_group).await?;

        for (sensor, reading) in &readings {
            database::insert_reading(&pool, sensor, reading).await?;
        }
        if readings.is_empty() {
            warn!("No data collected during this round");
        } else {
            info!("Inserted {} readings into the local queue", readings.len());
        }

        session.polls_since_sync += 1;
        if session.polls_since_sync >= transmission_rate {
            // A backend that stays unreachable would otherwise buffer
            // readings without bound; failing fast hands the decision to
            // the operator.
            let sync = client
                .sync_batch(&pool, &session.valid_sensors, &session.token, false)
                .await?;
            session.valid_sensors = sync.sensors.into_iter().collect();
            session.radio_group = sync.radio_group;
            session.polls_since_sync = 0;
            info!(
                "Sync complete: {} sensors, radio group {}",
                session.valid_sensors.len(),
                session.radio_group
            );
        }

        // Wait out the remainder of the round interval, measured from the
        // round start.
        let elapsed = round_start.elapsed();
        if elapsed < ROUND_INTERVAL {
            sleep(ROUND_INTERVAL - elapsed).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match HubConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal; dropping the loop closes
    // the serial channel and the store.
    tokio::select! {
        result = main_loop(config) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
                return Err(e);
            }
            info!("Program completed successfully");
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
