/// Sensor polling over the serial line protocol
use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info, warn};
use tokio::time::{sleep, Duration, Instant};

use crate::error::Result;
use crate::models::PollReading;
use crate::serial::SensorLink;
use crate::utils::{exponential_moving_average, now_timestamp, SMOOTHING_WEIGHT};

/// Samples retained per sensor within a round; also the smoothing window.
pub const SMOOTHING_WINDOW: usize = 5;

/// Settle delay after each radio-group broadcast.
const BROADCAST_SETTLE: Duration = Duration::from_millis(100);

/// Wall-clock budget for one polling round.
const POLL_WINDOW: Duration = Duration::from_secs(5);

/// Pause between sending a poll command and attempting to read.
const POLL_PAUSE: Duration = Duration::from_millis(500);

/// Run one polling round against the attached sensor nodes.
///
/// Broadcasts the radio group to every valid sensor, then repeatedly polls
/// within a bounded time window, accumulating per-sensor samples and
/// collapsing them into one smoothed reading each. Sensors that never
/// responded are omitted from the result rather than reported as zero.
pub async fn poll_round<L: SensorLink>(
    link: &mut L,
    valid_sensors: &HashSet<String>,
    radio_group: u8,
) -> Result<HashMap<String, PollReading>> {
    if valid_sensors.is_empty() {
        return Ok(HashMap::new());
    }

    // Put every addressed node onto the shared radio channel before
    // polling starts.
    for sensor in valid_sensors {
        link.send_command(&format!("bct{}|{}", sensor, radio_group))?;
        sleep(BROADCAST_SETTLE).await;
    }

    // Stale responses from a previous round must not be misattributed.
    link.clear_buffer();

    info!("Polling sensor data...");
    let mut samples: HashMap<String, VecDeque<f64>> = HashMap::new();
    let deadline = Instant::now() + POLL_WINDOW;

    while Instant::now() < deadline {
        link.send_command("pol")?;
        sleep(POLL_PAUSE).await;

        if let Some(line) = link.wait_response() {
            accumulate_line(&line, valid_sensors, &mut samples);
        }

        // Every sensor has saturated its smoothing window; no point
        // burning the rest of the budget.
        if valid_sensors
            .iter()
            .all(|s| samples.get(s).map_or(false, |ring| ring.len() >= SMOOTHING_WINDOW))
        {
            debug!("All sensors saturated, ending round early");
            break;
        }
    }

    let timestamp = now_timestamp();
    let mut result = HashMap::new();
    for (sensor, ring) in &samples {
        let collected: Vec<f64> = ring.iter().copied().collect();
        if let Some(value) = exponential_moving_average(&collected, SMOOTHING_WEIGHT) {
            result.insert(sensor.clone(), PollReading { value, timestamp });
        }
    }

    info!(
        "Polling completed with readings from {} of {} sensors",
        result.len(),
        valid_sensors.len()
    );
    Ok(result)
}

/// Parse one `<sensorId>|<value>` line into the per-sensor sample rings.
///
/// Serial hardware is inherently noisy, so malformed lines are dropped
/// per-line and never abort the round.
fn accumulate_line(
    line: &str,
    valid_sensors: &HashSet<String>,
    samples: &mut HashMap<String, VecDeque<f64>>,
) {
    let Some((sensor, raw_value)) = line.split_once('|') else {
        debug!("Discarding malformed line: {}", line);
        return;
    };

    if !valid_sensors.contains(sensor) {
        warn!("Discarding reading from unrecognized sensor {}", sensor);
        return;
    }

    let Ok(value) = raw_value.trim().parse::<f64>() else {
        debug!("Discarding unparseable value from {}: {}", sensor, raw_value);
        return;
    };

    let ring = samples.entry(sensor.to_string()).or_default();
    if ring.len() == SMOOTHING_WINDOW {
        ring.pop_front();
    }
    ring.push_back(value);
}
