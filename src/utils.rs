/// Utility functions for smoothing and timestamp formatting
use time::{format_description, OffsetDateTime};

/// Weight given to the most recent sample by the smoothing filter.
pub const SMOOTHING_WEIGHT: f64 = 0.4;

/// Timestamp format shared by the local store and the sync payload.
const TIMESTAMP_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

/// Current wall-clock time in the deployment's local offset.
///
/// Falls back to UTC when the platform cannot report a local offset
/// (the lookup is fallible on multithreaded Unix targets).
pub fn now_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Format a timestamp the way the store and the backend expect it.
///
/// Falls back to the default string representation if formatting fails.
pub fn format_timestamp(dt: &OffsetDateTime) -> String {
    let format = format_description::parse(TIMESTAMP_FORMAT)
        .expect("Failed to create format description");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Exponential moving average over accumulated samples.
///
/// Seeds with the first value, then folds each subsequent value in with
/// the fixed weight: `ema = ema * (1 - w) + value * w`. Returns `None`
/// for an empty sample set so callers omit silent sensors instead of
/// reporting zero.
pub fn exponential_moving_average(samples: &[f64], weight: f64) -> Option<f64> {
    let mut iter = samples.iter();
    let mut ema = *iter.next()?;
    for value in iter {
        ema = ema * (1.0 - weight) + value * weight;
    }
    Some(ema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn ema_matches_recurrence() {
        let samples = [18.5, 20.0, 19.2, 21.7, 20.4];
        let weight = 0.4;

        let mut expected = samples[0];
        for value in &samples[1..] {
            expected = expected * (1.0 - weight) + value * weight;
        }

        let ema = exponential_moving_average(&samples, weight).unwrap();
        assert!((ema - expected).abs() < 1e-12);
    }

    #[test]
    fn ema_of_two_samples() {
        // 20.0 * 0.6 + 22.0 * 0.4 = 20.8
        let ema = exponential_moving_average(&[20.0, 22.0], SMOOTHING_WEIGHT).unwrap();
        assert!((ema - 20.8).abs() < 1e-12);
    }

    #[test]
    fn ema_of_single_sample_is_the_sample() {
        let ema = exponential_moving_average(&[42.5], SMOOTHING_WEIGHT).unwrap();
        assert!((ema - 42.5).abs() < 1e-12);
    }

    #[test]
    fn ema_of_no_samples_is_absent() {
        assert!(exponential_moving_average(&[], SMOOTHING_WEIGHT).is_none());
    }

    #[test]
    fn timestamps_format_with_zero_padding() {
        let dt = datetime!(2024-05-01 13:05:09 UTC);
        assert_eq!(format_timestamp(&dt), "2024-05-01 13:05:09");
    }
}
