use std::time::Duration;

use chrono::Local;

/// `strftime` pattern for the time-of-day stamps carried by stream events.
pub const WALL_CLOCK_FORMAT: &str = "%H:%M:%S";

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the local time of day formatted as `HH:MM:SS`.
pub fn local_wall_clock() -> String {
    Local::now().format(WALL_CLOCK_FORMAT).to_string()
}

/// Renders a duration as `<minutes>m <seconds>s`.
pub fn format_duration_compact(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}m {}s", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveTime;

    use super::{format_duration_compact, local_wall_clock, WALL_CLOCK_FORMAT};

    #[test]
    fn unit_local_wall_clock_parses_as_time_of_day() {
        let stamp = local_wall_clock();
        assert_eq!(stamp.len(), 8);
        assert!(NaiveTime::parse_from_str(&stamp, WALL_CLOCK_FORMAT).is_ok());
    }

    #[test]
    fn unit_format_duration_compact_splits_minutes_and_seconds() {
        assert_eq!(format_duration_compact(Duration::from_secs(0)), "0m 0s");
        assert_eq!(format_duration_compact(Duration::from_secs(59)), "0m 59s");
        assert_eq!(format_duration_compact(Duration::from_secs(125)), "2m 5s");
        assert_eq!(
            format_duration_compact(Duration::from_millis(3_725_900)),
            "62m 5s"
        );
    }
}
