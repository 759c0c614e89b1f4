use std::fmt;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    Metrics,
    Chat,
    Transcript,
}

impl EventChannel {
    pub const ALL: [EventChannel; 3] = [
        EventChannel::Metrics,
        EventChannel::Chat,
        EventChannel::Transcript,
    ];

    /// Short label used in logs and the replay transcript format.
    pub fn label(self) -> &'static str {
        match self {
            EventChannel::Metrics => "metrics",
            EventChannel::Chat => "slack",
            EventChannel::Transcript => "zoom",
        }
    }

    /// Heading used when rendering events into the agent context.
    pub fn heading(self) -> &'static str {
        match self {
            EventChannel::Metrics => "METRICS STREAM (Automated monitoring)",
            EventChannel::Chat => "SLACK CHANNEL (#incident-response)",
            EventChannel::Transcript => "ZOOM BRIDGE (Voice call transcript)",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            EventChannel::Metrics => 0,
            EventChannel::Chat => 1,
            EventChannel::Transcript => 2,
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One normalized line from an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Wall-clock `HH:MM:SS`.
    pub timestamp: String,
    pub channel: EventChannel,
    pub message: String,
}

impl StreamEvent {
    pub fn new(
        channel: EventChannel,
        timestamp: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            channel,
            message: message.into(),
        }
    }

    /// Builds an event from a raw line.
    ///
    /// A leading `[HH:MM:SS]` becomes the timestamp and one following space
    /// is dropped. Any other line keeps its full text and is stamped with
    /// `now`.
    ///
    /// ```
    /// use vigil_incident::{EventChannel, StreamEvent};
    ///
    /// let line = "[14:02:05] db latency spike";
    /// let event = StreamEvent::parse_line(EventChannel::Metrics, line, "09:00:00");
    /// assert_eq!(event.timestamp, "14:02:05");
    /// assert_eq!(event.message, "db latency spike");
    /// ```
    pub fn parse_line(channel: EventChannel, line: &str, now: &str) -> Self {
        match split_timestamp_prefix(line) {
            Some((timestamp, message)) => Self::new(channel, timestamp, message),
            None => Self::new(channel, now, line),
        }
    }

    /// Seconds since midnight, when the timestamp is a valid time of day.
    pub fn seconds_of_day(&self) -> Option<u32> {
        parse_time_of_day(&self.timestamp)
    }
}

fn split_timestamp_prefix(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find(']')?;
    let timestamp = &rest[..close];
    parse_time_of_day(timestamp)?;
    let message = &rest[close + 1..];
    Some((timestamp, message.strip_prefix(' ').unwrap_or(message)))
}

pub(crate) fn parse_time_of_day(value: &str) -> Option<u32> {
    if value.len() != 8 {
        return None;
    }
    let time = NaiveTime::parse_from_str(value, "%H:%M:%S").ok()?;
    Some(time.num_seconds_from_midnight())
}
