//! Foundational low-level utilities shared across vigil crates.
//!
//! Provides wall-clock helpers used to stamp and age stream events, and the
//! HTTP retry policy shared by the Slack and Atlassian clients.

pub mod http_retry;
pub mod time_utils;

pub use http_retry::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};
pub use time_utils::{
    current_unix_timestamp_ms, format_duration_compact, local_wall_clock, WALL_CLOCK_FORMAT,
};
