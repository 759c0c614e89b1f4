use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

const BASE_BACKOFF_MS: u64 = 250;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 409 || status == 425 || status == 429 || status >= 500
}

/// Retry budget for one provider call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProviderRetryPolicy {
    pub(crate) max_retries: usize,
    /// Total wall-clock budget for sleeping between attempts; `0` disables it.
    pub(crate) budget_ms: u64,
    pub(crate) jitter: bool,
}

impl ProviderRetryPolicy {
    /// Returns the delay before the next attempt, or `None` when the caller
    /// should give up.
    pub(crate) fn next_delay(
        &self,
        attempt: usize,
        retry_after_ms: Option<u64>,
        elapsed_ms: u64,
    ) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let backoff_ms = backoff_ms(attempt, self.jitter);
        let delay_ms = retry_after_ms.map_or(backoff_ms, |hint| hint.max(backoff_ms));
        if self.budget_ms > 0 && elapsed_ms.saturating_add(delay_ms) > self.budget_ms {
            return None;
        }
        Some(Duration::from_millis(delay_ms))
    }
}

fn backoff_ms(attempt: usize, jitter: bool) -> u64 {
    let base = BASE_BACKOFF_MS.saturating_mul(1_u64 << attempt.min(6));
    if !jitter {
        return base;
    }
    // Jitter stays within [50%, 100%] of the deterministic backoff.
    let low = base / 2;
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    low.saturating_add(mixed % (base - low + 1))
}

pub(crate) fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

pub(crate) fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

pub(crate) fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("vigil-{millis}-{count}")
}
