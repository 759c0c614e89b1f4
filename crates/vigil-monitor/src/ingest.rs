//! Server-sent-event ingestors: one long-lived HTTP stream per feed, each
//! appending to exactly one channel of the incident state.

use std::fmt;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use tracing::{debug, info, warn};
use vigil_core::local_wall_clock;
use vigil_incident::{EventAppender, EventChannel, StreamEvent};

/// Remote feeds exposed under `{base_url}/stream/{feed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFeed {
    Incidents,
    Zoom,
    Team,
}

impl StreamFeed {
    pub const ALL: [StreamFeed; 3] = [StreamFeed::Incidents, StreamFeed::Zoom, StreamFeed::Team];

    pub fn path_segment(self) -> &'static str {
        match self {
            StreamFeed::Incidents => "incidents",
            StreamFeed::Zoom => "zoom",
            StreamFeed::Team => "team",
        }
    }

    pub fn channel(self) -> EventChannel {
        match self {
            StreamFeed::Incidents => EventChannel::Metrics,
            StreamFeed::Zoom => EventChannel::Transcript,
            StreamFeed::Team => EventChannel::Chat,
        }
    }

    pub fn url(self, base_url: &str) -> String {
        format!(
            "{}/stream/{}",
            base_url.trim().trim_end_matches('/'),
            self.path_segment()
        )
    }
}

impl fmt::Display for StreamFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Extracts the event payload carried by one SSE line.
///
/// `data:` lines yield their payload. Blank lines, comments, and the other
/// SSE fields yield nothing. Lines without a field prefix are payloads as-is.
pub fn sse_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        return (!data.trim().is_empty()).then_some(data);
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return None;
    }
    Some(line)
}

const MAX_PENDING_LINE_BYTES: usize = 64 * 1024;

/// Splits a byte stream into lines, keeping the unterminated tail buffered.
/// A tail longer than [`MAX_PENDING_LINE_BYTES`] is dropped along with the
/// rest of its line.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
    discarding: bool,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut chunk = chunk;
        if self.discarding {
            let Some(position) = chunk.iter().position(|byte| *byte == b'\n') else {
                return lines;
            };
            chunk = &chunk[position + 1..];
            self.discarding = false;
        }

        self.pending.extend_from_slice(chunk);
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=position).collect::<Vec<_>>();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        if self.pending.len() > MAX_PENDING_LINE_BYTES {
            warn!(
                dropped_bytes = self.pending.len(),
                max_line_bytes = MAX_PENDING_LINE_BYTES,
                "dropping oversized stream line"
            );
            self.pending.clear();
            self.discarding = true;
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Consumes one feed until the connection ends.
///
/// Every exit is an error: a non-success status, a transport failure, or the
/// server closing the stream. There is no reconnect.
pub async fn ingest_feed(
    http: &reqwest::Client,
    base_url: &str,
    feed: StreamFeed,
    appender: EventAppender,
) -> Result<()> {
    let url = feed.url(base_url);
    let response = http
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .with_context(|| format!("failed to connect to {feed} stream at {url}"))?;
    let status = response.status();
    if !status.is_success() {
        bail!("{feed} stream at {url} returned status {}", status.as_u16());
    }
    info!(feed = %feed, url = %url, channel = %appender.channel(), "stream connected");

    let mut appended = 0usize;
    let mut lines = LineBuffer::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("failed reading {feed} stream"))?;
        for line in lines.push(&chunk) {
            appended += append_line(&appender, &line);
        }
    }
    if let Some(line) = lines.finish() {
        appended += append_line(&appender, &line);
    }

    bail!("{feed} stream closed by server after {appended} events")
}

fn append_line(appender: &EventAppender, line: &str) -> usize {
    let Some(payload) = sse_payload(line) else {
        return 0;
    };
    let event = StreamEvent::parse_line(appender.channel(), payload, &local_wall_clock());
    debug!(
        channel = %event.channel,
        timestamp = %event.timestamp,
        message = %event.message,
        "event ingested"
    );
    appender.append(event);
    1
}
