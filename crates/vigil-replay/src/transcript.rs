use std::{fmt, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentInfo {
    pub title: String,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub description: String,
}

/// One scripted line, due `time_offset` seconds after a client connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub time_offset: u64,
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTranscript {
    pub incident: IncidentInfo,
    #[serde(default)]
    pub events: Vec<TranscriptEvent>,
}

impl IncidentTranscript {
    /// Events routed to `feed`, ordered by offset. Ties keep file order.
    pub fn events_for(&self, feed: ReplayFeed) -> Vec<TranscriptEvent> {
        let mut events = self
            .events
            .iter()
            .filter(|event| ReplayFeed::for_channel(&event.channel) == Some(feed))
            .cloned()
            .collect::<Vec<_>>();
        events.sort_by_key(|event| event.time_offset);
        events
    }
}

pub fn load_transcript(path: &Path) -> Result<IncidentTranscript> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read transcript {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse transcript {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayFeed {
    Incidents,
    Team,
    Zoom,
}

impl ReplayFeed {
    pub const ALL: [ReplayFeed; 3] = [ReplayFeed::Incidents, ReplayFeed::Team, ReplayFeed::Zoom];

    pub fn path_segment(self) -> &'static str {
        match self {
            ReplayFeed::Incidents => "incidents",
            ReplayFeed::Team => "team",
            ReplayFeed::Zoom => "zoom",
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|feed| feed.path_segment() == segment)
    }

    /// Maps a transcript channel name onto the feed that carries it.
    pub fn for_channel(channel: &str) -> Option<Self> {
        match channel.trim().to_ascii_lowercase().as_str() {
            "metrics" | "incidents" => Some(ReplayFeed::Incidents),
            "slack" | "team" => Some(ReplayFeed::Team),
            "zoom" => Some(ReplayFeed::Zoom),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ReplayFeed::Incidents => "System Metrics",
            ReplayFeed::Team => "Team Communication",
            ReplayFeed::Zoom => "Zoom Bridge",
        }
    }
}

impl fmt::Display for ReplayFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}
