//! Incident transcript replay: serves a recorded incident as the three
//! server-sent event feeds the monitor consumes.

mod server;
mod transcript;

pub use server::{build_replay_router, run_replay_server, PlaybackSpeed, ReplayConfig, ReplayState};
pub use transcript::{
    load_transcript, IncidentInfo, IncidentTranscript, ReplayFeed, TranscriptEvent,
};
