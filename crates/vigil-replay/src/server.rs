use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};
use vigil_core::local_wall_clock;

use crate::transcript::{load_transcript, IncidentTranscript, ReplayFeed};

const MIN_SPEED: f64 = 0.1;
const MAX_SPEED: f64 = 10.0;
const REPLAY_COMPLETED: &str = "✅ Incident replay completed";

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub bind: String,
    pub transcript_path: PathBuf,
    pub initial_speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8081".to_string(),
            transcript_path: PathBuf::from("incident_transcript.json"),
            initial_speed: 2.0,
        }
    }
}

/// Playback multiplier shared by every open stream, clamped to `[0.1, 10]`.
#[derive(Debug)]
pub struct PlaybackSpeed(AtomicU64);

impl PlaybackSpeed {
    pub fn new(speed: f64) -> Self {
        Self(AtomicU64::new(clamp_speed(speed).to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Stores the clamped value and returns it.
    pub fn set(&self, speed: f64) -> f64 {
        let clamped = clamp_speed(speed);
        self.0.store(clamped.to_bits(), Ordering::Release);
        clamped
    }
}

fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return MIN_SPEED;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Time after connect at which an event with `offset_secs` is due.
fn due_after(offset_secs: u64, speed: f64) -> Duration {
    Duration::from_secs_f64(offset_secs as f64 / clamp_speed(speed))
}

pub struct ReplayState {
    transcript: IncidentTranscript,
    speed: PlaybackSpeed,
}

impl ReplayState {
    pub fn new(transcript: IncidentTranscript, initial_speed: f64) -> Self {
        Self {
            transcript,
            speed: PlaybackSpeed::new(initial_speed),
        }
    }

    pub fn speed(&self) -> &PlaybackSpeed {
        &self.speed
    }
}

pub fn build_replay_router(state: Arc<ReplayState>) -> Router {
    Router::new()
        .route("/stream/{feed}", get(handle_stream))
        .route("/speed", get(handle_get_speed).post(handle_set_speed))
        .with_state(state)
}

/// Serves the replay feeds until Ctrl-C.
pub async fn run_replay_server(config: ReplayConfig) -> Result<()> {
    let bind_addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid replay bind '{}': expected host:port", config.bind))?;
    let transcript = load_transcript(&config.transcript_path)?;
    info!(
        title = %transcript.incident.title,
        description = %transcript.incident.description,
        events = transcript.events.len(),
        "transcript loaded"
    );
    let state = Arc::new(ReplayState::new(transcript, config.initial_speed));

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind replay server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve replay server listen address")?;
    info!(
        addr = %local_addr,
        speed = state.speed().get(),
        "replay server listening"
    );

    axum::serve(listener, build_replay_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("replay server exited unexpectedly")?;
    Ok(())
}

async fn handle_stream(
    State(state): State<Arc<ReplayState>>,
    Path(segment): Path<String>,
) -> Response {
    let Some(feed) = ReplayFeed::from_path_segment(&segment) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown stream '{segment}'") })),
        )
            .into_response();
    };
    info!(feed = %feed, "client connected to replay stream");

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(replay_feed(state, feed, tx));
    let stream = UnboundedReceiverStream::new(rx)
        .map(|line| Ok::<Event, Infallible>(Event::default().data(line)));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn replay_feed(state: Arc<ReplayState>, feed: ReplayFeed, tx: mpsc::UnboundedSender<String>) {
    let banners = [
        format!("🔗 Connected to {} stream", feed.display_name()),
        format!("📋 Incident: {}", state.transcript.incident.title),
    ];
    for banner in banners {
        if tx.send(banner).is_err() {
            return;
        }
    }

    let started = tokio::time::Instant::now();
    for event in state.transcript.events_for(feed) {
        let due = started + due_after(event.time_offset, state.speed.get());
        tokio::time::sleep_until(due).await;
        debug!(feed = %feed, message = %event.message, "replaying event");
        if tx
            .send(format!("[{}] {}", local_wall_clock(), event.message))
            .is_err()
        {
            info!(feed = %feed, "client disconnected from replay stream");
            return;
        }
    }

    if tx.send(REPLAY_COMPLETED.to_string()).is_err() {
        return;
    }
    info!(feed = %feed, "replay completed; holding stream open");
    tx.closed().await;
    info!(feed = %feed, "client disconnected from replay stream");
}

async fn handle_get_speed(State(state): State<Arc<ReplayState>>) -> Response {
    Json(json!({ "speed": state.speed.get() })).into_response()
}

#[derive(Debug, Deserialize)]
struct SpeedQuery {
    speed: Option<String>,
}

async fn handle_set_speed(
    State(state): State<Arc<ReplayState>>,
    Query(query): Query<SpeedQuery>,
) -> Response {
    let Some(raw) = query.speed.filter(|raw| !raw.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing speed parameter").into_response();
    };
    let requested = match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => return (StatusCode::BAD_REQUEST, "Invalid speed value").into_response(),
    };
    let applied = state.speed.set(requested);
    info!(requested, applied, "playback speed updated");
    Json(json!({
        "status": "ok",
        "message": format!("Speed set to {applied:.1}x"),
        "speed": applied,
    }))
    .into_response()
}
