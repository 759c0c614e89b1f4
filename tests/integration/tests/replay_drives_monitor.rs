use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::net::TcpListener;
use vigil_agent_core::AgentError;
use vigil_incident::{EventChannel, IncidentPhase, IncidentState};
use vigil_monitor::{
    ingest_feed, PostmortemAction, PostmortemOutcome, SchedulerConfig, StreamFeed,
    SummaryGenerator, SummaryScheduler, TickOutcome,
};
use vigil_replay::{
    build_replay_router, IncidentInfo, IncidentTranscript, ReplayState, TranscriptEvent,
};

#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl SummaryGenerator for CountingGenerator {
    async fn generate(&self, summary_number: u64, _channel_id: &str) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("summary #{summary_number}: investigating"))
    }
}

fn transcript() -> IncidentTranscript {
    let event = |channel: &str, message: &str| TranscriptEvent {
        time_offset: 0,
        channel: channel.to_string(),
        message: message.to_string(),
    };
    IncidentTranscript {
        incident: IncidentInfo {
            title: "Checkout database saturation".to_string(),
            duration_seconds: 600,
            description: "Primary database connection pool exhausted".to_string(),
        },
        events: vec![
            event("metrics", "db connections at 100%"),
            event("metrics", "checkout p99 latency 4.2s"),
            event("zoom", "Priya: failing over to the replica now"),
            event("zoom", "Priya: latency is back to normal, marking as resolved"),
        ],
    }
}

async fn start_replay_server() -> SocketAddr {
    let state = Arc::new(ReplayState::new(transcript(), 10.0));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind replay server");
    let addr = listener.local_addr().expect("replay server addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_replay_router(state)).await;
    });
    addr
}

async fn wait_for_events(state: &IncidentState, channel: EventChannel, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while state.event_count(channel) < count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("replayed events should arrive");
}

#[tokio::test]
async fn integration_replayed_bridge_resolution_triggers_postmortem_instead_of_summary() {
    let addr = start_replay_server().await;
    let base_url = format!("http://{addr}");
    let state = Arc::new(IncidentState::new());
    let http = reqwest::Client::new();

    let mut ingestors = Vec::new();
    for feed in [StreamFeed::Incidents, StreamFeed::Zoom] {
        let appender = state
            .take_appender(feed.channel())
            .expect("one appender per channel");
        let http = http.clone();
        let base_url = base_url.clone();
        ingestors.push(tokio::spawn(async move {
            ingest_feed(&http, &base_url, feed, appender).await
        }));
    }

    // Two banners, the scripted lines, then the completion line.
    wait_for_events(&state, EventChannel::Metrics, 5).await;
    wait_for_events(&state, EventChannel::Transcript, 5).await;

    let metrics = state.events(EventChannel::Metrics);
    assert_eq!(metrics[0].message, "🔗 Connected to System Metrics stream");
    assert_eq!(metrics[1].message, "📋 Incident: Checkout database saturation");
    assert_eq!(metrics[2].message, "db connections at 100%");
    assert_eq!(metrics[2].timestamp.len(), 8);
    let transcript = state.events(EventChannel::Transcript);
    assert!(transcript
        .iter()
        .any(|event| event.message.ends_with("marking as resolved")));

    let generator = Arc::new(CountingGenerator::default());
    let scheduler = SummaryScheduler::new(
        Arc::clone(&state),
        SchedulerConfig {
            interval: Duration::from_millis(10),
            warmup: Duration::ZERO,
            ..SchedulerConfig::default()
        },
        generator.clone(),
        Arc::new(PostmortemAction::new(Arc::clone(&state), None)),
    );

    assert_eq!(scheduler.tick().await, TickOutcome::WaitingForDeclaration);
    assert!(state.try_set_channel_id("C0INCIDENT"));

    // Without Jira/Confluence the post-mortem fails and the tick still summarizes.
    match scheduler.tick().await {
        TickOutcome::Generated {
            summary_number,
            postmortem,
        } => {
            assert_eq!(summary_number, 1);
            assert!(matches!(postmortem, Some(PostmortemOutcome::Failed { .. })));
        }
        other => panic!("expected a generated summary, got {other:?}"),
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert!(state.resolution_detected.is_set());
    assert!(!state.jira_tickets_created.is_set());
    assert_eq!(scheduler.phase(), IncidentPhase::ResolvedPendingPostmortem);

    for ingestor in ingestors {
        ingestor.abort();
    }
}
