use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use httpmock::prelude::*;
use serde_json::json;
use vigil_agent_core::AgentError;
use vigil_ai::MessageRole;
use vigil_incident::{EventChannel, IncidentState, StreamEvent};

use super::{
    parse_executive_summary, render_incident_context, ReasoningAdapter, ReasoningConfig,
};
use crate::postmortem::{PostmortemOutcome, TerminalAction};
use crate::scheduler::SummaryGenerator;
use crate::test_support::{slack_client, text_response, tool_call_response, ScriptedLlm};

struct NoopAction;

#[async_trait]
impl TerminalAction for NoopAction {
    async fn run(&self) -> PostmortemOutcome {
        PostmortemOutcome::AlreadyCompleted
    }
}

const SUMMARY_JSON: &str = r#"{
  "timestamp": "10:15:00",
  "incident_duration": "15m 0s",
  "current_status": "Rolling back the payment service",
  "customer_impact": "12% of checkouts failing",
  "key_actions_taken": ["Paged database on-call", "Started rollback"],
  "root_cause": null,
  "eta_to_resolution": "10:30",
  "severity": "SEV-1"
}"#;

fn adapter(
    llm: Arc<ScriptedLlm>,
    state: Arc<IncidentState>,
    server: &MockServer,
    config: ReasoningConfig,
) -> ReasoningAdapter {
    ReasoningAdapter::new(
        llm,
        state,
        slack_client(server),
        Arc::new(NoopAction),
        config,
    )
}

#[test]
fn unit_parses_bare_and_fenced_summary_json() {
    let bare = parse_executive_summary(SUMMARY_JSON).expect("bare json");
    assert_eq!(bare.severity, "SEV-1");
    assert_eq!(bare.root_cause, None);
    assert_eq!(bare.key_actions_taken.len(), 2);

    let fenced = format!("Here you go:\n```json\n{SUMMARY_JSON}\n```\n");
    assert_eq!(parse_executive_summary(&fenced), Some(bare));
}

#[test]
fn functional_finds_summary_embedded_in_prose() {
    let text = format!("Posted the update. Final summary: {SUMMARY_JSON} Done.");
    let summary = parse_executive_summary(&text).expect("embedded json");
    assert_eq!(summary.eta_to_resolution.as_deref(), Some("10:30"));
}

#[test]
fn regression_unparseable_output_yields_none() {
    assert_eq!(parse_executive_summary("Summary posted to Slack."), None);
    assert_eq!(parse_executive_summary("{ not json }"), None);
    assert_eq!(parse_executive_summary(r#"{"severity": "SEV-2"}"#), None);
}

#[test]
fn unit_context_lists_recent_events_per_channel() {
    let now = Local::now();
    let state = IncidentState::started_at(now - ChronoDuration::seconds(125));
    let metrics = state.take_appender(EventChannel::Metrics).expect("appender");
    for index in 0..12 {
        metrics.append(StreamEvent::new(
            EventChannel::Metrics,
            format!("10:00:{index:02}"),
            format!("metric {index}"),
        ));
    }
    state.begin_summary();
    state.begin_summary();
    state.record_feedback_request();
    state.begin_summary();

    let context = render_incident_context(&state, now, 10);

    assert!(context.contains("Incident duration: 2m 5s"));
    assert!(context.contains("Total events: 12"));
    assert!(context.contains("Current summary: #3"));
    assert!(context.contains("Last feedback request: summary #2 (1 summaries ago)"));
    assert!(context.contains("METRICS STREAM (Automated monitoring):"));
    assert!(!context.contains("metric 1\n"));
    assert!(context.contains("  [10:00:02] metric 2"));
    assert!(context.contains("  [10:00:11] metric 11"));
    assert!(context.contains("SLACK CHANNEL (#incident-response):\n  (no recent events)"));
    assert!(context.contains("ZOOM BRIDGE (Voice call transcript):\n  (no recent events)"));
}

#[test]
fn unit_postmortem_tool_is_opt_in() {
    let server = MockServer::start();
    let state = Arc::new(IncidentState::new());
    let llm = Arc::new(ScriptedLlm::new(Vec::new()));

    let default_agent = adapter(llm.clone(), state.clone(), &server, ReasoningConfig::default())
        .build_agent(Local::now());
    assert_eq!(
        default_agent.registered_tool_names(),
        [
            "create_incident_channel_with_state",
            "publish_exec_summary_to_slack",
            "request_team_feedback"
        ]
    );

    let exposed = adapter(
        llm,
        state,
        &server,
        ReasoningConfig {
            expose_postmortem_tool: true,
            ..ReasoningConfig::default()
        },
    )
    .build_agent(Local::now());
    assert!(exposed.has_tool("create_jira_and_confluence_postmortem"));
}

#[tokio::test]
async fn integration_generate_publishes_through_tool_and_returns_output() {
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("Executive Incident Summary #1");
        then.status(200)
            .json_body(json!({ "ok": true, "channel": "C123", "ts": "1.5" }));
    });
    let state = Arc::new(IncidentState::new());
    state.try_set_channel_id("C123");
    state.begin_summary();
    let llm = Arc::new(ScriptedLlm::new(vec![
        tool_call_response(
            "call-1",
            "publish_exec_summary_to_slack",
            json!({
                "markdown_content": "*:red_circle: Executive Incident Summary #1*",
                "channel_id": "C123"
            }),
        ),
        text_response(SUMMARY_JSON),
    ]));
    let adapter = adapter(llm.clone(), state.clone(), &server, ReasoningConfig::default());

    let output = adapter.generate(1, "C123").await.expect("generate");

    assert_eq!(output, SUMMARY_JSON);
    post.assert_calls(1);
    assert_eq!(llm.request_count(), 2);
    let requests = llm.requests.lock().expect("requests lock");
    let first = &requests[0];
    assert_eq!(first.messages[0].role, MessageRole::System);
    assert!(first.messages[0]
        .text_content()
        .contains("=== CURRENT INCIDENT CONTEXT ==="));
    let task = first.messages[1].text_content();
    assert!(task.contains("executive summary #1"));
    assert!(task.contains("Incident channel id: C123"));
}

#[tokio::test]
async fn regression_request_budget_is_enforced() {
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(200)
            .json_body(json!({ "ok": true, "channel": "C123", "ts": "1.5" }));
    });
    let state = Arc::new(IncidentState::new());
    state.try_set_channel_id("C123");
    let looping = (0..3)
        .map(|index| {
            tool_call_response(
                &format!("call-{index}"),
                "publish_exec_summary_to_slack",
                json!({ "markdown_content": "*again*", "channel_id": "C123" }),
            )
        })
        .collect();
    let llm = Arc::new(ScriptedLlm::new(looping));
    let adapter = adapter(
        llm.clone(),
        state,
        &server,
        ReasoningConfig {
            request_limit: 2,
            ..ReasoningConfig::default()
        },
    );

    let error = adapter.generate(1, "C123").await.expect_err("budget");

    assert!(matches!(error, AgentError::RequestLimitExceeded(2)));
    assert_eq!(llm.request_count(), 2);
    post.assert_calls(2);
}
