//! Builds the per-tick agent run: context rendering, tool scoping, and
//! best-effort display of what the model produced.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigil_agent_core::{extract_json_payload, Agent, AgentConfig, AgentError, AgentEvent};
use vigil_ai::LlmClient;
use vigil_core::format_duration_compact;
use vigil_incident::{EventChannel, IncidentState};
use vigil_slack::SlackApiClient;

use crate::postmortem::TerminalAction;
use crate::prompts::{incident_monitor_prompt, render_summary_task};
use crate::scheduler::SummaryGenerator;
use crate::tools::{
    CreateIncidentChannelTool, CreatePostmortemTool, PublishSummaryTool, RequestTeamFeedbackTool,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningConfig {
    pub model: String,
    /// Model requests allowed per tick, tool round-trips included.
    pub request_limit: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub expose_postmortem_tool: bool,
    pub context_events_per_channel: usize,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".to_string(),
            request_limit: 20,
            temperature: Some(0.2),
            max_tokens: None,
            expose_postmortem_tool: false,
            context_events_per_channel: 10,
        }
    }
}

/// The structured summary the task prompt asks the model to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub timestamp: String,
    pub incident_duration: String,
    pub current_status: String,
    pub customer_impact: String,
    #[serde(default)]
    pub key_actions_taken: Vec<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub eta_to_resolution: Option<String>,
    pub severity: String,
}

fn greedy_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
}

/// Pulls an [`ExecutiveSummary`] out of free-form model output, if one is there.
pub fn parse_executive_summary(text: &str) -> Option<ExecutiveSummary> {
    if let Ok(value) = extract_json_payload(text) {
        if let Ok(summary) = serde_json::from_value(value) {
            return Some(summary);
        }
    }
    let candidate = greedy_object_pattern()?.find(text)?;
    serde_json::from_str(candidate.as_str()).ok()
}

/// Logs the model's final output. Never fails.
pub fn log_summary_output(summary_number: u64, text: &str) {
    match parse_executive_summary(text) {
        Some(summary) => info!(
            summary_number,
            timestamp = %summary.timestamp,
            duration = %summary.incident_duration,
            severity = %summary.severity,
            status = %summary.current_status,
            impact = %summary.customer_impact,
            actions = %summary.key_actions_taken.join("; "),
            root_cause = summary.root_cause.as_deref().unwrap_or("unknown"),
            eta = summary.eta_to_resolution.as_deref().unwrap_or("unknown"),
            "executive summary"
        ),
        None => info!(summary_number, output = %text.trim(), "executive summary (raw output)"),
    }
}

/// Context block appended to the system prompt on every tick.
pub fn render_incident_context(
    state: &IncidentState,
    now: DateTime<Local>,
    events_per_channel: usize,
) -> String {
    let summary_count = state.summary_count();
    let last_feedback = state.last_feedback_request_summary();
    let feedback_line = if last_feedback == 0 {
        "Last feedback request: never".to_string()
    } else {
        format!(
            "Last feedback request: summary #{last_feedback} ({} summaries ago)",
            state.summaries_since_feedback()
        )
    };

    let mut lines = vec![
        "=== CURRENT INCIDENT CONTEXT ===".to_string(),
        format!(
            "Incident duration: {}",
            format_duration_compact(state.incident_duration(now))
        ),
        format!("Total events: {}", state.total_events()),
        format!("Current summary: #{summary_count}"),
        feedback_line,
    ];
    for channel in EventChannel::ALL {
        lines.push(String::new());
        lines.push(format!("{}:", channel.heading()));
        let events = state.last_events(channel, events_per_channel);
        if events.is_empty() {
            lines.push("  (no recent events)".to_string());
        }
        lines.extend(
            events
                .iter()
                .map(|event| format!("  [{}] {}", event.timestamp, event.message)),
        );
    }
    lines.join("\n")
}

fn render_current_state(state: &IncidentState, channel_id: &str) -> String {
    [
        "=== CURRENT STATE ===".to_string(),
        format!("Incident channel id: {channel_id}"),
        format!("Summary number: {}", state.summary_count()),
        format!(
            "Summaries since last feedback request: {}",
            state.summaries_since_feedback()
        ),
        format!(
            "Events: metrics={} slack={} zoom={}",
            state.event_count(EventChannel::Metrics),
            state.event_count(EventChannel::Chat),
            state.event_count(EventChannel::Transcript)
        ),
    ]
    .join("\n")
}

/// Runs one bounded agent invocation per summary.
pub struct ReasoningAdapter {
    llm: Arc<dyn LlmClient>,
    state: Arc<IncidentState>,
    slack: SlackApiClient,
    terminal: Arc<dyn TerminalAction>,
    config: ReasoningConfig,
}

impl ReasoningAdapter {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        state: Arc<IncidentState>,
        slack: SlackApiClient,
        terminal: Arc<dyn TerminalAction>,
        config: ReasoningConfig,
    ) -> Self {
        Self {
            llm,
            state,
            slack,
            terminal,
            config,
        }
    }

    /// A fresh agent scoped to the incident tools.
    pub fn build_agent(&self, now: DateTime<Local>) -> Agent {
        let system_prompt = format!(
            "{}\n\n{}",
            incident_monitor_prompt().trim_end(),
            render_incident_context(&self.state, now, self.config.context_events_per_channel)
        );
        let mut agent = Agent::new(
            self.llm.clone(),
            AgentConfig {
                agent_id: "vigil-summary".to_string(),
                model: self.config.model.clone(),
                system_prompt,
                request_limit: self.config.request_limit.max(1),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                ..AgentConfig::default()
            },
        );
        agent.register_tool(CreateIncidentChannelTool::new(
            self.state.clone(),
            self.slack.clone(),
        ));
        agent.register_tool(PublishSummaryTool::new(
            self.state.clone(),
            self.slack.clone(),
        ));
        agent.register_tool(RequestTeamFeedbackTool::new(
            self.state.clone(),
            self.slack.clone(),
        ));
        if self.config.expose_postmortem_tool {
            agent.register_tool(CreatePostmortemTool::new(self.terminal.clone()));
        }
        agent.subscribe(|event| {
            if let AgentEvent::RequestEnd {
                request,
                tool_results,
                request_duration_ms,
                usage,
                ..
            } = event
            {
                debug!(
                    request,
                    tool_results,
                    request_duration_ms,
                    total_tokens = usage.total_tokens,
                    "summary agent request finished"
                );
            }
        });
        agent
    }
}

#[async_trait]
impl SummaryGenerator for ReasoningAdapter {
    async fn generate(&self, summary_number: u64, channel_id: &str) -> Result<String, AgentError> {
        let mut agent = self.build_agent(Local::now());
        let task = format!(
            "{}\n\n{}",
            render_summary_task(summary_number, channel_id).trim_end(),
            render_current_state(&self.state, channel_id)
        );
        let report = agent.run(task).await?;
        for call in &report.tool_calls {
            debug!(
                summary_number,
                tool = %call.name,
                is_error = call.is_error,
                result = %call.result_text,
                "summary agent tool call"
            );
        }
        info!(
            summary_number,
            requests = report.requests,
            tool_calls = report.tool_calls.len(),
            "summary agent finished"
        );
        log_summary_output(summary_number, &report.output);
        Ok(report.output)
    }
}

#[cfg(test)]
mod tests;
