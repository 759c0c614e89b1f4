//! Terminal post-mortem action: one Jira issue and one Confluence page per
//! incident, guarded so it completes at most once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{error, info, warn};
use vigil_atlassian::{AtlassianClient, ConfluencePageRef, JiraIssueRef};
use vigil_core::format_duration_compact;
use vigil_incident::{ClaimFlag, EventChannel, IncidentState};

const TIMELINE_EVENTS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostmortemOutcome {
    Created {
        jira: JiraIssueRef,
        page: ConfluencePageRef,
        message: String,
    },
    /// The flags were already set; nothing was done.
    AlreadyCompleted,
    /// Another caller holds the in-flight claim.
    InProgress,
    /// Nothing was marked complete; a later trigger may retry.
    Failed { error: String },
}

impl PostmortemOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, PostmortemOutcome::Created { .. })
    }

    /// Text suitable for Slack or a tool result.
    pub fn message(&self) -> String {
        match self {
            PostmortemOutcome::Created { message, .. } => message.clone(),
            PostmortemOutcome::AlreadyCompleted => {
                "✅ Post-mortem documentation already exists for this incident.".to_string()
            }
            PostmortemOutcome::InProgress => {
                "⏳ Post-mortem documentation is already being created.".to_string()
            }
            PostmortemOutcome::Failed { error } => {
                format!("❌ Post-mortem creation failed: {error}")
            }
        }
    }
}

/// Entry point shared by the scheduler's resolution checks and the agent tool.
#[async_trait]
pub trait TerminalAction: Send + Sync {
    async fn run(&self) -> PostmortemOutcome;
}

pub struct PostmortemAction {
    state: Arc<IncidentState>,
    atlassian: Option<AtlassianClient>,
    in_flight: ClaimFlag,
    jira_issue: Mutex<Option<JiraIssueRef>>,
}

impl PostmortemAction {
    pub fn new(state: Arc<IncidentState>, atlassian: Option<AtlassianClient>) -> Self {
        Self {
            state,
            atlassian,
            in_flight: ClaimFlag::new(),
            jira_issue: Mutex::new(None),
        }
    }

    fn is_completed(&self) -> bool {
        self.state.incident_resolved.is_set() || self.state.jira_tickets_created.is_set()
    }

    async fn create_documents(&self, client: &AtlassianClient) -> PostmortemOutcome {
        let document = PostmortemDocument::render(&self.state, Local::now());

        let cached = lock_or_recover(&self.jira_issue).clone();
        let jira = match cached {
            Some(jira) => jira,
            None => match client
                .create_jira_issue(&document.jira_summary, &document.jira_description)
                .await
            {
                Ok(jira) => {
                    info!(issue = %jira.key, "post-mortem jira issue created");
                    *lock_or_recover(&self.jira_issue) = Some(jira.clone());
                    jira
                }
                Err(error) => return failed("jira issue", error),
            },
        };

        let body = document.confluence_body(&jira);
        let page = match client.create_confluence_page(&document.title, &body).await {
            Ok(page) => page,
            Err(error) => return failed("confluence page", error),
        };
        info!(page_id = %page.id, url = %page.url, "post-mortem confluence page created");

        self.state.jira_tickets_created.try_set();
        self.state.confluence_postmortem_created.try_set();
        self.state.incident_resolved.try_set();

        let message = format!(
            "📚 *Post-mortem documentation created*\n\
             • Jira: <{}|{}>\n\
             • Confluence: <{}|{}>",
            jira.url, jira.key, page.url, page.title
        );
        PostmortemOutcome::Created {
            jira,
            page,
            message,
        }
    }
}

#[async_trait]
impl TerminalAction for PostmortemAction {
    async fn run(&self) -> PostmortemOutcome {
        if self.is_completed() {
            return PostmortemOutcome::AlreadyCompleted;
        }
        let Some(_claim) = self.in_flight.try_claim() else {
            return PostmortemOutcome::InProgress;
        };
        // A previous holder may have finished between the check and the claim.
        if self.is_completed() {
            return PostmortemOutcome::AlreadyCompleted;
        }
        let Some(client) = self.atlassian.as_ref() else {
            warn!("post-mortem requested but jira/confluence are not configured");
            return PostmortemOutcome::Failed {
                error: "jira/confluence integration is not configured".to_string(),
            };
        };
        self.create_documents(client).await
    }
}

fn failed(what: &str, error: anyhow::Error) -> PostmortemOutcome {
    let rendered = format!("{error:#}");
    error!(target_document = what, error = %rendered, "post-mortem creation failed");
    PostmortemOutcome::Failed {
        error: format!("could not create {what}"),
    }
}

/// Text content of the post-mortem, rendered from a state snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostmortemDocument {
    pub title: String,
    pub jira_summary: String,
    pub jira_description: String,
    severity: String,
    duration: String,
    summary: String,
    counts: Vec<(EventChannel, usize)>,
    latest_summary: Option<String>,
    timeline: Vec<(String, String, String)>,
}

impl PostmortemDocument {
    pub fn render(state: &IncidentState, now: DateTime<Local>) -> Self {
        let declaration = state.declaration();
        let severity = declaration
            .as_ref()
            .map(|declaration| declaration.severity.short_label().to_string())
            .unwrap_or_else(|| "SEV-?".to_string());
        let summary = declaration
            .as_ref()
            .map(|declaration| declaration.summary.clone())
            .filter(|summary| !summary.trim().is_empty())
            .unwrap_or_else(|| "Production incident".to_string());
        let duration = format_duration_compact(state.incident_duration(now));
        let counts = EventChannel::ALL
            .iter()
            .map(|channel| (*channel, state.event_count(*channel)))
            .collect::<Vec<_>>();
        let all_events = state.all_events();
        let timeline = all_events[all_events.len().saturating_sub(TIMELINE_EVENTS)..]
            .iter()
            .map(|event| {
                (
                    event.timestamp.clone(),
                    event.channel.label().to_string(),
                    event.message.clone(),
                )
            })
            .collect::<Vec<_>>();
        let latest_summary = state.latest_published_summary();

        let title = format!(
            "Post-mortem: {summary} ({})",
            state.incident_start_time().format("%Y-%m-%d %H:%M")
        );
        let jira_summary = format!("[{severity}] Post-mortem: {summary}");
        let mut jira_description = format!(
            "Incident summary: {summary}\nSeverity: {severity}\nDuration: {duration}\n\n\
             Events tracked:\n"
        );
        for (channel, count) in &counts {
            jira_description.push_str(&format!("- {channel}: {count}\n"));
        }
        if let Some(latest) = latest_summary.as_deref() {
            jira_description.push_str(&format!("\nLatest executive summary:\n{latest}\n"));
        }

        Self {
            title,
            jira_summary,
            jira_description,
            severity,
            duration,
            summary,
            counts,
            latest_summary,
            timeline,
        }
    }

    /// Confluence storage-format body linking back to the Jira issue.
    pub fn confluence_body(&self, jira: &JiraIssueRef) -> String {
        let mut body = String::new();
        body.push_str(&format!("<h1>{}</h1>", escape_html(&self.title)));
        body.push_str("<table><tbody>");
        for (label, value) in [
            ("Summary", self.summary.as_str()),
            ("Severity", self.severity.as_str()),
            ("Duration", self.duration.as_str()),
        ] {
            body.push_str(&format!(
                "<tr><th>{label}</th><td>{}</td></tr>",
                escape_html(value)
            ));
        }
        body.push_str(&format!(
            "<tr><th>Jira</th><td><a href=\"{}\">{}</a></td></tr>",
            escape_html(&jira.url),
            escape_html(&jira.key)
        ));
        body.push_str("</tbody></table>");

        body.push_str("<h2>Events tracked</h2><ul>");
        for (channel, count) in &self.counts {
            body.push_str(&format!("<li>{}: {count}</li>", escape_html(channel.heading())));
        }
        body.push_str("</ul>");

        if let Some(latest) = self.latest_summary.as_deref() {
            body.push_str("<h2>Latest executive summary</h2>");
            body.push_str(&format!("<pre>{}</pre>", escape_html(latest)));
        }

        body.push_str("<h2>Timeline</h2>");
        if self.timeline.is_empty() {
            body.push_str("<p>No events were recorded.</p>");
        } else {
            body.push_str("<ul>");
            for (timestamp, channel, message) in &self.timeline {
                body.push_str(&format!(
                    "<li><code>{}</code> [{}] {}</li>",
                    escape_html(timestamp),
                    escape_html(channel),
                    escape_html(message)
                ));
            }
            body.push_str("</ul>");
        }

        body.push_str(
            "<h2>Follow-up</h2><ul><li>Root cause analysis</li>\
             <li>Customer communication review</li><li>Preventive action items</li></ul>",
        );
        body
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
