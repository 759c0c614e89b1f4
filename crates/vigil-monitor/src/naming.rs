//! Incident name and one-line summary derived from recent conversation.

use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Deserialize;
use tracing::{debug, warn};
use vigil_agent_core::extract_json_payload;
use vigil_ai::{ChatRequest, LlmClient, Message};
use vigil_incident::Severity;
use vigil_slack::{sanitize_channel_name, MAX_CHANNEL_NAME_CHARS};

const MAX_SLUG_CHARS: usize = 50;
const CHANNEL_SUFFIX: &str = "-summary";
const MAX_SUMMARY_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentName {
    /// `incident-<YYYYMMDD-HHMM>-<slug>`.
    pub base_name: String,
    pub summary: String,
    /// False when the deterministic fallback was used.
    pub generated: bool,
}

impl IncidentName {
    /// Name of the dedicated Slack channel, `<base_name>-summary`. The base
    /// is sanitized and shortened so the suffix fits Slack's length limit.
    pub fn channel_name(&self) -> String {
        let base = sanitize_channel_name(&self.base_name);
        let base = base
            .get(..MAX_CHANNEL_NAME_CHARS - CHANNEL_SUFFIX.len())
            .unwrap_or(&base)
            .trim_end_matches('-');
        format!("{base}{CHANNEL_SUFFIX}")
    }
}

#[derive(Debug, Deserialize)]
struct NamingReply {
    #[serde(default)]
    channel_name: String,
    #[serde(default)]
    summary: String,
}

/// Asks the model for a short incident name; any failure falls back to a
/// timestamp-based name.
#[derive(Clone)]
pub struct IncidentNamer {
    client: Option<Arc<dyn LlmClient>>,
    model: String,
}

impl IncidentNamer {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            model: model.into(),
        }
    }

    /// A namer that always uses the fallback.
    pub fn offline() -> Self {
        Self {
            client: None,
            model: String::new(),
        }
    }

    pub async fn name(
        &self,
        conversation: &[String],
        severity: Severity,
        now: DateTime<Local>,
    ) -> IncidentName {
        let stamp = now.format("%Y%m%d-%H%M").to_string();
        let fallback = fallback_name(&stamp, severity);
        let Some(client) = self.client.as_ref() else {
            return fallback;
        };
        if conversation.is_empty() {
            return fallback;
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(naming_prompt(conversation))],
            tools: Vec::new(),
            tool_choice: None,
            json_mode: true,
            max_tokens: Some(200),
            temperature: Some(0.3),
        };
        let response = match client.complete(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "incident naming request failed; using fallback name");
                return fallback;
            }
        };
        let text = response.message.text_content();
        let reply = extract_json_payload(&text)
            .and_then(|value| {
                serde_json::from_value::<NamingReply>(value).map_err(|error| error.to_string())
            });
        let reply = match reply {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    error = %error,
                    "incident naming reply was not usable JSON; using fallback name"
                );
                return fallback;
            }
        };

        let slug = slugify_description(&reply.channel_name);
        let summary = reply.summary.trim();
        if slug.is_empty() || summary.is_empty() {
            debug!("incident naming reply was empty; using fallback name");
            return fallback;
        }
        IncidentName {
            base_name: format!("incident-{stamp}-{slug}"),
            summary: summary.chars().take(MAX_SUMMARY_CHARS).collect(),
            generated: true,
        }
    }
}

pub fn fallback_name(stamp: &str, severity: Severity) -> IncidentName {
    IncidentName {
        base_name: format!("incident-{stamp}-{}", severity.slug()),
        summary: format!(
            "{} incident declared based on recent conversation",
            severity.short_label()
        ),
        generated: false,
    }
}

/// Lowercases, turns spaces into hyphens, keeps alphanumerics and hyphens,
/// caps at 50 chars, and trims edge hyphens.
pub fn slugify_description(raw: &str) -> String {
    let slug = raw
        .trim()
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '-')
        .take(MAX_SLUG_CHARS)
        .collect::<String>();
    slug.trim_matches('-').to_string()
}

fn naming_prompt(conversation: &[String]) -> String {
    format!(
        "Read this recent Slack conversation about a production incident and return:\n\
         1. a 2-4 word description for the incident channel name (lowercase, hyphenated, \
         specific, e.g. \"api-gateway-down\" or \"payment-service-error\")\n\
         2. a one-sentence summary of what is happening and who is affected \
         (at most 150 characters)\n\n\
         Conversation:\n{}\n\n\
         Reply with only this JSON object:\n\
         {{\"channel_name\": \"your-channel-name\", \"summary\": \"Your one-line summary\"}}",
        conversation.join("\n")
    )
}
