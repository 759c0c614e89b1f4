//! Tools the summary agent may call. Each validates its arguments against the
//! shared state before touching Slack or Atlassian.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};
use vigil_agent_core::{AgentTool, ToolExecutionResult};
use vigil_ai::ToolDefinition;
use vigil_incident::IncidentState;
use vigil_slack::{sanitize_channel_name, SlackApiClient};

use crate::postmortem::TerminalAction;
use crate::provisioning::{create_or_reuse_channel, invite_workspace_humans};

pub const CREATE_CHANNEL_TOOL: &str = "create_incident_channel_with_state";
pub const PUBLISH_SUMMARY_TOOL: &str = "publish_exec_summary_to_slack";
pub const REQUEST_FEEDBACK_TOOL: &str = "request_team_feedback";
pub const CREATE_POSTMORTEM_TOOL: &str = "create_jira_and_confluence_postmortem";

/// True for ids that look like an unresolved template variable rather than a
/// Slack channel id.
pub fn is_placeholder_channel_id(channel_id: &str) -> bool {
    let trimmed = channel_id.trim();
    if trimmed.is_empty() || trimmed.starts_with(['$', '{', '<']) {
        return true;
    }
    let upper = trimmed.to_ascii_uppercase();
    upper.contains("PREV") || upper.contains("CHANNEL")
}

fn required_string(arguments: &Value, key: &str) -> Result<String, String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(|value| value.to_string())
        .ok_or_else(|| format!("missing required string argument '{key}'"))
}

fn optional_string(arguments: &Value, key: &str) -> String {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn string_list(arguments: &Value, key: &str) -> Result<Vec<String>, String> {
    let items = arguments
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing required array argument '{key}'"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|text| text.trim().to_string())
                .ok_or_else(|| format!("every entry of '{key}' must be a string"))
        })
        .filter(|item| !matches!(item, Ok(text) if text.is_empty()))
        .collect()
}

fn tool_error(message: impl Into<String>) -> ToolExecutionResult {
    ToolExecutionResult::error(json!({ "error": message.into() }))
}

pub struct CreateIncidentChannelTool {
    state: Arc<IncidentState>,
    slack: SlackApiClient,
}

impl CreateIncidentChannelTool {
    pub fn new(state: Arc<IncidentState>, slack: SlackApiClient) -> Self {
        Self { state, slack }
    }

    fn already_linked(&self) -> Option<ToolExecutionResult> {
        let existing = self.state.channel_id()?;
        Some(ToolExecutionResult::ok(json!(format!(
            "✅ Incident channel already exists (ID: {existing}). Using existing channel."
        ))))
    }
}

#[async_trait]
impl AgentTool for CreateIncidentChannelTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: CREATE_CHANNEL_TOOL.to_string(),
            description: "Create the Slack channel for this incident and link it to the \
                          incident state. Does nothing when a channel is already linked."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "channel_name": {
                        "type": "string",
                        "description": "Lowercase channel name using hyphens"
                    },
                    "topic": { "type": "string" },
                    "purpose": { "type": "string" }
                },
                "required": ["channel_name"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        if let Some(result) = self.already_linked() {
            return result;
        }
        let Some(claim) = self.state.try_claim_channel_provisioning() else {
            info!("channel tool skipped; incident channel is being provisioned");
            return ToolExecutionResult::ok(json!(
                "⏳ The incident channel is being created by a declaration right now. \
                 Do not create another one; it will be linked shortly."
            ));
        };
        if let Some(result) = self.already_linked() {
            return result;
        }

        let declaration = self.state.declaration();
        if let Some((channel_id, channel_name)) = declaration.as_ref().and_then(|declaration| {
            declaration
                .channel_id
                .clone()
                .map(|id| (id, declaration.channel_name.clone()))
        }) {
            self.state.try_set_channel_id(channel_id.clone());
            let linked = self.state.channel_id().unwrap_or(channel_id.as_str());
            return ToolExecutionResult::ok(json!(format!(
                "✅ Using incident channel created during declaration: #{channel_name}\n\
                 Channel ID: {linked}\nAll future summaries will be posted here."
            )));
        }

        let requested = match declaration {
            Some(declaration) if !declaration.channel_name.trim().is_empty() => {
                declaration.channel_name
            }
            _ => match required_string(&arguments, "channel_name") {
                Ok(name) => name,
                Err(error) => return tool_error(error),
            },
        };
        let name = sanitize_channel_name(&requested);
        if name.is_empty() {
            return tool_error(format!("channel name '{requested}' has no usable characters"));
        }

        let provisioned = match create_or_reuse_channel(&self.slack, &name).await {
            Ok(provisioned) => provisioned,
            Err(error) => {
                warn!(channel_name = %name, error = %format!("{error:#}"), "channel tool failed");
                return tool_error(format!("could not create or find channel '{name}'"));
            }
        };
        let channel = provisioned.channel;
        if !self.state.try_set_channel_id(channel.id.clone()) {
            return tool_error(format!("channel id '{}' could not be linked", channel.id));
        }
        drop(claim);
        info!(channel_id = %channel.id, "incident channel linked by agent tool");

        let topic = optional_string(&arguments, "topic");
        if !topic.is_empty() {
            if let Err(error) = self.slack.set_topic(&channel.id, &topic).await {
                warn!(
                    channel_id = %channel.id,
                    error = %format!("{error:#}"),
                    "could not set topic"
                );
            }
        }
        let purpose = optional_string(&arguments, "purpose");
        if !purpose.is_empty() {
            if let Err(error) = self.slack.set_purpose(&channel.id, &purpose).await {
                warn!(
                    channel_id = %channel.id,
                    error = %format!("{error:#}"),
                    "could not set purpose"
                );
            }
        }
        let invited = invite_workspace_humans(&self.slack, &channel.id).await;

        let verb = if provisioned.created { "Created" } else { "Linked existing" };
        ToolExecutionResult::ok(json!(format!(
            "✅ {verb} channel #{} (ID: {}). Invited {invited} members. \
             Future summaries will be posted here.",
            channel.name, channel.id
        )))
    }
}

pub struct PublishSummaryTool {
    state: Arc<IncidentState>,
    slack: SlackApiClient,
}

impl PublishSummaryTool {
    pub fn new(state: Arc<IncidentState>, slack: SlackApiClient) -> Self {
        Self { state, slack }
    }
}

#[async_trait]
impl AgentTool for PublishSummaryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: PUBLISH_SUMMARY_TOOL.to_string(),
            description: "Post an executive summary, verbatim, to the incident Slack channel"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "markdown_content": {
                        "type": "string",
                        "description": "Slack markdown summary"
                    },
                    "channel_id": {
                        "type": "string",
                        "description": "Literal Slack channel id, e.g. C0123456789"
                    }
                },
                "required": ["markdown_content", "channel_id"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let channel_id = arguments
            .get("channel_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if is_placeholder_channel_id(&channel_id) {
            return tool_error(format!(
                "Invalid channel_id '{channel_id}'. Pass the actual incident channel id \
                 (current incident channel: {}).",
                self.state.channel_id().unwrap_or("not set")
            ));
        }
        let markdown = match required_string(&arguments, "markdown_content") {
            Ok(markdown) if !markdown.trim().is_empty() => markdown,
            Ok(_) => return tool_error("markdown_content must not be empty"),
            Err(error) => return tool_error(error),
        };

        match self.slack.post_message(&channel_id, &markdown, true).await {
            Ok(posted) => {
                self.state.record_published_summary(markdown);
                info!(channel_id = %posted.channel, ts = %posted.ts, "executive summary published");
                ToolExecutionResult::ok(json!(format!(
                    "✅ Posted executive summary to channel {} (ts: {})",
                    posted.channel, posted.ts
                )))
            }
            Err(error) => {
                warn!(
                    channel_id = %channel_id,
                    error = %format!("{error:#}"),
                    "summary publish failed"
                );
                tool_error(format!("could not post to channel {channel_id}"))
            }
        }
    }
}

pub struct RequestTeamFeedbackTool {
    state: Arc<IncidentState>,
    slack: SlackApiClient,
}

impl RequestTeamFeedbackTool {
    pub fn new(state: Arc<IncidentState>, slack: SlackApiClient) -> Self {
        Self { state, slack }
    }

    async fn human_members(&self, channel_id: &str) -> anyhow::Result<Vec<String>> {
        let mut humans = Vec::new();
        for member in self.slack.channel_members(channel_id).await? {
            match self.slack.user_info(&member).await {
                Ok(user) if user.is_human() => humans.push(member),
                Ok(_) => {}
                Err(error) => {
                    warn!(user_id = %member, error = %format!("{error:#}"), "skipping member");
                }
            }
        }
        Ok(humans)
    }
}

/// Assigns question `i` to member `i mod members.len()`.
pub fn render_feedback_request(summary: &str, questions: &[String], members: &[String]) -> String {
    let mut lines = vec![
        "*🔔 Team Update Requested*".to_string(),
        String::new(),
        format!("📊 *Current Status:* {summary}"),
        String::new(),
        "*Questions for the team:*".to_string(),
    ];
    if !members.is_empty() {
        for (index, question) in questions.iter().enumerate() {
            let member = &members[index % members.len()];
            lines.push(format!(">>> <@{member}> : {question}"));
        }
    }
    lines.join("\n")
}

#[async_trait]
impl AgentTool for RequestTeamFeedbackTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: REQUEST_FEEDBACK_TOOL.to_string(),
            description: "Tag incident channel members with specific questions. Use sparingly."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string", "description": "Brief current status" },
                    "specific_questions": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1
                    }
                },
                "required": ["summary", "specific_questions"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(channel_id) = self.state.channel_id().map(str::to_string) else {
            return tool_error(
                "Cannot request feedback: no incident channel yet. Wait for incident declaration.",
            );
        };
        let summary = match required_string(&arguments, "summary") {
            Ok(summary) => summary,
            Err(error) => return tool_error(error),
        };
        let questions = match string_list(&arguments, "specific_questions") {
            Ok(questions) if !questions.is_empty() => questions,
            Ok(_) => return tool_error("specific_questions must contain at least one question"),
            Err(error) => return tool_error(error),
        };

        let members = match self.human_members(&channel_id).await {
            Ok(members) => members,
            Err(error) => {
                warn!(
                    channel_id = %channel_id,
                    error = %format!("{error:#}"),
                    "could not list channel members"
                );
                return tool_error("could not fetch incident channel members");
            }
        };
        if members.is_empty() {
            return tool_error("no human team members found in the incident channel");
        }

        let message = render_feedback_request(&summary, &questions, &members);
        match self.slack.post_message(&channel_id, &message, true).await {
            Ok(posted) => {
                let at_summary = self.state.record_feedback_request();
                let tagged = members.len().min(questions.len());
                info!(
                    channel_id = %channel_id,
                    tagged,
                    questions = questions.len(),
                    at_summary,
                    "team feedback requested"
                );
                ToolExecutionResult::ok(json!(format!(
                    "✅ Requested team feedback in channel {channel_id}: tagged {tagged} members \
                     with {} questions (ts: {})",
                    questions.len(),
                    posted.ts
                )))
            }
            Err(error) => {
                warn!(
                    channel_id = %channel_id,
                    error = %format!("{error:#}"),
                    "feedback request failed"
                );
                tool_error("could not post the feedback request")
            }
        }
    }
}

pub struct CreatePostmortemTool {
    action: Arc<dyn TerminalAction>,
}

impl CreatePostmortemTool {
    pub fn new(action: Arc<dyn TerminalAction>) -> Self {
        Self { action }
    }
}

#[async_trait]
impl AgentTool for CreatePostmortemTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: CREATE_POSTMORTEM_TOOL.to_string(),
            description: "Create the Jira issue and Confluence post-mortem page once the \
                          incident is resolved"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        let outcome = self.action.run().await;
        let message = outcome.message();
        match outcome {
            crate::postmortem::PostmortemOutcome::Failed { .. } => tool_error(message),
            _ => ToolExecutionResult::ok(json!(message)),
        }
    }
}
