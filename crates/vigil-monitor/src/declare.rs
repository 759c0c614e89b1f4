//! `/declare-incident <sev1|sev2>`: provisions the incident channel and opens
//! the summary gate.

use std::{collections::HashMap, sync::Arc};

use chrono::Local;
use tracing::{info, warn};
use vigil_incident::{IncidentDeclaration, IncidentState, Severity};
use vigil_slack::{sanitize_channel_name, SlackApiClient, SlashCommandPayload};

use crate::naming::IncidentNamer;
use crate::provisioning::{create_or_reuse_channel, invite_workspace_humans};

pub const DECLARE_INCIDENT_COMMAND: &str = "/declare-incident";
const CONTEXT_PREVIEW_LINES: usize = 3;
const CONTEXT_PREVIEW_CHARS: usize = 100;

const DECLARE_USAGE: &str = "❌ Invalid severity level. Please use:\n\
• `/declare-incident sev1` - for critical incidents\n\
• `/declare-incident sev2` - for major incidents";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclareOutcome {
    /// Not a declare-incident command.
    Ignored,
    /// Invalid severity; the caller got an ephemeral usage message.
    Rejected,
    Declared {
        channel_id: String,
        channel_name: String,
        created: bool,
    },
    /// The gate was already open; no channel was touched.
    AlreadyDeclared { channel_id: String },
    /// Another declaration or the channel tool is provisioning right now.
    /// Nothing was sent to Slack.
    InProgress,
    /// No channel could be created or found. The gate stays closed.
    ChannelUnavailable { suggested_name: String },
}

pub struct DeclareIncidentHandler {
    slack: SlackApiClient,
    state: Arc<IncidentState>,
    namer: IncidentNamer,
    context_message_count: usize,
}

impl DeclareIncidentHandler {
    pub fn new(
        slack: SlackApiClient,
        state: Arc<IncidentState>,
        namer: IncidentNamer,
        context_message_count: usize,
    ) -> Self {
        Self {
            slack,
            state,
            namer,
            context_message_count,
        }
    }

    pub async fn handle(&self, command: &SlashCommandPayload) -> DeclareOutcome {
        if command.command.trim() != DECLARE_INCIDENT_COMMAND {
            return DeclareOutcome::Ignored;
        }
        info!(
            user_id = %command.user_id,
            channel_id = %command.channel_id,
            text = %command.text,
            "declare-incident received"
        );

        let severity = match command.text.parse::<Severity>() {
            Ok(severity) => severity,
            Err(error) => {
                info!(error = %error, "declare-incident rejected");
                if let Err(error) = self
                    .slack
                    .post_ephemeral(&command.channel_id, &command.user_id, DECLARE_USAGE)
                    .await
                {
                    warn!(error = %format!("{error:#}"), "could not send declare usage reply");
                }
                return DeclareOutcome::Rejected;
            }
        };

        if let Some(outcome) = self.already_declared(&command.channel_id).await {
            return outcome;
        }
        let Some(claim) = self.state.try_claim_channel_provisioning() else {
            info!("incident channel is being provisioned by another caller");
            return DeclareOutcome::InProgress;
        };
        if let Some(outcome) = self.already_declared(&command.channel_id).await {
            return outcome;
        }

        let context = self.recent_context(&command.channel_id).await;
        let declared_at = Local::now();
        let name = self.namer.name(&context, severity, declared_at).await;
        let suggested_name = sanitize_channel_name(&name.channel_name());
        info!(
            channel_name = %suggested_name,
            generated = name.generated,
            summary = %name.summary,
            "incident name chosen"
        );

        let provisioned = match create_or_reuse_channel(&self.slack, &suggested_name).await {
            Ok(provisioned) => Some(provisioned),
            Err(error) => {
                warn!(
                    channel_name = %suggested_name,
                    error = %format!("{error:#}"),
                    "incident channel provisioning failed"
                );
                None
            }
        };

        if let Some(provisioned) = provisioned.as_ref().filter(|p| p.created) {
            let channel_id = provisioned.channel.id.as_str();
            let topic = format!(
                "{severity} incident - Declared by <@{}>",
                command.user_id
            );
            if let Err(error) = self.slack.set_topic(channel_id, &topic).await {
                warn!(channel_id, error = %format!("{error:#}"), "could not set channel topic");
            }
            invite_workspace_humans(&self.slack, channel_id).await;
            let welcome = format!(
                "🚨 *Incident Response Channel* 🚨\n\n\
                 *Severity:* {severity}\n\
                 *Declared by:* <@{}>\n\
                 *Time:* {}\n\
                 *Summary:* {}\n\n\
                 _This channel will be used for executive summaries and incident coordination._",
                command.user_id,
                declared_at.format("%Y-%m-%d %H:%M:%S"),
                name.summary
            );
            if let Err(error) = self.slack.post_message(channel_id, &welcome, true).await {
                warn!(channel_id, error = %format!("{error:#}"), "could not post welcome message");
            }
        }

        let (channel, created) = match provisioned {
            Some(provisioned) => (Some(provisioned.channel), provisioned.created),
            None => (None, false),
        };
        if let Some(channel) = channel.as_ref() {
            if self.state.try_set_channel_id(channel.id.clone()) {
                info!(channel_id = %channel.id, "incident channel linked; summaries enabled");
            } else {
                warn!(
                    channel_id = %channel.id,
                    current = self.state.channel_id().unwrap_or_default(),
                    "incident channel was already linked; keeping the existing id"
                );
            }
        }
        self.state.record_declaration(IncidentDeclaration {
            severity,
            declared_by: command
                .user_name
                .clone()
                .unwrap_or_else(|| command.user_id.clone()),
            channel_name: channel
                .as_ref()
                .map(|channel| channel.name.clone())
                .unwrap_or_else(|| suggested_name.clone()),
            channel_id: channel.as_ref().map(|channel| channel.id.clone()),
            summary: name.summary.clone(),
            context: context.clone(),
            declared_at,
        });
        drop(claim);

        let header = format!(
            "🚨 *Incident Declared* 🚨\n\
             Severity: *{severity}*\n\
             Summary: _{}_\n\
             Declared by: <@{}>\n",
            name.summary, command.user_id
        );
        match channel {
            Some(channel) => {
                let message = format!(
                    "{header}Incident Channel: <#{}|{}>\n\
                     _AI monitoring will post executive summaries to the channel above._",
                    channel.id, channel.name
                );
                self.confirm(&command.channel_id, &message).await;
                DeclareOutcome::Declared {
                    channel_id: channel.id,
                    channel_name: channel.name,
                    created,
                }
            }
            None => {
                let message = format!(
                    "{header}Suggested Channel: `{suggested_name}`{}\n\
                     _⚠️ Channel creation failed. Please create manually._",
                    context_preview(&context)
                );
                self.confirm(&command.channel_id, &message).await;
                DeclareOutcome::ChannelUnavailable { suggested_name }
            }
        }
    }

    async fn already_declared(&self, reply_channel: &str) -> Option<DeclareOutcome> {
        let existing = self.state.channel_id()?.to_string();
        let message =
            format!("ℹ️ An incident is already active. Updates are posted in <#{existing}>.");
        self.confirm(reply_channel, &message).await;
        Some(DeclareOutcome::AlreadyDeclared {
            channel_id: existing,
        })
    }

    /// Recent human messages in the originating channel, oldest first, as
    /// `name: text` lines.
    async fn recent_context(&self, channel_id: &str) -> Vec<String> {
        let history = match self
            .slack
            .fetch_history(channel_id, self.context_message_count)
            .await
        {
            Ok(history) => history,
            Err(error) => {
                warn!(channel_id, error = %format!("{error:#}"), "could not fetch channel history");
                return Vec::new();
            }
        };

        let mut names: HashMap<String, String> = HashMap::new();
        let mut lines = Vec::new();
        for message in history.into_iter().rev() {
            if message.is_bot() || message.subtype.is_some() || message.text.trim().is_empty() {
                continue;
            }
            let author = match message.user.as_deref() {
                Some(user_id) => match names.get(user_id) {
                    Some(name) => name.clone(),
                    None => {
                        let name = match self.slack.user_info(user_id).await {
                            Ok(user) => user.display_label(),
                            Err(_) => user_id.to_string(),
                        };
                        names.insert(user_id.to_string(), name.clone());
                        name
                    }
                },
                None => "unknown".to_string(),
            };
            lines.push(format!("{author}: {}", message.text));
        }
        lines
    }

    async fn confirm(&self, channel_id: &str, message: &str) {
        if let Err(error) = self.slack.post_message(channel_id, message, true).await {
            warn!(channel_id, error = %format!("{error:#}"), "could not post declare confirmation");
        }
    }
}

fn context_preview(context: &[String]) -> String {
    if context.is_empty() {
        return String::new();
    }
    let mut preview = format!("\n\n*Context (last {} messages):*\n", context.len());
    for line in &context[context.len().saturating_sub(CONTEXT_PREVIEW_LINES)..] {
        if line.chars().count() > CONTEXT_PREVIEW_CHARS {
            let short = line.chars().take(CONTEXT_PREVIEW_CHARS).collect::<String>();
            preview.push_str(&format!("• {short}...\n"));
        } else {
            preview.push_str(&format!("• {line}\n"));
        }
    }
    preview
}
