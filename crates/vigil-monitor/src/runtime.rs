//! Wires the ingestors, Socket Mode and the summary scheduler into one task
//! group sharing a single [`IncidentState`].

use std::{fmt, sync::Arc};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vigil_ai::LlmClient;
use vigil_atlassian::{AtlassianClient, AtlassianConfig};
use vigil_incident::IncidentState;
use vigil_slack::{
    run_socket_mode, token_warnings, ReconnectPolicy, SlackApiClient, SlackMessageEvent,
    SlashCommandPayload, SocketModeHandler,
};

use crate::chat_feed::{resolve_channel_id, SlackChatFeed};
use crate::declare::DeclareIncidentHandler;
use crate::ingest::{ingest_feed, StreamFeed};
use crate::naming::IncidentNamer;
use crate::postmortem::PostmortemAction;
use crate::reasoning::{ReasoningAdapter, ReasoningConfig};
use crate::scheduler::{SchedulerConfig, SummaryScheduler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackSettings {
    pub api_base: String,
    pub bot_token: String,
    pub app_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl SlackSettings {
    pub fn client(&self) -> Result<SlackApiClient> {
        SlackApiClient::new(
            self.api_base.clone(),
            self.app_token.clone(),
            self.bot_token.clone(),
            self.request_timeout_ms,
            self.retry_max_attempts,
            self.retry_base_delay_ms,
        )
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub stream_base_url: String,
    pub slack: SlackSettings,
    /// When set, chat events come from this Slack channel instead of the
    /// `team` stream.
    pub monitor_channel: Option<String>,
    pub context_message_count: usize,
    pub scheduler: SchedulerConfig,
    pub reasoning: ReasoningConfig,
    pub atlassian: Option<AtlassianConfig>,
    pub reconnect: ReconnectPolicy,
}

/// Routes Socket Mode traffic to the command handler and the chat feed.
pub struct MonitorSocketHandler {
    declare: DeclareIncidentHandler,
    chat: Option<SlackChatFeed>,
}

impl MonitorSocketHandler {
    pub fn new(declare: DeclareIncidentHandler, chat: Option<SlackChatFeed>) -> Self {
        Self { declare, chat }
    }
}

#[async_trait]
impl SocketModeHandler for MonitorSocketHandler {
    async fn on_slash_command(&self, command: SlashCommandPayload) {
        let outcome = self.declare.handle(&command).await;
        debug!(command = %command.command, outcome = ?outcome, "slash command handled");
    }

    async fn on_message(&self, event: SlackMessageEvent) {
        if let Some(chat) = &self.chat {
            chat.accept(&event).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorTask {
    Ingest(StreamFeed),
    SocketMode,
    Scheduler,
}

impl fmt::Display for MonitorTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorTask::Ingest(feed) => write!(f, "{feed} ingestor"),
            MonitorTask::SocketMode => f.write_str("slack socket mode"),
            MonitorTask::Scheduler => f.write_str("summary scheduler"),
        }
    }
}

fn connect_atlassian(config: Option<AtlassianConfig>) -> Option<AtlassianClient> {
    let Some(config) = config else {
        info!("jira/confluence not configured; post-mortems will be reported as failed");
        return None;
    };
    match AtlassianClient::new(config) {
        Ok(client) => Some(client),
        Err(error) => {
            warn!(error = %format!("{error:#}"), "jira/confluence client unavailable");
            None
        }
    }
}

/// Runs until Ctrl-C, the incident closes, or Socket Mode gives up.
///
/// An ingestor that stops is logged and the rest keep running.
pub async fn run_monitor(
    config: MonitorConfig,
    llm: Arc<dyn LlmClient>,
    state: Arc<IncidentState>,
) -> Result<()> {
    for warning in token_warnings(&config.slack.bot_token, Some(&config.slack.app_token)) {
        warn!("{warning}");
    }
    let slack = config.slack.client()?;
    let identity = slack
        .auth_test()
        .await
        .context("slack bot token verification failed")?;
    info!(
        bot_user_id = %identity.user_id,
        team = identity.team.as_deref().unwrap_or("unknown"),
        "slack bot authenticated"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to create stream http client")?;
    let mut tasks: JoinSet<(MonitorTask, Result<()>)> = JoinSet::new();

    for feed in StreamFeed::ALL {
        if feed == StreamFeed::Team && config.monitor_channel.is_some() {
            continue;
        }
        let appender = state.take_appender(feed.channel())?;
        let http = http.clone();
        let base_url = config.stream_base_url.clone();
        tasks.spawn(async move {
            let result = ingest_feed(&http, &base_url, feed, appender).await;
            (MonitorTask::Ingest(feed), result)
        });
    }

    let chat = match config.monitor_channel.as_deref() {
        Some(identifier) => {
            let channel_id = resolve_channel_id(&slack, identifier).await?;
            info!(channel_id = %channel_id, "monitoring slack channel for chat events");
            let appender = state.take_appender(StreamFeed::Team.channel())?;
            Some(SlackChatFeed::new(slack.clone(), channel_id, appender))
        }
        None => None,
    };

    let declare = DeclareIncidentHandler::new(
        slack.clone(),
        state.clone(),
        IncidentNamer::new(Arc::clone(&llm), config.reasoning.model.clone()),
        config.context_message_count,
    );
    let handler = Arc::new(MonitorSocketHandler::new(declare, chat));
    let socket_client = slack.clone();
    let reconnect = config.reconnect;
    tasks.spawn(async move {
        let result = run_socket_mode(&socket_client, handler, reconnect).await;
        (MonitorTask::SocketMode, result)
    });

    let terminal = Arc::new(PostmortemAction::new(
        state.clone(),
        connect_atlassian(config.atlassian),
    ));
    let generator = Arc::new(ReasoningAdapter::new(
        llm,
        state.clone(),
        slack.clone(),
        terminal.clone(),
        config.reasoning,
    ));
    let scheduler = SummaryScheduler::new(state, config.scheduler, generator, terminal)
        .with_notifier(slack);
    tasks.spawn(async move {
        scheduler.run().await;
        (MonitorTask::Scheduler, Ok(()))
    });

    loop {
        let joined = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                tasks.abort_all();
                return Ok(());
            }
            joined = tasks.join_next() => joined,
        };
        let Some(joined) = joined else {
            return Ok(());
        };
        let (task, result) = joined.map_err(|error| anyhow!("monitor task panicked: {error}"))?;
        match (task, result) {
            (MonitorTask::Ingest(feed), Err(error)) => {
                error!(feed = %feed, error = %format!("{error:#}"), "event ingestor stopped");
            }
            (MonitorTask::Ingest(feed), Ok(())) => {
                info!(feed = %feed, "event ingestor finished");
            }
            (MonitorTask::Scheduler, _) => {
                info!("incident closed; shutting down monitor");
                tasks.abort_all();
                return Ok(());
            }
            (MonitorTask::SocketMode, result) => {
                tasks.abort_all();
                return result
                    .and_then(|()| Err(anyhow!("slack socket mode stopped unexpectedly")))
                    .with_context(|| format!("{task} failed"));
            }
        }
    }
}
