use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use tracing::info;
use vigil_ai::{LlmClient, ModelRef, OpenAiClient, OpenAiConfig, Provider};
use vigil_atlassian::AtlassianConfig;
use vigil_incident::IncidentState;
use vigil_monitor::{run_monitor, MonitorConfig, ReasoningConfig, SchedulerConfig, SlackSettings};
use vigil_replay::{run_replay_server, ReplayConfig};
use vigil_slack::ReconnectPolicy;

use crate::cli_args::{AtlassianArgs, Cli, CliCommand, MonitorArgs, ReplayArgs};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        CliCommand::Monitor(args) => run_monitor_command(*args).await,
        CliCommand::Replay(args) => run_replay_server(replay_config(&args)).await,
    }
}

async fn run_monitor_command(args: MonitorArgs) -> Result<()> {
    let model = resolve_model(&args)?;
    let llm = build_llm_client(&args, &model)?;
    let config = monitor_config(&args, &model);
    info!(
        provider = model.provider.as_str(),
        model = %model.model,
        stream_base_url = %config.stream_base_url,
        monitor_channel = config.monitor_channel.as_deref().unwrap_or("none"),
        "starting incident monitor"
    );
    run_monitor(config, llm, Arc::new(IncidentState::new())).await
}

pub(crate) fn resolve_model(args: &MonitorArgs) -> Result<ModelRef> {
    match args.model.as_deref() {
        Some(raw) => ModelRef::parse(raw, args.provider)
            .with_context(|| format!("invalid --model value '{raw}'")),
        None => Ok(ModelRef::provider_default(args.provider)),
    }
}

pub(crate) fn provider_api_key(args: &MonitorArgs, provider: Provider) -> Result<String> {
    let key = match provider {
        Provider::Groq => args.groq_api_key.as_deref(),
        Provider::OpenAi => args.openai_api_key.as_deref(),
    }
    .map(str::trim)
    .filter(|key| !key.is_empty());
    match key {
        Some(key) => Ok(key.to_string()),
        None => bail!(
            "missing API key for provider '{}': set {}",
            provider.as_str(),
            provider.api_key_env()
        ),
    }
}

pub(crate) fn openai_config(args: &MonitorArgs, model: &ModelRef) -> Result<OpenAiConfig> {
    let api_base = args
        .api_base
        .as_deref()
        .map(str::trim)
        .filter(|base| !base.is_empty())
        .unwrap_or(model.provider.default_api_base())
        .to_string();
    Ok(OpenAiConfig {
        api_base,
        api_key: provider_api_key(args, model.provider)?,
        organization: None,
        request_timeout_ms: args.provider_timeout_ms,
        max_retries: args.provider_max_retries,
        retry_budget_ms: args.provider_retry_budget_ms,
        retry_jitter: args.provider_retry_jitter,
    })
}

fn build_llm_client(args: &MonitorArgs, model: &ModelRef) -> Result<Arc<dyn LlmClient>> {
    let client = OpenAiClient::new(openai_config(args, model)?)
        .with_context(|| format!("failed to create {} client", model.provider.as_str()))?;
    Ok(Arc::new(client))
}

pub(crate) fn monitor_config(args: &MonitorArgs, model: &ModelRef) -> MonitorConfig {
    MonitorConfig {
        stream_base_url: args.stream_base_url.trim().trim_end_matches('/').to_string(),
        slack: SlackSettings {
            api_base: args.slack_api_base.clone(),
            bot_token: args.slack_bot_token.clone(),
            app_token: args.slack_app_token.clone(),
            request_timeout_ms: args.slack_request_timeout_ms,
            retry_max_attempts: args.slack_retry_max_attempts,
            retry_base_delay_ms: args.slack_retry_base_delay_ms,
        },
        monitor_channel: args
            .monitor_channel
            .as_deref()
            .map(str::trim)
            .filter(|channel| !channel.is_empty())
            .map(str::to_string),
        context_message_count: args.context_message_count,
        scheduler: SchedulerConfig {
            interval: Duration::from_secs(args.summary_interval_secs),
            warmup: Duration::from_secs(args.summary_warmup_secs),
            min_events: args.summary_min_events,
            transcript_window: args.resolution_transcript_window,
        },
        reasoning: ReasoningConfig {
            model: model.model.clone(),
            request_limit: args.agent_request_limit,
            temperature: Some(args.temperature),
            max_tokens: args.max_tokens,
            expose_postmortem_tool: args.expose_postmortem_tool,
            context_events_per_channel: args.context_events_per_channel,
        },
        atlassian: atlassian_config(&args.atlassian),
        reconnect: ReconnectPolicy {
            max_consecutive_failures: args.socket_max_reconnects,
            base_delay: Duration::from_millis(args.socket_reconnect_base_ms),
        },
    }
}

/// `None` when no Jira/Confluence setting was given at all. A partial
/// configuration is passed through so the monitor can report what is missing.
pub(crate) fn atlassian_config(args: &AtlassianArgs) -> Option<AtlassianConfig> {
    let set = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let jira_base_url = set(&args.jira_base_url);
    let confluence_base_url = set(&args.confluence_base_url);
    let email = set(&args.jira_email);
    let api_token = set(&args.jira_api_token);
    let space_key = set(&args.confluence_space_key);
    if jira_base_url.is_none()
        && confluence_base_url.is_none()
        && email.is_none()
        && api_token.is_none()
        && space_key.is_none()
    {
        return None;
    }

    let defaults = AtlassianConfig::default();
    Some(AtlassianConfig {
        confluence_base_url: confluence_base_url
            .or_else(|| jira_base_url.clone())
            .unwrap_or_default(),
        jira_base_url: jira_base_url.unwrap_or_default(),
        email: email.unwrap_or_default(),
        api_token: api_token.unwrap_or_default(),
        jira_project_key: args.jira_project_key.trim().to_string(),
        jira_issue_type: args.jira_issue_type.trim().to_string(),
        confluence_space_key: space_key.unwrap_or_default(),
        confluence_parent_page_id: set(&args.confluence_parent_page_id),
        ..defaults
    })
}

pub(crate) fn replay_config(args: &ReplayArgs) -> ReplayConfig {
    ReplayConfig {
        bind: args.bind.clone(),
        transcript_path: args.transcript.clone(),
        initial_speed: args.speed,
    }
}

#[cfg(test)]
mod tests;
