use std::{path::PathBuf, str::FromStr};

use clap::{ArgAction, Args, Parser, Subcommand};
use vigil_ai::Provider;

const MIN_PLAYBACK_SPEED: f64 = 0.1;
const MAX_PLAYBACK_SPEED: f64 = 10.0;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_playback_speed(value: &str) -> Result<f64, String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&parsed) {
        return Err(format!(
            "value must be between {MIN_PLAYBACK_SPEED} and {MAX_PLAYBACK_SPEED}"
        ));
    }
    Ok(parsed)
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    Provider::from_str(value).map_err(|error| error.to_string())
}

fn parse_temperature(value: &str) -> Result<f32, String> {
    let parsed = value
        .parse::<f32>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || !(0.0..=2.0).contains(&parsed) {
        return Err("value must be between 0 and 2".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "vigil",
    about = "Incident monitor that turns live incident chatter into executive summaries",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Ingest incident feeds, serve /declare-incident and publish summaries.
    Monitor(Box<MonitorArgs>),
    /// Serve a recorded incident transcript as live event streams.
    Replay(ReplayArgs),
}

#[derive(Debug, Args)]
pub(crate) struct MonitorArgs {
    #[arg(
        long,
        env = "VIGIL_STREAM_BASE_URL",
        default_value = "http://localhost:8081",
        help = "Base URL of the event stream server exposing /stream/{incidents,team,zoom}"
    )]
    pub stream_base_url: String,

    #[arg(
        long = "ai-model-type",
        env = "AI_MODEL_TYPE",
        default_value = "groq",
        value_parser = parse_provider,
        help = "Model provider used when --model has no provider prefix. Supported: groq, openai."
    )]
    pub provider: Provider,

    #[arg(
        long,
        env = "VIGIL_MODEL",
        help = "Model in provider/model format. Defaults to the provider's standard model."
    )]
    pub model: Option<String>,

    #[arg(
        long,
        env = "VIGIL_API_BASE",
        help = "Override the OpenAI-compatible API base URL"
    )]
    pub api_base: Option<String>,

    #[arg(
        long,
        env = "GROQ_API_KEY",
        hide_env_values = true,
        help = "API key for the groq provider"
    )]
    pub groq_api_key: Option<String>,

    #[arg(
        long,
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        help = "API key for the openai provider"
    )]
    pub openai_api_key: Option<String>,

    #[arg(
        long,
        env = "VIGIL_PROVIDER_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout for model requests in milliseconds"
    )]
    pub provider_timeout_ms: u64,

    #[arg(
        long,
        env = "VIGIL_PROVIDER_MAX_RETRIES",
        default_value_t = 2,
        help = "Retries for transient model API failures"
    )]
    pub provider_max_retries: usize,

    #[arg(
        long,
        env = "VIGIL_PROVIDER_RETRY_BUDGET_MS",
        default_value_t = 0,
        help = "Total retry backoff budget in milliseconds (0 means unbounded)"
    )]
    pub provider_retry_budget_ms: u64,

    #[arg(
        long,
        env = "VIGIL_PROVIDER_RETRY_JITTER",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Randomize model retry backoff"
    )]
    pub provider_retry_jitter: bool,

    #[arg(
        long,
        env = "VIGIL_TEMPERATURE",
        default_value_t = 0.2,
        value_parser = parse_temperature,
        help = "Sampling temperature for summary generation"
    )]
    pub temperature: f32,

    #[arg(
        long,
        env = "VIGIL_MAX_TOKENS",
        help = "Optional completion token cap per model request"
    )]
    pub max_tokens: Option<u32>,

    #[arg(
        long,
        env = "VIGIL_AGENT_REQUEST_LIMIT",
        default_value_t = 20,
        value_parser = parse_positive_usize,
        help = "Model requests allowed per summary tick"
    )]
    pub agent_request_limit: usize,

    #[arg(
        long,
        env = "VIGIL_EXPOSE_POSTMORTEM_TOOL",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Let the model create the Jira ticket and Confluence post-mortem itself"
    )]
    pub expose_postmortem_tool: bool,

    #[arg(
        long,
        env = "SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token (xoxb-...)"
    )]
    pub slack_bot_token: String,

    #[arg(
        long,
        env = "SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "Slack app-level token for Socket Mode (xapp-...)"
    )]
    pub slack_app_token: String,

    #[arg(
        long,
        env = "VIGIL_SLACK_API_BASE",
        default_value = "https://slack.com/api",
        help = "Slack Web API base URL"
    )]
    pub slack_api_base: String,

    #[arg(
        long,
        env = "VIGIL_SLACK_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64
    )]
    pub slack_request_timeout_ms: u64,

    #[arg(
        long,
        env = "VIGIL_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize
    )]
    pub slack_retry_max_attempts: usize,

    #[arg(
        long,
        env = "VIGIL_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64
    )]
    pub slack_retry_base_delay_ms: u64,

    #[arg(
        long,
        env = "SLACK_MONITOR_CHANNEL",
        help = "Slack channel (#name or id) to read chat from instead of the team stream"
    )]
    pub monitor_channel: Option<String>,

    #[arg(
        long,
        env = "INCIDENT_CONTEXT_MESSAGE_COUNT",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Channel messages captured as context when an incident is declared"
    )]
    pub context_message_count: usize,

    #[arg(
        long,
        env = "VIGIL_CONTEXT_EVENTS_PER_CHANNEL",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Recent events per source shown to the model each tick"
    )]
    pub context_events_per_channel: usize,

    #[arg(
        long,
        env = "VIGIL_SUMMARY_INTERVAL_SECS",
        default_value_t = 15,
        value_parser = parse_positive_u64
    )]
    pub summary_interval_secs: u64,

    #[arg(
        long,
        env = "VIGIL_SUMMARY_WARMUP_SECS",
        default_value_t = 30,
        help = "Delay before the first summary tick"
    )]
    pub summary_warmup_secs: u64,

    #[arg(
        long,
        env = "VIGIL_SUMMARY_MIN_EVENTS",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Events required before summaries are generated"
    )]
    pub summary_min_events: usize,

    #[arg(
        long,
        env = "VIGIL_RESOLUTION_TRANSCRIPT_WINDOW",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Trailing bridge transcript lines scanned for a resolution phrase"
    )]
    pub resolution_transcript_window: usize,

    #[arg(
        long,
        env = "VIGIL_SOCKET_MAX_RECONNECTS",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Consecutive Socket Mode failures tolerated before giving up"
    )]
    pub socket_max_reconnects: usize,

    #[arg(
        long,
        env = "VIGIL_SOCKET_RECONNECT_BASE_MS",
        default_value_t = 2_000,
        value_parser = parse_positive_u64
    )]
    pub socket_reconnect_base_ms: u64,

    #[command(flatten)]
    pub atlassian: AtlassianArgs,
}

#[derive(Debug, Args)]
pub(crate) struct AtlassianArgs {
    #[arg(
        long,
        env = "JIRA_BASE_URL",
        help = "Jira Cloud site, e.g. https://acme.atlassian.net"
    )]
    pub jira_base_url: Option<String>,

    #[arg(
        long,
        env = "CONFLUENCE_BASE_URL",
        help = "Confluence site; defaults to the Jira site"
    )]
    pub confluence_base_url: Option<String>,

    #[arg(long, env = "JIRA_EMAIL")]
    pub jira_email: Option<String>,

    #[arg(long, env = "JIRA_API_TOKEN", hide_env_values = true)]
    pub jira_api_token: Option<String>,

    #[arg(long, env = "JIRA_PROJECT_KEY", default_value = "INC")]
    pub jira_project_key: String,

    #[arg(long, env = "JIRA_ISSUE_TYPE", default_value = "Task")]
    pub jira_issue_type: String,

    #[arg(long, env = "CONFLUENCE_SPACE_KEY")]
    pub confluence_space_key: Option<String>,

    #[arg(long, env = "CONFLUENCE_PARENT_PAGE_ID")]
    pub confluence_parent_page_id: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct ReplayArgs {
    #[arg(
        long,
        env = "VIGIL_REPLAY_BIND",
        default_value = "127.0.0.1:8081",
        help = "Address the replay server listens on"
    )]
    pub bind: String,

    #[arg(
        long,
        env = "VIGIL_REPLAY_TRANSCRIPT",
        default_value = "incident_transcript.json",
        help = "Transcript JSON with the incident header and timed events"
    )]
    pub transcript: PathBuf,

    #[arg(
        long,
        env = "VIGIL_REPLAY_SPEED",
        default_value_t = 2.0,
        value_parser = parse_playback_speed,
        help = "Initial playback multiplier (0.1 to 10)"
    )]
    pub speed: f64,
}
