use std::time::Duration;

use clap::Parser;
use vigil_ai::Provider;

use super::{atlassian_config, monitor_config, openai_config, replay_config, resolve_model};
use crate::cli_args::{Cli, CliCommand, MonitorArgs};

fn monitor_args(extra: &[&str]) -> MonitorArgs {
    let mut argv = vec![
        "vigil",
        "monitor",
        "--ai-model-type",
        "groq",
        "--slack-bot-token",
        "xoxb-test",
        "--slack-app-token",
        "xapp-test",
    ];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv).expect("monitor args parse").command {
        CliCommand::Monitor(args) => {
            let mut args = *args;
            args.model = None;
            args.api_base = None;
            args.groq_api_key = None;
            args.openai_api_key = None;
            args.atlassian.jira_base_url = None;
            args.atlassian.confluence_base_url = None;
            args.atlassian.jira_email = None;
            args.atlassian.jira_api_token = None;
            args.atlassian.confluence_space_key = None;
            args.atlassian.confluence_parent_page_id = None;
            args
        }
        other => panic!("expected monitor command, got {other:?}"),
    }
}

#[test]
fn unit_model_defaults_follow_provider() {
    let mut args = monitor_args(&[]);
    let model = resolve_model(&args).expect("default model");
    assert_eq!(model.provider, Provider::Groq);
    assert_eq!(model.model, "llama-3.1-8b-instant");

    args.provider = Provider::OpenAi;
    let model = resolve_model(&args).expect("default model");
    assert_eq!(model.model, "gpt-3.5-turbo");

    args.model = Some("groq/llama-3.3-70b-versatile".to_string());
    let model = resolve_model(&args).expect("prefixed model");
    assert_eq!(model.provider, Provider::Groq);
    assert_eq!(model.model, "llama-3.3-70b-versatile");
}

#[test]
fn functional_openai_config_uses_provider_base_and_key() {
    let mut args = monitor_args(&[]);
    let model = resolve_model(&args).expect("default model");
    let error = openai_config(&args, &model).expect_err("missing key");
    assert!(error.to_string().contains("GROQ_API_KEY"));

    args.groq_api_key = Some("  gsk-test  ".to_string());
    let config = openai_config(&args, &model).expect("config");
    assert_eq!(config.api_base, "https://api.groq.com/openai/v1");
    assert_eq!(config.api_key, "gsk-test");

    args.api_base = Some("http://127.0.0.1:9999/v1".to_string());
    let config = openai_config(&args, &model).expect("config");
    assert_eq!(config.api_base, "http://127.0.0.1:9999/v1");
}

#[test]
fn functional_monitor_config_maps_every_section() {
    let mut args = monitor_args(&[
        "--stream-base-url",
        "http://replay.local:8081/",
        "--summary-interval-secs",
        "20",
        "--summary-warmup-secs",
        "0",
        "--agent-request-limit",
        "8",
        "--socket-reconnect-base-ms",
        "250",
    ]);
    args.monitor_channel = Some("  ".to_string());
    let model = resolve_model(&args).expect("default model");
    let config = monitor_config(&args, &model);

    assert_eq!(config.stream_base_url, "http://replay.local:8081");
    assert_eq!(config.slack.bot_token, "xoxb-test");
    assert_eq!(config.slack.app_token, "xapp-test");
    assert_eq!(config.monitor_channel, None);
    assert_eq!(config.scheduler.interval, Duration::from_secs(20));
    assert_eq!(config.scheduler.warmup, Duration::ZERO);
    assert_eq!(config.reasoning.model, "llama-3.1-8b-instant");
    assert_eq!(config.reasoning.request_limit, 8);
    assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
    assert!(config.atlassian.is_none());
}

#[test]
fn functional_atlassian_config_shares_jira_site_with_confluence() {
    let mut args = monitor_args(&[]);
    assert!(atlassian_config(&args.atlassian).is_none());

    args.atlassian.jira_base_url = Some("https://acme.atlassian.net".to_string());
    args.atlassian.jira_email = Some("ops@acme.test".to_string());
    args.atlassian.jira_api_token = Some("token".to_string());
    args.atlassian.confluence_space_key = Some("OPS".to_string());
    let config = atlassian_config(&args.atlassian).expect("configured");
    assert_eq!(config.confluence_base_url, "https://acme.atlassian.net");
    assert_eq!(config.jira_project_key, "INC");
    assert!(config.missing_fields().is_empty());
}

#[test]
fn regression_partial_atlassian_settings_are_reported_not_dropped() {
    let mut args = monitor_args(&[]);
    args.atlassian.jira_base_url = Some("https://acme.atlassian.net".to_string());
    let config = atlassian_config(&args.atlassian).expect("partial config kept");
    assert_eq!(
        config.missing_fields(),
        vec!["email", "api_token", "confluence_space_key"]
    );
}

#[test]
fn unit_replay_config_copies_arguments() {
    let cli = Cli::try_parse_from(["vigil", "replay", "--speed", "0.5"]).expect("replay parse");
    let CliCommand::Replay(args) = cli.command else {
        panic!("expected replay command");
    };
    let config = replay_config(&args);
    assert_eq!(config.initial_speed, 0.5);
    assert_eq!(config.transcript_path, args.transcript);
}
