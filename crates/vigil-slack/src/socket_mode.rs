//! Socket Mode client: receives slash commands and message events over a
//! WebSocket, acknowledging every envelope before it is handled.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::SlackApiClient;

#[derive(Debug, Clone, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

/// Form fields Slack sends for a slash command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: Option<String>,
}

/// A `message` event from the Events API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackMessageEvent {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventCallback {
    #[serde(rename = "type")]
    callback_type: String,
    event: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum SocketEvent {
    Hello,
    Disconnect { reason: Option<String> },
    SlashCommand(SlashCommandPayload),
    Message(SlackMessageEvent),
    Ignored(String),
}

/// Receives decoded Socket Mode traffic.
#[async_trait]
pub trait SocketModeHandler: Send + Sync + 'static {
    /// Runs on its own task so slow commands never delay acknowledgements.
    async fn on_slash_command(&self, command: SlashCommandPayload);
    async fn on_message(&self, event: SlackMessageEvent);
}

/// Bounded reconnect with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_consecutive_failures: usize,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl ReconnectPolicy {
    /// Delay after the `failures`-th consecutive failure: `base * 2^(failures - 1)`.
    pub fn delay_for(&self, failures: usize) -> Duration {
        let exponent = failures.saturating_sub(1).min(10) as u32;
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}

enum SessionEnd {
    Disconnected,
    Closed,
}

struct SessionReport {
    saw_hello: bool,
    end: SessionEnd,
}

/// Keeps a Socket Mode connection alive until the failure ceiling is hit.
///
/// A session that received `hello` resets the failure streak. Server
/// `disconnect` requests reconnect immediately.
pub async fn run_socket_mode(
    client: &SlackApiClient,
    handler: Arc<dyn SocketModeHandler>,
    policy: ReconnectPolicy,
) -> Result<()> {
    let mut failure_streak = 0_usize;
    loop {
        let outcome = match client.open_socket_connection().await {
            Ok(url) => run_socket_session(&url, Arc::clone(&handler)).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(report) => {
                if report.saw_hello {
                    failure_streak = 0;
                } else {
                    failure_streak = failure_streak.saturating_add(1);
                }
                match report.end {
                    SessionEnd::Disconnected => {
                        info!("slack socket mode disconnect requested; reconnecting");
                    }
                    SessionEnd::Closed => {
                        warn!(failure_streak, "slack socket mode connection closed");
                    }
                }
                if failure_streak == 0 {
                    continue;
                }
            }
            Err(error) => {
                failure_streak = failure_streak.saturating_add(1);
                warn!(
                    failure_streak,
                    max_failures = policy.max_consecutive_failures,
                    error = %format!("{error:#}"),
                    "slack socket mode session failed"
                );
            }
        }

        if failure_streak >= policy.max_consecutive_failures {
            bail!(
                "slack socket mode connection lost after {failure_streak} consecutive failures"
            );
        }
        tokio::time::sleep(policy.delay_for(failure_streak)).await;
    }
}

async fn run_socket_session(
    socket_url: &str,
    handler: Arc<dyn SocketModeHandler>,
) -> Result<SessionReport> {
    let (stream, _response) = connect_async(socket_url)
        .await
        .context("failed to connect slack socket mode websocket")?;
    let (mut sink, mut source) = stream.split();
    let mut saw_hello = false;

    while let Some(message) = source.next().await {
        let message = message.context("failed reading slack websocket message")?;
        let envelope = match parse_socket_envelope(message) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "skipping malformed slack socket envelope");
                continue;
            }
        };
        if let Some(envelope_id) = envelope.envelope_id.as_deref() {
            let ack = json!({ "envelope_id": envelope_id }).to_string();
            sink.send(WsMessage::Text(ack.into()))
                .await
                .context("failed to send slack socket ack")?;
        }

        match classify_envelope(envelope) {
            SocketEvent::Hello => {
                saw_hello = true;
                info!("slack socket mode connected");
            }
            SocketEvent::Disconnect { reason } => {
                debug!(reason = reason.as_deref().unwrap_or("unspecified"), "slack disconnect");
                return Ok(SessionReport {
                    saw_hello,
                    end: SessionEnd::Disconnected,
                });
            }
            SocketEvent::SlashCommand(command) => {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler.on_slash_command(command).await });
            }
            SocketEvent::Message(event) => handler.on_message(event).await,
            SocketEvent::Ignored(kind) => debug!(kind = %kind, "ignored slack envelope"),
        }
    }

    Ok(SessionReport {
        saw_hello,
        end: SessionEnd::Closed,
    })
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SocketEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<SocketEnvelope>(text.as_str())
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?;
            let envelope = serde_json::from_str::<SocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}

fn classify_envelope(envelope: SocketEnvelope) -> SocketEvent {
    match envelope.envelope_type.as_str() {
        "hello" => SocketEvent::Hello,
        "disconnect" => SocketEvent::Disconnect {
            reason: envelope.reason,
        },
        "slash_commands" => match serde_json::from_value::<SlashCommandPayload>(envelope.payload)
        {
            Ok(command) => SocketEvent::SlashCommand(command),
            Err(error) => SocketEvent::Ignored(format!("malformed slash command: {error}")),
        },
        "events_api" => {
            let Ok(callback) = serde_json::from_value::<EventCallback>(envelope.payload) else {
                return SocketEvent::Ignored("malformed events_api payload".to_string());
            };
            if callback.callback_type != "event_callback" {
                return SocketEvent::Ignored(callback.callback_type);
            }
            let event_type = callback
                .event
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if event_type != "message" {
                return SocketEvent::Ignored(event_type);
            }
            match serde_json::from_value::<SlackMessageEvent>(callback.event) {
                Ok(event) => SocketEvent::Message(event),
                Err(error) => SocketEvent::Ignored(format!("malformed message event: {error}")),
            }
        }
        other => SocketEvent::Ignored(other.to_string()),
    }
}
