//! Slack Web API client for channel provisioning, posting, and lookups.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use vigil_core::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

/// Maximum users per `conversations.invite` call.
pub const SLACK_INVITE_BATCH_LIMIT: usize = 100;
const PAGE_LIMIT: usize = 200;
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackIdentity {
    pub user_id: String,
    pub user: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCreateOutcome {
    Created(SlackChannel),
    /// A channel with the requested name already exists.
    NameTaken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackPostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackHistoryMessage {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl SlackHistoryMessage {
    pub fn is_bot(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackUserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub profile: SlackUserProfile,
}

impl SlackUser {
    /// Active, non-bot account. Slackbot counts as a bot.
    pub fn is_human(&self) -> bool {
        !self.is_bot && !self.deleted && self.id != "USLACKBOT"
    }

    /// Display name, then real name, then the user id.
    pub fn display_label(&self) -> String {
        [
            self.profile.display_name.as_deref(),
            self.real_name.as_deref(),
            self.profile.real_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(&self.id)
        .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct SlackStatusResponse {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    user: Option<String>,
    team: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackOpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackChannelResponse {
    ok: bool,
    channel: Option<SlackChannel>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackChannelListResponse {
    ok: bool,
    #[serde(default)]
    channels: Vec<SlackChannel>,
    #[serde(default)]
    response_metadata: SlackResponseMetadata,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackHistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<SlackHistoryMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackMembersResponse {
    ok: bool,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: SlackResponseMetadata,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUserInfoResponse {
    ok: bool,
    user: Option<SlackUser>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUserListResponse {
    ok: bool,
    #[serde(default)]
    members: Vec<SlackUser>,
    #[serde(default)]
    response_metadata: SlackResponseMetadata,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

fn ensure_ok(operation: &str, ok: bool, error: Option<String>) -> Result<()> {
    if !ok {
        bail!(
            "slack {operation} failed: {}",
            error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

fn next_cursor(metadata: SlackResponseMetadata) -> Option<String> {
    metadata
        .next_cursor
        .filter(|cursor| !cursor.trim().is_empty())
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub fn new(
        api_base: String,
        app_token: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("vigil-incident-monitor"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    /// `auth.test` with the bot token.
    pub async fn auth_test(&self) -> Result<SlackIdentity> {
        let response: SlackAuthTestResponse = self
            .request_json("auth.test", || {
                self.http
                    .post(self.url("auth.test"))
                    .bearer_auth(&self.bot_token)
            })
            .await?;
        ensure_ok("auth.test", response.ok, response.error)?;

        let user_id = response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack auth.test did not return user_id"))?;
        Ok(SlackIdentity {
            user_id,
            user: response.user,
            team: response.team,
        })
    }

    /// `apps.connections.open` with the app-level token; returns the WebSocket URL.
    pub async fn open_socket_connection(&self) -> Result<String> {
        let response: SlackOpenSocketResponse = self
            .request_json("apps.connections.open", || {
                self.http
                    .post(self.url("apps.connections.open"))
                    .bearer_auth(&self.app_token)
            })
            .await?;
        ensure_ok("apps.connections.open", response.ok, response.error)?;
        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    pub async fn create_channel(
        &self,
        name: &str,
        is_private: bool,
    ) -> Result<ChannelCreateOutcome> {
        let payload = json!({ "name": name, "is_private": is_private });
        let response: SlackChannelResponse = self
            .request_json("conversations.create", || {
                self.http
                    .post(self.url("conversations.create"))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok && response.error.as_deref() == Some("name_taken") {
            return Ok(ChannelCreateOutcome::NameTaken);
        }
        ensure_ok("conversations.create", response.ok, response.error)?;
        response
            .channel
            .map(ChannelCreateOutcome::Created)
            .ok_or_else(|| anyhow!("slack conversations.create did not return channel"))
    }

    /// Every non-archived public and private channel visible to the bot.
    pub async fn list_channels(&self) -> Result<Vec<SlackChannel>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("types", "public_channel,private_channel".to_string()),
                ("exclude_archived", "true".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let response: SlackChannelListResponse = self
                .request_json("conversations.list", || {
                    self.http
                        .get(self.url("conversations.list"))
                        .bearer_auth(&self.bot_token)
                        .query(&query)
                })
                .await?;
            ensure_ok("conversations.list", response.ok, response.error)?;
            channels.extend(response.channels);
            cursor = next_cursor(response.response_metadata);
            if cursor.is_none() {
                break;
            }
        }
        Ok(channels)
    }

    pub async fn find_channel_by_name(&self, name: &str) -> Result<Option<SlackChannel>> {
        let wanted = name.trim().trim_start_matches('#');
        Ok(self
            .list_channels()
            .await?
            .into_iter()
            .find(|channel| channel.name == wanted))
    }

    pub async fn set_topic(&self, channel: &str, topic: &str) -> Result<()> {
        self.post_status(
            "conversations.setTopic",
            json!({ "channel": channel, "topic": topic }),
        )
        .await
    }

    pub async fn set_purpose(&self, channel: &str, purpose: &str) -> Result<()> {
        self.post_status(
            "conversations.setPurpose",
            json!({ "channel": channel, "purpose": purpose }),
        )
        .await
    }

    /// Invites users in batches of [`SLACK_INVITE_BATCH_LIMIT`]. A failed
    /// batch is logged and skipped; returns how many users were in accepted
    /// batches.
    pub async fn invite_users(&self, channel: &str, user_ids: &[String]) -> Result<usize> {
        let mut invited = 0usize;
        for batch in user_ids.chunks(SLACK_INVITE_BATCH_LIMIT) {
            let payload = json!({ "channel": channel, "users": batch.join(",") });
            match self.post_status("conversations.invite", payload).await {
                Ok(()) => invited += batch.len(),
                Err(error) => warn!(
                    channel,
                    batch_size = batch.len(),
                    error = %format!("{error:#}"),
                    "slack invite batch failed"
                ),
            }
        }
        Ok(invited)
    }

    /// Most recent messages, newest first as Slack returns them.
    pub async fn fetch_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<SlackHistoryMessage>> {
        let query = [
            ("channel", channel.to_string()),
            ("limit", limit.max(1).to_string()),
        ];
        let response: SlackHistoryResponse = self
            .request_json("conversations.history", || {
                self.http
                    .get(self.url("conversations.history"))
                    .bearer_auth(&self.bot_token)
                    .query(&query)
            })
            .await?;
        ensure_ok("conversations.history", response.ok, response.error)?;
        Ok(response.messages)
    }

    pub async fn channel_members(&self, channel: &str) -> Result<Vec<String>> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("channel", channel.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let response: SlackMembersResponse = self
                .request_json("conversations.members", || {
                    self.http
                        .get(self.url("conversations.members"))
                        .bearer_auth(&self.bot_token)
                        .query(&query)
                })
                .await?;
            ensure_ok("conversations.members", response.ok, response.error)?;
            members.extend(response.members);
            cursor = next_cursor(response.response_metadata);
            if cursor.is_none() {
                break;
            }
        }
        Ok(members)
    }

    pub async fn user_info(&self, user_id: &str) -> Result<SlackUser> {
        let query = [("user", user_id.to_string())];
        let response: SlackUserInfoResponse = self
            .request_json("users.info", || {
                self.http
                    .get(self.url("users.info"))
                    .bearer_auth(&self.bot_token)
                    .query(&query)
            })
            .await?;
        ensure_ok("users.info", response.ok, response.error)?;
        response
            .user
            .ok_or_else(|| anyhow!("slack users.info did not return user"))
    }

    pub async fn list_users(&self) -> Result<Vec<SlackUser>> {
        let mut users = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let response: SlackUserListResponse = self
                .request_json("users.list", || {
                    self.http
                        .get(self.url("users.list"))
                        .bearer_auth(&self.bot_token)
                        .query(&query)
                })
                .await?;
            ensure_ok("users.list", response.ok, response.error)?;
            users.extend(response.members);
            cursor = next_cursor(response.response_metadata);
            if cursor.is_none() {
                break;
            }
        }
        Ok(users)
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        mrkdwn: bool,
    ) -> Result<SlackPostedMessage> {
        let payload = json!({
            "channel": channel,
            "text": text,
            "mrkdwn": mrkdwn,
            "unfurl_links": false,
            "unfurl_media": false,
        });

        let response: SlackChatMessageResponse = self
            .request_json("chat.postMessage", || {
                self.http
                    .post(self.url("chat.postMessage"))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        ensure_ok("chat.postMessage", response.ok, response.error)?;

        Ok(SlackPostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response
                .ts
                .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))?,
        })
    }

    /// Message visible only to `user`.
    pub async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<()> {
        self.post_status(
            "chat.postEphemeral",
            json!({ "channel": channel, "user": user, "text": text }),
        )
        .await
    }

    async fn post_status(&self, operation: &str, payload: serde_json::Value) -> Result<()> {
        let response: SlackStatusResponse = self
            .request_json(operation, || {
                self.http
                    .post(self.url(operation))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        ensure_ok(operation, response.ok, response.error)
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header("x-vigil-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "slack api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
