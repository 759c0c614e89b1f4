//! Channel creation with name-collision reuse, and workspace invites.

use anyhow::{anyhow, Result};
use tracing::{info, warn};
use vigil_slack::{ChannelCreateOutcome, SlackApiClient, SlackChannel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedChannel {
    pub channel: SlackChannel,
    /// False when an existing channel with the same name was reused.
    pub created: bool,
}

/// Creates a public channel, or looks up the existing one on `name_taken`.
pub async fn create_or_reuse_channel(
    slack: &SlackApiClient,
    name: &str,
) -> Result<ProvisionedChannel> {
    match slack.create_channel(name, false).await? {
        ChannelCreateOutcome::Created(channel) => {
            info!(
                channel_id = %channel.id,
                channel_name = %channel.name,
                "incident channel created"
            );
            Ok(ProvisionedChannel {
                channel,
                created: true,
            })
        }
        ChannelCreateOutcome::NameTaken => {
            let channel = slack
                .find_channel_by_name(name)
                .await?
                .ok_or_else(|| {
                    anyhow!("channel '{name}' exists but is not visible to the bot")
                })?;
            info!(
                channel_id = %channel.id,
                channel_name = %channel.name,
                "reusing existing incident channel"
            );
            Ok(ProvisionedChannel {
                channel,
                created: false,
            })
        }
    }
}

/// Invites every active human in the workspace. Failures are logged and
/// reported as zero invites.
pub async fn invite_workspace_humans(slack: &SlackApiClient, channel_id: &str) -> usize {
    let users = match slack.list_users().await {
        Ok(users) => users,
        Err(error) => {
            warn!(channel_id, error = %format!("{error:#}"), "could not list workspace users");
            return 0;
        }
    };
    let humans = users
        .into_iter()
        .filter(|user| user.is_human())
        .map(|user| user.id)
        .collect::<Vec<_>>();
    if humans.is_empty() {
        return 0;
    }
    match slack.invite_users(channel_id, &humans).await {
        Ok(invited) => {
            info!(channel_id, invited, "invited workspace members");
            invited
        }
        Err(error) => {
            warn!(
                channel_id,
                error = %format!("{error:#}"),
                "could not invite workspace members"
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{create_or_reuse_channel, invite_workspace_humans};
    use crate::test_support::slack_client;

    #[tokio::test]
    async fn functional_name_collision_reuses_existing_channel() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST).path("/conversations.create");
            then.status(200)
                .json_body(json!({ "ok": false, "error": "name_taken" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/conversations.list");
            then.status(200).json_body(json!({
                "ok": true,
                "channels": [
                    { "id": "C1", "name": "general" },
                    { "id": "C77", "name": "incident-db-summary" }
                ]
            }));
        });

        let provisioned = create_or_reuse_channel(&slack_client(&server), "incident-db-summary")
            .await
            .expect("reused");
        create.assert_calls(1);
        assert!(!provisioned.created);
        assert_eq!(provisioned.channel.id, "C77");
    }

    #[tokio::test]
    async fn regression_name_collision_without_visible_channel_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/conversations.create");
            then.status(200)
                .json_body(json!({ "ok": false, "error": "name_taken" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/conversations.list");
            then.status(200).json_body(json!({ "ok": true, "channels": [] }));
        });

        let error = create_or_reuse_channel(&slack_client(&server), "incident-db-summary")
            .await
            .expect_err("missing channel");
        assert!(error.to_string().contains("not visible"));
    }

    #[tokio::test]
    async fn functional_invites_only_active_humans() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users.list");
            then.status(200).json_body(json!({
                "ok": true,
                "members": [
                    { "id": "USLACKBOT" },
                    { "id": "U1" },
                    { "id": "B1", "is_bot": true },
                    { "id": "U2", "deleted": true },
                    { "id": "U3" }
                ]
            }));
        });
        let invite = server.mock(|when, then| {
            when.method(POST)
                .path("/conversations.invite")
                .body_includes("\"users\":\"U1,U3\"");
            then.status(200).json_body(json!({ "ok": true }));
        });

        assert_eq!(invite_workspace_humans(&slack_client(&server), "C9").await, 2);
        invite.assert_calls(1);
    }
}
