use httpmock::prelude::*;
use serde_json::json;

use super::{ChannelCreateOutcome, SlackApiClient, SlackUser, SlackUserProfile};

fn test_client(server: &MockServer) -> SlackApiClient {
    SlackApiClient::new(
        server.base_url(),
        "xapp-test".to_string(),
        "xoxb-test".to_string(),
        2_000,
        3,
        1,
    )
    .expect("client")
}

#[tokio::test]
async fn integration_slack_api_client_retries_rate_limits() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("x-vigil-retry-attempt", "0");
        then.status(429)
            .header("retry-after", "0")
            .body("rate limit");
    });
    let second = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("x-vigil-retry-attempt", "1")
            .body_includes("\"mrkdwn\":true");
        then.status(200).json_body(json!({
            "ok": true,
            "channel": "C1",
            "ts": "1.2"
        }));
    });

    let posted = test_client(&server)
        .post_message("C1", "*hello*", true)
        .await
        .expect("post message eventually succeeds");
    assert_eq!(posted.channel, "C1");
    assert_eq!(posted.ts, "1.2");
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn functional_create_channel_reports_name_taken_as_outcome() {
    let server = MockServer::start();
    let created = server.mock(|when, then| {
        when.method(POST)
            .path("/conversations.create")
            .header("authorization", "Bearer xoxb-test")
            .body_includes("\"name\":\"incident-db-summary\"")
            .body_includes("\"is_private\":false");
        then.status(200).json_body(json!({
            "ok": true,
            "channel": { "id": "C42", "name": "incident-db-summary" }
        }));
    });
    let taken = server.mock(|when, then| {
        when.method(POST)
            .path("/conversations.create")
            .body_includes("\"name\":\"incident-taken\"");
        then.status(200)
            .json_body(json!({ "ok": false, "error": "name_taken" }));
    });

    let client = test_client(&server);
    let outcome = client
        .create_channel("incident-db-summary", false)
        .await
        .expect("create");
    match outcome {
        ChannelCreateOutcome::Created(channel) => assert_eq!(channel.id, "C42"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        client
            .create_channel("incident-taken", false)
            .await
            .expect("name_taken is not an error"),
        ChannelCreateOutcome::NameTaken
    );
    created.assert_calls(1);
    taken.assert_calls(1);
}

#[tokio::test]
async fn regression_platform_errors_carry_error_code() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/conversations.create");
        then.status(200)
            .json_body(json!({ "ok": false, "error": "restricted_action" }));
    });

    let error = test_client(&server)
        .create_channel("incident-x", false)
        .await
        .expect_err("restricted action fails");
    assert!(format!("{error:#}").contains("restricted_action"));
}

#[tokio::test]
async fn functional_list_channels_follows_cursor_pagination() {
    let server = MockServer::start();
    let first_page = server.mock(|when, then| {
        when.method(GET)
            .path("/conversations.list")
            .query_param("types", "public_channel,private_channel")
            .query_param_missing("cursor");
        then.status(200).json_body(json!({
            "ok": true,
            "channels": [{ "id": "C1", "name": "general" }],
            "response_metadata": { "next_cursor": "page2" }
        }));
    });
    let second_page = server.mock(|when, then| {
        when.method(GET)
            .path("/conversations.list")
            .query_param("cursor", "page2");
        then.status(200).json_body(json!({
            "ok": true,
            "channels": [{ "id": "C2", "name": "incident-response" }],
            "response_metadata": { "next_cursor": "" }
        }));
    });

    let client = test_client(&server);
    let found = client
        .find_channel_by_name("#incident-response")
        .await
        .expect("lookup");
    assert_eq!(found.map(|channel| channel.id), Some("C2".to_string()));
    first_page.assert_calls(1);
    second_page.assert_calls(1);
}

#[tokio::test]
async fn integration_invite_users_batches_and_skips_failed_batches() {
    let server = MockServer::start();
    let first_batch = server.mock(|when, then| {
        when.method(POST)
            .path("/conversations.invite")
            .body_includes("U000,");
        then.status(200).json_body(json!({ "ok": true }));
    });
    let second_batch = server.mock(|when, then| {
        when.method(POST)
            .path("/conversations.invite")
            .body_includes("\"users\":\"U100,U101\"");
        then.status(200)
            .json_body(json!({ "ok": false, "error": "already_in_channel" }));
    });

    let users = (0..102).map(|index| format!("U{index:03}")).collect::<Vec<_>>();
    let invited = test_client(&server)
        .invite_users("C1", &users)
        .await
        .expect("invite");
    assert_eq!(invited, 100);
    first_batch.assert_calls(1);
    second_batch.assert_calls(1);
}

#[tokio::test]
async fn functional_history_and_user_lookup_decode_payloads() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/conversations.history")
            .query_param("channel", "C9")
            .query_param("limit", "10");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [
                { "user": "U2", "text": "second", "ts": "2.0" },
                { "bot_id": "B1", "subtype": "bot_message", "text": "alert", "ts": "1.5" }
            ]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/users.info").query_param("user", "U2");
        then.status(200).json_body(json!({
            "ok": true,
            "user": {
                "id": "U2",
                "real_name": "Dana Ops",
                "profile": { "display_name": "" }
            }
        }));
    });

    let client = test_client(&server);
    let history = client.fetch_history("C9", 10).await.expect("history");
    assert_eq!(history.len(), 2);
    assert!(!history[0].is_bot());
    assert!(history[1].is_bot());

    let user = client.user_info("U2").await.expect("user");
    assert_eq!(user.display_label(), "Dana Ops");
}

#[test]
fn unit_user_filters_bots_deleted_and_slackbot() {
    let human = SlackUser {
        id: "U1".to_string(),
        profile: SlackUserProfile {
            display_name: Some("dana".to_string()),
            real_name: None,
        },
        ..SlackUser::default()
    };
    assert!(human.is_human());
    assert_eq!(human.display_label(), "dana");

    let slackbot = SlackUser {
        id: "USLACKBOT".to_string(),
        ..SlackUser::default()
    };
    let deleted = SlackUser {
        id: "U3".to_string(),
        deleted: true,
        ..SlackUser::default()
    };
    assert!(!slackbot.is_human());
    assert!(!deleted.is_human());
    assert_eq!(deleted.display_label(), "U3");
}
