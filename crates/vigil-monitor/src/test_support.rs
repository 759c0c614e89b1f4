//! Shared doubles for the monitor's tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use httpmock::MockServer;
use serde_json::Value;
use vigil_ai::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message,
};
use vigil_atlassian::{AtlassianClient, AtlassianConfig};
use vigil_slack::SlackApiClient;

pub(crate) fn slack_client(server: &MockServer) -> SlackApiClient {
    SlackApiClient::new(
        server.base_url(),
        "xapp-test".to_string(),
        "xoxb-test".to_string(),
        2_000,
        1,
        1,
    )
    .expect("slack client")
}

pub(crate) fn atlassian_client(server: &MockServer) -> AtlassianClient {
    AtlassianClient::new(AtlassianConfig {
        jira_base_url: server.base_url(),
        confluence_base_url: server.base_url(),
        email: "oncall@example.com".to_string(),
        api_token: "token".to_string(),
        jira_project_key: "OPS".to_string(),
        jira_issue_type: "Task".to_string(),
        confluence_space_key: "ENG".to_string(),
        confluence_parent_page_id: None,
        request_timeout_ms: 2_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("atlassian client")
}

/// Replays canned responses in order and records every request.
pub(crate) struct ScriptedLlm {
    responses: Mutex<VecDeque<ChatResponse>>,
    pub(crate) requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedLlm {
    pub(crate) fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.requests.lock().expect("requests lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| AiError::InvalidResponse("scripted responses exhausted".to_string()))
    }
}

pub(crate) fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_text(text),
        finish_reason: Some("stop".to_string()),
        usage: ChatUsage::default(),
    }
}

pub(crate) fn tool_call_response(id: &str, name: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_blocks(vec![ContentBlock::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }]),
        finish_reason: Some("tool_calls".to_string()),
        usage: ChatUsage::default(),
    }
}
