use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use vigil_ai::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    ToolDefinition,
};

use crate::{Agent, AgentConfig, AgentError, AgentEvent, AgentTool, ToolExecutionResult};

struct MockClient {
    responses: AsyncMutex<VecDeque<ChatResponse>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockClient {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: AsyncMutex::new(VecDeque::from(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.requests.lock().expect("requests lock").push(request);
        let mut responses = self.responses.lock().await;
        responses
            .pop_front()
            .ok_or_else(|| AiError::InvalidResponse("mock response queue is empty".to_string()))
    }
}

struct FlakyClient {
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for FlakyClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failures_remaining.load(Ordering::Relaxed) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::Relaxed);
            return Err(AiError::HttpStatus {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(text_response("recovered"))
    }
}

struct EchoChannelTool {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AgentTool for EchoChannelTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "publish_exec_summary_to_slack".to_string(),
            description: "Publish a summary".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "markdown": { "type": "string" },
                    "channel_id": { "type": "string" }
                },
                "required": ["markdown", "channel_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let channel = arguments
            .get("channel_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        ToolExecutionResult::ok(json!(format!("posted to {channel}")))
    }
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_text(text),
        finish_reason: Some("stop".to_string()),
        usage: ChatUsage::default(),
    }
}

fn tool_call_response(id: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_blocks(vec![ContentBlock::ToolCall {
            id: id.to_string(),
            name: "publish_exec_summary_to_slack".to_string(),
            arguments,
        }]),
        finish_reason: Some("tool_calls".to_string()),
        usage: ChatUsage::default(),
    }
}

#[tokio::test]
async fn unit_prompt_without_tools_completes_in_one_request() {
    let client = Arc::new(MockClient::new(vec![text_response("all quiet")]));
    let mut agent = Agent::new(
        client.clone(),
        AgentConfig {
            system_prompt: "You monitor incidents.".to_string(),
            ..AgentConfig::default()
        },
    );

    let new_messages = agent.prompt("status?").await.expect("prompt succeeds");
    assert_eq!(new_messages.len(), 2);
    assert_eq!(new_messages[1].text_content(), "all quiet");

    let requests = client.requests.lock().expect("requests lock");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages[0].role, MessageRole::System);
    assert!(requests[0].tool_choice.is_none());
}

#[tokio::test]
async fn functional_prompt_executes_tool_calls_and_continues() {
    let client = Arc::new(MockClient::new(vec![
        tool_call_response("call_1", json!({ "markdown": "*ok*", "channel_id": "C123" })),
        text_response("published"),
    ]));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut agent = Agent::new(client, AgentConfig::default());
    agent.register_tool(EchoChannelTool {
        calls: Arc::clone(&calls),
    });
    assert!(agent.has_tool("publish_exec_summary_to_slack"));

    let report = agent.run("publish").await.expect("run succeeds");
    assert_eq!(report.requests, 2);
    assert_eq!(report.output, "published");
    assert_eq!(report.tool_calls.len(), 1);
    assert_eq!(report.tool_calls[0].result_text, "posted to C123");
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn regression_invalid_tool_arguments_are_returned_to_model_without_execution() {
    let client = Arc::new(MockClient::new(vec![
        tool_call_response("call_1", json!({ "markdown": "*ok*" })),
        text_response("giving up"),
    ]));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut agent = Agent::new(client, AgentConfig::default());
    agent.register_tool(EchoChannelTool {
        calls: Arc::clone(&calls),
    });

    let report = agent.run("publish").await.expect("run succeeds");
    assert!(report.tool_calls[0].is_error);
    assert!(report.tool_calls[0].result_text.contains("invalid arguments"));
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn regression_request_limit_stops_runaway_tool_loops() {
    let responses = (0..5)
        .map(|index| {
            tool_call_response(
                &format!("call_{index}"),
                json!({ "markdown": "again", "channel_id": "C1" }),
            )
        })
        .collect::<Vec<_>>();
    let client = Arc::new(MockClient::new(responses));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut agent = Agent::new(
        client.clone(),
        AgentConfig {
            request_limit: 3,
            ..AgentConfig::default()
        },
    );
    agent.register_tool(EchoChannelTool {
        calls: Arc::clone(&calls),
    });

    let error = agent.run("loop").await.expect_err("limit must trip");
    assert!(matches!(error, AgentError::RequestLimitExceeded(3)));
    assert_eq!(client.requests.lock().expect("requests lock").len(), 3);
    assert_eq!(calls.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn integration_retryable_provider_errors_are_retried_with_backoff() {
    let client = Arc::new(FlakyClient {
        failures_remaining: AtomicUsize::new(2),
        calls: AtomicUsize::new(0),
    });
    let mut agent = Agent::new(
        client.clone(),
        AgentConfig {
            request_max_retries: 2,
            request_retry_initial_backoff_ms: 1,
            request_retry_max_backoff_ms: 2,
            ..AgentConfig::default()
        },
    );

    let report = agent.run("hello").await.expect("third attempt succeeds");
    assert_eq!(report.output, "recovered");
    assert_eq!(client.calls.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn regression_retry_budget_exhaustion_surfaces_provider_error() {
    let client = Arc::new(FlakyClient {
        failures_remaining: AtomicUsize::new(5),
        calls: AtomicUsize::new(0),
    });
    let mut agent = Agent::new(
        client.clone(),
        AgentConfig {
            request_max_retries: 1,
            request_retry_initial_backoff_ms: 1,
            ..AgentConfig::default()
        },
    );

    let error = agent.run("hello").await.expect_err("retries exhausted");
    assert!(matches!(
        error,
        AgentError::Ai(AiError::HttpStatus { status: 503, .. })
    ));
    assert_eq!(client.calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn functional_subscribers_observe_tool_lifecycle_events() {
    let client = Arc::new(MockClient::new(vec![
        tool_call_response("call_7", json!({ "markdown": "m", "channel_id": "C7" })),
        text_response("done"),
    ]));
    let mut agent = Agent::new(client, AgentConfig::default());
    agent.register_tool(EchoChannelTool {
        calls: Arc::new(AtomicUsize::new(0)),
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    agent.subscribe(move |event| {
        let label = match event {
            AgentEvent::AgentStart => "start".to_string(),
            AgentEvent::AgentEnd { .. } => "end".to_string(),
            AgentEvent::RequestStart { request } => format!("request:{request}"),
            AgentEvent::RequestEnd { tool_results, .. } => format!("results:{tool_results}"),
            AgentEvent::ToolExecutionStart { tool_name, .. } => format!("tool:{tool_name}"),
            AgentEvent::ToolExecutionEnd { result, .. } => format!("tool_end:{}", result.is_error),
        };
        sink.lock().expect("sink lock").push(label);
    });

    agent.prompt("go").await.expect("prompt");
    let seen = seen.lock().expect("seen lock").clone();
    assert_eq!(
        seen,
        vec![
            "start",
            "request:1",
            "tool:publish_exec_summary_to_slack",
            "tool_end:false",
            "results:1",
            "request:2",
            "results:0",
            "end",
        ]
    );
}
