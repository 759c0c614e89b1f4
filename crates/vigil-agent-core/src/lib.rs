//! Tool-using agent loop used for incident summary generation.
//!
//! An [`Agent`] alternates model requests and tool executions until the model
//! replies without tool calls or the request budget runs out.
use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use vigil_ai::{
    AiError, ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, ToolCall, ToolChoice,
    ToolDefinition,
};

mod run_report;
mod runtime_tool_bridge;
mod runtime_turn_loop;

pub use run_report::{AgentRunReport, ToolInvocationRecord};
pub use runtime_turn_loop::extract_json_payload;

use runtime_tool_bridge::execute_tool_call_inner;
use runtime_turn_loop::timeout_duration_from_ms;

/// Settings for one [`Agent`].
///
/// # Examples
///
/// ```
/// use vigil_agent_core::AgentConfig;
///
/// let config = AgentConfig {
///     model: "llama-3.1-8b-instant".to_string(),
///     request_limit: 20,
///     ..AgentConfig::default()
/// };
///
/// assert_eq!(config.request_limit, 20);
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub model: String,
    pub system_prompt: String,
    /// Maximum model requests per prompt, counting every tool round-trip.
    pub request_limit: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_max_retries: usize,
    pub request_retry_initial_backoff_ms: u64,
    pub request_retry_max_backoff_ms: u64,
    pub request_timeout_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: "vigil-agent".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            system_prompt: String::new(),
            request_limit: 20,
            temperature: Some(0.2),
            max_tokens: None,
            request_max_retries: 2,
            request_retry_initial_backoff_ms: 200,
            request_retry_max_backoff_ms: 2_000,
            request_timeout_ms: Some(120_000),
            tool_timeout_ms: Some(60_000),
        }
    }
}

/// Result payload returned by an [`AgentTool`].
///
/// ```
/// use serde_json::json;
/// use vigil_agent_core::ToolExecutionResult;
///
/// let err = ToolExecutionResult::error(json!("boom"));
/// assert!(err.is_error);
/// assert_eq!(err.as_text(), "boom");
/// ```
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub content: Value,
    pub is_error: bool,
}

impl ToolExecutionResult {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Converts the payload to text for insertion into a tool message.
    pub fn as_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// A capability the model may invoke by name.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;
}

#[derive(Debug, Clone)]
pub enum AgentEvent {
    AgentStart,
    AgentEnd {
        new_messages: usize,
    },
    RequestStart {
        request: usize,
    },
    RequestEnd {
        request: usize,
        tool_results: usize,
        request_duration_ms: u64,
        usage: ChatUsage,
        finish_reason: Option<String>,
    },
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        result: ToolExecutionResult,
    },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("agent exceeded request limit ({0})")]
    RequestLimitExceeded(usize),
    #[error("model request timed out after {timeout_ms}ms on attempt {attempt}")]
    RequestTimeout { timeout_ms: u64, attempt: usize },
}

type EventHandler = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

#[derive(Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    tool: Arc<dyn AgentTool>,
}

/// Conversation state plus the tools the model may call.
#[derive(Clone)]
pub struct Agent {
    client: Arc<dyn LlmClient>,
    config: AgentConfig,
    messages: Vec<Message>,
    tools: HashMap<String, RegisteredTool>,
    handlers: Vec<EventHandler>,
}

impl Agent {
    /// Creates a new [`Agent`] with an initial system message when configured.
    pub fn new(client: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        let mut messages = Vec::new();
        if !config.system_prompt.trim().is_empty() {
            messages.push(Message::system(config.system_prompt.clone()));
        }

        Self {
            client,
            config,
            messages,
            tools: HashMap::new(),
            handlers: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    /// Registers a tool, replacing any previous tool with the same name.
    pub fn register_tool<T>(&mut self, tool: T)
    where
        T: AgentTool + 'static,
    {
        let definition = tool.definition();
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                tool: Arc::new(tool),
            },
        );
    }

    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.contains_key(tool_name)
    }

    /// Returns registered tool names in sorted order.
    pub fn registered_tool_names(&self) -> Vec<String> {
        let mut names = self.tools.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    /// Sends a user prompt and returns every message appended by the run.
    pub async fn prompt(&mut self, text: impl Into<String>) -> Result<Vec<Message>, AgentError> {
        let start_index = self.messages.len();
        self.messages.push(Message::user(text.into()));
        self.run_loop(start_index).await
    }

    /// Like [`Agent::prompt`], condensed into an [`AgentRunReport`].
    pub async fn run(&mut self, text: impl Into<String>) -> Result<AgentRunReport, AgentError> {
        let new_messages = self.prompt(text).await?;
        Ok(AgentRunReport::from_messages(&new_messages))
    }

    fn emit(&self, event: AgentEvent) {
        for handler in &self.handlers {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self
            .tools
            .values()
            .map(|tool| tool.definition.clone())
            .collect::<Vec<_>>();
        definitions.sort_by(|left, right| left.name.cmp(&right.name));
        definitions
    }

    async fn run_loop(&mut self, start_index: usize) -> Result<Vec<Message>, AgentError> {
        self.emit(AgentEvent::AgentStart);

        for request_number in 1..=self.config.request_limit {
            self.emit(AgentEvent::RequestStart {
                request: request_number,
            });

            let tools = self.tool_definitions();
            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: self.messages.clone(),
                tool_choice: if tools.is_empty() {
                    None
                } else {
                    Some(ToolChoice::Auto)
                },
                json_mode: false,
                tools,
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let request_started = std::time::Instant::now();
            let response = self.complete_with_retry(request).await?;
            let request_duration_ms = request_started.elapsed().as_millis() as u64;
            let finish_reason = response.finish_reason.clone();
            let usage = response.usage.clone();
            let assistant = response.message;
            self.messages.push(assistant.clone());

            let tool_calls = assistant.tool_calls();
            let tool_results = tool_calls.len();
            for call in tool_calls {
                self.execute_tool_call(call).await;
            }

            self.emit(AgentEvent::RequestEnd {
                request: request_number,
                tool_results,
                request_duration_ms,
                usage,
                finish_reason,
            });

            if tool_results == 0 {
                let new_messages = self.messages[start_index..].to_vec();
                self.emit(AgentEvent::AgentEnd {
                    new_messages: new_messages.len(),
                });
                return Ok(new_messages);
            }
        }

        warn!(
            agent_id = %self.config.agent_id,
            request_limit = self.config.request_limit,
            "agent run stopped at request limit"
        );
        Err(AgentError::RequestLimitExceeded(self.config.request_limit))
    }

    async fn complete_with_retry(&self, request: ChatRequest) -> Result<ChatResponse, AgentError> {
        let max_retries = self.config.request_max_retries;
        let mut attempt = 0usize;
        let mut backoff_ms = self.config.request_retry_initial_backoff_ms.max(1);
        let max_backoff_ms = self.config.request_retry_max_backoff_ms.max(backoff_ms);
        let request_timeout = timeout_duration_from_ms(self.config.request_timeout_ms);

        loop {
            let client_call = self.client.complete(request.clone());
            let response_result = match request_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, client_call).await {
                    Ok(result) => result,
                    Err(_) => {
                        if attempt >= max_retries {
                            return Err(AgentError::RequestTimeout {
                                timeout_ms: timeout.as_millis() as u64,
                                attempt: attempt.saturating_add(1),
                            });
                        }
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = backoff_ms.saturating_mul(2).min(max_backoff_ms);
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                },
                None => client_call.await,
            };

            match response_result {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if attempt >= max_retries || !error.is_retryable() {
                        return Err(AgentError::Ai(error));
                    }
                    debug!(
                        attempt = attempt + 1,
                        backoff_ms,
                        error = %error,
                        "retrying model request"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(max_backoff_ms);
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn execute_tool_call(&mut self, call: ToolCall) {
        self.emit(AgentEvent::ToolExecutionStart {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let registered = self
            .tools
            .get(&call.name)
            .map(|tool| (tool.definition.clone(), Arc::clone(&tool.tool)));
        let tool_timeout = timeout_duration_from_ms(self.config.tool_timeout_ms);
        let task_call = call.clone();
        let result = match tokio::spawn(async move {
            execute_tool_call_inner(task_call, registered, tool_timeout).await
        })
        .await
        {
            Ok(result) => result,
            Err(error) => ToolExecutionResult::error(json!({
                "error": format!("tool '{}' execution task failed: {error}", call.name)
            })),
        };

        debug!(
            tool = %call.name,
            is_error = result.is_error,
            "tool call finished"
        );
        self.emit(AgentEvent::ToolExecutionEnd {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: result.clone(),
        });
        self.messages.push(Message::tool_result(
            call.id,
            call.name,
            result.as_text(),
            result.is_error,
        ));
    }
}

#[cfg(test)]
mod tests;
