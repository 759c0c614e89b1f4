//! Summary of one agent run: final text plus the tool invocation trace.

use serde::Serialize;
use serde_json::Value;
use vigil_ai::{Message, MessageRole};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocationRecord {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: Value,
    pub is_error: bool,
    pub result_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRunReport {
    /// Text of the final assistant message.
    pub output: String,
    pub tool_calls: Vec<ToolInvocationRecord>,
    /// Number of model requests spent on the run.
    pub requests: usize,
}

impl AgentRunReport {
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut tool_calls: Vec<ToolInvocationRecord> = Vec::new();
        let mut requests = 0usize;
        let mut output = String::new();

        for message in messages {
            match message.role {
                MessageRole::Assistant => {
                    requests += 1;
                    output = message.text_content();
                    for call in message.tool_calls() {
                        tool_calls.push(ToolInvocationRecord {
                            tool_call_id: call.id,
                            name: call.name,
                            arguments: call.arguments,
                            is_error: false,
                            result_text: String::new(),
                        });
                    }
                }
                MessageRole::Tool => {
                    let Some(call_id) = message.tool_call_id.as_deref() else {
                        continue;
                    };
                    if let Some(record) = tool_calls
                        .iter_mut()
                        .rev()
                        .find(|record| record.tool_call_id == call_id)
                    {
                        record.is_error = message.is_error;
                        record.result_text = message.text_content();
                    }
                }
                MessageRole::System | MessageRole::User => {}
            }
        }

        Self {
            output,
            tool_calls,
            requests,
        }
    }

    pub fn called(&self, tool_name: &str) -> bool {
        self.tool_calls.iter().any(|call| call.name == tool_name)
    }
}
