//! Tool-bridge helpers for argument validation and tool execution.

use std::{sync::Arc, time::Duration};

use jsonschema::validator_for;
use serde_json::{json, Value};
use vigil_ai::{ToolCall, ToolDefinition};

use crate::{AgentTool, ToolExecutionResult};

pub(crate) async fn execute_tool_call_inner(
    call: ToolCall,
    registered: Option<(ToolDefinition, Arc<dyn AgentTool>)>,
    tool_timeout: Option<Duration>,
) -> ToolExecutionResult {
    let Some((definition, tool)) = registered else {
        return ToolExecutionResult::error(json!({
            "error": format!("Tool '{}' is not registered", call.name)
        }));
    };

    if let Err(error) = validate_tool_arguments(&definition, &call.arguments) {
        return ToolExecutionResult::error(json!({ "error": error }));
    }

    match tool_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, tool.execute(call.arguments)).await {
            Ok(result) => result,
            Err(_) => ToolExecutionResult::error(json!({
                "error": format!(
                    "tool '{}' timed out after {}ms",
                    definition.name,
                    timeout.as_millis()
                )
            })),
        },
        None => tool.execute(call.arguments).await,
    }
}

pub(crate) fn validate_tool_arguments(
    definition: &ToolDefinition,
    arguments: &Value,
) -> Result<(), String> {
    let validator = validator_for(&definition.parameters)
        .map_err(|error| format!("invalid JSON schema for '{}': {error}", definition.name))?;

    let mut errors = validator.iter_errors(arguments);
    if let Some(first) = errors.next() {
        return Err(format!(
            "invalid arguments for '{}': {}",
            definition.name, first
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use vigil_ai::{ToolCall, ToolDefinition};

    use super::{execute_tool_call_inner, validate_tool_arguments};
    use crate::{AgentTool, ToolExecutionResult};

    struct SlowTool;

    #[async_trait]
    impl AgentTool for SlowTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "slow".to_string(),
                description: "sleeps".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ToolExecutionResult::ok(json!("late"))
        }
    }

    fn channel_schema() -> ToolDefinition {
        ToolDefinition {
            name: "publish_exec_summary_to_slack".to_string(),
            description: "publish".to_string(),
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

    #[test]
    fn unit_validate_tool_arguments_reports_missing_required_field() {
        let error = validate_tool_arguments(&channel_schema(), &json!({ "markdown": "hi" }))
            .expect_err("channel_id is required");
        assert!(error.contains("invalid arguments for 'publish_exec_summary_to_slack'"));
        assert!(validate_tool_arguments(
            &channel_schema(),
            &json!({ "markdown": "hi", "channel_id": "C1" })
        )
        .is_ok());
    }

    #[tokio::test]
    async fn functional_unregistered_tool_returns_error_result() {
        let result = execute_tool_call_inner(
            ToolCall {
                id: "call_1".to_string(),
                name: "missing".to_string(),
                arguments: json!({}),
            },
            None,
            None,
        )
        .await;
        assert!(result.is_error);
        assert!(result.as_text().contains("not registered"));
    }

    #[tokio::test]
    async fn regression_tool_timeout_is_reported_as_error() {
        let tool: Arc<dyn AgentTool> = Arc::new(SlowTool);
        let result = execute_tool_call_inner(
            ToolCall {
                id: "call_2".to_string(),
                name: "slow".to_string(),
                arguments: json!({}),
            },
            Some((tool.definition(), tool)),
            Some(Duration::from_millis(10)),
        )
        .await;
        assert!(result.is_error);
        assert!(result.as_text().contains("timed out after 10ms"));
    }
}
