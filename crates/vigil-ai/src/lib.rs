//! Language-model message types and the OpenAI-compatible chat client used
//! by the incident monitor.
mod openai;
mod provider;
mod retry;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use provider::{ModelRef, ModelRefParseError, Provider};
pub use types::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    ToolCall, ToolChoice, ToolDefinition,
};
