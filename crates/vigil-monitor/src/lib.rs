//! The incident monitor: event ingestion, incident declaration, recurring
//! executive summaries and the post-mortem hand-off.

mod chat_feed;
mod declare;
mod ingest;
mod naming;
mod postmortem;
mod prompts;
mod provisioning;
mod reasoning;
mod runtime;
mod scheduler;
mod tools;

#[cfg(test)]
mod test_support;

pub use chat_feed::{resolve_channel_id, SlackChatFeed, SEEN_MESSAGE_CAPACITY};
pub use declare::{DeclareIncidentHandler, DeclareOutcome, DECLARE_INCIDENT_COMMAND};
pub use ingest::{ingest_feed, sse_payload, StreamFeed};
pub use naming::{fallback_name, slugify_description, IncidentName, IncidentNamer};
pub use postmortem::{PostmortemAction, PostmortemDocument, PostmortemOutcome, TerminalAction};
pub use prompts::{incident_monitor_prompt, render_summary_task};
pub use provisioning::{create_or_reuse_channel, invite_workspace_humans, ProvisionedChannel};
pub use reasoning::{
    log_summary_output, parse_executive_summary, render_incident_context, ExecutiveSummary,
    ReasoningAdapter, ReasoningConfig,
};
pub use runtime::{run_monitor, MonitorConfig, MonitorSocketHandler, SlackSettings};
pub use scheduler::{SchedulerConfig, SummaryGenerator, SummaryScheduler, TickOutcome};
pub use tools::{
    is_placeholder_channel_id, render_feedback_request, CreateIncidentChannelTool,
    CreatePostmortemTool, PublishSummaryTool, RequestTeamFeedbackTool, CREATE_CHANNEL_TOOL,
    CREATE_POSTMORTEM_TOOL, PUBLISH_SUMMARY_TOOL, REQUEST_FEEDBACK_TOOL,
};
