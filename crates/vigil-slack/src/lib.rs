//! Slack Web API and Socket Mode plumbing for the incident monitor.

mod api_client;
mod channel_name;
mod socket_mode;
mod tokens;

pub use api_client::{
    ChannelCreateOutcome, SlackApiClient, SlackChannel, SlackHistoryMessage, SlackIdentity,
    SlackPostedMessage, SlackUser, SlackUserProfile, SLACK_INVITE_BATCH_LIMIT,
};
pub use channel_name::{sanitize_channel_name, MAX_CHANNEL_NAME_CHARS};
pub use socket_mode::{
    run_socket_mode, ReconnectPolicy, SlackMessageEvent, SlashCommandPayload, SocketModeHandler,
};
pub use tokens::{token_warnings, TokenKind};
