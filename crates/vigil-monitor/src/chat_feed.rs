//! Chat events from a monitored Slack channel, delivered over Socket Mode.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{anyhow, Result};
use tracing::debug;
use vigil_core::local_wall_clock;
use vigil_incident::{EventAppender, StreamEvent};
use vigil_slack::{SlackApiClient, SlackMessageEvent};

pub const SEEN_MESSAGE_CAPACITY: usize = 1_000;

/// Bounded set of message timestamps; the oldest entry is evicted first.
#[derive(Debug)]
struct SeenMessages {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl SeenMessages {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false when `ts` was already recorded.
    fn insert(&mut self, ts: &str) -> bool {
        if self.members.contains(ts) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(ts.to_string());
        self.members.insert(ts.to_string());
        true
    }
}

pub struct SlackChatFeed {
    slack: SlackApiClient,
    channel_id: String,
    appender: EventAppender,
    seen: Mutex<SeenMessages>,
    usernames: Mutex<HashMap<String, String>>,
}

impl SlackChatFeed {
    pub fn new(
        slack: SlackApiClient,
        channel_id: impl Into<String>,
        appender: EventAppender,
    ) -> Self {
        Self {
            slack,
            channel_id: channel_id.into(),
            appender,
            seen: Mutex::new(SeenMessages::new(SEEN_MESSAGE_CAPACITY)),
            usernames: Mutex::new(HashMap::new()),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Appends the message when it belongs to the monitored channel, is a
    /// plain or bot message, and has not been seen before.
    pub async fn accept(&self, event: &SlackMessageEvent) -> bool {
        if event.channel != self.channel_id {
            return false;
        }
        if !matches!(event.subtype.as_deref(), None | Some("bot_message")) {
            return false;
        }
        if event.text.trim().is_empty() {
            return false;
        }
        if !lock_or_recover(&self.seen).insert(&event.ts) {
            debug!(ts = %event.ts, "duplicate slack message skipped");
            return false;
        }

        let author = self.author_name(event).await;
        self.appender.append(StreamEvent::new(
            self.appender.channel(),
            local_wall_clock(),
            format!("{author}: {}", event.text),
        ));
        true
    }

    async fn author_name(&self, event: &SlackMessageEvent) -> String {
        let Some(user_id) = event.user.as_deref() else {
            return event
                .username
                .clone()
                .or_else(|| event.bot_id.clone())
                .unwrap_or_else(|| "unknown".to_string());
        };
        if let Some(name) = lock_or_recover(&self.usernames).get(user_id) {
            return name.clone();
        }
        let name = match self.slack.user_info(user_id).await {
            Ok(user) => user.display_label(),
            Err(error) => {
                debug!(user_id, error = %format!("{error:#}"), "slack user lookup failed");
                user_id.to_string()
            }
        };
        lock_or_recover(&self.usernames).insert(user_id.to_string(), name.clone());
        name
    }
}

/// `C…`/`G…` ids are used as given; anything else is looked up by name.
pub async fn resolve_channel_id(slack: &SlackApiClient, identifier: &str) -> Result<String> {
    let identifier = identifier.trim();
    if identifier.starts_with('C') || identifier.starts_with('G') {
        return Ok(identifier.to_string());
    }
    slack
        .find_channel_by_name(identifier)
        .await?
        .map(|channel| channel.id)
        .ok_or_else(|| anyhow!("slack channel '{identifier}' was not found"))
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
