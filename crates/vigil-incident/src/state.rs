use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock,
    },
    time::Duration,
};

use chrono::{DateTime, Local, Timelike};
use thiserror::Error;

use crate::{
    event::parse_time_of_day, Claim, ClaimFlag, EventChannel, IncidentDeclaration, OnceFlag,
    StreamEvent,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("appender for channel '{0}' was already taken")]
    AppenderTaken(EventChannel),
}

/// Where the incident is in its lifecycle, derived from the gate and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentPhase {
    WaitingForDeclaration,
    Active,
    ResolvedPendingPostmortem,
    Terminated,
}

#[derive(Debug, Default)]
struct EventLog {
    events: RwLock<Vec<StreamEvent>>,
}

impl EventLog {
    fn snapshot(&self) -> Vec<StreamEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn tail(&self, count: usize) -> Vec<StreamEvent> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        events[events.len().saturating_sub(count)..].to_vec()
    }

    fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// The only write handle for one channel's event log.
#[derive(Debug)]
pub struct EventAppender {
    channel: EventChannel,
    log: Arc<EventLog>,
}

impl EventAppender {
    pub fn channel(&self) -> EventChannel {
        self.channel
    }

    /// Appends an event; its channel is rewritten to the appender's channel.
    pub fn append(&self, mut event: StreamEvent) {
        event.channel = self.channel;
        self.log
            .events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Shared aggregate for a single incident, created once per process.
#[derive(Debug)]
pub struct IncidentState {
    logs: [Arc<EventLog>; 3],
    appenders_taken: [OnceFlag; 3],
    started_at: DateTime<Local>,
    slack_channel_id: OnceLock<String>,
    channel_provisioning: ClaimFlag,
    summary_count: AtomicU64,
    last_feedback_request_summary: AtomicU64,
    pub incident_resolved: OnceFlag,
    pub jira_tickets_created: OnceFlag,
    pub confluence_postmortem_created: OnceFlag,
    /// Set the first time either resolution pass matches.
    pub resolution_detected: OnceFlag,
    last_summary_time: Mutex<Option<DateTime<Local>>>,
    latest_published_summary: Mutex<Option<String>>,
    declaration: Mutex<Option<IncidentDeclaration>>,
}

impl Default for IncidentState {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentState {
    pub fn new() -> Self {
        Self::started_at(Local::now())
    }

    pub fn started_at(started_at: DateTime<Local>) -> Self {
        Self {
            logs: Default::default(),
            appenders_taken: Default::default(),
            started_at,
            slack_channel_id: OnceLock::new(),
            channel_provisioning: ClaimFlag::new(),
            summary_count: AtomicU64::new(0),
            last_feedback_request_summary: AtomicU64::new(0),
            incident_resolved: OnceFlag::new(),
            jira_tickets_created: OnceFlag::new(),
            confluence_postmortem_created: OnceFlag::new(),
            resolution_detected: OnceFlag::new(),
            last_summary_time: Mutex::new(None),
            latest_published_summary: Mutex::new(None),
            declaration: Mutex::new(None),
        }
    }

    /// Hands out the write handle for `channel`. Each handle is issued once.
    pub fn take_appender(&self, channel: EventChannel) -> Result<EventAppender, AppendError> {
        let index = channel.index();
        if !self.appenders_taken[index].try_set() {
            return Err(AppendError::AppenderTaken(channel));
        }
        Ok(EventAppender {
            channel,
            log: Arc::clone(&self.logs[index]),
        })
    }

    pub fn incident_start_time(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn incident_duration(&self, now: DateTime<Local>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.slack_channel_id.get().map(String::as_str)
    }

    /// Sets the incident channel id if unset. Returns `true` for the caller
    /// that set it; later callers leave the stored id untouched.
    pub fn try_set_channel_id(&self, channel_id: impl Into<String>) -> bool {
        let channel_id = channel_id.into();
        if channel_id.trim().is_empty() {
            return false;
        }
        self.slack_channel_id.set(channel_id).is_ok()
    }

    /// Exclusive right to create the incident channel. Hold it from the gate
    /// check until [`Self::try_set_channel_id`] has run.
    pub fn try_claim_channel_provisioning(&self) -> Option<Claim<'_>> {
        self.channel_provisioning.try_claim()
    }

    pub fn summary_count(&self) -> u64 {
        self.summary_count.load(Ordering::Acquire)
    }

    /// Starts a new summary and returns its number.
    pub fn begin_summary(&self) -> u64 {
        self.summary_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn last_feedback_request_summary(&self) -> u64 {
        self.last_feedback_request_summary.load(Ordering::Acquire)
    }

    /// Records a feedback request against the current summary number.
    pub fn record_feedback_request(&self) -> u64 {
        let current = self.summary_count();
        self.last_feedback_request_summary
            .fetch_max(current, Ordering::AcqRel);
        current
    }

    pub fn summaries_since_feedback(&self) -> u64 {
        self.summary_count()
            .saturating_sub(self.last_feedback_request_summary())
    }

    pub fn events(&self, channel: EventChannel) -> Vec<StreamEvent> {
        self.logs[channel.index()].snapshot()
    }

    /// The last `count` events of one channel, oldest first.
    pub fn last_events(&self, channel: EventChannel, count: usize) -> Vec<StreamEvent> {
        self.logs[channel.index()].tail(count)
    }

    pub fn event_count(&self, channel: EventChannel) -> usize {
        self.logs[channel.index()].len()
    }

    pub fn total_events(&self) -> usize {
        self.logs.iter().map(|log| log.len()).sum()
    }

    /// Every event across channels, ordered by timestamp string.
    pub fn all_events(&self) -> Vec<StreamEvent> {
        let mut events = self
            .logs
            .iter()
            .flat_map(|log| log.snapshot())
            .collect::<Vec<_>>();
        events.sort_by(|left, right| left.timestamp.cmp(&right.timestamp));
        events
    }

    /// Events stamped within `window` before `now`, treating timestamps as
    /// times of the current day.
    pub fn recent_events(&self, window: Duration, now: DateTime<Local>) -> Vec<StreamEvent> {
        let now_seconds = i64::from(now.num_seconds_from_midnight());
        let cutoff = now_seconds - i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        self.all_events()
            .into_iter()
            .filter(|event| {
                let seconds = parse_time_of_day(&event.timestamp)
                    .map(i64::from)
                    .unwrap_or(now_seconds);
                seconds > cutoff
            })
            .collect()
    }

    pub fn last_summary_time(&self) -> Option<DateTime<Local>> {
        *lock_or_recover(&self.last_summary_time)
    }

    pub fn record_summary_time(&self, at: DateTime<Local>) {
        *lock_or_recover(&self.last_summary_time) = Some(at);
    }

    pub fn latest_published_summary(&self) -> Option<String> {
        lock_or_recover(&self.latest_published_summary).clone()
    }

    pub fn record_published_summary(&self, markdown: impl Into<String>) {
        *lock_or_recover(&self.latest_published_summary) = Some(markdown.into());
    }

    pub fn declaration(&self) -> Option<IncidentDeclaration> {
        lock_or_recover(&self.declaration).clone()
    }

    pub fn record_declaration(&self, declaration: IncidentDeclaration) {
        *lock_or_recover(&self.declaration) = Some(declaration);
    }

    /// True once post-mortem work is done or the incident is closed.
    pub fn is_terminated(&self) -> bool {
        self.incident_resolved.is_set() || self.confluence_postmortem_created.is_set()
    }

    pub fn phase(&self) -> IncidentPhase {
        if self.is_terminated() {
            IncidentPhase::Terminated
        } else if self.resolution_detected.is_set() {
            IncidentPhase::ResolvedPendingPostmortem
        } else if self.channel_id().is_some() {
            IncidentPhase::Active
        } else {
            IncidentPhase::WaitingForDeclaration
        }
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
