//! The recurring summary loop and its resolution safety nets.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Local;
use tracing::{error, info, warn};
use vigil_agent_core::AgentError;
use vigil_incident::{
    detect_in_events, EventChannel, IncidentPhase, IncidentState, PhraseListDetector,
    ResolutionDetector,
};
use vigil_slack::SlackApiClient;

use crate::postmortem::{PostmortemOutcome, TerminalAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Delay before the first tick so the feeds can fill up.
    pub warmup: Duration,
    pub min_events: usize,
    /// Trailing transcript events scanned by the resolution pre-check.
    pub transcript_window: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            warmup: Duration::from_secs(30),
            min_events: 5,
            transcript_window: 5,
        }
    }
}

/// Produces and publishes one executive summary, returning the model's text.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn generate(&self, summary_number: u64, channel_id: &str) -> Result<String, AgentError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The incident is closed; the loop stops.
    Terminated,
    WaitingForDeclaration,
    InsufficientEvents { total: usize },
    /// The transcript announced resolution and the post-mortem did not fail;
    /// generation was skipped.
    PostmortemTriggered {
        summary_number: u64,
        phrase: String,
        outcome: PostmortemOutcome,
    },
    Generated {
        summary_number: u64,
        /// Set when either resolution pass ran the post-mortem. A failed
        /// transcript-triggered run is not retried by the output pass.
        postmortem: Option<PostmortemOutcome>,
    },
    BudgetExceeded { summary_number: u64 },
    GenerationFailed { summary_number: u64, error: String },
}

pub struct SummaryScheduler {
    state: Arc<IncidentState>,
    config: SchedulerConfig,
    generator: Arc<dyn SummaryGenerator>,
    terminal: Arc<dyn TerminalAction>,
    transcript_detector: Box<dyn ResolutionDetector>,
    output_detector: Box<dyn ResolutionDetector>,
    notifier: Option<SlackApiClient>,
}

impl SummaryScheduler {
    pub fn new(
        state: Arc<IncidentState>,
        config: SchedulerConfig,
        generator: Arc<dyn SummaryGenerator>,
        terminal: Arc<dyn TerminalAction>,
    ) -> Self {
        Self {
            state,
            config,
            generator,
            terminal,
            transcript_detector: Box::new(PhraseListDetector::transcript()),
            output_detector: Box::new(PhraseListDetector::summary_output()),
            notifier: None,
        }
    }

    pub fn with_detectors(
        mut self,
        transcript: Box<dyn ResolutionDetector>,
        output: Box<dyn ResolutionDetector>,
    ) -> Self {
        self.transcript_detector = transcript;
        self.output_detector = output;
        self
    }

    /// Posts post-mortem links back to the incident channel.
    pub fn with_notifier(mut self, slack: SlackApiClient) -> Self {
        self.notifier = Some(slack);
        self
    }

    pub fn phase(&self) -> IncidentPhase {
        self.state.phase()
    }

    /// Waits out the warm-up, then ticks until the incident terminates.
    pub async fn run(&self) {
        info!(
            warmup_secs = self.config.warmup.as_secs(),
            interval_secs = self.config.interval.as_secs(),
            "summary scheduler starting"
        );
        tokio::time::sleep(self.config.warmup).await;

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if self.tick().await == TickOutcome::Terminated {
                info!("incident closed; summary scheduler stopped");
                break;
            }
        }
    }

    /// One pass of the state machine. Flags and the gate are re-read every call.
    pub async fn tick(&self) -> TickOutcome {
        if self.state.is_terminated() {
            return TickOutcome::Terminated;
        }
        let Some(channel_id) = self.state.channel_id().map(str::to_string) else {
            info!("waiting for incident declaration before summarizing");
            return TickOutcome::WaitingForDeclaration;
        };
        let total = self.state.total_events();
        if total < self.config.min_events {
            info!(total, min_events = self.config.min_events, "not enough events to summarize");
            return TickOutcome::InsufficientEvents { total };
        }

        let summary_number = self.state.begin_summary();
        info!(summary_number, channel_id = %channel_id, total, "generating executive summary");

        let mut postmortem = None;
        let recent = self
            .state
            .last_events(EventChannel::Transcript, self.config.transcript_window);
        if let Some((event, phrase)) = detect_in_events(self.transcript_detector.as_ref(), &recent)
        {
            if self.terminal_flags_clear() {
                info!(
                    summary_number,
                    phrase = %phrase,
                    at = %event.timestamp,
                    "resolution announced on the bridge; creating post-mortem"
                );
                self.state.resolution_detected.try_set();
                let outcome = self.run_terminal(&channel_id).await;
                if !matches!(outcome, PostmortemOutcome::Failed { .. }) {
                    return TickOutcome::PostmortemTriggered {
                        summary_number,
                        phrase,
                        outcome,
                    };
                }
                info!(summary_number, "post-mortem failed; summarizing this tick anyway");
                postmortem = Some(outcome);
            }
        }

        let output = match self.generator.generate(summary_number, &channel_id).await {
            Ok(output) => output,
            Err(AgentError::RequestLimitExceeded(limit)) => {
                warn!(summary_number, limit, "summary agent hit its request limit; skipping tick");
                return TickOutcome::BudgetExceeded { summary_number };
            }
            Err(error) => {
                let rendered = format!("{error:#}");
                error!(summary_number, error = %rendered, "summary generation failed");
                return TickOutcome::GenerationFailed {
                    summary_number,
                    error: rendered,
                };
            }
        };

        if let Some(phrase) = self.output_detector.detect(&output) {
            if postmortem.is_none() && self.terminal_flags_clear() {
                info!(
                    summary_number,
                    phrase = %phrase,
                    "summary reports resolution; creating post-mortem"
                );
                self.state.resolution_detected.try_set();
                postmortem = Some(self.run_terminal(&channel_id).await);
            }
        }

        self.state.record_summary_time(Local::now());
        TickOutcome::Generated {
            summary_number,
            postmortem,
        }
    }

    fn terminal_flags_clear(&self) -> bool {
        !self.state.jira_tickets_created.is_set() && !self.state.incident_resolved.is_set()
    }

    async fn run_terminal(&self, channel_id: &str) -> PostmortemOutcome {
        let outcome = self.terminal.run().await;
        match &outcome {
            PostmortemOutcome::Created { message, .. } => {
                if let Some(slack) = &self.notifier {
                    if let Err(error) = slack.post_message(channel_id, message, true).await {
                        warn!(
                            channel_id,
                            error = %format!("{error:#}"),
                            "could not post post-mortem links"
                        );
                    }
                }
            }
            PostmortemOutcome::Failed { error } => {
                warn!(
                    channel_id,
                    error = %error,
                    "post-mortem not created; a later tick will retry"
                );
            }
            PostmortemOutcome::AlreadyCompleted | PostmortemOutcome::InProgress => {}
        }
        outcome
    }
}
