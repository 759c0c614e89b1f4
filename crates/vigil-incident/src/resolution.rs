use crate::StreamEvent;

const TRANSCRIPT_PHRASES: &[&str] = &[
    "marking as resolved",
    "incident resolved",
    "let's close it out",
    "marking this resolved",
    "close it out",
];

const SUMMARY_OUTPUT_PHRASES: &[&str] = &[
    "incident resolved",
    "resolved -",
    "status: resolved",
    "all systems operational",
    "systems have returned to normal",
    "incident closed",
    "marking as resolved",
];

/// Decides whether a piece of text announces that the incident is over.
pub trait ResolutionDetector: Send + Sync {
    /// Returns the matched phrase.
    fn detect(&self, text: &str) -> Option<String>;
}

/// Case-insensitive substring match against a fixed phrase list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseListDetector {
    phrases: Vec<String>,
}

impl PhraseListDetector {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|phrase| phrase.as_ref().trim().to_lowercase())
                .filter(|phrase| !phrase.is_empty())
                .collect(),
        }
    }

    /// Phrases people say on the bridge when they close an incident.
    pub fn transcript() -> Self {
        Self::new(TRANSCRIPT_PHRASES)
    }

    /// Phrases the summary model uses for a resolved incident.
    pub fn summary_output() -> Self {
        Self::new(SUMMARY_OUTPUT_PHRASES)
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl ResolutionDetector for PhraseListDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| lowered.contains(phrase.as_str()))
            .cloned()
    }
}

/// Runs a detector over event messages, newest first.
pub fn detect_in_events(
    detector: &dyn ResolutionDetector,
    events: &[StreamEvent],
) -> Option<(StreamEvent, String)> {
    events.iter().rev().find_map(|event| {
        detector
            .detect(&event.message)
            .map(|phrase| (event.clone(), phrase))
    })
}
