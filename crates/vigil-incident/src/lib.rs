//! Shared incident state: per-channel event logs, the channel-id gate,
//! monotonic counters, one-way flags, and resolution detection.

mod declaration;
mod event;
mod once;
mod resolution;
mod state;

pub use declaration::{IncidentDeclaration, Severity, SeverityParseError};
pub use event::{EventChannel, StreamEvent};
pub use once::{Claim, ClaimFlag, OnceFlag};
pub use resolution::{detect_in_events, PhraseListDetector, ResolutionDetector};
pub use state::{AppendError, EventAppender, IncidentPhase, IncidentState};
