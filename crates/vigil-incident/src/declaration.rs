use std::{fmt, str::FromStr};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Sev1,
    Sev2,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported severity '{0}', expected sev1 or sev2")]
pub struct SeverityParseError(pub String);

impl Severity {
    /// Lowercase token accepted on the command line, e.g. `sev1`.
    pub fn slug(self) -> &'static str {
        match self {
            Severity::Sev1 => "sev1",
            Severity::Sev2 => "sev2",
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Severity::Sev1 => "SEV-1",
            Severity::Sev2 => "SEV-2",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Severity::Sev1 => "🔴",
            Severity::Sev2 => "🟠",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Sev1 => f.write_str("SEV-1 (Critical)"),
            Severity::Sev2 => f.write_str("SEV-2 (Major)"),
        }
    }
}

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sev1" => Ok(Severity::Sev1),
            "sev2" => Ok(Severity::Sev2),
            _ => Err(SeverityParseError(value.trim().to_string())),
        }
    }
}

/// What the declare-incident command recorded about the incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentDeclaration {
    pub severity: Severity,
    pub declared_by: String,
    pub channel_name: String,
    pub channel_id: Option<String>,
    pub summary: String,
    /// Recent conversation lines captured at declaration time.
    pub context: Vec<String>,
    pub declared_at: DateTime<Local>,
}

#[cfg(test)]
mod tests {
    use super::Severity;

    #[test]
    fn unit_severity_parses_case_insensitively() {
        assert_eq!("SEV1".parse::<Severity>(), Ok(Severity::Sev1));
        assert_eq!(" sev2 ".parse::<Severity>(), Ok(Severity::Sev2));
        let error = "sev3".parse::<Severity>().expect_err("sev3 is unsupported");
        assert_eq!(error.0, "sev3");
        assert_eq!(Severity::Sev1.to_string(), "SEV-1 (Critical)");
        assert_eq!(Severity::Sev2.short_label(), "SEV-2");
    }
}
