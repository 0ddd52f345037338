//! Alert and severity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Upper-case label shown next to an alert
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    /// Display colour as a hex triplet
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Critical => "#d32f2f",
            Severity::Warning => "#f57c00",
            Severity::Info => "#388e3c",
        }
    }

    /// Match a configured type string against the synonym sets.
    ///
    /// Returns `None` when the string names no known severity.
    pub fn from_synonym(s: &str) -> Option<Severity> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "error" | "fatal" => Some(Severity::Critical),
            "warning" | "warn" | "alert" => Some(Severity::Warning),
            "info" | "information" | "notice" => Some(Severity::Info),
            _ => None,
        }
    }

    /// Lenient parse used by the query definition format: unknown strings are `Info`
    pub fn parse_lenient(s: &str) -> Severity {
        Self::from_synonym(s).unwrap_or(Severity::Info)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_synonym(s).ok_or_else(|| UnknownSeverity(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown severity: {0}")]
pub struct UnknownSeverity(pub String);

/// Alert content before the store assigns an id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub source: String,
    pub raw_result: Option<String>,
}

impl NewAlert {
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
            source: source.into(),
            raw_result: None,
        }
    }

    pub fn with_raw_result(mut self, raw: impl Into<String>) -> Self {
        self.raw_result = Some(raw.into());
        self
    }
}

/// A stored alert. Immutable once the store hands it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Sequential id, starting at 1, never reused
    pub id: u64,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    /// Id of the query definition that produced the alert
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub(crate) fn from_candidate(id: u64, candidate: NewAlert, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            severity: candidate.severity,
            title: candidate.title,
            message: candidate.message,
            source: candidate.source,
            raw_result: candidate.raw_result,
            created_at,
        }
    }

    /// Same severity, source, title and message
    pub fn same_content(&self, candidate: &NewAlert) -> bool {
        self.same_origin(candidate) && self.message == candidate.message
    }

    /// Same severity, source and title
    pub fn same_origin(&self, candidate: &NewAlert) -> bool {
        self.severity == candidate.severity
            && self.source == candidate.source
            && self.title == candidate.title
    }

    /// Human-readable age relative to `now`
    pub fn age_text(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.created_at).num_seconds();
        if secs < 5 {
            "Just now".to_string()
        } else if secs < 60 {
            format!("{} seconds ago", secs)
        } else if secs < 3600 {
            format!("{} minutes ago", secs / 60)
        } else if secs < 86_400 {
            format!("{} hours ago", secs / 3600)
        } else {
            self.created_at.format("%b %d, %Y %H:%M:%S").to_string()
        }
    }
}
