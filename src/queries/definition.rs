//! Query definition type

use serde::{Deserialize, Serialize};

use crate::alerts::Severity;

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// A named query plus its alerting rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    /// Unique, non-empty key
    pub id: String,
    /// Display name, used as the alert title
    pub name: String,
    /// Read-only SQL executed against the data source
    pub sql: String,
    /// Configured severity; `None` selects keyword classification
    pub alert_type: Option<Severity>,
    /// Count threshold for the first cell; 0 disables threshold classification
    pub threshold: i64,
    pub enabled: bool,
    /// Seconds to wait for a result; 0 waits indefinitely
    pub timeout_secs: u64,
}

impl QueryDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sql: sql.into(),
            alert_type: None,
            threshold: 0,
            enabled: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_alert_type(mut self, severity: Severity) -> Self {
        self.alert_type = Some(severity);
        self
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}
