//! Outcome of one query execution

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::ResultSet;
use crate::queries::QueryDefinition;

pub const DUPLICATE_MESSAGE: &str = "Duplicate result ignored";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Failed,
    /// Same digest as a recent run of this query; not surfaced again
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub query_id: String,
    pub query_name: String,
    pub outcome: ExecutionOutcome,
    pub error: Option<String>,
    pub data: ResultSet,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::config::duration_millis")]
    pub elapsed: Duration,
}

impl ExecutionResult {
    fn base(def: &QueryDefinition, outcome: ExecutionOutcome) -> Self {
        Self {
            query_id: def.id.clone(),
            query_name: def.name.clone(),
            outcome,
            error: None,
            data: ResultSet::empty(),
            timestamp: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(def: &QueryDefinition, data: ResultSet) -> Self {
        Self {
            data,
            ..Self::base(def, ExecutionOutcome::Succeeded)
        }
    }

    pub fn failed(def: &QueryDefinition, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(def, ExecutionOutcome::Failed)
        }
    }

    pub fn duplicate(def: &QueryDefinition) -> Self {
        Self {
            error: Some(DUPLICATE_MESSAGE.to_string()),
            ..Self::base(def, ExecutionOutcome::Duplicate)
        }
    }

    pub fn timed_out(def: &QueryDefinition, limit: Duration) -> Self {
        let mut result = Self::failed(
            def,
            format!("Query timed out after {} seconds", limit.as_secs()),
        );
        result.elapsed = limit;
        result
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Succeeded
    }
}
