//! Running execution counters

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::execution::{ExecutionOutcome, ExecutionResult};

#[derive(Debug, Default)]
struct Counters {
    executed: u64,
    failed: u64,
    duplicates: u64,
    total_elapsed: Duration,
    last_execution: Option<DateTime<Utc>>,
    per_query: HashMap<String, u64>,
}

/// Counters updated from every completed execution
#[derive(Debug, Default)]
pub struct ExecutionStats {
    counters: Mutex<Counters>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed execution. Duplicates count as failures and are
    /// also tallied on their own.
    pub fn record(&self, result: &ExecutionResult) {
        let mut c = self.counters.lock();
        c.executed += 1;
        match result.outcome {
            ExecutionOutcome::Succeeded => {}
            ExecutionOutcome::Failed => c.failed += 1,
            ExecutionOutcome::Duplicate => {
                c.failed += 1;
                c.duplicates += 1;
            }
        }
        c.total_elapsed += result.elapsed;
        c.last_execution = Some(result.timestamp);
        *c.per_query.entry(result.query_id.clone()).or_insert(0) += 1;
    }

    pub fn executed_count(&self) -> u64 {
        self.counters.lock().executed
    }

    pub fn failed_count(&self) -> u64 {
        self.counters.lock().failed
    }

    pub fn duplicate_count(&self) -> u64 {
        self.counters.lock().duplicates
    }

    pub fn last_execution_time(&self) -> Option<DateTime<Utc>> {
        self.counters.lock().last_execution
    }

    pub fn average_execution_time(&self) -> Duration {
        let c = self.counters.lock();
        average(c.total_elapsed, c.executed)
    }

    pub fn execution_counts(&self) -> HashMap<String, u64> {
        self.counters.lock().per_query.clone()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = self.counters.lock();
        StatsSnapshot {
            executed: c.executed,
            failed: c.failed,
            duplicates: c.duplicates,
            average_execution_ms: average(c.total_elapsed, c.executed).as_secs_f64() * 1000.0,
            last_execution: c.last_execution,
            per_query: c.per_query.clone(),
        }
    }

    pub fn reset(&self) {
        *self.counters.lock() = Counters::default();
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub executed: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub average_execution_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
    pub per_query: HashMap<String, u64>,
}
