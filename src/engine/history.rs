//! Per-query result digest history
//!
//! Bounded by age and by count; both bounds are applied before every lookup
//! and insert.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const HISTORY_RETENTION: Duration = Duration::from_secs(60);
pub const HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_RESULT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Entry {
    query_id: String,
    digest: String,
    recorded_at: Instant,
}

pub struct DuplicateHistory {
    entries: Mutex<VecDeque<Entry>>,
    retention: Duration,
    capacity: usize,
}

impl DuplicateHistory {
    pub fn new() -> Self {
        Self::with_limits(HISTORY_RETENTION, HISTORY_CAPACITY)
    }

    pub fn with_limits(retention: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            retention,
            capacity,
        }
    }

    /// True if the same query produced the same digest within `window`
    pub fn is_recent_duplicate(&self, query_id: &str, digest: &str, window: Duration) -> bool {
        self.is_recent_duplicate_at(query_id, digest, window, Instant::now())
    }

    pub(crate) fn is_recent_duplicate_at(
        &self,
        query_id: &str,
        digest: &str,
        window: Duration,
        now: Instant,
    ) -> bool {
        let mut entries = self.entries.lock();
        self.purge(&mut entries, now);

        entries.iter().any(|e| {
            e.query_id == query_id
                && e.digest == digest
                && now.saturating_duration_since(e.recorded_at) <= window
        })
    }

    pub fn record(&self, query_id: &str, digest: &str) {
        self.record_at(query_id, digest, Instant::now());
    }

    pub(crate) fn record_at(&self, query_id: &str, digest: &str, now: Instant) {
        let mut entries = self.entries.lock();
        self.purge(&mut entries, now);

        entries.push_back(Entry {
            query_id: query_id.to_string(),
            digest: digest.to_string(),
            recorded_at: now,
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn purge(&self, entries: &mut VecDeque<Entry>, now: Instant) {
        while let Some(front) = entries.front() {
            if now.saturating_duration_since(front.recorded_at) > self.retention {
                entries.pop_front();
            } else {
                break;
            }
        }
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }
}

impl Default for DuplicateHistory {
    fn default() -> Self {
        Self::new()
    }
}
