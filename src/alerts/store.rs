//! Bounded, thread-safe alert store
//!
//! Alerts are kept in insertion order. Content duplicates inside the
//! configured window are rejected, and once the cap is exceeded the oldest
//! alerts are evicted first.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::model::{Alert, NewAlert, Severity};

pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ALERTS: usize = 1000;

/// Store settings, applied to calls made after they change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStoreConfig {
    pub duplicate_detection: bool,
    #[serde(with = "crate::config::duration_millis")]
    pub duplicate_window: Duration,
    pub max_alerts: usize,
}

impl Default for AlertStoreConfig {
    fn default() -> Self {
        Self {
            duplicate_detection: true,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
            max_alerts: DEFAULT_MAX_ALERTS,
        }
    }
}

struct Inner {
    alerts: VecDeque<Alert>,
    next_id: u64,
    config: AlertStoreConfig,
}

impl Inner {
    fn find_within(
        &self,
        window: Duration,
        now: DateTime<Utc>,
        matches: impl Fn(&Alert) -> bool,
    ) -> bool {
        let cutoff = cutoff(now, window);
        self.alerts
            .iter()
            .any(|a| a.created_at >= cutoff && matches(a))
    }

    fn truncate_oldest(&mut self, max: usize) -> usize {
        let excess = self.alerts.len().saturating_sub(max);
        self.alerts.drain(..excess);
        excess
    }
}

fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Alert store guarded by a single lock
pub struct AlertStore {
    inner: Mutex<Inner>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::with_config(AlertStoreConfig::default())
    }

    pub fn with_config(config: AlertStoreConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                alerts: VecDeque::new(),
                next_id: 1,
                config,
            }),
        }
    }

    /// Insert an alert, stamping it with the next id and the current time.
    ///
    /// Returns `None` when duplicate detection is on and an alert with the
    /// same severity, source, title and message exists inside the window.
    pub fn add_alert(&self, candidate: NewAlert) -> Option<Alert> {
        self.add_alert_at(candidate, Utc::now())
    }

    pub(crate) fn add_alert_at(&self, candidate: NewAlert, now: DateTime<Utc>) -> Option<Alert> {
        let mut inner = self.inner.lock();

        if inner.config.duplicate_detection {
            let window = inner.config.duplicate_window;
            if inner.find_within(window, now, |a| a.same_content(&candidate)) {
                tracing::debug!(
                    source = %candidate.source,
                    title = %candidate.title,
                    "Duplicate alert suppressed"
                );
                return None;
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let alert = Alert::from_candidate(id, candidate, now);
        inner.alerts.push_back(alert.clone());

        let max = inner.config.max_alerts;
        let evicted = inner.truncate_oldest(max);

        tracing::debug!(
            alert_id = id,
            severity = %alert.severity,
            title = %alert.title,
            total = inner.alerts.len(),
            evicted,
            "Added alert"
        );

        Some(alert)
    }

    /// Check for a content duplicate inside an explicit window
    pub fn is_duplicate(&self, candidate: &NewAlert, window: Duration) -> bool {
        let inner = self.inner.lock();
        inner.find_within(window, Utc::now(), |a| a.same_content(candidate))
    }

    /// Check for an alert with the same severity, source and title inside the window
    pub fn is_similar(&self, candidate: &NewAlert, window: Duration) -> bool {
        let inner = self.inner.lock();
        inner.find_within(window, Utc::now(), |a| a.same_origin(candidate))
    }

    /// Newest alerts first, at most `max_count`
    pub fn recent_alerts(&self, max_count: usize) -> Vec<Alert> {
        let inner = self.inner.lock();
        inner.alerts.iter().rev().take(max_count).cloned().collect()
    }

    /// Newest alerts of one severity first, at most `max_count`
    pub fn alerts_by_severity(&self, severity: Severity, max_count: usize) -> Vec<Alert> {
        let inner = self.inner.lock();
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| a.severity == severity)
            .take(max_count)
            .cloned()
            .collect()
    }

    /// Alerts created at or after `since`, newest first
    pub fn alerts_since(&self, since: DateTime<Utc>) -> Vec<Alert> {
        let inner = self.inner.lock();
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect()
    }

    /// Remove alerts older than `max_age`. Returns the number removed.
    pub fn cleanup_old_alerts(&self, max_age: Duration) -> usize {
        self.cleanup_old_alerts_at(max_age, Utc::now())
    }

    pub(crate) fn cleanup_old_alerts_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, max_age);
        let mut inner = self.inner.lock();
        let before = inner.alerts.len();
        inner.alerts.retain(|a| a.created_at >= cutoff);
        let removed = before - inner.alerts.len();

        tracing::debug!(removed, remaining = inner.alerts.len(), "Cleaned up old alerts");
        removed
    }

    /// Trim to at most `max` alerts, oldest first; `0` clears the store
    pub fn enforce_max_alerts(&self, max: usize) -> usize {
        self.inner.lock().truncate_oldest(max)
    }

    pub fn clear(&self) {
        self.enforce_max_alerts(0);
    }

    pub fn alert_count(&self) -> usize {
        self.inner.lock().alerts.len()
    }

    pub fn alert_count_by_severity(&self, severity: Severity) -> usize {
        let inner = self.inner.lock();
        inner.alerts.iter().filter(|a| a.severity == severity).count()
    }

    /// Creation time of the most recently inserted alert
    pub fn last_alert_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().alerts.back().map(|a| a.created_at)
    }

    pub fn stats(&self) -> AlertStoreStats {
        let inner = self.inner.lock();
        let count = |s: Severity| inner.alerts.iter().filter(|a| a.severity == s).count();

        AlertStoreStats {
            total: inner.alerts.len(),
            critical: count(Severity::Critical),
            warning: count(Severity::Warning),
            info: count(Severity::Info),
            last_alert_time: inner.alerts.back().map(|a| a.created_at),
            next_id: inner.next_id,
        }
    }

    pub fn config(&self) -> AlertStoreConfig {
        self.inner.lock().config.clone()
    }

    pub fn set_duplicate_detection(&self, enabled: bool) {
        self.inner.lock().config.duplicate_detection = enabled;
    }

    pub fn set_duplicate_window(&self, window: Duration) {
        self.inner.lock().config.duplicate_window = window;
    }

    /// Change the cap. Existing alerts are trimmed on the next insert, not now.
    pub fn set_max_alerts(&self, max: usize) {
        self.inner.lock().config.max_alerts = max;
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Alert store counters
#[derive(Debug, Clone, Serialize)]
pub struct AlertStoreStats {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    pub last_alert_time: Option<DateTime<Utc>>,
    pub next_id: u64,
}
