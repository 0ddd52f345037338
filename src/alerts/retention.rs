use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use super::store::AlertStore;

pub const DEFAULT_RETENTION_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ALERT_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Background worker that periodically drops alerts older than `max_age`
pub struct RetentionWorker {
    store: Arc<AlertStore>,
    interval: Duration,
    max_age: Duration,
    running: Arc<AtomicBool>,
}

impl RetentionWorker {
    pub fn new(store: Arc<AlertStore>, interval: Duration, max_age: Duration) -> Self {
        Self {
            store,
            interval,
            max_age,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                max_age_secs = self.max_age.as_secs(),
                "Alert retention worker started"
            );

            let mut interval = time::interval_at(time::Instant::now() + self.interval, self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                self.run_once();
            }

            tracing::info!("Alert retention worker stopped");
        })
    }

    /// One cleanup pass; returns the number of alerts removed
    pub fn run_once(&self) -> usize {
        let removed = self.store.cleanup_old_alerts(self.max_age);
        if removed > 0 {
            tracing::info!(removed, "Retention removed expired alerts");
        }
        removed
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
