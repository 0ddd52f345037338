//! Timer-driven query scheduler
//!
//! Every tick, all enabled definitions are dispatched concurrently. Each
//! execution runs on the blocking pool behind a semaphore sized by
//! `max_concurrent_queries`; a definition whose previous run is still in
//! flight is skipped. Results flow through classification into the alert
//! store on whichever task finished the execution, so completion order
//! across queries is unspecified.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::events::{EventBus, MonitorEvent};
use super::execution::{ExecutionOutcome, ExecutionResult};
use super::hasher::digest;
use super::history::{DuplicateHistory, DEFAULT_RESULT_WINDOW};
use super::stats::ExecutionStats;
use crate::alerts::classifier::{classify_alert, classify_from_threshold};
use crate::alerts::{AlertStore, NewAlert, Severity};
use crate::data::ResultSet;
use crate::queries::{QueryDefinition, QueryRegistry};
use crate::source::DataSource;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 5;
pub const DEFAULT_RECONNECT_GRACE: Duration = Duration::from_secs(2);
const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const SNIPPET_ROWS: usize = 3;

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(with = "crate::config::duration_millis")]
    pub interval: Duration,
    pub max_concurrent_queries: usize,
    /// Window in which an unchanged result of the same query is ignored
    #[serde(with = "crate::config::duration_millis")]
    pub result_duplicate_window: Duration,
    /// How long a running scheduler waits for a dropped source to come back
    /// before it stops itself
    #[serde(with = "crate::config::duration_millis", default = "default_reconnect_grace")]
    pub reconnect_grace: Duration,
}

fn default_reconnect_grace() -> Duration {
    DEFAULT_RECONNECT_GRACE
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            result_duplicate_window: DEFAULT_RESULT_WINDOW,
            reconnect_grace: DEFAULT_RECONNECT_GRACE,
        }
    }
}

/// Reasons `start` refuses to run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("Monitoring is already running")]
    AlreadyRunning,

    #[error("Database not connected")]
    NotConnected,

    #[error("No enabled queries configured")]
    NoQueries,

    #[error("Scheduler must be started from within a tokio runtime")]
    NoRuntime,
}

struct RunHandle {
    shutdown_tx: mpsc::Sender<()>,
    _task: JoinHandle<()>,
}

struct Shared {
    source: Arc<dyn DataSource>,
    registry: Arc<QueryRegistry>,
    store: Arc<AlertStore>,
    stats: ExecutionStats,
    history: DuplicateHistory,
    events: EventBus,
    in_flight: DashSet<String>,
    limiter: RwLock<Arc<Semaphore>>,
    max_concurrent: AtomicUsize,
    result_window: RwLock<Duration>,
    reconnect_grace: RwLock<Duration>,
    interval_tx: watch::Sender<Duration>,
    running: Mutex<Option<RunHandle>>,
}

/// Query scheduler. Stopped until `start` succeeds.
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn DataSource>,
        registry: Arc<QueryRegistry>,
        store: Arc<AlertStore>,
    ) -> Self {
        Self::with_config(source, registry, store, SchedulerConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn DataSource>,
        registry: Arc<QueryRegistry>,
        store: Arc<AlertStore>,
        config: SchedulerConfig,
    ) -> Self {
        let max_concurrent = config.max_concurrent_queries.max(1);
        let (interval_tx, _) = watch::channel(clamp_interval(config.interval));

        Self {
            shared: Arc::new(Shared {
                source,
                registry,
                store,
                stats: ExecutionStats::new(),
                history: DuplicateHistory::new(),
                events: EventBus::new(),
                in_flight: DashSet::new(),
                limiter: RwLock::new(Arc::new(Semaphore::new(max_concurrent))),
                max_concurrent: AtomicUsize::new(max_concurrent),
                result_window: RwLock::new(config.result_duplicate_window),
                reconnect_grace: RwLock::new(config.reconnect_grace),
                interval_tx,
                running: Mutex::new(None),
            }),
        }
    }

    /// Arm the timer and begin ticking.
    ///
    /// Fails, and publishes a query error, when the source is disconnected
    /// or no definition is enabled.
    pub fn start(&self) -> Result<(), StartError> {
        let shared = &self.shared;
        let mut running = shared.running.lock();

        if running.is_some() {
            tracing::warn!("Monitoring is already started");
            return Err(StartError::AlreadyRunning);
        }

        if !shared.source.is_connected() {
            tracing::warn!("Cannot start monitoring: database not connected");
            shared.publish_error("", StartError::NotConnected.to_string());
            return Err(StartError::NotConnected);
        }

        let enabled = shared.registry.enabled_count();
        if enabled == 0 {
            tracing::warn!("Cannot start monitoring: no enabled queries");
            shared.publish_error("", StartError::NoQueries.to_string());
            return Err(StartError::NoQueries);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StartError::NoRuntime)?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status_rx = shared.source.subscribe_status();
        let interval_rx = shared.interval_tx.subscribe();
        let task = runtime.spawn(run_loop(
            Arc::clone(shared),
            shutdown_rx,
            status_rx,
            interval_rx,
        ));

        *running = Some(RunHandle {
            shutdown_tx,
            _task: task,
        });
        drop(running);

        tracing::info!(
            queries = enabled,
            interval_ms = self.interval().as_millis() as u64,
            max_concurrent = self.max_concurrent_queries(),
            "Started monitoring"
        );
        shared.events.publish(MonitorEvent::MonitoringStarted);
        Ok(())
    }

    /// Disarm the timer. In-flight executions finish and are still processed.
    /// Returns false if the scheduler was not running.
    pub fn stop(&self) -> bool {
        self.shared.stop()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.lock().is_some()
    }

    /// Push notification of a connection change. A disconnect while running
    /// stops the scheduler at once and publishes a query error.
    pub fn on_connection_changed(&self, connected: bool) {
        if !connected {
            self.shared.on_connection_lost();
        }
    }

    /// Dispatch one tick now and wait for every execution it started
    pub async fn execute_all_now(&self) -> Vec<ExecutionResult> {
        let handles = self.shared.dispatch_tick();
        futures::future::join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect()
    }

    /// Execute a single definition now, honouring the concurrency gate
    pub async fn execute_query(&self, id: &str) -> Option<ExecutionResult> {
        let limiter = self.shared.limiter.read().clone();
        Arc::clone(&self.shared).run_query(id.to_string(), limiter).await
    }

    /// Change the tick period; a running timer is re-armed with it
    pub fn set_interval(&self, interval: Duration) {
        self.shared.interval_tx.send_replace(clamp_interval(interval));
    }

    pub fn interval(&self) -> Duration {
        *self.shared.interval_tx.borrow()
    }

    /// Change the concurrency bound; applies from the next dispatch
    pub fn set_max_concurrent_queries(&self, max: usize) {
        let max = max.max(1);
        self.shared.max_concurrent.store(max, Ordering::SeqCst);
        *self.shared.limiter.write() = Arc::new(Semaphore::new(max));
    }

    pub fn max_concurrent_queries(&self) -> usize {
        self.shared.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn set_result_duplicate_window(&self, window: Duration) {
        *self.shared.result_window.write() = window;
    }

    pub fn result_duplicate_window(&self) -> Duration {
        *self.shared.result_window.read()
    }

    /// Zero stops the scheduler on the first observed disconnect
    pub fn set_reconnect_grace(&self, grace: Duration) {
        *self.shared.reconnect_grace.write() = grace;
    }

    pub fn reconnect_grace(&self) -> Duration {
        *self.shared.reconnect_grace.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.shared.stats
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.shared.registry
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.shared.store
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.shared.source
    }

    /// Ids of definitions currently executing
    pub fn in_flight(&self) -> Vec<String> {
        self.shared.in_flight.iter().map(|id| id.key().clone()).collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    mut shutdown_rx: mpsc::Receiver<()>,
    mut status_rx: watch::Receiver<bool>,
    mut interval_rx: watch::Receiver<Duration>,
) {
    let mut ticker = new_ticker(*interval_rx.borrow_and_update());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shared.dispatch_tick();
            }
            _ = shutdown_rx.recv() => {
                break;
            }
            Ok(()) = status_rx.changed() => {
                let connected = *status_rx.borrow_and_update();
                if !connected && !shared.await_recovery(&mut status_rx).await {
                    shared.on_connection_lost();
                    break;
                }
            }
            Ok(()) = interval_rx.changed() => {
                let period = *interval_rx.borrow_and_update();
                tracing::debug!(interval_ms = period.as_millis() as u64, "Re-arming timer");
                ticker = new_ticker(period);
            }
        }
    }

    tracing::debug!("Scheduler loop exited");
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_INTERVAL, MAX_INTERVAL)
}

fn new_ticker(period: Duration) -> tokio::time::Interval {
    let now = tokio::time::Instant::now();
    let start = now.checked_add(period).unwrap_or(now);
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl Shared {
    fn stop(&self) -> bool {
        let Some(handle) = self.running.lock().take() else {
            return false;
        };
        // The loop may already be gone (it stops itself on disconnect)
        let _ = handle.shutdown_tx.try_send(());

        tracing::info!("Stopped monitoring");
        self.events.publish(MonitorEvent::MonitoringStopped);
        true
    }

    fn on_connection_lost(&self) {
        if self.stop() {
            tracing::warn!("Database connection lost, monitoring stopped");
            self.publish_error("", "Database connection lost");
        }
    }

    /// Wait up to the reconnect grace for the source to report connected
    async fn await_recovery(&self, status_rx: &mut watch::Receiver<bool>) -> bool {
        let grace = *self.reconnect_grace.read();
        if grace.is_zero() {
            return false;
        }

        match tokio::time::timeout(grace, status_rx.wait_for(|connected| *connected)).await {
            Ok(Ok(_)) => {
                tracing::info!("Database connection recovered, monitoring continues");
                true
            }
            _ => false,
        }
    }

    fn publish_error(&self, query_id: &str, message: impl Into<String>) {
        self.events.publish(MonitorEvent::QueryError {
            query_id: query_id.to_string(),
            message: message.into(),
        });
    }

    /// Fan out every enabled definition onto its own task
    fn dispatch_tick(self: &Arc<Self>) -> Vec<JoinHandle<Option<ExecutionResult>>> {
        if !self.source.is_connected() {
            tracing::warn!("Skipping tick: database not connected");
            return Vec::new();
        }

        let ids: Vec<String> = self
            .registry
            .list_enabled()
            .into_iter()
            .map(|def| def.id)
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        tracing::debug!(count = ids.len(), "Dispatching queries");
        let limiter = self.limiter.read().clone();

        ids.into_iter()
            .map(|id| {
                let shared = Arc::clone(self);
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { shared.run_query(id, limiter).await })
            })
            .collect()
    }

    async fn run_query(
        self: Arc<Self>,
        id: String,
        limiter: Arc<Semaphore>,
    ) -> Option<ExecutionResult> {
        // The definition may have changed since the tick snapshot
        let Some(def) = self.registry.get(&id).filter(|d| d.enabled) else {
            tracing::debug!(query_id = %id, "Query missing or disabled, skipping");
            return None;
        };

        let Some(guard) = InFlightGuard::acquire(&self, &def.id) else {
            tracing::debug!(query_id = %def.id, "Previous execution still running, skipping");
            return None;
        };

        let permit = limiter.acquire_owned().await.ok()?;

        let worker = Arc::clone(&self);
        let worker_def = def.clone();
        let window = *self.result_window.read();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _guard = guard;
            execute_definition(worker.source.as_ref(), &worker.history, &worker_def, window)
        });

        let joined = if def.timeout_secs > 0 {
            let limit = Duration::from_secs(def.timeout_secs);
            match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(query_id = %def.id, timeout_secs = def.timeout_secs, "Query timed out");
                    Ok(ExecutionResult::timed_out(&def, limit))
                }
            }
        } else {
            task.await
        };

        let result = joined.unwrap_or_else(|e| {
            tracing::error!(query_id = %def.id, error = %e, "Query worker failed");
            ExecutionResult::failed(&def, format!("Query worker failed: {}", e))
        });

        self.handle_result(result.clone());
        Some(result)
    }

    /// Stats, alerting and publication for one completed execution
    fn handle_result(&self, result: ExecutionResult) {
        self.stats.record(&result);

        match result.outcome {
            ExecutionOutcome::Succeeded if !result.data.is_empty() => {
                self.history.record(&result.query_id, &digest(&result.data));
                self.generate_data_alert(&result);
            }
            ExecutionOutcome::Succeeded => {}
            ExecutionOutcome::Failed => {
                let error = result.error.clone().unwrap_or_default();
                tracing::warn!(query_id = %result.query_id, error = %error, "Query execution failed");
                self.generate_error_alert(&result, &error);
                self.publish_error(&result.query_id, error);
            }
            ExecutionOutcome::Duplicate => {
                tracing::debug!(query_id = %result.query_id, "Duplicate result ignored");
            }
        }

        self.events
            .publish(MonitorEvent::QueryExecuted(Arc::new(result)));
    }

    fn generate_data_alert(&self, result: &ExecutionResult) {
        let Some(def) = self.registry.get(&result.query_id) else {
            return;
        };

        let severity = classify_result(&def, &result.data);
        let candidate = NewAlert::new(
            severity,
            def.name.clone(),
            format_alert_message(&result.data),
            def.id.clone(),
        )
        .with_raw_result(result.data.snippet(SNIPPET_ROWS));

        self.insert_alert(candidate);
    }

    fn generate_error_alert(&self, result: &ExecutionResult, error: &str) {
        let title = self
            .registry
            .get(&result.query_id)
            .map(|def| def.name)
            .unwrap_or_else(|| result.query_name.clone());

        let candidate = NewAlert::new(
            Severity::Warning,
            title,
            format!("Query execution failed: {}", error),
            result.query_id.clone(),
        )
        .with_raw_result(format!("Query error: {}", error));

        self.insert_alert(candidate);
    }

    fn insert_alert(&self, candidate: NewAlert) {
        if let Some(alert) = self.store.add_alert(candidate) {
            tracing::info!(
                alert_id = alert.id,
                severity = %alert.severity,
                query_id = %alert.source,
                "Alert generated: {}",
                alert.message
            );
            self.events.publish(MonitorEvent::AlertGenerated(alert));
        }
    }
}

/// Marks a query id as executing until dropped
struct InFlightGuard {
    shared: Arc<Shared>,
    id: String,
}

impl InFlightGuard {
    fn acquire(shared: &Arc<Shared>, id: &str) -> Option<Self> {
        if !shared.in_flight.insert(id.to_string()) {
            return None;
        }
        Some(Self {
            shared: Arc::clone(shared),
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.in_flight.remove(&self.id);
    }
}

/// Run one definition against the source. Blocking.
fn execute_definition(
    source: &dyn DataSource,
    history: &DuplicateHistory,
    def: &QueryDefinition,
    window: Duration,
) -> ExecutionResult {
    let started = Instant::now();

    let result = match source.execute(&def.sql) {
        Ok(data) => {
            if !data.is_empty() && history.is_recent_duplicate(&def.id, &digest(&data), window) {
                ExecutionResult::duplicate(def)
            } else {
                ExecutionResult::succeeded(def, data)
            }
        }
        Err(e) => ExecutionResult::failed(def, e.to_string()),
    };

    result.with_elapsed(started.elapsed())
}

/// Severity for a data alert: the configured type (or the keyword heuristic
/// when none is configured), raised by the threshold rule when one is set.
pub fn classify_result(def: &QueryDefinition, data: &ResultSet) -> Severity {
    let base = match def.alert_type {
        Some(severity) => severity,
        None => classify_alert("", data),
    };

    if def.threshold > 0 {
        classify_from_threshold(data, def.threshold, base)
    } else {
        base
    }
}

/// One-line summary of a result: the first cell, with a count of the rows
/// beyond the first.
pub fn format_alert_message(data: &ResultSet) -> String {
    let rows = data.row_count();
    if rows == 0 {
        return "No results returned from query".to_string();
    }

    match data.first_cell().and_then(|cell| cell.as_text()) {
        Some(first) if rows == 1 => first,
        Some(first) => format!("{} (and {} more rows)", first, rows - 1),
        None => format!("Query returned {} row(s)", rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::source::mock::ScriptedSource;

    const BREACH_SQL: &str = "SELECT 'BREACH DETECTED'";

    struct Fixture {
        source: Arc<ScriptedSource>,
        scheduler: Scheduler,
    }

    fn fixture(defs: Vec<QueryDefinition>) -> Fixture {
        let source = Arc::new(ScriptedSource::new());
        let registry = Arc::new(QueryRegistry::new());
        for def in defs {
            registry.add(def).unwrap();
        }
        let scheduler = Scheduler::new(
            Arc::clone(&source) as Arc<dyn DataSource>,
            registry,
            Arc::new(AlertStore::new()),
        );
        Fixture { source, scheduler }
    }

    fn breach_query() -> QueryDefinition {
        QueryDefinition::new("SecurityBreach", "Security Breach Detection", BREACH_SQL)
            .with_alert_type(Severity::Critical)
    }

    async fn next_event(rx: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[test]
    fn test_format_alert_message() {
        assert_eq!(
            format_alert_message(&ResultSet::empty()),
            "No results returned from query"
        );
        assert_eq!(
            format_alert_message(&ResultSet::from_rows(vec![vec!["BREACH DETECTED"]])),
            "BREACH DETECTED"
        );
        assert_eq!(
            format_alert_message(&ResultSet::from_rows(vec![vec!["a"], vec!["b"], vec!["c"]])),
            "a (and 2 more rows)"
        );
        assert_eq!(
            format_alert_message(&ResultSet::from_rows(vec![vec![Value::Null], vec![Value::Null]])),
            "Query returned 2 row(s)"
        );
        assert_eq!(
            format_alert_message(&ResultSet::new(vec![], vec![vec![]])),
            "Query returned 1 row(s)"
        );
    }

    #[test]
    fn test_classify_result() {
        let data = ResultSet::from_rows(vec![vec!["12"]]);
        let def = QueryDefinition::new("q", "Q", "SELECT 12").with_alert_type(Severity::Info);
        assert_eq!(classify_result(&def, &data), Severity::Info);
        assert_eq!(classify_result(&def.clone().with_threshold(5), &data), Severity::Critical);
        assert_eq!(classify_result(&def.with_threshold(10), &data), Severity::Warning);

        let untyped = QueryDefinition::new("q", "Q", "SELECT 1");
        let unusual = ResultSet::from_rows(vec![vec!["unusual activity"]]);
        assert_eq!(classify_result(&untyped, &unusual), Severity::Warning);
    }

    #[tokio::test]
    async fn test_start_fails_without_enabled_queries() {
        let f = fixture(vec![breach_query().with_enabled(false)]);
        let mut events = f.scheduler.subscribe();

        assert_eq!(f.scheduler.start(), Err(StartError::NoQueries));
        assert!(!f.scheduler.is_running());

        match next_event(&mut events).await {
            MonitorEvent::QueryError { query_id, message } => {
                assert!(query_id.is_empty());
                assert_eq!(message, "No enabled queries configured");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_fails_when_disconnected() {
        let f = fixture(vec![breach_query()]);
        f.source.set_connected(false);
        let mut events = f.scheduler.subscribe();

        assert_eq!(f.scheduler.start(), Err(StartError::NotConnected));
        assert!(matches!(
            next_event(&mut events).await,
            MonitorEvent::QueryError { .. }
        ));
    }

    #[tokio::test]
    async fn test_start_stop_events() {
        let f = fixture(vec![breach_query()]);
        f.scheduler.set_interval(Duration::from_secs(3600));
        let mut events = f.scheduler.subscribe();

        f.scheduler.start().unwrap();
        assert!(f.scheduler.is_running());
        assert_eq!(f.scheduler.start(), Err(StartError::AlreadyRunning));
        assert!(matches!(next_event(&mut events).await, MonitorEvent::MonitoringStarted));

        assert!(f.scheduler.stop());
        assert!(!f.scheduler.stop());
        assert!(!f.scheduler.is_running());
        assert!(matches!(next_event(&mut events).await, MonitorEvent::MonitoringStopped));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_breach_alert_then_duplicate_suppressed() {
        let f = fixture(vec![breach_query()]);
        f.source
            .respond(BREACH_SQL, ResultSet::from_rows(vec![vec!["BREACH DETECTED"]]));
        let mut events = f.scheduler.subscribe();

        let results = f.scheduler.execute_all_now().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());

        let alerts = f.scheduler.store().recent_alerts(10);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].message, "BREACH DETECTED");
        assert_eq!(alerts[0].title, "Security Breach Detection");
        assert_eq!(alerts[0].source, "SecurityBreach");

        assert!(matches!(next_event(&mut events).await, MonitorEvent::AlertGenerated(a) if a.id == 1));
        assert!(matches!(next_event(&mut events).await, MonitorEvent::QueryExecuted(_)));

        // Same result again: ignored at the result level
        let results = f.scheduler.execute_all_now().await;
        assert_eq!(results[0].outcome, ExecutionOutcome::Duplicate);
        assert_eq!(results[0].error.as_deref(), Some("Duplicate result ignored"));
        assert_eq!(f.scheduler.store().alert_count(), 1);

        // Outside the result window the alert store still suppresses it
        f.scheduler.set_result_duplicate_window(Duration::ZERO);
        let results = f.scheduler.execute_all_now().await;
        assert!(results[0].is_success());
        assert_eq!(f.scheduler.store().alert_count(), 1);

        let stats = f.scheduler.stats();
        assert_eq!(stats.executed_count(), 3);
        assert_eq!(stats.duplicate_count(), 1);
    }

    #[tokio::test]
    async fn test_threshold_escalates_severity() {
        let sql = "SELECT COUNT(*) FROM login_attempts";
        let f = fixture(vec![QueryDefinition::new("FailedLogins", "Failed Login Count", sql)
            .with_alert_type(Severity::Info)
            .with_threshold(3)]);
        f.source.respond(sql, ResultSet::from_rows(vec![vec![7i64]]));

        f.scheduler.execute_all_now().await;

        let alerts = f.scheduler.store().recent_alerts(1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].message, "7");
    }

    #[tokio::test]
    async fn test_failure_generates_warning() {
        let sql = "SELECT broken";
        let f = fixture(vec![QueryDefinition::new("Broken", "Broken Query", sql)
            .with_alert_type(Severity::Critical)]);
        f.source.fail(sql, "syntax error");
        let mut events = f.scheduler.subscribe();

        let results = f.scheduler.execute_all_now().await;
        assert_eq!(results[0].outcome, ExecutionOutcome::Failed);

        let alert = &f.scheduler.store().recent_alerts(1)[0];
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.message, "Query execution failed: syntax error");
        assert_eq!(f.scheduler.stats().failed_count(), 1);

        let mut saw_error = false;
        for _ in 0..3 {
            if let MonitorEvent::QueryError { query_id, .. } = next_event(&mut events).await {
                assert_eq!(query_id, "Broken");
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_empty_result_produces_no_alert() {
        let f = fixture(vec![breach_query()]);
        f.source.respond(BREACH_SQL, ResultSet::empty());

        let results = f.scheduler.execute_all_now().await;
        assert!(results[0].is_success());
        assert_eq!(f.scheduler.store().alert_count(), 0);
        assert_eq!(f.scheduler.stats().executed_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_and_missing_queries_are_skipped() {
        let f = fixture(vec![breach_query().with_enabled(false)]);
        assert!(f.scheduler.execute_all_now().await.is_empty());
        assert!(f.scheduler.execute_query("SecurityBreach").await.is_none());
        assert!(f.scheduler.execute_query("Unknown").await.is_none());
        assert_eq!(f.source.calls(BREACH_SQL), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let defs: Vec<QueryDefinition> = (0..6)
            .map(|i| QueryDefinition::new(format!("q{}", i), format!("Q{}", i), format!("SELECT {}", i)))
            .collect();
        let f = fixture(defs);
        for i in 0..6 {
            f.source.respond_slowly(
                &format!("SELECT {}", i),
                ResultSet::from_rows(vec![vec![i as i64]]),
                Duration::from_millis(100),
            );
        }
        f.scheduler.set_max_concurrent_queries(2);

        let results = f.scheduler.execute_all_now().await;
        assert_eq!(results.len(), 6);
        assert_eq!(f.source.peak_in_flight(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_execution_is_skipped() {
        let f = fixture(vec![breach_query()]);
        f.source.respond_slowly(
            BREACH_SQL,
            ResultSet::from_rows(vec![vec!["BREACH DETECTED"]]),
            Duration::from_millis(300),
        );

        let (first, second) = tokio::join!(
            f.scheduler.execute_all_now(),
            f.scheduler.execute_all_now()
        );
        assert_eq!(first.len() + second.len(), 1);
        assert_eq!(f.source.calls(BREACH_SQL), 1);
        assert!(f.scheduler.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_reports_failure() {
        let f = fixture(vec![breach_query().with_timeout(1)]);
        f.source.respond_slowly(
            BREACH_SQL,
            ResultSet::from_rows(vec![vec!["late"]]),
            Duration::from_millis(1500),
        );

        let result = f.scheduler.execute_query("SecurityBreach").await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Failed);
        assert_eq!(result.error.as_deref(), Some("Query timed out after 1 seconds"));
    }

    #[tokio::test]
    async fn test_ticks_execute_queries() {
        let f = fixture(vec![breach_query()]);
        f.source
            .respond(BREACH_SQL, ResultSet::from_rows(vec![vec!["BREACH DETECTED"]]));
        f.scheduler.set_interval(Duration::from_millis(20));
        let mut events = f.scheduler.subscribe();

        f.scheduler.start().unwrap();
        loop {
            if let MonitorEvent::QueryExecuted(result) = next_event(&mut events).await {
                assert_eq!(result.query_id, "SecurityBreach");
                break;
            }
        }
        f.scheduler.stop();

        assert!(f.source.calls(BREACH_SQL) >= 1);
        assert_eq!(f.scheduler.store().alert_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_loss_stops_monitoring() {
        let f = fixture(vec![breach_query()]);
        f.scheduler.set_interval(Duration::from_secs(3600));
        f.scheduler.set_reconnect_grace(Duration::from_millis(50));
        let mut events = f.scheduler.subscribe();

        f.scheduler.start().unwrap();
        assert!(matches!(next_event(&mut events).await, MonitorEvent::MonitoringStarted));

        f.source.set_connected(false);

        assert!(matches!(next_event(&mut events).await, MonitorEvent::MonitoringStopped));
        match next_event(&mut events).await {
            MonitorEvent::QueryError { message, .. } => {
                assert_eq!(message, "Database connection lost")
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!f.scheduler.is_running());

        // Recoverable: reconnect and start again
        f.source.set_connected(true);
        f.scheduler.start().unwrap();
        assert!(f.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_transient_disconnect_within_grace_keeps_running() {
        let f = fixture(vec![breach_query()]);
        f.scheduler.set_interval(Duration::from_secs(3600));
        f.scheduler.set_reconnect_grace(Duration::from_secs(5));
        let mut events = f.scheduler.subscribe();

        f.scheduler.start().unwrap();
        assert!(matches!(next_event(&mut events).await, MonitorEvent::MonitoringStarted));

        f.source.set_connected(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.scheduler.is_running());
        f.source.set_connected(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(f.scheduler.is_running());
        assert!(events.try_recv().is_err());

        // A second drop that never recovers still stops the scheduler
        f.scheduler.set_reconnect_grace(Duration::from_millis(20));
        f.source.set_connected(false);
        assert!(matches!(next_event(&mut events).await, MonitorEvent::MonitoringStopped));
        assert!(!f.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_push_disconnect_notification() {
        let f = fixture(vec![breach_query()]);
        f.scheduler.set_interval(Duration::from_secs(3600));
        f.scheduler.start().unwrap();

        f.scheduler.on_connection_changed(false);
        assert!(!f.scheduler.is_running());

        // Disconnect while stopped is a no-op
        f.scheduler.on_connection_changed(false);
    }

    #[tokio::test]
    async fn test_interval_and_concurrency_setters() {
        let f = fixture(vec![breach_query()]);
        assert_eq!(f.scheduler.interval(), DEFAULT_INTERVAL);
        assert_eq!(f.scheduler.max_concurrent_queries(), DEFAULT_MAX_CONCURRENT_QUERIES);

        f.scheduler.set_interval(Duration::ZERO);
        assert_eq!(f.scheduler.interval(), MIN_INTERVAL);

        f.scheduler.set_max_concurrent_queries(0);
        assert_eq!(f.scheduler.max_concurrent_queries(), 1);

        f.scheduler.set_reconnect_grace(Duration::ZERO);
        assert_eq!(f.scheduler.reconnect_grace(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_interval_change_rearms_running_timer() {
        let f = fixture(vec![breach_query()]);
        f.source
            .respond(BREACH_SQL, ResultSet::from_rows(vec![vec!["BREACH DETECTED"]]));
        f.scheduler.set_interval(Duration::from_secs(3600));
        let mut events = f.scheduler.subscribe();

        f.scheduler.start().unwrap();
        assert!(matches!(next_event(&mut events).await, MonitorEvent::MonitoringStarted));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.source.calls(BREACH_SQL), 0);

        f.scheduler.set_interval(Duration::from_millis(20));
        loop {
            if let MonitorEvent::QueryExecuted(result) = next_event(&mut events).await {
                assert_eq!(result.query_id, "SecurityBreach");
                break;
            }
        }
        assert!(f.scheduler.is_running());
        assert!(f.source.calls(BREACH_SQL) >= 1);
        f.scheduler.stop();
    }

    #[tokio::test]
    async fn test_huge_interval_is_clamped() {
        let f = fixture(vec![breach_query()]);
        f.scheduler.set_interval(Duration::MAX);
        assert_eq!(f.scheduler.interval(), MAX_INTERVAL);

        f.scheduler.start().unwrap();
        f.scheduler.set_interval(Duration::MAX);
        tokio::task::yield_now().await;
        assert!(f.scheduler.is_running());
        assert!(f.scheduler.stop());

        let config = SchedulerConfig {
            interval: Duration::MAX,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::with_config(
            Arc::clone(&f.source) as Arc<dyn DataSource>,
            Arc::clone(f.scheduler.registry()),
            Arc::new(AlertStore::new()),
            config,
        );
        assert_eq!(scheduler.interval(), MAX_INTERVAL);
    }
}
