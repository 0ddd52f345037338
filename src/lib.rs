//! Querywatch: scheduled SQL monitoring with a bounded alert stream
//!
//! A registry of named read-only queries is executed against a data source
//! on a fixed cadence. Each result is fingerprinted so unchanged results are
//! ignored, classified into a severity, and stored as an alert in a bounded,
//! de-duplicating store. Observers follow the engine through a broadcast
//! event stream or the HTTP API.
//!
//! # Features
//!
//! - **Query Definitions**: ini-style sections with SQL, alert type and threshold
//! - **Bounded Concurrency**: per-tick fan-out behind a semaphore, with overlap skipping
//! - **Result De-duplication**: sampled result digests per query
//! - **Classification**: configured type, count thresholds or keyword scan
//! - **Alert Store**: sequential ids, duplicate suppression, FIFO cap, age-based retention
//! - **Notifications**: log and webhook targets
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use querywatch::alerts::AlertStore;
//! use querywatch::engine::Scheduler;
//! use querywatch::queries::{QueryRegistry, DEFAULT_QUERIES};
//! use querywatch::source::{DataSource, SqliteSource};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source: Arc<dyn DataSource> = Arc::new(SqliteSource::connect("monitor.db")?);
//! let registry = Arc::new(QueryRegistry::new());
//! registry.load(DEFAULT_QUERIES)?;
//!
//! let scheduler = Scheduler::new(source, registry, Arc::new(AlertStore::new()));
//! for result in scheduler.execute_all_now().await {
//!     println!("{}: {:?}", result.query_id, result.outcome);
//! }
//! println!("alerts: {}", scheduler.store().alert_count());
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod data;
pub mod engine;
pub mod queries;
pub mod source;

// Re-export commonly used types
pub use alerts::{Alert, AlertStore, NewAlert, Severity};
pub use config::MonitorConfig;
pub use data::{ResultSet, Value};
pub use engine::{ExecutionResult, MonitorEvent, Scheduler, StartError};
pub use queries::{QueryDefinition, QueryRegistry};
pub use source::{DataSource, SourceError, SqliteSource};
