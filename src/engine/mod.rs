//! Scheduling and execution of monitoring queries
//!
//! The [`Scheduler`] drives the tick loop. Each execution is fingerprinted by
//! [`hasher::digest`] so that unchanged results are dropped before they reach
//! classification, and every outcome is folded into [`ExecutionStats`] and
//! published on the [`EventBus`].

pub mod events;
pub mod execution;
pub mod hasher;
pub mod history;
pub mod scheduler;
pub mod stats;

pub use events::{EventBus, MonitorEvent};
pub use execution::{ExecutionOutcome, ExecutionResult};
pub use history::DuplicateHistory;
pub use scheduler::{Scheduler, SchedulerConfig, StartError};
pub use stats::{ExecutionStats, StatsSnapshot};
