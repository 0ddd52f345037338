//! Events published by the scheduler

use std::sync::Arc;

use tokio::sync::broadcast;

use super::execution::ExecutionResult;
use crate::alerts::Alert;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    QueryExecuted(Arc<ExecutionResult>),
    AlertGenerated(Alert),
    MonitoringStarted,
    MonitoringStopped,
    /// `query_id` is empty for engine-level errors
    QueryError { query_id: String, message: String },
}

/// Broadcast fan-out to any number of subscribers. Slow subscribers lag and
/// lose the oldest events rather than blocking the engine.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
