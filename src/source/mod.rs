//! Data source collaborator
//!
//! The engine only needs a synchronous "execute SQL, get rows or an error"
//! call plus a way to observe connection state. Implementations must mark
//! themselves disconnected when a failure means the connection is unusable,
//! so the next `is_connected` call and all status subscribers see it.

pub mod sqlite;

#[cfg(test)]
pub mod mock;

use tokio::sync::watch;

use crate::data::ResultSet;

pub use sqlite::SqliteSource;

/// Data source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Not connected to database")]
    NotConnected,

    #[error("Failed to open database {path}: {message}")]
    Open { path: String, message: String },

    #[error("{0}")]
    Query(String),
}

/// Blocking query executor. Calls are made from blocking worker threads,
/// never from the scheduler's own task.
pub trait DataSource: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    fn execute(&self, sql: &str) -> Result<ResultSet, SourceError>;

    /// Receiver that observes every connected/disconnected transition
    fn subscribe_status(&self) -> watch::Receiver<bool>;

    /// Try to restore the connection
    fn reconnect(&self) -> Result<(), SourceError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SourceError::NotConnected)
        }
    }
}

/// Connected flag with change notification, for `DataSource` implementors
#[derive(Debug)]
pub struct ConnectionState {
    tx: watch::Sender<bool>,
}

impl ConnectionState {
    pub fn new(connected: bool) -> Self {
        let (tx, _) = watch::channel(connected);
        Self { tx }
    }

    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the new state; subscribers are only woken on an actual change
    pub fn set(&self, connected: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            tracing::info!(connected, "Data source connection status changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_state_notifies_on_change() {
        let state = ConnectionState::new(true);
        let mut rx = state.subscribe();

        state.set(true);
        assert!(!rx.has_changed().unwrap());

        state.set(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
        assert!(!state.is_connected());
    }
}
