//! SQLite data source
//!
//! Every execution opens its own read-only connection, so concurrent
//! executions never share a transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::watch;

use super::{ConnectionState, DataSource, SourceError};
use crate::data::{ResultSet, Value};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(250);

pub struct SqliteSource {
    path: PathBuf,
    state: ConnectionState,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl SqliteSource {
    /// Create a source for `path` without connecting
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: ConnectionState::new(false),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Number of reconnect attempts made after a failed execution, and the
    /// pause between them. Zero attempts leaves the source disconnected.
    pub fn with_reconnect_policy(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    /// Create a source and verify the database can be opened
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let source = Self::new(path);
        source.reconnect()?;
        Ok(source)
    }

    /// Mark the source disconnected
    pub fn disconnect(&self) {
        self.state.set(false);
    }

    fn open(&self) -> Result<Connection, SourceError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;

        let conn = Connection::open_with_flags(&self.path, flags).map_err(|e| SourceError::Open {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SourceError::Query(e.to_string()))?;
        Ok(conn)
    }

    /// Bounded reconnect after a failed execution. Runs on the caller's
    /// (blocking) thread.
    fn recover(&self) -> bool {
        for attempt in 1..=self.reconnect_attempts {
            if attempt > 1 {
                std::thread::sleep(self.reconnect_delay);
            }
            match self.reconnect() {
                Ok(()) => {
                    tracing::info!(attempt, "Database reconnection successful");
                    return true;
                }
                Err(e) => tracing::warn!(attempt, error = %e, "Database reconnection attempt failed"),
            }
        }
        false
    }

    fn run(conn: &Connection, sql: &str) -> rusqlite::Result<ResultSet> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(convert(row.get_ref(i)?));
            }
            rows.push(cells);
        }

        Ok(ResultSet::new(columns, rows))
    }
}

fn convert(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl DataSource for SqliteSource {
    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn execute(&self, sql: &str) -> Result<ResultSet, SourceError> {
        if !self.is_connected() {
            return Err(SourceError::NotConnected);
        }

        let result = self
            .open()
            .and_then(|conn| Self::run(&conn, sql).map_err(|e| SourceError::Query(e.to_string())));

        if let Err(e) = &result {
            tracing::warn!(path = %self.path.display(), error = %e, "Query execution failed");
            self.state.set(false);
            self.recover();
        }
        result
    }

    fn subscribe_status(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    fn reconnect(&self) -> Result<(), SourceError> {
        match self.open().and_then(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| SourceError::Open {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })
        }) {
            Ok(()) => {
                self.state.set(true);
                Ok(())
            }
            Err(e) => {
                self.state.set(false);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE security_events (message TEXT, severity INTEGER, payload BLOB);
             INSERT INTO security_events VALUES ('BREACH DETECTED', 9, NULL);
             INSERT INTO security_events VALUES ('login ok', 1, x'00ff');",
        )
        .unwrap();
        file
    }

    #[test]
    fn test_execute_returns_rows() {
        let db = seeded_db();
        let source = SqliteSource::connect(db.path()).unwrap();
        assert!(source.is_connected());

        let result = source
            .execute("SELECT message, severity, payload FROM security_events ORDER BY severity DESC")
            .unwrap();
        assert_eq!(result.columns, vec!["message", "severity", "payload"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.first_cell(), Some(&Value::from("BREACH DETECTED")));
        assert_eq!(result.rows[0][1], Value::Int64(9));
        assert_eq!(result.rows[0][2], Value::Null);
        assert_eq!(result.rows[1][2], Value::Bytes(vec![0x00, 0xff]));
    }

    #[test]
    fn test_failure_invalidates_connection() {
        let db = seeded_db();
        let source = SqliteSource::connect(db.path())
            .unwrap()
            .with_reconnect_policy(0, Duration::ZERO);
        let rx = source.subscribe_status();

        let err = source.execute("SELECT * FROM missing_table").unwrap_err();
        assert!(matches!(err, SourceError::Query(_)));
        assert!(!source.is_connected());
        assert!(!*rx.borrow());
        assert!(matches!(source.execute("SELECT 1"), Err(SourceError::NotConnected)));

        source.reconnect().unwrap();
        assert!(source.execute("SELECT 1").is_ok());
    }

    #[test]
    fn test_failure_reconnects_when_database_is_usable() {
        let db = seeded_db();
        let source = SqliteSource::connect(db.path()).unwrap();
        let mut rx = source.subscribe_status();

        assert!(source.execute("SELECT * FROM missing_table").is_err());

        // The drop was published, then the reconnect restored the state
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
        assert!(source.is_connected());
        assert!(source.execute("SELECT COUNT(*) FROM security_events").is_ok());
    }

    #[test]
    fn test_failure_stays_disconnected_when_database_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();

        let source = SqliteSource::connect(&path)
            .unwrap()
            .with_reconnect_policy(2, Duration::from_millis(1));
        std::fs::remove_file(&path).unwrap();

        assert!(source.execute("SELECT x FROM t").is_err());
        assert!(!source.is_connected());
        assert!(source.reconnect().is_err());
    }

    #[test]
    fn test_source_is_read_only() {
        let db = seeded_db();
        let source = SqliteSource::connect(db.path()).unwrap();

        let result = source.execute("DELETE FROM security_events");
        assert!(result.is_err());
        assert_eq!(source.execute("SELECT COUNT(*) FROM security_events").unwrap().first_cell(), Some(&Value::Int64(2)));
    }

    #[test]
    fn test_connect_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.db");

        assert!(SqliteSource::connect(&missing).is_err());

        let source = SqliteSource::new(&missing);
        assert!(matches!(source.execute("SELECT 1"), Err(SourceError::NotConnected)));
    }

    #[test]
    fn test_disconnect_is_observed() {
        let db = seeded_db();
        let source = SqliteSource::connect(db.path()).unwrap();
        let rx = source.subscribe_status();

        source.disconnect();
        assert!(!source.is_connected());
        assert!(!*rx.borrow());
        assert!(source.reconnect().is_ok());
        assert!(source.is_connected());
    }
}
