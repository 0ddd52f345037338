//! Scripted in-memory source for engine tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::{ConnectionState, DataSource, SourceError};
use crate::data::ResultSet;

#[derive(Clone)]
struct Script {
    response: Result<ResultSet, String>,
    delay: Duration,
}

pub struct ScriptedSource {
    state: ConnectionState,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::new(true),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn respond(&self, sql: &str, result: ResultSet) {
        self.script(sql, Ok(result), Duration::ZERO);
    }

    pub fn respond_slowly(&self, sql: &str, result: ResultSet, delay: Duration) {
        self.script(sql, Ok(result), delay);
    }

    pub fn fail(&self, sql: &str, message: &str) {
        self.script(sql, Err(message.to_string()), Duration::ZERO);
    }

    fn script(&self, sql: &str, response: Result<ResultSet, String>, delay: Duration) {
        self.scripts
            .lock()
            .insert(sql.to_string(), Script { response, delay });
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.set(connected);
    }

    pub fn calls(&self, sql: &str) -> usize {
        self.calls.lock().get(sql).copied().unwrap_or(0)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl DataSource for ScriptedSource {
    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn execute(&self, sql: &str) -> Result<ResultSet, SourceError> {
        if !self.is_connected() {
            return Err(SourceError::NotConnected);
        }
        *self.calls.lock().entry(sql.to_string()).or_insert(0) += 1;

        let script = self
            .scripts
            .lock()
            .get(sql)
            .cloned()
            .unwrap_or(Script {
                response: Ok(ResultSet::empty()),
                delay: Duration::ZERO,
            });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !script.delay.is_zero() {
            std::thread::sleep(script.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        script.response.map_err(SourceError::Query)
    }

    fn subscribe_status(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
