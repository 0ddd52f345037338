//! Thread-safe registry of query definitions
//!
//! Definitions are loaded from an ini-like text format:
//!
//! ```text
//! # comment
//! [FailedLogins]
//! name=Failed Login Count
//! sql=SELECT COUNT(*) FROM login_attempts WHERE success = 0
//! alert_type=warning
//! threshold=3
//! enabled=true
//! timeout=5
//! ```

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;

use super::definition::{QueryDefinition, DEFAULT_TIMEOUT_SECS};
use crate::alerts::Severity;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No query definitions found")]
    NoDefinitions,

    #[error("Query definition has an empty id")]
    EmptyId,

    #[error("Failed to read query file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Query definitions keyed by id. Readers always receive copies.
pub struct QueryRegistry {
    queries: RwLock<HashMap<String, QueryDefinition>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self {
            queries: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the whole registry with the definitions parsed from `text`.
    ///
    /// The registry is replaced even when parsing yields nothing, in which
    /// case `NoDefinitions` is returned.
    pub fn load(&self, text: &str) -> Result<usize, RegistryError> {
        let parsed = parse_definitions(text);

        let mut queries = self.queries.write();
        queries.clear();
        for def in parsed {
            queries.insert(def.id.clone(), def);
        }

        let count = queries.len();
        tracing::info!(count, "Loaded query definitions");

        if count == 0 {
            Err(RegistryError::NoDefinitions)
        } else {
            Ok(count)
        }
    }

    /// Read a definition file and `load` it
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load(&text)
    }

    /// Insert or replace a definition. Returns the previous one with the same id.
    pub fn add(&self, def: QueryDefinition) -> Result<Option<QueryDefinition>, RegistryError> {
        if def.id.trim().is_empty() {
            return Err(RegistryError::EmptyId);
        }
        tracing::debug!(query_id = %def.id, name = %def.name, "Added query");
        Ok(self.queries.write().insert(def.id.clone(), def))
    }

    /// Replace an existing definition. Returns the old one, or `None` if the id is unknown.
    pub fn update(&self, def: QueryDefinition) -> Option<QueryDefinition> {
        let mut queries = self.queries.write();
        let slot = queries.get_mut(&def.id)?;
        Some(std::mem::replace(slot, def))
    }

    pub fn remove(&self, id: &str) -> Option<QueryDefinition> {
        let removed = self.queries.write().remove(id);
        if removed.is_some() {
            tracing::debug!(query_id = %id, "Removed query");
        }
        removed
    }

    /// Enable or disable a definition. Returns false if the id is unknown.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut queries = self.queries.write();
        if let Some(def) = queries.get_mut(id) {
            def.enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: &str) -> Option<QueryDefinition> {
        self.queries.read().get(id).cloned()
    }

    /// All definitions, ordered by id
    pub fn list_all(&self) -> Vec<QueryDefinition> {
        let mut all: Vec<QueryDefinition> = self.queries.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Enabled definitions, ordered by id
    pub fn list_enabled(&self) -> Vec<QueryDefinition> {
        let mut enabled: Vec<QueryDefinition> = self
            .queries
            .read()
            .values()
            .filter(|d| d.enabled)
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.id.cmp(&b.id));
        enabled
    }

    pub fn len(&self) -> usize {
        self.queries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.read().is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.queries.read().values().filter(|d| d.enabled).count()
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse definition text into definitions, in file order.
///
/// Field-level problems never abort the parse: unknown keys are skipped,
/// malformed numbers fall back to their defaults, and a section with an
/// empty id is dropped. A section is committed when the next header or the
/// end of input is reached.
pub fn parse_definitions(text: &str) -> Vec<QueryDefinition> {
    let mut parsed = Vec::new();
    let mut current: Option<QueryDefinition> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
            commit(&mut parsed, current.take());
            let id = line[1..line.len() - 1].trim();
            current = Some(QueryDefinition::new(id, "", ""));
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(line = line_no, "Ignoring line without '=' in query definitions");
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        let Some(def) = current.as_mut() else {
            tracing::warn!(line = line_no, key, "Ignoring key outside of a query section");
            continue;
        };

        match key {
            "name" => def.name = value.to_string(),
            "sql" => def.sql = value.to_string(),
            "alert_type" => def.alert_type = Some(Severity::parse_lenient(value)),
            "threshold" => {
                def.threshold = value.parse().unwrap_or_else(|_| {
                    tracing::warn!(query_id = %def.id, value, "Invalid threshold, using 0");
                    0
                });
            }
            "enabled" => def.enabled = parse_bool(value),
            "timeout" => {
                def.timeout_secs = value.parse().unwrap_or_else(|_| {
                    tracing::warn!(
                        query_id = %def.id,
                        value,
                        "Invalid timeout, using {}",
                        DEFAULT_TIMEOUT_SECS
                    );
                    DEFAULT_TIMEOUT_SECS
                });
            }
            _ => {
                tracing::warn!(query_id = %def.id, line = line_no, key, "Unknown query key ignored");
            }
        }
    }

    commit(&mut parsed, current);
    parsed
}

fn commit(parsed: &mut Vec<QueryDefinition>, def: Option<QueryDefinition>) {
    match def {
        Some(def) if !def.id.is_empty() => parsed.push(def),
        Some(_) => tracing::warn!("Dropping query section with an empty id"),
        None => {}
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}
