//! Tabular result returned by a data source

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Rows and column names produced by one query execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names, in select order
    pub columns: Vec<String>,
    /// Row data; rows may be ragged when built by hand
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build a result from rows alone, naming columns `column_N`
    pub fn from_rows<R, V>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let columns = (0..width).map(|i| format!("column_{}", i)).collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First column of the first row, if present
    pub fn first_cell(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Compact rendering of the leading rows, used as an alert's raw snippet
    pub fn snippet(&self, max_rows: usize) -> String {
        let mut lines: Vec<String> = self
            .rows
            .iter()
            .take(max_rows)
            .map(|row| {
                row.iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect();

        if self.rows.len() > max_rows {
            lines.push(format!("... {} more row(s)", self.rows.len() - max_rows));
        }
        lines.join("\n")
    }
}
