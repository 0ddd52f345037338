//! Severity classification of query results

use super::model::Severity;
use crate::data::ResultSet;

const CRITICAL_KEYWORDS: [&str; 4] = ["error", "fail", "critical", "breach"];
const WARNING_KEYWORDS: [&str; 3] = ["warning", "alert", "unusual"];

/// Classify by comparing the first cell of the first row against `threshold`.
///
/// A count at or above the threshold is `Warning`, strictly above twice the
/// threshold `Critical`. Anything else (no rows, non-numeric cell, count
/// below the threshold, non-positive threshold) keeps `default`.
pub fn classify_from_threshold(result: &ResultSet, threshold: i64, default: Severity) -> Severity {
    if threshold <= 0 {
        return default;
    }

    match result.first_cell().and_then(|v| v.as_count()) {
        Some(count) if count > threshold.saturating_mul(2) => Severity::Critical,
        Some(count) if count >= threshold => Severity::Warning,
        _ => default,
    }
}

/// Classify from a configured type string, falling back to a keyword scan
/// of every cell when the string names no severity.
pub fn classify_alert(type_str: &str, result: &ResultSet) -> Severity {
    if let Some(severity) = Severity::from_synonym(type_str) {
        return severity;
    }
    classify_by_keywords(result)
}

/// Case-insensitive substring scan; critical keywords win over warning keywords
pub fn classify_by_keywords(result: &ResultSet) -> Severity {
    let mut warning = false;

    for text in result
        .rows
        .iter()
        .flatten()
        .filter_map(|cell| cell.as_text())
    {
        let lower = text.to_lowercase();
        if CRITICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Severity::Critical;
        }
        if !warning && WARNING_KEYWORDS.iter().any(|k| lower.contains(k)) {
            warning = true;
        }
    }

    if warning {
        Severity::Warning
    } else {
        Severity::Info
    }
}
