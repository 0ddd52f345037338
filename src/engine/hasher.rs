//! Result fingerprinting for change detection
//!
//! The digest covers the row count and a 3x3 sample of leading cells only.
//! Results that differ solely outside the sample hash identically; this is
//! a cheap change detector, not an equality check.

use crate::data::ResultSet;

/// Digest of a result with no rows
pub const EMPTY_DIGEST: &str = "empty";

const SAMPLE_ROWS: usize = 3;
const SAMPLE_COLUMNS: usize = 3;
const NULL_MARKER: &str = "NULL";

/// Compute the sampled digest of a result
pub fn digest(result: &ResultSet) -> String {
    if result.is_empty() {
        return EMPTY_DIGEST.to_string();
    }

    let mut input = format!("{}_", result.row_count());
    for row in result.rows.iter().take(SAMPLE_ROWS) {
        for cell in row.iter().take(SAMPLE_COLUMNS) {
            match cell.as_text() {
                Some(text) => input.push_str(&text),
                None => input.push_str(NULL_MARKER),
            }
            input.push('|');
        }
        input.push(';');
    }

    format!("{:016x}", fxhash::hash64(input.as_str()))
}
