use serde::{Deserialize, Serialize};

/// A single cell returned by a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Convert the cell to text.
    ///
    /// Returns `None` when the cell has no textual form: `NULL`, or a blob
    /// that is not valid UTF-8.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int64(i) => Some(i.to_string()),
            Value::Float64(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Bytes(b) => std::str::from_utf8(b).ok().map(str::to_string),
        }
    }

    /// Read the cell as an integer count.
    ///
    /// Text is parsed leniently: leading whitespace and an optional sign are
    /// accepted, then the longest run of digits is taken ("12 rows" -> 12).
    /// Floats are truncated toward zero.
    pub fn as_count(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Float64(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::String(s) => parse_leading_int(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok().and_then(parse_leading_int),
            _ => None,
        }
    }
}

fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_text() {
        assert_eq!(Value::Int64(42).as_text().as_deref(), Some("42"));
        assert_eq!(Value::from("hello").as_text().as_deref(), Some("hello"));
        assert_eq!(Value::Null.as_text(), None);
        assert_eq!(Value::Bytes(vec![0xff, 0xfe]).as_text(), None);
        assert_eq!(Value::Bytes(b"ok".to_vec()).as_text().as_deref(), Some("ok"));
    }

    #[test]
    fn test_as_count() {
        assert_eq!(Value::Int64(7).as_count(), Some(7));
        assert_eq!(Value::from("10").as_count(), Some(10));
        assert_eq!(Value::from("  -3 errors").as_count(), Some(-3));
        assert_eq!(Value::from("3.9").as_count(), Some(3));
        assert_eq!(Value::Float64(12.7).as_count(), Some(12));
        assert_eq!(Value::from("BREACH DETECTED").as_count(), None);
        assert_eq!(Value::from("").as_count(), None);
        assert_eq!(Value::Null.as_count(), None);
        assert_eq!(Value::Bool(true).as_count(), None);
    }
}
