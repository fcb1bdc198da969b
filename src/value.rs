// 🧱 Values - grid cells and stored field values
//
// A decoder hands back cells (what the spreadsheet holds), the catalog
// stores field values (what a record holds). Cells collapse into values
// during materialization.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Field name → value. Always built from the schema so every field is present.
pub type Fields = BTreeMap<String, FieldValue>;

/// 2-D cell grid, rows of cells, as produced by a spreadsheet decoder.
pub type Grid = Vec<Vec<Cell>>;

// ============================================================================
// CELL
// ============================================================================

/// One scalar from a decoded spreadsheet
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Trimmed label used for header matching (None for empty cells)
    pub fn label(&self) -> Option<String> {
        let text = match self {
            Cell::Empty => return None,
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => number_text(*n),
            Cell::Bool(b) => bool_text(*b).to_string(),
        };
        Some(text)
    }

    /// Convert into a stored value. Empty cells are absent.
    pub fn to_value(&self) -> Option<FieldValue> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(FieldValue::Text(s.clone())),
            Cell::Number(n) => Some(FieldValue::Number(*n)),
            Cell::Bool(b) => Some(FieldValue::Text(bool_text(*b).to_string())),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

fn bool_text(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

// ============================================================================
// FIELD VALUE
// ============================================================================

/// Stored value of one canonical field (JSON string or number)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn empty() -> Self {
        FieldValue::Text(String::new())
    }

    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Text form: strings as-is, numbers in shortest decimal form
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Number(n) => Cow::Owned(number_text(*n)),
        }
    }

    /// Whitespace-only text counts as blank; numbers never do
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(_) => false,
        }
    }

    /// Empty text or numeric zero
    pub fn is_falsy(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Number(n) => *n == 0.0 || n.is_nan(),
        }
    }

    /// Business-key form: trimmed text
    pub fn key(&self) -> String {
        self.as_text().trim().to_string()
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::empty()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// Shortest decimal rendering of a number; integral values drop the fraction
pub fn number_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_text() {
        assert_eq!(number_text(15.0), "15");
        assert_eq!(number_text(12.5), "12.5");
        assert_eq!(number_text(-3.0), "-3");
        assert_eq!(number_text(12345678.0), "12345678");
    }

    #[test]
    fn test_cell_label_trims() {
        assert_eq!(Cell::Text("  NCM ".into()).label().as_deref(), Some("NCM"));
        assert_eq!(Cell::Number(2024.0).label().as_deref(), Some("2024"));
        assert_eq!(Cell::Empty.label(), None);
    }

    #[test]
    fn test_field_value_json_untagged() {
        let fields: Fields = [
            ("NCM".to_string(), FieldValue::Number(12345678.0)),
            ("IPI".to_string(), FieldValue::text("5,00%")),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"IPI":"5,00%","NCM":12345678.0}"#);

        let back: Fields = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn test_key_and_blank() {
        assert_eq!(FieldValue::text(" 0101.21.00 ").key(), "0101.21.00");
        assert_eq!(FieldValue::Number(0.0).key(), "0");
        assert!(FieldValue::text("   ").is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
        assert!(FieldValue::Number(0.0).is_falsy());
        assert!(!FieldValue::text("0").is_falsy());
    }
}
