use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared type of a result column, as reported in the query schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    String,
    Integer,
    Float,
    /// Fixed-precision `NUMERIC` (38 digits, scale 9).
    Numeric,
    /// Extended `BIGNUMERIC` (76 digits, scale 38).
    BigNumeric,
    Boolean,
    Timestamp,
    Record,
    /// Any type without special handling, kept by its upper-cased name.
    Other(String),
}

impl ColumnKind {
    /// Map a schema type name (legacy or standard SQL spelling) to a kind.
    pub fn from_type_name(name: &str) -> Self {
        let upper = name.trim().to_uppercase();
        match upper.as_str() {
            "STRING" => ColumnKind::String,
            "INTEGER" | "INT64" => ColumnKind::Integer,
            "FLOAT" | "FLOAT64" => ColumnKind::Float,
            "NUMERIC" | "DECIMAL" => ColumnKind::Numeric,
            "BIGNUMERIC" | "BIG_NUMERIC" | "BIGDECIMAL" => ColumnKind::BigNumeric,
            "BOOLEAN" | "BOOL" => ColumnKind::Boolean,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "RECORD" | "STRUCT" => ColumnKind::Record,
            _ => ColumnKind::Other(upper),
        }
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::BigNumeric)
    }
}

/// A single typed cell from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Decimal(BigDecimal),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    /// Nested or repeated value.
    Json(serde_json::Value),
    Null,
    /// Raw text of a type with no typed representation (DATE, GEOGRAPHY, ...).
    Other(String),
}

/// Default textual representation of a value. NULL renders as an empty field.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) | CellValue::Other(s) => f.write_str(s),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Decimal(d) => write!(f, "{}", d),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::Timestamp(ts) => write!(f, "{}", ts),
            CellValue::Json(v) => write!(f, "{}", v),
            CellValue::Null => Ok(()),
        }
    }
}

/// Render one cell to its output text given the column's declared kind.
///
/// Decimals in `NUMERIC`/`BIGNUMERIC` columns are written in plain notation
/// with trailing fractional zeros removed (`3.1400` → `3.14`, `5.000` → `5`).
/// Everything else uses the value's `Display` form.
pub fn render_cell(kind: &ColumnKind, value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => s.clone(),
        CellValue::Integer(i) => i.to_string(),
        CellValue::Decimal(d) if kind.is_decimal() => trim_fraction(&d.to_plain_string()),
        other => other.to_string(),
    }
}

/// Render a full row. Cells beyond the known columns fall back to `Display`.
pub fn render_row(kinds: &[ColumnKind], row: &[CellValue]) -> Vec<String> {
    row.iter()
        .enumerate()
        .map(|(i, cell)| match kinds.get(i) {
            Some(kind) => render_cell(kind, cell),
            None => cell.to_string(),
        })
        .collect()
}

fn trim_fraction(plain: &str) -> String {
    if !plain.contains('.') {
        return plain.to_string();
    }
    plain.trim_end_matches('0').trim_end_matches('.').to_string()
}
