//! Decoding of BigQuery REST cells into [`CellValue`]s.
//!
//! The REST API carries every scalar as a JSON string (`{"v": "42"}`), so the
//! column's declared kind decides how the text is interpreted:
//!
//! - `STRING` → `Text`
//! - `INTEGER` / `INT64` → `Integer` (with fallback to `Other`)
//! - `NUMERIC` / `BIGNUMERIC` → `Decimal` (with fallback to `Other`)
//! - `FLOAT` → `Float`, `BOOLEAN` → `Boolean` (with fallback to `Other`)
//! - `TIMESTAMP` → `Timestamp` from epoch seconds (with fallback to `Other`)
//! - `REPEATED` columns → `Json` array, `RECORD` columns → `Json` object
//! - JSON null → `Null`
//! - Unknown types → `Other` holding the raw text

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use bq2csv_core::{CellValue, ColumnKind};

use crate::warehouse::Column;

/// Decode one REST row. Missing trailing cells decode as `Null`.
pub fn decode_row(columns: &[Column], cells: &[Option<Value>]) -> Vec<CellValue> {
    columns
        .iter()
        .enumerate()
        .map(|(i, col)| decode_cell(col, cells.get(i).and_then(|c| c.as_ref())))
        .collect()
}

/// Decode one cell according to its column definition.
pub fn decode_cell(column: &Column, value: Option<&Value>) -> CellValue {
    let value = match value {
        None | Some(Value::Null) => return CellValue::Null,
        Some(v) => v,
    };

    if column.repeated {
        return match value {
            Value::Array(items) => CellValue::Json(Value::Array(
                items
                    .iter()
                    .map(|item| element_to_json(column, unwrap_v(item)))
                    .collect(),
            )),
            other => CellValue::Json(other.clone()),
        };
    }

    if column.kind == ColumnKind::Record {
        return CellValue::Json(record_to_json(&column.fields, value));
    }

    match value {
        Value::String(raw) => decode_scalar(&column.kind, raw),
        other => CellValue::Json(other.clone()),
    }
}

/// Interpret the raw text of a scalar cell.
pub fn decode_scalar(kind: &ColumnKind, raw: &str) -> CellValue {
    let other = || CellValue::Other(raw.to_string());

    match kind {
        ColumnKind::String => CellValue::Text(raw.to_string()),
        ColumnKind::Integer => raw.parse::<i64>().map(CellValue::Integer).unwrap_or_else(|_| other()),
        ColumnKind::Numeric | ColumnKind::BigNumeric => BigDecimal::from_str(raw)
            .map(CellValue::Decimal)
            .unwrap_or_else(|_| other()),
        ColumnKind::Float => raw.parse::<f64>().map(CellValue::Float).unwrap_or_else(|_| other()),
        ColumnKind::Boolean => match raw.to_lowercase().as_str() {
            "true" => CellValue::Boolean(true),
            "false" => CellValue::Boolean(false),
            _ => other(),
        },
        ColumnKind::Timestamp => parse_epoch_seconds(raw)
            .map(CellValue::Timestamp)
            .unwrap_or_else(other),
        ColumnKind::Record | ColumnKind::Other(_) => other(),
    }
}

/// Parse a REST timestamp (`"1.6725312E9"`, seconds since epoch) at microsecond precision.
fn parse_epoch_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let seconds = BigDecimal::from_str(raw).ok()?;
    let micros = (seconds * BigDecimal::from(1_000_000)).with_scale(0).to_i64()?;
    DateTime::from_timestamp_micros(micros)
}

/// Array elements and record fields are wrapped as `{"v": ...}`.
fn unwrap_v(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(obj) => obj.get("v"),
        other => Some(other),
    }
}

fn element_to_json(column: &Column, value: Option<&Value>) -> Value {
    let scalar = Column {
        repeated: false,
        ..column.clone()
    };
    cell_to_json(decode_cell(&scalar, value))
}

/// Records arrive as `{"f": [{"v": ...}, ...]}` in sub-field order.
fn record_to_json(fields: &[Column], value: &Value) -> Value {
    let cells = match value.get("f").and_then(Value::as_array) {
        Some(cells) => cells,
        None => return value.clone(),
    };

    let mut obj = Map::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let cell = cells.get(i).and_then(unwrap_v);
        obj.insert(field.name.clone(), cell_to_json(decode_cell(field, cell)));
    }
    Value::Object(obj)
}

fn cell_to_json(cell: CellValue) -> Value {
    match cell {
        CellValue::Text(s) | CellValue::Other(s) => Value::String(s),
        CellValue::Integer(i) => Value::from(i),
        CellValue::Decimal(d) => Value::String(d.to_plain_string()),
        CellValue::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        CellValue::Boolean(b) => Value::Bool(b),
        CellValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        CellValue::Json(v) => v,
        CellValue::Null => Value::Null,
    }
}
