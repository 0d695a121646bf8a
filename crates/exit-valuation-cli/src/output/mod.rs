pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Array fields that hold one row per holder or scenario, in priority order.
const ROW_KEYS: [&str; 4] = ["distributions", "scenario_results", "scenarios", "holders"];

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The object to render: the `result` of an envelope, or the value itself.
fn result_object(value: &Value) -> Option<&Map<String, Value>> {
    value
        .as_object()
        .map(|m| m.get("result").and_then(Value::as_object).unwrap_or(m))
}

/// The first non-empty row array in a result, with its key.
fn primary_rows(result: &Map<String, Value>) -> Option<(&'static str, &Vec<Value>)> {
    ROW_KEYS.iter().find_map(|key| match result.get(*key) {
        Some(Value::Array(rows)) if !rows.is_empty() => Some((*key, rows)),
        _ => None,
    })
}

/// Scalar-ish cell text. Nested values are rendered as compact JSON.
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => {
            items.iter().map(cell).collect::<Vec<_>>().join(", ")
        }
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Headers taken from the first row, values looked up per row.
fn row_matrix(rows: &[Value]) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let first = rows.first()?.as_object()?;
    let headers: Vec<String> = first.keys().cloned().collect();
    let body = rows
        .iter()
        .filter_map(Value::as_object)
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();
    Some((headers, body))
}
