use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{cell, primary_rows, result_object, row_matrix};

/// Format output as tables: summary fields first, then the per-holder or
/// per-scenario rows, then warnings and methodology from the envelope.
pub fn print_table(value: &Value) {
    let Some(result) = result_object(value) else {
        println!("{}", value);
        return;
    };
    let rows = primary_rows(result);

    let mut summary = Builder::default();
    summary.push_record(["Field", "Value"]);
    for (key, val) in result {
        if rows.map(|(k, _)| k == key.as_str()).unwrap_or(false) || val.is_array() {
            continue;
        }
        summary.push_record([key.as_str(), &cell(val)]);
    }
    println!("{}", Table::from(summary));

    if let Some((key, (headers, body))) = rows.and_then(|(k, r)| row_matrix(r).map(|m| (k, m))) {
        let mut builder = Builder::default();
        builder.push_record(headers);
        for row in body {
            builder.push_record(row);
        }
        println!("\n{}:\n{}", key, Table::from(builder));
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }
    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}
