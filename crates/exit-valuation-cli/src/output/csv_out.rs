use serde_json::Value;
use std::io;

use super::{cell, primary_rows, result_object, row_matrix};

/// Write output as CSV to stdout.
///
/// Results with per-holder or per-scenario rows are written one row per
/// entry; anything else becomes a two-column `field,value` listing.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let Some(result) = result_object(value) else {
        let _ = wtr.write_record([cell(value)]);
        let _ = wtr.flush();
        return;
    };

    match primary_rows(result).and_then(|(_, rows)| row_matrix(rows)) {
        Some((headers, body)) => {
            let _ = wtr.write_record(&headers);
            for row in body {
                let _ = wtr.write_record(&row);
            }
        }
        None => {
            let _ = wtr.write_record(["field", "value"]);
            for (key, val) in result {
                let _ = wtr.write_record([key.as_str(), &cell(val)]);
            }
        }
    }

    let _ = wtr.flush();
}
