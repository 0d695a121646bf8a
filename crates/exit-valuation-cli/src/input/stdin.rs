use serde_json::Value;
use std::io::{self, Read};

/// JSON piped on stdin, or `None` when stdin is a terminal or empty.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    match buffer.trim() {
        "" => Ok(None),
        payload => serde_json::from_str(payload)
            .map(Some)
            .map_err(|e| format!("Failed to parse JSON from stdin: {}", e).into()),
    }
}
