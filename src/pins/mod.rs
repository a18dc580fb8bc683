//! Pin-table parsing.
//!
//! The pin generator writes one declaration per line:
//!
//! ```text
//! var LED1 = 0x1234;
//! var SW2 = 12;
//! ```
//!
//! A line is kept when splitting it on single spaces yields exactly four fields; the
//! pin name is the second field and the value is the fourth minus its final character
//! (the terminator). Everything else (comments, blank lines, differently shaped
//! declarations) is skipped.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::FwError;

/// One named pin and its value, exactly as written by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinEntry {
    pub name: String,
    pub value: String,
}

/// Parses pin declarations, preserving order and duplicates.
pub fn parse_pins(text: &str) -> Vec<PinEntry> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(' ').collect();
            let [_, name, _, value] = fields.as_slice() else {
                return None;
            };
            let mut value = (*value).to_string();
            value.pop();
            Some(PinEntry {
                name: (*name).to_string(),
                value,
            })
        })
        .collect()
}

/// Reads and parses the pin artifact at `path`.
pub fn load_pins(path: &Path) -> Result<Vec<PinEntry>, FwError> {
    let text = std::fs::read_to_string(path).map_err(|e| FwError::PinReadError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let pins = parse_pins(&text);
    tracing::debug!(target: "pins", "Parsed {} pin(s) from {}", pins.len(), path.display());
    Ok(pins)
}
