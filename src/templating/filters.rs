//! Tera filters for emitting C/C++ source.
//!
//! - `c_ident`: turns any string into a valid C identifier
//! - `c_string`: escapes a string for use inside a C string literal

use std::collections::HashMap;
use tera::{Result as TeraResult, Value};

/// Sanitizes `name` into a C identifier.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit is prefixed
/// with `_`. An empty name becomes `_`.
pub fn c_ident(name: &str) -> String {
    let mut ident: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Escapes backslashes, double quotes and newlines for a C string literal.
pub fn c_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn string_arg<'a>(filter: &str, value: &'a Value) -> TeraResult<&'a str> {
    value.as_str().ok_or_else(|| tera::Error::msg(format!("{filter} filter expects a string, got {value}")))
}

/// `{{ lib.name | c_ident }}`
pub fn c_ident_filter(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    Ok(Value::String(c_ident(string_arg("c_ident", value)?)))
}

/// `"{{ lib.name | c_string }}"`
pub fn c_string_filter(value: &Value, _args: &HashMap<String, Value>) -> TeraResult<Value> {
    Ok(Value::String(c_string(string_arg("c_string", value)?)))
}
