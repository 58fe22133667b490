//! Method parameters and value formatting.
//!
//! Two renderings exist for the same value: the form rendering used in
//! `application/x-www-form-urlencoded` bodies of single calls, and the literal
//! rendering used inside composite scripts.

use serde_json::Value;
use std::collections::BTreeMap;

/// Parameters of one remote method call.
///
/// Ordered so that script generation is deterministic.
pub type Params = BTreeMap<String, Value>;

/// Render a value for a form-encoded body.
///
/// Strings are sent raw, booleans as `1`/`0`, arrays comma-joined and objects as JSON.
pub fn form_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => bool_digit(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(form_value).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Render a value as a script literal.
///
/// Strings are quoted with JSON escaping, so parameter content can never break out of
/// the literal. Arrays become array literals of recursively rendered elements.
pub fn script_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => bool_digit(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(script_literal).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(_) => value.to_string(),
    }
}

/// Quote a string as a script string literal.
pub fn quote(s: &str) -> String {
    // Serializing a &str into JSON cannot fail.
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn bool_digit(b: bool) -> u8 {
    u8::from(b)
}
