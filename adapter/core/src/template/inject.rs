//! Placeholder injection
//!
//! A string that is exactly one placeholder (`"{{ temperature }}"`) is
//! replaced by a typed value, so a JSON template authored as text can still
//! carry numbers and booleans. A string mixing placeholders with literal text
//! always stays a string.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Number, Value};

use super::Vars;

static WHOLE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}$").expect("placeholder pattern is valid")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

static NUMERIC_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?$").expect("numeric pattern is valid")
});

/// Substitute placeholders throughout a JSON tree
///
/// Objects and arrays are rebuilt recursively; keys are left untouched.
/// Non-string scalars pass through unchanged.
#[must_use]
pub fn inject(node: &Value, vars: &Vars) -> Value {
    match node {
        Value::String(text) => inject_string(text, vars),
        Value::Array(items) => Value::Array(items.iter().map(|item| inject(item, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), inject(value, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Textual substitution for strings that must stay strings (URLs, headers)
#[must_use]
pub fn inject_str(text: &str, vars: &Vars) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| render(vars.get(&caps[1])))
        .into_owned()
}

fn inject_string(text: &str, vars: &Vars) -> Value {
    if let Some(caps) = WHOLE_PLACEHOLDER.captures(text) {
        return match vars.get(&caps[1]) {
            None | Some(Value::Null) => Value::String(String::new()),
            Some(Value::String(raw)) => coerce_scalar(raw),
            Some(structured) => structured.clone(),
        };
    }
    Value::String(inject_str(text, vars))
}

/// Textual form of a variable inside a larger string
fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Sniff the type of a whole-placeholder string variable
fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if NUMERIC_LITERAL.is_match(raw) => parse_number(raw)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    if let Ok(uint) = raw.parse::<u64>() {
        return Some(Number::from(uint));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}
