//! Util functions

use serde_json::{Number, Value};

/// Converts a raw status string into the most specific JSON value.
///
/// Tries an integer first, then a float, then a boolean and falls back to the
/// string itself.
pub fn as_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Value::from(u);
    }
    if let Ok(f) = raw.parse::<f64>() {
        // NaN and infinities have no JSON representation
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    if let Some(b) = parse_bool(raw) {
        return Value::Bool(b);
    }
    Value::String(raw.to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Turns `snake_case` status names into `camelCase` metric names.
///
/// A `:` separates name spaces and becomes a `.`, each part is camel cased on
/// its own: `one:two_three_four` is `one.twoThreeFour`.
pub fn camel_case(name: &str) -> String {
    name.split(':')
        .map(camel_case_segment)
        .collect::<Vec<_>>()
        .join(".")
}

fn camel_case_segment(segment: &str) -> String {
    let mut words = segment.split('_').filter(|w| !w.is_empty());
    let mut result = words.next().unwrap_or_default().to_string();
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(chars.as_str());
        }
    }
    result
}
