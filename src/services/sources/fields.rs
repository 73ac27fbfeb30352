//! Alias-tolerant field access on loosely typed JSON items.

use serde_json::{Map, Value};

/// First non-empty string among `keys`. Numbers are rendered as strings.
pub fn first_string(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match item.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Coordinate lookup result. `Invalid` carries the raw text that failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberField {
    Missing,
    Invalid(String),
    Value(f64),
}

/// First present value among `keys`, accepting numbers or numeric strings.
/// Null and empty strings count as missing.
pub fn first_number(item: &Map<String, Value>, keys: &[&str]) -> NumberField {
    for key in keys {
        match item.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Number(n)) => {
                return n
                    .as_f64()
                    .map(NumberField::Value)
                    .unwrap_or_else(|| NumberField::Invalid(n.to_string()))
            }
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(Value::String(s)) => {
                return s
                    .trim()
                    .parse::<f64>()
                    .map(NumberField::Value)
                    .unwrap_or_else(|_| NumberField::Invalid(s.clone()))
            }
            Some(other) => return NumberField::Invalid(other.to_string()),
        }
    }
    NumberField::Missing
}

/// Follows a path of object keys, e.g. `["player", "lifetime", "embed"]`.
pub fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

pub fn nested_string(value: &Value, path: &[&str]) -> Option<String> {
    nested(value, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
