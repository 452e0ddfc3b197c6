//! The dynamic, per-field value carried by a decoded row.
//!
//! A payload decoder produces a flat mapping from column name to [`Value`];
//! the bulk insert engine never needs to know which decoder produced it.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One decoded row: column name -> value. `BTreeMap` keeps column order
/// deterministic across runs, which the bulk-insert column-list builder and
/// the tests both rely on.
pub type Object = BTreeMap<String, Value>;

/// A dynamically-typed field value as carried inside a [`Object`].
///
/// Covers the primitive kinds the payload contract actually promises, plus
/// an escape hatch (`Raw`) for driver-specific passthrough for values the
/// decoder doesn't want to collapse into one of the named kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Raw(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is "falsy" in the sense `prepared()` needs: a
    /// `created_at` value that should be replaced with the current instant.
    /// Mirrors the original's `src_obj["created_at"] or datetime.now()`.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::Timestamp(_) | Value::Raw(_) => false,
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Raw(JsonValue::Number(n))
                }
            }
            JsonValue::String(s) => Value::Str(s),
            other @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::Raw(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_matches_python_truthiness_for_the_fields_we_care_about() {
        assert!(Value::Null.is_falsy());
        assert!(Value::Int(0).is_falsy());
        assert!(Value::Str(String::new()).is_falsy());
        assert!(!Value::Int(1).is_falsy());
        assert!(!Value::Str("x".into()).is_falsy());
    }

    #[test]
    fn json_number_without_exact_i64_becomes_float() {
        let v: Value = serde_json::json!(1.5).into();
        assert_eq!(v, Value::Float(1.5));
    }
}
