use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ─── Scalar values ────────────────────────────────────────────

/// A heterogeneous scalar held in a state/input/output record.
///
/// `untagged` so records serialize as plain JSON/YAML scalars. Variant order
/// matters for deserialization: `Null` and `Bool` must win before the
/// numeric variants, and `Int` before `Float` so `3` stays integral.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A name-keyed record of scalars. `BTreeMap` keeps key order deterministic
/// for serialized logs and CSV headers.
pub type Record = BTreeMap<String, Value>;

impl Value {
    /// Truthiness: `Null` is false, numbers are nonzero, strings nonempty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Numeric view; `None` for non-numeric variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
        }
    }

    /// Parse user-entered text the way the interactive prompt does:
    /// int, then float, then bool, otherwise the raw string.
    pub fn parse_lossy(text: &str) -> Value {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::Int(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Str(trimmed.to_string()),
        }
    }
}

impl fmt::Display for Value {
    /// Plain-text rendering used for CSV cells; `Null` renders empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_record_semantics() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
    }

    #[test]
    fn parse_lossy_tries_int_float_bool_then_str() {
        assert_eq!(Value::parse_lossy("42"), Value::Int(42));
        assert_eq!(Value::parse_lossy("4.5"), Value::Float(4.5));
        assert_eq!(Value::parse_lossy("True"), Value::Bool(true));
        assert_eq!(Value::parse_lossy("hello"), Value::Str("hello".into()));
    }

    #[test]
    fn untagged_serde_round_trips_scalars() {
        let record: Record = [
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Float(2.5)),
            ("c".to_string(), Value::Bool(true)),
            ("d".to_string(), Value::Str("s".into())),
            ("e".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
