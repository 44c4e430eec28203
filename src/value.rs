// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache item values and their datatype tags.
//!
//! Items are plain [`serde_json::Value`]s. Backends declare per [`Datatype`]
//! whether they store it natively, need it cast, or reject it (see
//! [`crate::Capabilities`]).

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

pub use serde_json::Value;

/// Metadata record returned by `get_metadata` (field name → value).
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datatype {
    Null,
    Boolean,
    Integer,
    Double,
    String,
    /// Ordered list
    Array,
    /// String-keyed map
    Object,
}

impl Datatype {
    pub const ALL: [Datatype; 7] = [
        Datatype::Null,
        Datatype::Boolean,
        Datatype::Integer,
        Datatype::Double,
        Datatype::String,
        Datatype::Array,
        Datatype::Object,
    ];

    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Double,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert `value` into `target`, the way string-only stores coerce scalars.
///
/// `null` and `false` become `""`, `true` becomes `"1"`, numbers keep their
/// shortest textual form. Containers can only be cast to a string (JSON text).
pub fn cast(value: &Value, target: Datatype) -> CacheResult<Value> {
    if Datatype::of(value) == target {
        return Ok(value.clone());
    }

    let cast = match target {
        Datatype::Null => Some(Value::Null),
        Datatype::String => Some(Value::String(to_text(value))),
        Datatype::Boolean => Some(Value::Bool(is_truthy(value))),
        Datatype::Integer => as_integer(value).map(Value::from),
        Datatype::Double => as_double(value).and_then(|f| serde_json::Number::from_f64(f).map(Value::Number)),
        Datatype::Array | Datatype::Object => None,
    };

    cast.ok_or_else(|| {
        CacheError::invalid(format!(
            "Can't cast a value of type '{}' to '{}'",
            Datatype::of(value),
            target
        ))
    })
}

/// Text form written by string-only stores. Containers are rejected.
pub(crate) fn stored_text(value: &Value) -> CacheResult<String> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(CacheError::invalid(format!(
            "Can't store a value of type '{}' as text",
            Datatype::of(value)
        ))),
        other => Ok(to_text(other)),
    }
}

/// Integer view used by increment/decrement. Numeric strings are accepted.
#[must_use]
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Null => Some(0),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate_to_integer)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate_to_integer))
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Whole part of `f`, or `None` when it is not finite or falls outside `i64`.
fn truncate_to_integer(f: f64) -> Option<i64> {
    // 2^63; `i64::MAX as f64` rounds up to it
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let whole = f.trunc();
    (whole >= -LIMIT && whole < LIMIT).then(|| whole as i64)
}

fn as_double(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_datatype_of() {
        assert_eq!(Datatype::of(&json!(null)), Datatype::Null);
        assert_eq!(Datatype::of(&json!(true)), Datatype::Boolean);
        assert_eq!(Datatype::of(&json!(123)), Datatype::Integer);
        assert_eq!(Datatype::of(&json!(123.12)), Datatype::Double);
        assert_eq!(Datatype::of(&json!("x")), Datatype::String);
        assert_eq!(Datatype::of(&json!([1])), Datatype::Array);
        assert_eq!(Datatype::of(&json!({"a": 1})), Datatype::Object);
    }

    #[test]
    fn test_cast_scalars_to_string() {
        assert_eq!(cast(&json!(123), Datatype::String).unwrap(), json!("123"));
        assert_eq!(cast(&json!(123.12), Datatype::String).unwrap(), json!("123.12"));
        assert_eq!(cast(&json!(null), Datatype::String).unwrap(), json!(""));
        assert_eq!(cast(&json!(true), Datatype::String).unwrap(), json!("1"));
        assert_eq!(cast(&json!(false), Datatype::String).unwrap(), json!(""));
    }

    #[test]
    fn test_cast_to_container_is_rejected() {
        let err = cast(&json!("abc"), Datatype::Array).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_stored_text() {
        assert_eq!(stored_text(&json!(12)).unwrap(), "12");
        assert_eq!(stored_text(&json!("x")).unwrap(), "x");
        assert!(stored_text(&json!([1])).is_err());
    }

    #[test]
    fn test_as_integer() {
        assert_eq!(as_integer(&json!("42")), Some(42));
        assert_eq!(as_integer(&json!(" 7 ")), Some(7));
        assert_eq!(as_integer(&json!(3.9)), Some(3));
        assert_eq!(as_integer(&json!("nope")), None);
        assert_eq!(as_integer(&json!([1])), None);
    }

    #[test]
    fn test_as_integer_rejects_out_of_range_floats() {
        assert_eq!(as_integer(&json!(1e19)), None);
        assert_eq!(as_integer(&json!(-1e19)), None);
        assert_eq!(as_integer(&json!(9.3e18)), None);
        assert_eq!(as_integer(&json!("1e300")), None);
        assert_eq!(as_integer(&json!("inf")), None);
        assert_eq!(as_integer(&json!(-9.2e18)), Some(-9_200_000_000_000_000_000));
        assert_eq!(as_integer(&json!("-2.5")), Some(-2));
    }
}
