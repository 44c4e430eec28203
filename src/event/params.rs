// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The mutable argument bag carried by storage events.
//!
//! Listeners on `<op>.pre` may rewrite any field; the adapter reads the bag
//! back after the emission, so rewritten values are what reach the backend.

use std::collections::BTreeMap;

use crate::error::{CacheError, CacheResult};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    None,
    Key {
        key: String,
    },
    Keys {
        keys: Vec<String>,
    },
    Item {
        key: String,
        value: Value,
    },
    Items {
        items: BTreeMap<String, Value>,
    },
    /// `token` is the value previously read from `get_item`.
    CheckAndSet {
        token: Value,
        key: String,
        value: Value,
    },
    Increment {
        key: String,
        amount: i64,
    },
    Increments {
        amounts: BTreeMap<String, i64>,
    },
}

impl Params {
    /// Every key the operation touches, in bag order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Key { key }
            | Self::Item { key, .. }
            | Self::CheckAndSet { key, .. }
            | Self::Increment { key, .. } => vec![key.clone()],
            Self::Keys { keys } => keys.clone(),
            Self::Items { items } => items.keys().cloned().collect(),
            Self::Increments { amounts } => amounts.keys().cloned().collect(),
        }
    }

    pub(crate) fn expect_key(&self) -> CacheResult<&str> {
        match self {
            Self::Key { key } => Ok(key),
            other => Err(mismatch("a key", other)),
        }
    }

    pub(crate) fn expect_keys(&self) -> CacheResult<&[String]> {
        match self {
            Self::Keys { keys } => Ok(keys),
            other => Err(mismatch("a key list", other)),
        }
    }

    pub(crate) fn expect_item(&self) -> CacheResult<(&str, &Value)> {
        match self {
            Self::Item { key, value } => Ok((key, value)),
            other => Err(mismatch("a key/value pair", other)),
        }
    }

    pub(crate) fn expect_items(&self) -> CacheResult<&BTreeMap<String, Value>> {
        match self {
            Self::Items { items } => Ok(items),
            other => Err(mismatch("a key/value map", other)),
        }
    }

    pub(crate) fn expect_check_and_set(&self) -> CacheResult<(&Value, &str, &Value)> {
        match self {
            Self::CheckAndSet { token, key, value } => Ok((token, key, value)),
            other => Err(mismatch("a token/key/value triple", other)),
        }
    }

    pub(crate) fn expect_increment(&self) -> CacheResult<(&str, i64)> {
        match self {
            Self::Increment { key, amount } => Ok((key, *amount)),
            other => Err(mismatch("a key/amount pair", other)),
        }
    }

    pub(crate) fn expect_increments(&self) -> CacheResult<&BTreeMap<String, i64>> {
        match self {
            Self::Increments { amounts } => Ok(amounts),
            other => Err(mismatch("a key/amount map", other)),
        }
    }

    /// Mutable views of every value in the bag (not CAS tokens).
    pub fn values_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Self::Item { value, .. } | Self::CheckAndSet { value, .. } => vec![value],
            Self::Items { items } => items.values_mut().collect(),
            _ => Vec::new(),
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Key { .. } => "key",
            Self::Keys { .. } => "keys",
            Self::Item { .. } => "item",
            Self::Items { .. } => "items",
            Self::CheckAndSet { .. } => "check_and_set",
            Self::Increment { .. } => "increment",
            Self::Increments { .. } => "increments",
        }
    }
}

fn mismatch(expected: &str, found: &Params) -> CacheError {
    CacheError::logic(format!(
        "Event parameters were replaced: expected {}, found '{}'",
        expected,
        found.variant()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_of_each_shape() {
        assert!(Params::None.keys().is_empty());
        let item = Params::Item { key: "a".into(), value: json!(1) };
        assert_eq!(item.keys(), vec!["a".to_string()]);
        let items = Params::Items {
            items: BTreeMap::from([("b".to_string(), json!(1)), ("a".to_string(), json!(2))]),
        };
        assert_eq!(items.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_expect_mismatch_is_logic_error() {
        let params = Params::Key { key: "a".into() };
        assert!(params.expect_key().is_ok());
        let err = params.expect_items().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Logic);
    }

    #[test]
    fn test_values_mut_skips_token() {
        let mut params = Params::CheckAndSet {
            token: json!("old"),
            key: "k".into(),
            value: json!("new"),
        };
        for v in params.values_mut() {
            *v = json!("rewritten");
        }
        assert_eq!(
            params,
            Params::CheckAndSet { token: json!("old"), key: "k".into(), value: json!("rewritten") }
        );
    }
}
