// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operation results as seen by listeners.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::capabilities::Capabilities;
use crate::error::{CacheError, CacheResult};
use crate::value::{Metadata, Value};

use super::{Operation, Params};

/// The result slot of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Bool(bool),
    /// `None` is the "not found" sentinel.
    Item(Option<Value>),
    Items(BTreeMap<String, Value>),
    /// Failed keys of a batch write, or found keys of `has_items`.
    Keys(Vec<String>),
    Counter(Option<i64>),
    Counters(BTreeMap<String, i64>),
    Metadata(Option<Metadata>),
    Metadatas(BTreeMap<String, Metadata>),
    Capabilities(Arc<Capabilities>),
}

impl Outcome {
    fn variant(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Item(_) => "item",
            Self::Items(_) => "items",
            Self::Keys(_) => "keys",
            Self::Counter(_) => "counter",
            Self::Counters(_) => "counters",
            Self::Metadata(_) => "metadata",
            Self::Metadatas(_) => "metadatas",
            Self::Capabilities(_) => "capabilities",
        }
    }

    /// Neutral result of `op`: a miss, `false`, an empty map, or every key
    /// reported as failed. Capabilities have no neutral value.
    #[must_use]
    pub fn fallback(op: Operation, params: &Params) -> Option<Outcome> {
        let outcome = match op {
            Operation::GetItem => Outcome::Item(None),
            Operation::GetItems => Outcome::Items(BTreeMap::new()),
            Operation::HasItems => Outcome::Keys(Vec::new()),
            Operation::GetMetadata => Outcome::Metadata(None),
            Operation::GetMetadatas => Outcome::Metadatas(BTreeMap::new()),
            Operation::HasItem
            | Operation::SetItem
            | Operation::AddItem
            | Operation::ReplaceItem
            | Operation::CheckAndSetItem
            | Operation::TouchItem
            | Operation::RemoveItem => Outcome::Bool(false),
            Operation::SetItems
            | Operation::AddItems
            | Operation::ReplaceItems
            | Operation::TouchItems
            | Operation::RemoveItems => Outcome::Keys(params.keys()),
            Operation::IncrementItem | Operation::DecrementItem => Outcome::Counter(None),
            Operation::IncrementItems | Operation::DecrementItems => {
                Outcome::Counters(BTreeMap::new())
            }
            Operation::GetCapabilities => return None,
        };
        Some(outcome)
    }
}

/// Conversion between typed operation results and the event result slot.
pub trait OperationResult: Sized {
    fn into_outcome(self) -> Outcome;
    fn from_outcome(outcome: Outcome) -> CacheResult<Self>;
}

fn wrong(expected: &str, found: &Outcome) -> CacheError {
    CacheError::logic(format!(
        "Listener stored a '{}' result where '{}' was expected",
        found.variant(),
        expected
    ))
}

macro_rules! operation_result {
    ($ty:ty, $variant:ident, $label:literal) => {
        impl OperationResult for $ty {
            fn into_outcome(self) -> Outcome {
                Outcome::$variant(self)
            }

            fn from_outcome(outcome: Outcome) -> CacheResult<Self> {
                match outcome {
                    Outcome::$variant(v) => Ok(v),
                    other => Err(wrong($label, &other)),
                }
            }
        }
    };
}

operation_result!(bool, Bool, "bool");
operation_result!(Option<Value>, Item, "item");
operation_result!(BTreeMap<String, Value>, Items, "items");
operation_result!(Vec<String>, Keys, "keys");
operation_result!(Option<i64>, Counter, "counter");
operation_result!(BTreeMap<String, i64>, Counters, "counters");
operation_result!(Option<Metadata>, Metadata, "metadata");
operation_result!(BTreeMap<String, Metadata>, Metadatas, "metadatas");
operation_result!(Arc<Capabilities>, Capabilities, "capabilities");
