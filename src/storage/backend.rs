// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The native-operation contract implemented by each store.
//!
//! A [`Backend`] only knows how to talk to its store. Key validation,
//! readable/writable switches, datatype coercion, events and metrics are
//! applied by [`super::Adapter`] before a call reaches it, so backends can
//! assume keys are non-empty and values already match their capabilities.
//!
//! Only the single-item primitives are required. Batch variants,
//! `add`/`replace`, check-and-set, touch and increment have read-then-write
//! defaults; stores with native support override them.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::capabilities::Capabilities;
use crate::error::{CacheError, CacheResult};
use crate::value::{self, Metadata, Value};

use super::AdapterOptions;

/// Everything a native call may consult.
#[derive(Debug)]
pub struct Context<'a, O> {
    pub options: &'a AdapterOptions,
    pub backend: &'a O,
    /// Bumped on every option change; cached resources compare against it.
    pub generation: u64,
}

impl<O> Context<'_, O> {
    /// Key as stored when the namespace is a key prefix.
    #[must_use]
    pub fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.options.namespace_prefix(), key)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.options.ttl_duration()
    }
}

/// Optional capabilities a backend implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub flush: bool,
    pub clear_expired: bool,
    pub clear_by_namespace: bool,
    pub clear_by_prefix: bool,
    pub optimize: bool,
    pub total_space: bool,
    pub available_space: bool,
    pub expirable: bool,
}

impl Features {
    #[must_use]
    pub fn all() -> Self {
        Self {
            flush: true,
            clear_expired: true,
            clear_by_namespace: true,
            clear_by_prefix: true,
            optimize: true,
            total_space: true,
            available_space: true,
            expirable: true,
        }
    }
}

pub trait Backend: Send + Sync + 'static {
    type Options: Clone + Default + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Adapter name used in logs and metrics.
    fn name(&self) -> &'static str;

    fn features(&self) -> Features {
        Features::default()
    }

    /// Native capabilities for the given options.
    fn capabilities(&self, ctx: &Context<'_, Self::Options>) -> Capabilities;

    /// Reject option combinations the store cannot honour.
    fn validate_options(&self, _options: &AdapterOptions, _backend: &Self::Options) -> CacheResult<()> {
        Ok(())
    }

    /// Store-specific key rule, applied after the key pattern.
    fn validate_key(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    fn get(&self, ctx: &Context<'_, Self::Options>, key: &str) -> CacheResult<Option<Value>>;

    fn set(&self, ctx: &Context<'_, Self::Options>, key: &str, value: &Value) -> CacheResult<bool>;

    fn remove(&self, ctx: &Context<'_, Self::Options>, key: &str) -> CacheResult<bool>;

    fn get_many(&self, ctx: &Context<'_, Self::Options>, keys: &[String]) -> CacheResult<BTreeMap<String, Value>> {
        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(ctx, key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn has(&self, ctx: &Context<'_, Self::Options>, key: &str) -> CacheResult<bool> {
        Ok(self.get(ctx, key)?.is_some())
    }

    fn has_many(&self, ctx: &Context<'_, Self::Options>, keys: &[String]) -> CacheResult<Vec<String>> {
        let mut found = Vec::new();
        for key in keys {
            if self.has(ctx, key)? {
                found.push(key.clone());
            }
        }
        Ok(found)
    }

    /// Metadata of an existing item. Stores without metadata return an empty map.
    fn metadata(&self, ctx: &Context<'_, Self::Options>, key: &str) -> CacheResult<Option<Metadata>> {
        Ok(self.has(ctx, key)?.then(Metadata::new))
    }

    fn metadata_many(
        &self,
        ctx: &Context<'_, Self::Options>,
        keys: &[String],
    ) -> CacheResult<BTreeMap<String, Metadata>> {
        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(metadata) = self.metadata(ctx, key)? {
                found.insert(key.clone(), metadata);
            }
        }
        Ok(found)
    }

    /// Returns the keys that could not be stored.
    fn set_many(&self, ctx: &Context<'_, Self::Options>, items: &BTreeMap<String, Value>) -> CacheResult<Vec<String>> {
        let mut failed = Vec::new();
        for (key, value) in items {
            if !self.set(ctx, key, value)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    /// Store only if the key is absent.
    fn add(&self, ctx: &Context<'_, Self::Options>, key: &str, value: &Value) -> CacheResult<bool> {
        if self.has(ctx, key)? {
            return Ok(false);
        }
        self.set(ctx, key, value)
    }

    fn add_many(&self, ctx: &Context<'_, Self::Options>, items: &BTreeMap<String, Value>) -> CacheResult<Vec<String>> {
        let mut failed = Vec::new();
        for (key, value) in items {
            if !self.add(ctx, key, value)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    /// Store only if the key is present.
    fn replace(&self, ctx: &Context<'_, Self::Options>, key: &str, value: &Value) -> CacheResult<bool> {
        if !self.has(ctx, key)? {
            return Ok(false);
        }
        self.set(ctx, key, value)
    }

    fn replace_many(
        &self,
        ctx: &Context<'_, Self::Options>,
        items: &BTreeMap<String, Value>,
    ) -> CacheResult<Vec<String>> {
        let mut failed = Vec::new();
        for (key, value) in items {
            if !self.replace(ctx, key, value)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    /// Store `value` only if the current value still equals `token`.
    fn check_and_set(
        &self,
        ctx: &Context<'_, Self::Options>,
        token: &Value,
        key: &str,
        value: &Value,
    ) -> CacheResult<bool> {
        match self.get(ctx, key)? {
            Some(current) if current == *token => self.set(ctx, key, value),
            _ => Ok(false),
        }
    }

    /// Reset the lifetime of an existing item.
    fn touch(&self, ctx: &Context<'_, Self::Options>, key: &str) -> CacheResult<bool> {
        match self.get(ctx, key)? {
            Some(current) => self.set(ctx, key, &current),
            None => Ok(false),
        }
    }

    fn touch_many(&self, ctx: &Context<'_, Self::Options>, keys: &[String]) -> CacheResult<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.touch(ctx, key)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    fn remove_many(&self, ctx: &Context<'_, Self::Options>, keys: &[String]) -> CacheResult<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.remove(ctx, key)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    /// Add `amount` to a stored integer, creating it when missing.
    ///
    /// The default is a plain read-modify-write and is not atomic.
    fn increment(&self, ctx: &Context<'_, Self::Options>, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        read_modify_increment(self, ctx, key, amount)
    }

    fn increment_many(
        &self,
        ctx: &Context<'_, Self::Options>,
        amounts: &BTreeMap<String, i64>,
    ) -> CacheResult<BTreeMap<String, i64>> {
        let mut counters = BTreeMap::new();
        for (key, amount) in amounts {
            if let Some(counter) = self.increment(ctx, key, *amount)? {
                counters.insert(key.clone(), counter);
            }
        }
        Ok(counters)
    }

    fn decrement(&self, ctx: &Context<'_, Self::Options>, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        let negated = amount
            .checked_neg()
            .ok_or_else(|| CacheError::invalid(format!("Can't decrement by {}", amount)))?;
        self.increment(ctx, key, negated)
    }

    fn decrement_many(
        &self,
        ctx: &Context<'_, Self::Options>,
        amounts: &BTreeMap<String, i64>,
    ) -> CacheResult<BTreeMap<String, i64>> {
        let mut counters = BTreeMap::new();
        for (key, amount) in amounts {
            if let Some(counter) = self.decrement(ctx, key, *amount)? {
                counters.insert(key.clone(), counter);
            }
        }
        Ok(counters)
    }

    fn flush(&self, _ctx: &Context<'_, Self::Options>) -> CacheResult<bool> {
        Err(CacheError::Unsupported("flush"))
    }

    fn clear_expired(&self, _ctx: &Context<'_, Self::Options>) -> CacheResult<bool> {
        Err(CacheError::Unsupported("clear_expired"))
    }

    fn clear_by_namespace(&self, _ctx: &Context<'_, Self::Options>, _namespace: &str) -> CacheResult<bool> {
        Err(CacheError::Unsupported("clear_by_namespace"))
    }

    fn clear_by_prefix(&self, _ctx: &Context<'_, Self::Options>, _prefix: &str) -> CacheResult<bool> {
        Err(CacheError::Unsupported("clear_by_prefix"))
    }

    fn optimize(&self, _ctx: &Context<'_, Self::Options>) -> CacheResult<bool> {
        Err(CacheError::Unsupported("optimize"))
    }

    fn total_space(&self, _ctx: &Context<'_, Self::Options>) -> CacheResult<u64> {
        Err(CacheError::Unsupported("total_space"))
    }

    fn available_space(&self, _ctx: &Context<'_, Self::Options>) -> CacheResult<u64> {
        Err(CacheError::Unsupported("available_space"))
    }

    fn set_timeout(&self, _ctx: &Context<'_, Self::Options>, _key: &str, _timeout: Duration) -> CacheResult<bool> {
        Err(CacheError::Unsupported("set_timeout"))
    }

    fn remaining_timeout(&self, _ctx: &Context<'_, Self::Options>, _key: &str) -> CacheResult<Option<Duration>> {
        Err(CacheError::Unsupported("remaining_timeout"))
    }
}

/// New counter value for `current + amount`.
///
/// A missing item counts as zero. Non-numeric values and overflow are
/// runtime errors.
pub(crate) fn next_counter(key: &str, current: Option<&Value>, amount: i64) -> CacheResult<i64> {
    let base = match current {
        None => 0,
        Some(value) => value::as_integer(value).ok_or_else(|| {
            CacheError::runtime(format!("The value stored under '{}' is not an integer", key))
        })?,
    };
    base.checked_add(amount)
        .ok_or_else(|| CacheError::runtime(format!("Counter '{}' would overflow", key)))
}

pub(crate) fn read_modify_increment<B: Backend + ?Sized>(
    backend: &B,
    ctx: &Context<'_, B::Options>,
    key: &str,
    amount: i64,
) -> CacheResult<Option<i64>> {
    let current = backend.get(ctx, key)?;
    let next = next_counter(key, current.as_ref(), amount)?;
    Ok(backend.set(ctx, key, &Value::from(next))?.then_some(next))
}
