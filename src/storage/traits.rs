// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public adapter surface.
//!
//! [`StorageAdapter`] is object safe; callers usually hold an
//! `Arc<dyn StorageAdapter>` from the factory. Optional capabilities are
//! separate traits reached through the `as_*` accessors, which return `None`
//! when the backend lacks the feature.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::Capabilities;
use crate::error::{CacheError, CacheResult};
use crate::event::EventManager;
use crate::plugin::Plugin;
use crate::value::{Metadata, Value};

use super::AdapterOptions;

pub trait StorageAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn options(&self) -> AdapterOptions;

    /// Replace the adapter options. Emits the `option` event.
    fn set_options(&self, options: AdapterOptions) -> CacheResult<()>;

    /// Adapter and backend options as one flat map.
    fn options_value(&self) -> Value;

    fn get_capabilities(&self) -> CacheResult<Arc<Capabilities>>;

    /// `None` when the item is missing or expired.
    fn get_item(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Found items only; missing keys are omitted.
    fn get_items(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Value>>;

    fn has_item(&self, key: &str) -> CacheResult<bool>;

    /// The subset of `keys` that exist.
    fn has_items(&self, keys: &[&str]) -> CacheResult<Vec<String>>;

    fn get_metadata(&self, key: &str) -> CacheResult<Option<Metadata>>;

    fn get_metadatas(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Metadata>>;

    fn set_item(&self, key: &str, value: Value) -> CacheResult<bool>;

    /// Returns the keys that failed.
    fn set_items(&self, items: BTreeMap<String, Value>) -> CacheResult<Vec<String>>;

    fn add_item(&self, key: &str, value: Value) -> CacheResult<bool>;

    fn add_items(&self, items: BTreeMap<String, Value>) -> CacheResult<Vec<String>>;

    fn replace_item(&self, key: &str, value: Value) -> CacheResult<bool>;

    fn replace_items(&self, items: BTreeMap<String, Value>) -> CacheResult<Vec<String>>;

    /// Write `value` only if the item still holds `token`, the value read
    /// earlier through `get_item`.
    fn check_and_set_item(&self, token: &Value, key: &str, value: Value) -> CacheResult<bool>;

    fn touch_item(&self, key: &str) -> CacheResult<bool>;

    fn touch_items(&self, keys: &[&str]) -> CacheResult<Vec<String>>;

    fn remove_item(&self, key: &str) -> CacheResult<bool>;

    fn remove_items(&self, keys: &[&str]) -> CacheResult<Vec<String>>;

    /// New value, or `None` when the store refused the write.
    fn increment_item(&self, key: &str, amount: i64) -> CacheResult<Option<i64>>;

    fn increment_items(&self, amounts: BTreeMap<String, i64>) -> CacheResult<BTreeMap<String, i64>>;

    fn decrement_item(&self, key: &str, amount: i64) -> CacheResult<Option<i64>>;

    fn decrement_items(&self, amounts: BTreeMap<String, i64>) -> CacheResult<BTreeMap<String, i64>>;

    fn as_plugin_capable(&self) -> Option<&dyn PluginCapable> {
        None
    }

    fn as_flushable(&self) -> Option<&dyn Flushable> {
        None
    }

    fn as_clear_expired(&self) -> Option<&dyn ClearExpired> {
        None
    }

    fn as_clear_by_namespace(&self) -> Option<&dyn ClearByNamespace> {
        None
    }

    fn as_clear_by_prefix(&self) -> Option<&dyn ClearByPrefix> {
        None
    }

    fn as_optimizable(&self) -> Option<&dyn Optimizable> {
        None
    }

    fn as_total_space(&self) -> Option<&dyn TotalSpace> {
        None
    }

    fn as_available_space(&self) -> Option<&dyn AvailableSpace> {
        None
    }

    fn as_expirable(&self) -> Option<&dyn Expirable> {
        None
    }
}

impl dyn StorageAdapter + '_ {
    /// Plugin registry of this adapter, or a logic error if it has none.
    pub fn plugins(&self) -> CacheResult<&dyn PluginCapable> {
        self.as_plugin_capable().ok_or_else(|| {
            CacheError::logic(format!("Adapter '{}' doesn't support plugins", self.name()))
        })
    }
}

/// Adapters that host an event bus and plugins.
pub trait PluginCapable {
    fn events(&self) -> &EventManager;

    /// Attach `plugin` at `priority`. Registering the same instance twice is
    /// a logic error.
    fn add_plugin(&self, plugin: Arc<dyn Plugin>, priority: i32) -> CacheResult<()>;

    /// Detach exactly the listeners `plugin` attached.
    fn remove_plugin(&self, plugin: &Arc<dyn Plugin>) -> CacheResult<()>;

    fn has_plugin(&self, plugin: &Arc<dyn Plugin>) -> bool;

    /// Registered plugins in attachment order.
    fn plugin_registry(&self) -> Vec<Arc<dyn Plugin>>;
}

/// Plugin identity is the allocation, not the value.
pub(crate) fn same_plugin(a: &Arc<dyn Plugin>, b: &Arc<dyn Plugin>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub trait Flushable {
    /// Remove every item of every namespace.
    fn flush(&self) -> CacheResult<bool>;
}

pub trait ClearExpired {
    fn clear_expired(&self) -> CacheResult<bool>;
}

pub trait ClearByNamespace {
    /// Remove every item of `namespace`. An empty namespace is rejected.
    fn clear_by_namespace(&self, namespace: &str) -> CacheResult<bool>;
}

pub trait ClearByPrefix {
    /// Remove items of the current namespace whose key starts with `prefix`.
    /// An empty prefix is rejected.
    fn clear_by_prefix(&self, prefix: &str) -> CacheResult<bool>;
}

pub trait Optimizable {
    fn optimize(&self) -> CacheResult<bool>;
}

pub trait TotalSpace {
    /// Capacity in bytes.
    fn total_space(&self) -> CacheResult<u64>;
}

pub trait AvailableSpace {
    /// Free capacity in bytes.
    fn available_space(&self) -> CacheResult<u64>;
}

/// Per-item lifetimes independent of the `ttl` option.
pub trait Expirable {
    fn set_timeout(&self, key: &str, timeout: Duration) -> CacheResult<bool>;

    /// `None` when the item is missing or never expires.
    fn remaining_timeout(&self, key: &str) -> CacheResult<Option<Duration>>;
}
