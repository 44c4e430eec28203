// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend that stores nothing. Every read misses and every write fails;
//! useful to switch caching off without changing call sites.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;
use crate::error::CacheResult;
use crate::value::Value;

use super::backend::{Backend, Context, Features};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackHoleOptions {}

#[derive(Debug, Default)]
pub struct BlackHoleBackend;

impl BlackHoleBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Backend for BlackHoleBackend {
    type Options = BlackHoleOptions;

    fn name(&self) -> &'static str {
        "black_hole"
    }

    fn features(&self) -> Features {
        Features {
            expirable: false,
            ..Features::all()
        }
    }

    fn capabilities(&self, _ctx: &Context<'_, BlackHoleOptions>) -> Capabilities {
        Capabilities::builder()
            .all_datatypes()
            .static_ttl(false)
            .unlimited_key_length()
            .namespace_is_prefix(true)
            .build()
    }

    fn get(&self, _ctx: &Context<'_, BlackHoleOptions>, _key: &str) -> CacheResult<Option<Value>> {
        Ok(None)
    }

    fn set(&self, _ctx: &Context<'_, BlackHoleOptions>, _key: &str, _value: &Value) -> CacheResult<bool> {
        Ok(false)
    }

    fn remove(&self, _ctx: &Context<'_, BlackHoleOptions>, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    fn increment(&self, _ctx: &Context<'_, BlackHoleOptions>, _key: &str, _amount: i64) -> CacheResult<Option<i64>> {
        Ok(None)
    }

    fn increment_many(
        &self,
        _ctx: &Context<'_, BlackHoleOptions>,
        _amounts: &BTreeMap<String, i64>,
    ) -> CacheResult<BTreeMap<String, i64>> {
        Ok(BTreeMap::new())
    }

    fn flush(&self, _ctx: &Context<'_, BlackHoleOptions>) -> CacheResult<bool> {
        Ok(false)
    }

    fn clear_expired(&self, _ctx: &Context<'_, BlackHoleOptions>) -> CacheResult<bool> {
        Ok(false)
    }

    fn clear_by_namespace(&self, _ctx: &Context<'_, BlackHoleOptions>, _namespace: &str) -> CacheResult<bool> {
        Ok(false)
    }

    fn clear_by_prefix(&self, _ctx: &Context<'_, BlackHoleOptions>, _prefix: &str) -> CacheResult<bool> {
        Ok(false)
    }

    fn optimize(&self, _ctx: &Context<'_, BlackHoleOptions>) -> CacheResult<bool> {
        Ok(false)
    }

    fn total_space(&self, _ctx: &Context<'_, BlackHoleOptions>) -> CacheResult<u64> {
        Ok(0)
    }

    fn available_space(&self, _ctx: &Context<'_, BlackHoleOptions>) -> CacheResult<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Adapter, StorageAdapter};
    use serde_json::json;

    #[test]
    fn test_everything_misses() {
        let cache = Adapter::new(BlackHoleBackend::new());
        assert!(!cache.set_item("k", json!(1)).unwrap());
        assert_eq!(cache.get_item("k").unwrap(), None);
        assert!(!cache.has_item("k").unwrap());
        assert_eq!(cache.increment_item("k", 1).unwrap(), None);
        let failed = cache
            .set_items(BTreeMap::from([("a".to_string(), json!(1))]))
            .unwrap();
        assert_eq!(failed, vec!["a".to_string()]);
        assert_eq!(cache.as_total_space().unwrap().total_space().unwrap(), 0);
        assert!(cache.as_expirable().is_none());
    }

    #[test]
    fn test_accepts_any_config() {
        let cache = Adapter::from_config(BlackHoleBackend::new(), &json!({"namespace": "x", "anything": 1})).unwrap();
        assert_eq!(cache.options().namespace, "x");
    }
}
