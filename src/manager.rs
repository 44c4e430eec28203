// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Name → constructor registries for adapters and plugins.
//!
//! Lookups ignore case, `_` and `-`, so `BlackHole`, `black_hole` and
//! `black-hole` resolve to the same entry. Unknown names are
//! [`CacheError::ServiceNotFound`]; backends compiled out of this build are
//! [`CacheError::ExtensionNotLoaded`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::plugin::{
    ClearExpiredByFactor, ExceptionHandler, IgnoreUserAbort, OptimizeByFactor, Plugin, Serializer,
};
use crate::storage::{Adapter, BlackHoleBackend, FilesystemBackend, MemoryBackend, StorageAdapter};
use crate::value::Value;

pub type AdapterConstructor = Arc<dyn Fn(&Value) -> CacheResult<Arc<dyn StorageAdapter>> + Send + Sync>;

pub type PluginConstructor = Arc<dyn Fn(&Value) -> CacheResult<Arc<dyn Plugin>> + Send + Sync>;

/// Registry key for `name`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn adapter_from<F>(build: F) -> AdapterConstructor
where
    F: Fn(&Value) -> CacheResult<Arc<dyn StorageAdapter>> + Send + Sync + 'static,
{
    Arc::new(build)
}

#[cfg(any(not(feature = "redis"), not(feature = "mongodb")))]
fn missing_extension(backend: &'static str, feature: &'static str) -> AdapterConstructor {
    adapter_from(move |_| {
        Err(CacheError::ExtensionNotLoaded(format!(
            "The {} adapter requires the '{}' cargo feature",
            backend, feature
        )))
    })
}

pub struct AdapterManager {
    constructors: BTreeMap<String, AdapterConstructor>,
}

impl AdapterManager {
    /// Registry with the bundled backends.
    #[must_use]
    pub fn new() -> Self {
        let mut manager = Self::empty();
        manager.register(
            "memory",
            adapter_from(|options| Ok(Arc::new(Adapter::from_config(MemoryBackend::new(), options)?))),
        );
        manager.register(
            "filesystem",
            adapter_from(|options| Ok(Arc::new(Adapter::from_config(FilesystemBackend::new(), options)?))),
        );
        manager.register(
            "black_hole",
            adapter_from(|options| Ok(Arc::new(Adapter::from_config(BlackHoleBackend::new(), options)?))),
        );

        #[cfg(feature = "redis")]
        manager.register(
            "redis",
            adapter_from(|options| {
                Ok(Arc::new(Adapter::from_config(crate::storage::RedisBackend::new(), options)?))
            }),
        );
        #[cfg(not(feature = "redis"))]
        manager.register("redis", missing_extension("Redis", "redis"));

        #[cfg(feature = "mongodb")]
        manager.register(
            "mongodb",
            adapter_from(|options| {
                Ok(Arc::new(Adapter::from_config(crate::storage::MongoDbBackend::new(), options)?))
            }),
        );
        #[cfg(not(feature = "mongodb"))]
        manager.register("mongodb", missing_extension("MongoDB", "mongodb"));

        manager
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register or replace the constructor for `name`.
    pub fn register(&mut self, name: &str, constructor: AdapterConstructor) {
        self.constructors.insert(normalize_name(name), constructor);
    }

    pub fn has(&self, name: &str) -> bool {
        self.constructors.contains_key(&normalize_name(name))
    }

    /// Normalised names of every registered adapter.
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn build(&self, name: &str, options: &Value) -> CacheResult<Arc<dyn StorageAdapter>> {
        let constructor = self
            .constructors
            .get(&normalize_name(name))
            .ok_or_else(|| CacheError::ServiceNotFound {
                kind: "adapter",
                name: name.to_string(),
            })?;
        let adapter = constructor(options)?;
        debug!(adapter = adapter.name(), requested = name, "Adapter constructed");
        Ok(adapter)
    }
}

impl Default for AdapterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdapterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterManager").field("names", &self.names()).finish()
    }
}

fn plugin_from<F>(build: F) -> PluginConstructor
where
    F: Fn(&Value) -> CacheResult<Arc<dyn Plugin>> + Send + Sync + 'static,
{
    Arc::new(build)
}

pub struct PluginManager {
    constructors: BTreeMap<String, PluginConstructor>,
}

impl PluginManager {
    /// Registry with the bundled plugins.
    #[must_use]
    pub fn new() -> Self {
        let mut manager = Self::empty();
        manager.register("serializer", plugin_from(|options| Ok(Arc::new(Serializer::from_options(options)?))));
        let sweeper = plugin_from(|options| Ok(Arc::new(ClearExpiredByFactor::from_options(options)?)));
        manager.register("clear_expired_by_factor", Arc::clone(&sweeper));
        manager.register("expired_items_sweeper", sweeper);
        manager.register(
            "optimize_by_factor",
            plugin_from(|options| Ok(Arc::new(OptimizeByFactor::from_options(options)?))),
        );
        manager.register(
            "exception_handler",
            plugin_from(|options| Ok(Arc::new(ExceptionHandler::from_options(options)?))),
        );
        manager.register(
            "ignore_user_abort",
            plugin_from(|options| Ok(Arc::new(IgnoreUserAbort::from_options(options)?))),
        );
        manager
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, constructor: PluginConstructor) {
        self.constructors.insert(normalize_name(name), constructor);
    }

    /// Resolve `name` to this very instance, whatever options are passed.
    pub fn register_instance(&mut self, name: &str, plugin: Arc<dyn Plugin>) {
        self.register(name, plugin_from(move |_| Ok(Arc::clone(&plugin))));
    }

    pub fn has(&self, name: &str) -> bool {
        self.constructors.contains_key(&normalize_name(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn build(&self, name: &str, options: &Value) -> CacheResult<Arc<dyn Plugin>> {
        let constructor = self
            .constructors
            .get(&normalize_name(name))
            .ok_or_else(|| CacheError::ServiceNotFound {
                kind: "plugin",
                name: name.to_string(),
            })?;
        constructor(options)
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("ClearExpiredByFactor"), "clearexpiredbyfactor");
        assert_eq!(normalize_name("clear_expired_by_factor"), "clearexpiredbyfactor");
        assert_eq!(normalize_name("Black-Hole"), "blackhole");
    }

    #[test]
    fn test_builds_bundled_adapters() {
        let manager = AdapterManager::new();
        let memory = manager.build("Memory", &json!({"namespace": "m"})).unwrap();
        assert_eq!(memory.name(), "memory");
        assert_eq!(memory.options().namespace, "m");
        assert_eq!(manager.build("BlackHole", &Value::Null).unwrap().name(), "black_hole");
    }

    #[test]
    fn test_unknown_adapter() {
        let err = AdapterManager::new().build("Memcached", &Value::Null).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ServiceNotFound);
    }

    #[test]
    fn test_bad_adapter_options() {
        let err = AdapterManager::new().build("memory", &json!("nope")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[cfg(not(feature = "mongodb"))]
    #[test]
    fn test_compiled_out_backend() {
        let err = AdapterManager::new().build("MongoDb", &Value::Null).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ExtensionNotLoaded);
    }

    #[test]
    fn test_plugin_aliases() {
        let manager = PluginManager::new();
        assert_eq!(manager.build("ExpiredItemsSweeper", &Value::Null).unwrap().name(), "clear_expired_by_factor");
        assert_eq!(manager.build("ClearExpiredByFactor", &Value::Null).unwrap().name(), "clear_expired_by_factor");
        let err = manager.build("NoSuchPlugin", &Value::Null).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ServiceNotFound);
    }

    #[test]
    fn test_registered_instance_is_shared() {
        let mut manager = PluginManager::new();
        let shared: Arc<dyn Plugin> = Arc::new(Serializer::new());
        manager.register_instance("serializer", Arc::clone(&shared));
        let a = manager.build("Serializer", &Value::Null).unwrap();
        let b = manager.build("serializer", &json!({"serializer": "json_pretty"})).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &shared));
    }
}
