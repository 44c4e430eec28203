// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Composition root: adapter + options + plugins from one configuration.
//!
//! ```text
//! {
//!   "adapter": "memory" | { "name": "memory", "options": { .. } },
//!   "options": { .. },                       // wins over adapter.options
//!   "plugins": [ "serializer",
//!                { "name": "clear_expired_by_factor", "options": { .. }, "priority": 5 } ]
//!           |  { "serializer": { .. } }     // name → options
//! }
//! ```
//!
//! Construction happens in two phases: the adapter is built, then plugins
//! are resolved and attached in order. A failing plugin leaves the ones
//! before it attached; callers that want a usable adapter regardless run
//! the phases separately ([`StorageFactory::create_adapter`] then
//! [`StorageFactory::attach_plugins`]).

use std::sync::Arc;

use serde_json::Map;
use tracing::info;

use crate::error::{CacheError, CacheResult};
use crate::manager::{AdapterManager, PluginManager};
use crate::plugin::{Plugin, DEFAULT_PRIORITY};
use crate::storage::StorageAdapter;
use crate::value::Value;

/// One configured plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSpec {
    pub name: String,
    pub options: Value,
    pub priority: i32,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
            priority: DEFAULT_PRIORITY,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Parsed storage configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub adapter: String,
    /// Adapter options with the top-level `options` merged over them.
    pub options: Value,
    pub plugins: Vec<PluginSpec>,
}

fn options_map(what: &str, value: Option<&Value>) -> CacheResult<Map<String, Value>> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(CacheError::invalid(format!("{} must be a map, got {}", what, other))),
    }
}

impl StorageConfig {
    pub fn parse(config: &Value) -> CacheResult<Self> {
        let Value::Object(config) = config else {
            return Err(CacheError::invalid("The storage configuration must be a map"));
        };

        let (adapter, mut options) = match config.get("adapter") {
            None => return Err(CacheError::invalid("Missing 'adapter'")),
            Some(Value::String(name)) => (name.clone(), Map::new()),
            Some(Value::Object(adapter)) => {
                let name = match adapter.get("name") {
                    Some(Value::String(name)) => name.clone(),
                    _ => return Err(CacheError::invalid("Name of adapter is missing")),
                };
                (name, options_map("'adapter.options'", adapter.get("options"))?)
            }
            Some(other) => {
                return Err(CacheError::invalid(format!(
                    "'adapter' must be a name or a map, got {}",
                    other
                )))
            }
        };
        options.extend(options_map("'options'", config.get("options"))?);

        let plugins = match config.get("plugins") {
            None | Some(Value::Null) => Vec::new(),
            Some(plugins) => parse_plugins(plugins)?,
        };

        Ok(Self {
            adapter,
            options: Value::Object(options),
            plugins,
        })
    }
}

/// Plugins as a list of names / `{name, options, priority}` entries, or as a
/// `name → options` map.
pub fn parse_plugins(plugins: &Value) -> CacheResult<Vec<PluginSpec>> {
    match plugins {
        Value::Null => Ok(Vec::new()),
        Value::Array(entries) => entries
            .iter()
            .enumerate()
            .map(|(index, entry)| parse_plugin_entry(index, entry))
            .collect(),
        Value::Object(entries) => entries
            .iter()
            .map(|(name, options)| {
                let options = options_map(&format!("'plugins.{}'", name), Some(options))?;
                Ok(PluginSpec::new(name.clone()).with_options(Value::Object(options)))
            })
            .collect(),
        other => Err(CacheError::invalid(format!(
            "'plugins' must be a list or a map, got {}",
            other
        ))),
    }
}

fn parse_plugin_entry(index: usize, entry: &Value) -> CacheResult<PluginSpec> {
    match entry {
        Value::String(name) => Ok(PluginSpec::new(name.clone())),
        Value::Object(fields) => {
            let name = match fields.get("name") {
                Some(Value::String(name)) if !name.is_empty() => name.clone(),
                _ => {
                    return Err(CacheError::invalid(format!(
                        "Invalid plugins[{}] or missing plugins[{}].name",
                        index, index
                    )))
                }
            };
            let options = options_map(&format!("'plugins[{}].options'", index), fields.get("options"))?;
            let priority = match fields.get("priority") {
                None | Some(Value::Null) => DEFAULT_PRIORITY,
                Some(value) => value
                    .as_i64()
                    .and_then(|p| i32::try_from(p).ok())
                    .ok_or_else(|| CacheError::invalid(format!("'plugins[{}].priority' must be an integer", index)))?,
            };
            Ok(PluginSpec {
                name,
                options: Value::Object(options),
                priority,
            })
        }
        other => Err(CacheError::invalid(format!(
            "Invalid plugins[{}]: expected a name or a map, got {}",
            index, other
        ))),
    }
}

#[derive(Debug, Default)]
pub struct StorageFactory {
    adapters: AdapterManager,
    plugins: PluginManager,
}

impl StorageFactory {
    /// Factory over the bundled adapters and plugins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_managers(adapters: AdapterManager, plugins: PluginManager) -> Self {
        Self { adapters, plugins }
    }

    pub fn adapters(&self) -> &AdapterManager {
        &self.adapters
    }

    pub fn adapters_mut(&mut self) -> &mut AdapterManager {
        &mut self.adapters
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginManager {
        &mut self.plugins
    }

    /// Build `adapter` with `options` and attach `plugins` (see [`parse_plugins`]).
    pub fn create(&self, adapter: &str, options: &Value, plugins: &Value) -> CacheResult<Arc<dyn StorageAdapter>> {
        let specs = parse_plugins(plugins)?;
        let storage = self.create_adapter(adapter, options)?;
        self.attach_specs(storage.as_ref(), &specs)?;
        info!(adapter = storage.name(), plugins = specs.len(), "Storage composed");
        Ok(storage)
    }

    pub fn create_from_config(&self, config: &Value) -> CacheResult<Arc<dyn StorageAdapter>> {
        let config = StorageConfig::parse(config)?;
        let storage = self.create_adapter(&config.adapter, &config.options)?;
        self.attach_specs(storage.as_ref(), &config.plugins)?;
        info!(adapter = storage.name(), plugins = config.plugins.len(), "Storage composed from config");
        Ok(storage)
    }

    pub fn create_adapter(&self, name: &str, options: &Value) -> CacheResult<Arc<dyn StorageAdapter>> {
        self.adapters.build(name, options)
    }

    pub fn create_plugin(&self, name: &str, options: &Value) -> CacheResult<Arc<dyn Plugin>> {
        self.plugins.build(name, options)
    }

    /// Attach plugins to an existing adapter. Entries before a failing one
    /// stay attached.
    pub fn attach_plugins(&self, adapter: &dyn StorageAdapter, plugins: &Value) -> CacheResult<()> {
        self.attach_specs(adapter, &parse_plugins(plugins)?)
    }

    fn attach_specs(&self, adapter: &dyn StorageAdapter, specs: &[PluginSpec]) -> CacheResult<()> {
        if specs.is_empty() {
            return Ok(());
        }
        let host = adapter.as_plugin_capable().ok_or_else(|| {
            CacheError::runtime(format!(
                "The adapter '{}' can't host plugins",
                adapter.name()
            ))
        })?;

        for spec in specs {
            let plugin = self.plugins.build(&spec.name, &spec.options)?;
            if host.has_plugin(&plugin) {
                continue;
            }
            host.add_plugin(plugin, spec.priority)?;
        }
        Ok(())
    }
}
