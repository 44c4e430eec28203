// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Generic adapter: routes every public operation of a [`Backend`] through
//! the event bus.
//!
//! ```text
//!   caller
//!     │ get_item("k")
//!     ▼
//!   readable / writable switch ──off──► neutral result
//!     │
//!   key normalisation (empty, pattern, backend rule, max length, dedup)
//!     │
//!   TTL check on writes
//!     │
//!   get_item.pre ──stopped──► event result
//!     │
//!   datatype coercion on writes
//!     │
//!   Backend::get ──Err──► get_item.exception ──cleared──► event result
//!     │                          └──────────────────────► Err(Runtime)
//!   get_item.post
//!     │
//!     ▼
//!   event result
//! ```
//!
//! Options live in an `Arc` snapshot swapped under a lock, so a dispatch
//! keeps a consistent view even if another thread changes them mid-call.
//! Each swap bumps the generation; capabilities are rebuilt lazily for the
//! new generation.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Map;
use tracing::debug;

use crate::capabilities::Capabilities;
use crate::error::{CacheError, CacheResult};
use crate::event::{
    Event, EventManager, ListenerHandle, Operation, OperationResult, Outcome, Params, CAPABILITIES_CHANGED_EVENT,
    OPTION_EVENT,
};
use crate::metrics::{self, LatencyTimer};
use crate::plugin::Plugin;
use crate::value::{Metadata, Value};

use super::backend::{Backend, Context};
use super::traits::{
    same_plugin, AvailableSpace, ClearByNamespace, ClearByPrefix, ClearExpired, Expirable, Flushable, Optimizable,
    PluginCapable, StorageAdapter, TotalSpace,
};
use super::AdapterOptions;

struct Settings<O> {
    options: AdapterOptions,
    backend: O,
    key_pattern: Option<Regex>,
    generation: u64,
}

impl<O> Settings<O> {
    fn context(&self) -> Context<'_, O> {
        Context {
            options: &self.options,
            backend: &self.backend,
            generation: self.generation,
        }
    }
}

struct Registration {
    plugin: Arc<dyn Plugin>,
    priority: i32,
    handles: Vec<ListenerHandle>,
}

pub struct Adapter<B: Backend> {
    backend: B,
    settings: RwLock<Arc<Settings<B::Options>>>,
    generation: AtomicU64,
    /// Native capabilities keyed by the generation they were built for
    capabilities: Mutex<Option<(u64, Arc<Capabilities>)>>,
    events: EventManager,
    plugins: Mutex<Vec<Registration>>,
}

impl<B: Backend> Adapter<B> {
    /// Adapter with default options.
    pub fn new(backend: B) -> Self {
        Self::build(backend, AdapterOptions::default(), B::Options::default(), None)
    }

    pub fn with_options(backend: B, options: AdapterOptions, backend_options: B::Options) -> CacheResult<Self> {
        let key_pattern = options.validate()?;
        backend.validate_options(&options, &backend_options)?;
        Ok(Self::build(backend, options, backend_options, key_pattern))
    }

    /// Build from one flat option map holding adapter and backend fields.
    pub fn from_config(backend: B, config: &Value) -> CacheResult<Self> {
        let map = match config {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => config.clone(),
            other => {
                return Err(CacheError::invalid(format!(
                    "Options of adapter '{}' must be a map, got {}",
                    backend.name(),
                    other
                )))
            }
        };

        let options: AdapterOptions = serde_json::from_value(map.clone())
            .map_err(|e| CacheError::invalid(format!("Invalid adapter options: {}", e)))?;
        let backend_options: B::Options = serde_json::from_value(map)
            .map_err(|e| CacheError::invalid(format!("Invalid options for adapter '{}': {}", backend.name(), e)))?;
        Self::with_options(backend, options, backend_options)
    }

    fn build(backend: B, options: AdapterOptions, backend_options: B::Options, key_pattern: Option<Regex>) -> Self {
        Self {
            backend,
            settings: RwLock::new(Arc::new(Settings {
                options,
                backend: backend_options,
                key_pattern,
                generation: 0,
            })),
            generation: AtomicU64::new(0),
            capabilities: Mutex::new(None),
            events: EventManager::new(),
            plugins: Mutex::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_options(&self) -> B::Options {
        self.settings.read().backend.clone()
    }

    /// Replace the backend options. Emits the `option` event.
    pub fn set_backend_options(&self, backend_options: B::Options) -> CacheResult<()> {
        self.update(move |current| Ok((current.options.clone(), backend_options)))
    }

    /// Number of option changes since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn settings(&self) -> Arc<Settings<B::Options>> {
        Arc::clone(&self.settings.read())
    }

    fn update<F>(&self, change: F) -> CacheResult<()>
    where
        F: FnOnce(&Settings<B::Options>) -> CacheResult<(AdapterOptions, B::Options)>,
    {
        {
            let mut slot = self.settings.write();
            let (options, backend_options) = change(&slot)?;
            let key_pattern = options.validate()?;
            self.backend.validate_options(&options, &backend_options)?;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *slot = Arc::new(Settings {
                options,
                backend: backend_options,
                key_pattern,
                generation,
            });
        }

        debug!(adapter = self.backend.name(), generation = self.generation(), "Adapter options changed");
        let mut event = Event::new(OPTION_EVENT, self, Params::None);
        self.events.emit(&mut event)
    }

    /// Native capabilities for `settings`, rebuilt once per generation.
    ///
    /// Emits `capabilities.changed` when a rebuild differs from the previous
    /// snapshot.
    fn native_capabilities(&self, settings: &Settings<B::Options>) -> CacheResult<Arc<Capabilities>> {
        let (capabilities, changed) = {
            let mut cached = self.capabilities.lock();
            if let Some((generation, capabilities)) = cached.as_ref() {
                if *generation >= settings.generation {
                    return Ok(Arc::clone(capabilities));
                }
            }
            let fresh = Arc::new(self.backend.capabilities(&settings.context()));
            let changed = cached.as_ref().is_some_and(|(_, previous)| **previous != *fresh);
            *cached = Some((settings.generation, Arc::clone(&fresh)));
            (fresh, changed)
        };

        if changed {
            debug!(adapter = self.backend.name(), "Capabilities changed");
            let mut event = Event::new(CAPABILITIES_CHANGED_EVENT, self, Params::None);
            event.set_result(Outcome::Capabilities(Arc::clone(&capabilities)));
            self.events.emit(&mut event)?;
        }
        Ok(capabilities)
    }

    fn check_key(&self, settings: &Settings<B::Options>, capabilities: &Capabilities, key: &str) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::invalid("An empty key isn't allowed"));
        }
        if let Some(pattern) = &settings.key_pattern {
            if !pattern.is_match(key) {
                return Err(CacheError::invalid(format!(
                    "The key '{}' doesn't match against pattern '{}'",
                    key, settings.options.key_pattern
                )));
            }
        }
        self.backend.validate_key(key)?;

        if let Some(max) = capabilities.max_key_length() {
            let length = if capabilities.namespace_is_prefix() {
                settings.options.namespace_prefix().len() + key.len()
            } else {
                key.len()
            };
            if length > max {
                return Err(CacheError::invalid(format!(
                    "The key '{}' is {} characters long including the namespace; the maximum is {}",
                    key, length, max
                )));
            }
        }
        Ok(())
    }

    fn normalize(&self, settings: &Settings<B::Options>, capabilities: &Capabilities, params: &mut Params) -> CacheResult<()> {
        match params {
            Params::None => Ok(()),
            Params::Key { key }
            | Params::Item { key, .. }
            | Params::CheckAndSet { key, .. }
            | Params::Increment { key, .. } => self.check_key(settings, capabilities, key),
            Params::Keys { keys } => {
                for key in keys.iter() {
                    self.check_key(settings, capabilities, key)?;
                }
                let mut seen = HashSet::with_capacity(keys.len());
                keys.retain(|key| seen.insert(key.clone()));
                Ok(())
            }
            Params::Items { items } => items
                .keys()
                .try_for_each(|key| self.check_key(settings, capabilities, key)),
            Params::Increments { amounts } => amounts
                .keys()
                .try_for_each(|key| self.check_key(settings, capabilities, key)),
        }
    }

    fn dispatch<R: OperationResult>(&self, op: Operation, params: Params) -> CacheResult<R> {
        let adapter = self.backend.name();
        let _timer = LatencyTimer::new(adapter, op.as_str());
        let result = self.run(op, params);
        metrics::record_operation(adapter, op.as_str(), if result.is_ok() { "success" } else { "error" });
        result
    }

    fn run<R: OperationResult>(&self, op: Operation, mut params: Params) -> CacheResult<R> {
        let adapter = self.backend.name();
        let settings = self.settings();

        if (op.is_read() && !settings.options.readable) || (op.is_write() && !settings.options.writable) {
            return neutral(op, &params);
        }

        let capabilities = self.native_capabilities(&settings)?;
        self.normalize(&settings, &capabilities, &mut params)?;
        if op.is_write() && !matches!(op, Operation::RemoveItem | Operation::RemoveItems) {
            capabilities.check_ttl(settings.options.ttl_duration())?;
        }

        let mut event = Event::for_operation(op, self, params);
        self.events.emit(&mut event)?;
        if event.propagation_is_stopped() {
            metrics::record_short_circuit(adapter, op.as_str());
            return finish(op, event);
        }

        if op.carries_value() {
            coerce_params(&capabilities, event.params_mut())?;
        }

        let native = self.call_native(op, &settings.context(), &capabilities, event.params());
        match native {
            Ok(outcome) => event.set_result(outcome),
            Err(err) => {
                debug!(adapter, operation = %op, error = %err, "Native call failed");
                event.set_error(err);
                event.rename(op.exception());
                self.events.emit(&mut event)?;
                if let Some(err) = event.take_error() {
                    return Err(as_runtime(err));
                }
                metrics::record_suppressed_error(adapter, op.as_str());
                return finish(op, event);
            }
        }

        event.rename(op.post());
        self.events.emit(&mut event)?;
        finish(op, event)
    }

    fn call_native(
        &self,
        op: Operation,
        ctx: &Context<'_, B::Options>,
        capabilities: &Arc<Capabilities>,
        params: &Params,
    ) -> CacheResult<Outcome> {
        let backend = &self.backend;
        let outcome = match op {
            Operation::GetItem => Outcome::Item(backend.get(ctx, params.expect_key()?)?),
            Operation::GetItems => Outcome::Items(backend.get_many(ctx, params.expect_keys()?)?),
            Operation::HasItem => Outcome::Bool(backend.has(ctx, params.expect_key()?)?),
            Operation::HasItems => Outcome::Keys(backend.has_many(ctx, params.expect_keys()?)?),
            Operation::GetMetadata => Outcome::Metadata(backend.metadata(ctx, params.expect_key()?)?),
            Operation::GetMetadatas => Outcome::Metadatas(backend.metadata_many(ctx, params.expect_keys()?)?),
            Operation::SetItem => {
                let (key, value) = params.expect_item()?;
                Outcome::Bool(backend.set(ctx, key, value)?)
            }
            Operation::SetItems => Outcome::Keys(backend.set_many(ctx, params.expect_items()?)?),
            Operation::AddItem => {
                let (key, value) = params.expect_item()?;
                Outcome::Bool(backend.add(ctx, key, value)?)
            }
            Operation::AddItems => Outcome::Keys(backend.add_many(ctx, params.expect_items()?)?),
            Operation::ReplaceItem => {
                let (key, value) = params.expect_item()?;
                Outcome::Bool(backend.replace(ctx, key, value)?)
            }
            Operation::ReplaceItems => Outcome::Keys(backend.replace_many(ctx, params.expect_items()?)?),
            Operation::CheckAndSetItem => {
                let (token, key, value) = params.expect_check_and_set()?;
                Outcome::Bool(backend.check_and_set(ctx, token, key, value)?)
            }
            Operation::TouchItem => Outcome::Bool(backend.touch(ctx, params.expect_key()?)?),
            Operation::TouchItems => Outcome::Keys(backend.touch_many(ctx, params.expect_keys()?)?),
            Operation::RemoveItem => Outcome::Bool(backend.remove(ctx, params.expect_key()?)?),
            Operation::RemoveItems => Outcome::Keys(backend.remove_many(ctx, params.expect_keys()?)?),
            Operation::IncrementItem => {
                let (key, amount) = params.expect_increment()?;
                Outcome::Counter(backend.increment(ctx, key, amount)?)
            }
            Operation::IncrementItems => Outcome::Counters(backend.increment_many(ctx, params.expect_increments()?)?),
            Operation::DecrementItem => {
                let (key, amount) = params.expect_increment()?;
                Outcome::Counter(backend.decrement(ctx, key, amount)?)
            }
            Operation::DecrementItems => Outcome::Counters(backend.decrement_many(ctx, params.expect_increments()?)?),
            Operation::GetCapabilities => Outcome::Capabilities(Arc::clone(capabilities)),
        };
        Ok(outcome)
    }

    /// Run an optional, event-less operation with metrics.
    fn maintenance<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&B, &Context<'_, B::Options>) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let adapter = self.backend.name();
        let _timer = LatencyTimer::new(adapter, operation);
        let settings = self.settings();
        let result = call(&self.backend, &settings.context());
        metrics::record_operation(adapter, operation, if result.is_ok() { "success" } else { "error" });
        result
    }

    fn checked_key(&self, key: &str) -> CacheResult<()> {
        let settings = self.settings();
        let capabilities = self.native_capabilities(&settings)?;
        self.check_key(&settings, &capabilities, key)
    }
}

fn neutral<R: OperationResult>(op: Operation, params: &Params) -> CacheResult<R> {
    let outcome = Outcome::fallback(op, params)
        .ok_or_else(|| CacheError::logic(format!("Operation '{}' produced no result", op)))?;
    R::from_outcome(outcome)
}

fn finish<R: OperationResult>(op: Operation, mut event: Event<'_>) -> CacheResult<R> {
    match event.take_result() {
        Some(outcome) => R::from_outcome(outcome),
        None => neutral(op, event.params()),
    }
}

fn as_runtime(err: CacheError) -> CacheError {
    if err.is_runtime() {
        err
    } else {
        CacheError::runtime_with(err.to_string(), err)
    }
}

fn coerce_params(capabilities: &Capabilities, params: &mut Params) -> CacheResult<()> {
    // tokens follow the stored representation; an uncastable token simply won't match
    if let Params::CheckAndSet { token, .. } = params {
        let coerced = match capabilities.coerce(token) {
            Ok(Cow::Owned(value)) => Some(value),
            _ => None,
        };
        if let Some(value) = coerced {
            *token = value;
        }
    }

    for value in params.values_mut() {
        let coerced = match capabilities.coerce(value)? {
            Cow::Borrowed(_) => None,
            Cow::Owned(converted) => Some(converted),
        };
        if let Some(converted) = coerced {
            *value = converted;
        }
    }
    Ok(())
}

fn key_list(keys: &[&str]) -> Params {
    Params::Keys {
        keys: keys.iter().map(|k| (*k).to_string()).collect(),
    }
}

impl<B: Backend> StorageAdapter for Adapter<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn options(&self) -> AdapterOptions {
        self.settings().options.clone()
    }

    fn set_options(&self, options: AdapterOptions) -> CacheResult<()> {
        self.update(move |current| Ok((options, current.backend.clone())))
    }

    fn options_value(&self) -> Value {
        let settings = self.settings();
        let mut merged = Map::new();
        for part in [serde_json::to_value(&settings.options), serde_json::to_value(&settings.backend)] {
            if let Ok(Value::Object(fields)) = part {
                merged.extend(fields);
            }
        }
        Value::Object(merged)
    }

    fn get_capabilities(&self) -> CacheResult<Arc<Capabilities>> {
        self.dispatch(Operation::GetCapabilities, Params::None)
    }

    fn get_item(&self, key: &str) -> CacheResult<Option<Value>> {
        self.dispatch(Operation::GetItem, Params::Key { key: key.to_string() })
    }

    fn get_items(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Value>> {
        self.dispatch(Operation::GetItems, key_list(keys))
    }

    fn has_item(&self, key: &str) -> CacheResult<bool> {
        self.dispatch(Operation::HasItem, Params::Key { key: key.to_string() })
    }

    fn has_items(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
        self.dispatch(Operation::HasItems, key_list(keys))
    }

    fn get_metadata(&self, key: &str) -> CacheResult<Option<Metadata>> {
        self.dispatch(Operation::GetMetadata, Params::Key { key: key.to_string() })
    }

    fn get_metadatas(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Metadata>> {
        self.dispatch(Operation::GetMetadatas, key_list(keys))
    }

    fn set_item(&self, key: &str, value: Value) -> CacheResult<bool> {
        self.dispatch(Operation::SetItem, Params::Item { key: key.to_string(), value })
    }

    fn set_items(&self, items: BTreeMap<String, Value>) -> CacheResult<Vec<String>> {
        self.dispatch(Operation::SetItems, Params::Items { items })
    }

    fn add_item(&self, key: &str, value: Value) -> CacheResult<bool> {
        self.dispatch(Operation::AddItem, Params::Item { key: key.to_string(), value })
    }

    fn add_items(&self, items: BTreeMap<String, Value>) -> CacheResult<Vec<String>> {
        self.dispatch(Operation::AddItems, Params::Items { items })
    }

    fn replace_item(&self, key: &str, value: Value) -> CacheResult<bool> {
        self.dispatch(Operation::ReplaceItem, Params::Item { key: key.to_string(), value })
    }

    fn replace_items(&self, items: BTreeMap<String, Value>) -> CacheResult<Vec<String>> {
        self.dispatch(Operation::ReplaceItems, Params::Items { items })
    }

    fn check_and_set_item(&self, token: &Value, key: &str, value: Value) -> CacheResult<bool> {
        self.dispatch(
            Operation::CheckAndSetItem,
            Params::CheckAndSet {
                token: token.clone(),
                key: key.to_string(),
                value,
            },
        )
    }

    fn touch_item(&self, key: &str) -> CacheResult<bool> {
        self.dispatch(Operation::TouchItem, Params::Key { key: key.to_string() })
    }

    fn touch_items(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
        self.dispatch(Operation::TouchItems, key_list(keys))
    }

    fn remove_item(&self, key: &str) -> CacheResult<bool> {
        self.dispatch(Operation::RemoveItem, Params::Key { key: key.to_string() })
    }

    fn remove_items(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
        self.dispatch(Operation::RemoveItems, key_list(keys))
    }

    fn increment_item(&self, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        self.dispatch(Operation::IncrementItem, Params::Increment { key: key.to_string(), amount })
    }

    fn increment_items(&self, amounts: BTreeMap<String, i64>) -> CacheResult<BTreeMap<String, i64>> {
        self.dispatch(Operation::IncrementItems, Params::Increments { amounts })
    }

    fn decrement_item(&self, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        self.dispatch(Operation::DecrementItem, Params::Increment { key: key.to_string(), amount })
    }

    fn decrement_items(&self, amounts: BTreeMap<String, i64>) -> CacheResult<BTreeMap<String, i64>> {
        self.dispatch(Operation::DecrementItems, Params::Increments { amounts })
    }

    fn as_plugin_capable(&self) -> Option<&dyn PluginCapable> {
        Some(self)
    }

    fn as_flushable(&self) -> Option<&dyn Flushable> {
        self.backend.features().flush.then_some(self as &dyn Flushable)
    }

    fn as_clear_expired(&self) -> Option<&dyn ClearExpired> {
        self.backend.features().clear_expired.then_some(self as &dyn ClearExpired)
    }

    fn as_clear_by_namespace(&self) -> Option<&dyn ClearByNamespace> {
        self.backend.features().clear_by_namespace.then_some(self as &dyn ClearByNamespace)
    }

    fn as_clear_by_prefix(&self) -> Option<&dyn ClearByPrefix> {
        self.backend.features().clear_by_prefix.then_some(self as &dyn ClearByPrefix)
    }

    fn as_optimizable(&self) -> Option<&dyn Optimizable> {
        self.backend.features().optimize.then_some(self as &dyn Optimizable)
    }

    fn as_total_space(&self) -> Option<&dyn TotalSpace> {
        self.backend.features().total_space.then_some(self as &dyn TotalSpace)
    }

    fn as_available_space(&self) -> Option<&dyn AvailableSpace> {
        self.backend.features().available_space.then_some(self as &dyn AvailableSpace)
    }

    fn as_expirable(&self) -> Option<&dyn Expirable> {
        self.backend.features().expirable.then_some(self as &dyn Expirable)
    }
}

impl<B: Backend> PluginCapable for Adapter<B> {
    fn events(&self) -> &EventManager {
        &self.events
    }

    fn add_plugin(&self, plugin: Arc<dyn Plugin>, priority: i32) -> CacheResult<()> {
        let mut plugins = self.plugins.lock();
        if plugins.iter().any(|r| same_plugin(&r.plugin, &plugin)) {
            return Err(CacheError::logic(format!(
                "Plugin '{}' is already registered with adapter '{}'",
                plugin.name(),
                self.backend.name()
            )));
        }

        let handles = Arc::clone(&plugin).attach(&self.events, priority);
        debug!(
            adapter = self.backend.name(),
            plugin = plugin.name(),
            priority,
            listeners = handles.len(),
            "Plugin attached"
        );
        plugins.push(Registration { plugin, priority, handles });
        Ok(())
    }

    fn remove_plugin(&self, plugin: &Arc<dyn Plugin>) -> CacheResult<()> {
        let registration = {
            let mut plugins = self.plugins.lock();
            let index = plugins
                .iter()
                .position(|r| same_plugin(&r.plugin, plugin))
                .ok_or_else(|| CacheError::logic(format!("Plugin '{}' is not registered", plugin.name())))?;
            plugins.remove(index)
        };

        for handle in &registration.handles {
            self.events.detach(*handle);
        }
        debug!(
            adapter = self.backend.name(),
            plugin = registration.plugin.name(),
            priority = registration.priority,
            "Plugin detached"
        );
        Ok(())
    }

    fn has_plugin(&self, plugin: &Arc<dyn Plugin>) -> bool {
        self.plugins.lock().iter().any(|r| same_plugin(&r.plugin, plugin))
    }

    fn plugin_registry(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins.lock().iter().map(|r| Arc::clone(&r.plugin)).collect()
    }
}

impl<B: Backend> Flushable for Adapter<B> {
    fn flush(&self) -> CacheResult<bool> {
        self.maintenance("flush", |backend, ctx| backend.flush(ctx))
    }
}

impl<B: Backend> ClearExpired for Adapter<B> {
    fn clear_expired(&self) -> CacheResult<bool> {
        self.maintenance("clear_expired", |backend, ctx| backend.clear_expired(ctx))
    }
}

impl<B: Backend> ClearByNamespace for Adapter<B> {
    fn clear_by_namespace(&self, namespace: &str) -> CacheResult<bool> {
        if namespace.is_empty() {
            return Err(CacheError::invalid("No namespace given"));
        }
        self.maintenance("clear_by_namespace", |backend, ctx| backend.clear_by_namespace(ctx, namespace))
    }
}

impl<B: Backend> ClearByPrefix for Adapter<B> {
    fn clear_by_prefix(&self, prefix: &str) -> CacheResult<bool> {
        if prefix.is_empty() {
            return Err(CacheError::invalid("No prefix given"));
        }
        self.maintenance("clear_by_prefix", |backend, ctx| backend.clear_by_prefix(ctx, prefix))
    }
}

impl<B: Backend> Optimizable for Adapter<B> {
    fn optimize(&self) -> CacheResult<bool> {
        self.maintenance("optimize", |backend, ctx| backend.optimize(ctx))
    }
}

impl<B: Backend> TotalSpace for Adapter<B> {
    fn total_space(&self) -> CacheResult<u64> {
        self.maintenance("total_space", |backend, ctx| backend.total_space(ctx))
    }
}

impl<B: Backend> AvailableSpace for Adapter<B> {
    fn available_space(&self) -> CacheResult<u64> {
        self.maintenance("available_space", |backend, ctx| backend.available_space(ctx))
    }
}

impl<B: Backend> Expirable for Adapter<B> {
    fn set_timeout(&self, key: &str, timeout: Duration) -> CacheResult<bool> {
        self.checked_key(key)?;
        self.maintenance("set_timeout", |backend, ctx| backend.set_timeout(ctx, key, timeout))
    }

    fn remaining_timeout(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.checked_key(key)?;
        self.maintenance("remaining_timeout", |backend, ctx| backend.remaining_timeout(ctx, key))
    }
}

impl<B: Backend> std::fmt::Debug for Adapter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings = self.settings();
        f.debug_struct("Adapter")
            .field("name", &self.backend.name())
            .field("options", &settings.options)
            .field("backend_options", &settings.backend)
            .field("generation", &settings.generation)
            .field("plugins", &self.plugins.lock().len())
            .finish_non_exhaustive()
    }
}
