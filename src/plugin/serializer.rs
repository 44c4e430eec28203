// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store values as serialized text.
//!
//! Lets a string-only backend (filesystem, Redis) hold maps and arrays:
//!
//! ```text
//! set_item("cfg", {"a": 1})   ─pre─►  backend sees "{\"a\":1}"
//! get_item("cfg")             ◄post─  {"a": 1}
//! increment_item("hits", 2)   ─pre─►  get_item + check_and_set_item (or add_item)
//! get_capabilities()          ◄post─  every datatype native
//! ```
//!
//! Write listeners run at `+priority`, read listeners at `-priority`, so the
//! serializer sits closest to the backend on both sides.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::event::{Event, EventManager, Listener, ListenerHandle, Operation, Outcome, Params};
use crate::storage::StorageAdapter;
use crate::value::{self, Value};

use super::{attach_each, parse_options, Plugin};

/// Text codec used by [`Serializer`].
pub trait SerializerAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn serialize(&self, value: &Value) -> CacheResult<String>;

    fn deserialize(&self, text: &str) -> CacheResult<Value>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    #[must_use]
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SerializerAdapter for JsonSerializer {
    fn name(&self) -> &'static str {
        if self.pretty {
            "json_pretty"
        } else {
            "json"
        }
    }

    fn serialize(&self, value: &Value) -> CacheResult<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|e| CacheError::runtime_with("Can't serialize value", e))
    }

    fn deserialize(&self, text: &str) -> CacheResult<Value> {
        serde_json::from_str(text).map_err(|e| CacheError::runtime_with("Can't deserialize stored value", e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializerOptions {
    /// `json` or `json_pretty`
    #[serde(default = "default_serializer")]
    pub serializer: String,
}

fn default_serializer() -> String {
    "json".to_string()
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            serializer: default_serializer(),
        }
    }
}

fn serializer_by_name(name: &str) -> CacheResult<Arc<dyn SerializerAdapter>> {
    match name.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
        "json" => Ok(Arc::new(JsonSerializer::default())),
        "jsonpretty" => Ok(Arc::new(JsonSerializer::pretty())),
        _ => Err(CacheError::invalid(format!("Unknown serializer '{}'", name))),
    }
}

pub struct Serializer {
    codec: Arc<dyn SerializerAdapter>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self {
            codec: Arc::new(JsonSerializer::default()),
        }
    }
}

const WRITES: [Operation; 7] = [
    Operation::SetItem,
    Operation::SetItems,
    Operation::AddItem,
    Operation::AddItems,
    Operation::ReplaceItem,
    Operation::ReplaceItems,
    Operation::CheckAndSetItem,
];

/// Read-modify-write rounds before an increment gives up under contention.
const INCREMENT_ATTEMPTS: usize = 3;

const INCREMENTS: [Operation; 4] = [
    Operation::IncrementItem,
    Operation::IncrementItems,
    Operation::DecrementItem,
    Operation::DecrementItems,
];

impl Serializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(codec: Arc<dyn SerializerAdapter>) -> Self {
        Self { codec }
    }

    pub fn from_options(options: &Value) -> CacheResult<Self> {
        let options: SerializerOptions = parse_options("serializer", options)?;
        Ok(Self::with_codec(serializer_by_name(&options.serializer)?))
    }

    fn decode(&self, stored: Value) -> CacheResult<Value> {
        match stored {
            Value::String(text) => self.codec.deserialize(&text),
            other => Err(CacheError::runtime(format!(
                "Expected a serialized string, found {}",
                value::Datatype::of(&other)
            ))),
        }
    }

    fn on_write_pre(&self, event: &mut Event<'_>) -> CacheResult<()> {
        let params = event.params_mut();
        if let Params::CheckAndSet { token, .. } = params {
            *token = Value::String(self.codec.serialize(token)?);
        }
        for value in params.values_mut() {
            *value = Value::String(self.codec.serialize(value)?);
        }
        Ok(())
    }

    fn on_read_post(&self, event: &mut Event<'_>) -> CacheResult<()> {
        let decoded = match event.take_result() {
            Some(Outcome::Item(Some(stored))) => Outcome::Item(Some(self.decode(stored)?)),
            Some(Outcome::Items(found)) => Outcome::Items(
                found
                    .into_iter()
                    .map(|(key, stored)| Ok((key, self.decode(stored)?)))
                    .collect::<CacheResult<BTreeMap<_, _>>>()?,
            ),
            Some(other) => other,
            None => return Ok(()),
        };
        event.set_result(decoded);
        Ok(())
    }

    fn on_capabilities_post(&self, event: &mut Event<'_>) -> CacheResult<()> {
        if let Some(Outcome::Capabilities(native)) = event.result() {
            let derived = native.to_builder().all_datatypes().build();
            event.set_result(Outcome::Capabilities(Arc::new(derived)));
        }
        Ok(())
    }

    /// Read, add and write back through the target so the counter goes
    /// through the codec like any other value.
    fn on_increment_pre(&self, event: &mut Event<'_>) -> CacheResult<()> {
        let Some(op) = event.operation() else {
            return Ok(());
        };
        let negate = matches!(op, Operation::DecrementItem | Operation::DecrementItems);
        let target = event.target();

        let outcome = match event.params() {
            Params::Increment { key, amount } => Outcome::Counter(increment_through(target, key, *amount, negate)?),
            Params::Increments { amounts } => {
                let mut counters = BTreeMap::new();
                for (key, amount) in amounts {
                    if let Some(counter) = increment_through(target, key, *amount, negate)? {
                        counters.insert(key.clone(), counter);
                    }
                }
                Outcome::Counters(counters)
            }
            _ => return Ok(()),
        };
        event.set_result(outcome);
        event.stop_propagation();
        Ok(())
    }
}

/// Read-modify-write through `target`. A lost race (the value changed or the key
/// was created in between) is retried; after `INCREMENT_ATTEMPTS` losses the
/// increment reports "not stored" (`None`).
fn increment_through(target: &dyn StorageAdapter, key: &str, amount: i64, negate: bool) -> CacheResult<Option<i64>> {
    let amount = if negate {
        amount
            .checked_neg()
            .ok_or_else(|| CacheError::invalid(format!("Can't decrement by {}", amount)))?
    } else {
        amount
    };

    for _ in 0..INCREMENT_ATTEMPTS {
        let stored = match target.get_item(key)? {
            Some(current) => {
                let base = value::as_integer(&current).ok_or_else(|| {
                    CacheError::runtime(format!("The value stored under '{}' is not an integer", key))
                })?;
                let next = base
                    .checked_add(amount)
                    .ok_or_else(|| CacheError::runtime(format!("Counter '{}' would overflow", key)))?;
                target.check_and_set_item(&current, key, json!(next))?.then_some(next)
            }
            None => target.add_item(key, json!(amount))?.then_some(amount),
        };
        if stored.is_some() {
            return Ok(stored);
        }
    }
    debug!(key, attempts = INCREMENT_ATTEMPTS, "Increment lost every race");
    Ok(None)
}

impl Plugin for Serializer {
    fn name(&self) -> &'static str {
        "serializer"
    }

    fn options(&self) -> Value {
        json!({ "serializer": self.codec.name() })
    }

    fn attach(self: Arc<Self>, events: &EventManager, priority: i32) -> Vec<ListenerHandle> {
        let plugin = Arc::clone(&self);
        let write: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_write_pre(event));
        let plugin = Arc::clone(&self);
        let read: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_read_post(event));
        let plugin = Arc::clone(&self);
        let increment: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_increment_pre(event));
        let plugin = Arc::clone(&self);
        let capabilities: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_capabilities_post(event));

        let mut handles = attach_each(events, &WRITES, Operation::pre, priority, &write);
        handles.extend(attach_each(events, &INCREMENTS, Operation::pre, priority, &increment));
        handles.extend(attach_each(
            events,
            &[Operation::GetItem, Operation::GetItems],
            Operation::post,
            -priority,
            &read,
        ));
        handles.extend(attach_each(
            events,
            &[Operation::GetCapabilities],
            Operation::post,
            -priority,
            &capabilities,
        ));
        debug!(codec = self.codec.name(), listeners = handles.len(), "Serializer listeners attached");
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::DatatypeSupport;
    use crate::storage::{Adapter, FilesystemBackend, FilesystemOptions, MemoryBackend, PluginCapable};
    use crate::value::Datatype;

    fn serialized_memory() -> Adapter<MemoryBackend> {
        let cache = Adapter::new(MemoryBackend::new());
        cache.add_plugin(Arc::new(Serializer::new()), 1).unwrap();
        cache
    }

    #[test]
    fn test_values_stored_as_text() {
        let cache = serialized_memory();
        assert!(cache.set_item("cfg", json!({"a": [1, 2]})).unwrap());
        assert_eq!(cache.get_item("cfg").unwrap(), Some(json!({"a": [1, 2]})));

        let found = cache.get_items(&["cfg", "missing"]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["cfg"], json!({"a": [1, 2]}));
    }

    #[test]
    fn test_map_round_trip_on_string_only_backend() {
        let dir = tempfile::tempdir().unwrap();
        let options = FilesystemOptions {
            cache_dir: dir.path().to_path_buf(),
            ..FilesystemOptions::default()
        };
        let cache = Adapter::with_options(FilesystemBackend::new(), Default::default(), options).unwrap();
        assert!(cache.set_item("m", json!({"x": 1})).is_err());

        cache.add_plugin(Arc::new(Serializer::new()), 1).unwrap();
        assert!(cache.set_item("m", json!({"x": 1})).unwrap());
        assert_eq!(cache.get_item("m").unwrap(), Some(json!({"x": 1})));
    }

    #[test]
    fn test_increment_through_codec() {
        let cache = serialized_memory();
        assert_eq!(cache.increment_item("hits", 2).unwrap(), Some(2));
        assert_eq!(cache.increment_item("hits", 3).unwrap(), Some(5));
        assert_eq!(cache.decrement_item("hits", 1).unwrap(), Some(4));
        assert_eq!(cache.get_item("hits").unwrap(), Some(json!(4)));

        let counters = cache
            .increment_items(BTreeMap::from([("hits".to_string(), 1), ("new".to_string(), 7)]))
            .unwrap();
        assert_eq!(counters, BTreeMap::from([("hits".to_string(), 5), ("new".to_string(), 7)]));
    }

    /// Every CAS round sees a concurrent writer bump the counter first (up to `races` times).
    fn racing_writer(cache: &Adapter<MemoryBackend>, races: usize) -> Arc<std::sync::atomic::AtomicUsize> {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let seen = Arc::new(AtomicUsize::new(0));
        let rounds = Arc::clone(&seen);
        cache.events().attach(Operation::CheckAndSetItem.pre(), 100, move |event: &mut Event<'_>| {
            let round = rounds.fetch_add(1, Ordering::SeqCst);
            if round < races {
                event.target().set_item("hits", json!(100 + round as i64))?;
            }
            Ok(())
        });
        seen
    }

    #[test]
    fn test_increment_retries_after_lost_race() {
        let cache = serialized_memory();
        cache.set_item("hits", json!(1)).unwrap();
        let rounds = racing_writer(&cache, 1);

        assert_eq!(cache.increment_item("hits", 3).unwrap(), Some(103));
        assert_eq!(cache.get_item("hits").unwrap(), Some(json!(103)));
        assert_eq!(rounds.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_increment_gives_up_after_bounded_attempts() {
        let cache = serialized_memory();
        cache.set_item("hits", json!(1)).unwrap();
        let rounds = racing_writer(&cache, usize::MAX);

        assert_eq!(cache.increment_item("hits", 3).unwrap(), None);
        assert_eq!(rounds.load(std::sync::atomic::Ordering::SeqCst), INCREMENT_ATTEMPTS);
        assert_eq!(cache.get_item("hits").unwrap(), Some(json!(100 + INCREMENT_ATTEMPTS as i64 - 1)));
    }

    #[test]
    fn test_check_and_set_with_plain_token() {
        let cache = serialized_memory();
        cache.set_item("k", json!([1])).unwrap();
        let token = cache.get_item("k").unwrap().unwrap();
        assert!(cache.check_and_set_item(&token, "k", json!([2])).unwrap());
        assert!(!cache.check_and_set_item(&token, "k", json!([3])).unwrap());
        assert_eq!(cache.get_item("k").unwrap(), Some(json!([2])));
    }

    #[test]
    fn test_capabilities_widened() {
        let dir = tempfile::tempdir().unwrap();
        let options = FilesystemOptions {
            cache_dir: dir.path().to_path_buf(),
            ..FilesystemOptions::default()
        };
        let cache = Adapter::with_options(FilesystemBackend::new(), Default::default(), options).unwrap();
        let native = cache.get_capabilities().unwrap();
        assert_eq!(native.support_for(Datatype::Object), DatatypeSupport::Unsupported);

        cache.add_plugin(Arc::new(Serializer::new()), 1).unwrap();
        let derived = cache.get_capabilities().unwrap();
        assert_eq!(derived.support_for(Datatype::Object), DatatypeSupport::Native);
        assert_eq!(derived.max_key_length(), native.max_key_length());
    }

    #[test]
    fn test_corrupt_payload_is_runtime() {
        let cache = Adapter::new(MemoryBackend::new());
        cache.set_item("k", json!("{not json")).unwrap();
        cache.add_plugin(Arc::new(Serializer::new()), 1).unwrap();
        assert!(cache.get_item("k").unwrap_err().is_runtime());
    }

    #[test]
    fn test_serializer_options() {
        let plugin = Serializer::from_options(&json!({"serializer": "json_pretty"})).unwrap();
        assert_eq!(plugin.options(), json!({"serializer": "json_pretty"}));
        let err = Serializer::from_options(&json!({"serializer": "php"})).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_removal_detaches_listeners() {
        let cache = Adapter::new(MemoryBackend::new());
        let plugin: Arc<dyn Plugin> = Arc::new(Serializer::new());
        cache.add_plugin(Arc::clone(&plugin), 1).unwrap();
        assert!(cache.events().total_listeners() > 0);
        cache.remove_plugin(&plugin).unwrap();
        assert_eq!(cache.events().total_listeners(), 0);
        assert!(!cache.has_plugin(&plugin));
    }
}
