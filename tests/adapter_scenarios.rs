//! End-to-end scenarios across adapters, plugins and the factory.
//!
//! Everything here runs in-process (memory, filesystem and a scripted
//! backend defined below); Redis lives in `integration.rs`.
//!
//! Run with: `cargo test --test adapter_scenarios`

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use pluggable_cache::plugin::{ExceptionHandler, ExceptionHandlerOptions, Serializer};
use pluggable_cache::storage::{Adapter, Backend, Context, MemoryBackend};
use pluggable_cache::{
    AdapterOptions, CacheError, CacheResult, Capabilities, Datatype, DatatypeSupport, ErrorKind, Event, Outcome,
    Params, Plugin, PluginCapable, StorageAdapter, StorageFactory, Value,
};

// =============================================================================
// A string-only backend with a static TTL floor, counting native calls
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StrictOptions {
    #[serde(default)]
    fail: bool,
}

#[derive(Default)]
struct StrictBackend {
    items: Mutex<HashMap<String, Value>>,
    native_calls: AtomicUsize,
}

impl StrictBackend {
    fn enter(&self, ctx: &Context<'_, StrictOptions>) -> CacheResult<()> {
        self.native_calls.fetch_add(1, Ordering::SeqCst);
        if ctx.backend.fail {
            return Err(CacheError::runtime("strict backend is down"));
        }
        Ok(())
    }
}

impl Backend for StrictBackend {
    type Options = StrictOptions;

    fn name(&self) -> &'static str {
        "strict"
    }

    fn capabilities(&self, _ctx: &Context<'_, StrictOptions>) -> Capabilities {
        Capabilities::builder()
            .datatype(Datatype::String, DatatypeSupport::Native)
            .datatype(Datatype::Integer, DatatypeSupport::CastTo(Datatype::String))
            .min_ttl(Duration::from_secs(2))
            .static_ttl(true)
            .build()
    }

    fn get(&self, ctx: &Context<'_, StrictOptions>, key: &str) -> CacheResult<Option<Value>> {
        self.enter(ctx)?;
        Ok(self.items.lock().get(&ctx.prefixed(key)).cloned())
    }

    fn set(&self, ctx: &Context<'_, StrictOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        self.enter(ctx)?;
        self.items.lock().insert(ctx.prefixed(key), value.clone());
        Ok(true)
    }

    fn remove(&self, ctx: &Context<'_, StrictOptions>, key: &str) -> CacheResult<bool> {
        self.enter(ctx)?;
        Ok(self.items.lock().remove(&ctx.prefixed(key)).is_some())
    }
}

fn strict(ttl: f64, fail: bool) -> Adapter<StrictBackend> {
    Adapter::with_options(
        StrictBackend::default(),
        AdapterOptions::default().with_ttl(ttl),
        StrictOptions { fail },
    )
    .unwrap()
}

// =============================================================================
// Basic contract
// =============================================================================

#[test]
fn set_then_get_returns_value() {
    let cache = Adapter::new(MemoryBackend::new());
    assert!(cache.set_item("answer", json!(42)).unwrap());
    assert_eq!(cache.get_item("answer").unwrap(), Some(json!(42)));
    assert_eq!(cache.get_item("question").unwrap(), None);
}

#[test]
fn cast_datatypes_come_back_as_strings() {
    let cache = strict(0.0, false);
    assert!(cache.set_item("n", json!(123)).unwrap());
    assert_eq!(cache.get_item("n").unwrap(), Some(json!("123")));

    let err = cache.set_item("f", json!(1.5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn static_ttl_below_minimum_is_rejected() {
    let err = strict(1.0, false).set_item("k", json!("v")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(strict(3.0, false).set_item("k", json!("v")).unwrap());
}

#[test]
fn batch_results_follow_the_convention() {
    let cache = Adapter::new(MemoryBackend::new());
    let failed = cache
        .set_items(BTreeMap::from([("a".to_string(), json!(1)), ("b".to_string(), json!(2))]))
        .unwrap();
    assert!(failed.is_empty());

    let found = cache.get_items(&["a", "missing", "b"]).unwrap();
    assert_eq!(found, BTreeMap::from([("a".to_string(), json!(1)), ("b".to_string(), json!(2))]));
    assert_eq!(cache.has_items(&["a", "missing"]).unwrap(), vec!["a".to_string()]);
    assert_eq!(cache.remove_items(&["a", "missing"]).unwrap(), vec!["missing".to_string()]);
}

// =============================================================================
// Event pipeline
// =============================================================================

#[test]
fn higher_priority_mutation_is_visible_to_lower_priority() {
    let cache = Adapter::new(MemoryBackend::new());
    let seen = Arc::new(Mutex::new(None));

    cache.events().attach("set_item.pre", 100, |event: &mut Event<'_>| {
        if let Params::Item { value, .. } = event.params_mut() {
            *value = json!("rewritten");
        }
        Ok(())
    });
    let sink = Arc::clone(&seen);
    cache.events().attach("set_item.pre", 50, move |event: &mut Event<'_>| {
        if let Params::Item { value, .. } = event.params() {
            *sink.lock() = Some(value.clone());
        }
        Ok(())
    });

    cache.set_item("k", json!("original")).unwrap();
    assert_eq!(*seen.lock(), Some(json!("rewritten")));
    assert_eq!(cache.get_item("k").unwrap(), Some(json!("rewritten")));
}

#[test]
fn stopped_pre_event_skips_backend_and_post() {
    let cache = strict(0.0, false);
    let posts = Arc::new(AtomicUsize::new(0));

    cache.events().attach("get_item.pre", 1, |event: &mut Event<'_>| {
        event.set_result(Outcome::Item(Some(json!("from listener"))));
        event.stop_propagation();
        Ok(())
    });
    let counter = Arc::clone(&posts);
    cache.events().attach("get_item.post", 1, move |_event: &mut Event<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert_eq!(cache.get_item("k").unwrap(), Some(json!("from listener")));
    assert_eq!(cache.backend().native_calls.load(Ordering::SeqCst), 0);
    assert_eq!(posts.load(Ordering::SeqCst), 0);
}

#[test]
fn unhandled_backend_error_is_runtime() {
    let err = strict(0.0, true).get_item("k").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
}

#[test]
fn exception_handler_turns_errors_into_misses() {
    let cache = strict(0.0, true);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let plugin = ExceptionHandler::new(ExceptionHandlerOptions { throw_exceptions: false })
        .with_callback(move |_err| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    cache.add_plugin(Arc::new(plugin), 1).unwrap();

    assert_eq!(cache.get_item("k").unwrap(), None);
    assert!(!cache.set_item("k", json!("v")).unwrap());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn removing_a_plugin_leaves_other_listeners() {
    let cache = Adapter::new(MemoryBackend::new());
    cache.events().attach("get_item.post", 0, |_event: &mut Event<'_>| Ok(()));
    let plugin: Arc<dyn Plugin> = Arc::new(Serializer::new());

    cache.add_plugin(Arc::clone(&plugin), 1).unwrap();
    assert_eq!(cache.events().listener_count("get_item.post"), 2);
    let err = cache.add_plugin(Arc::clone(&plugin), 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Logic);

    cache.remove_plugin(&plugin).unwrap();
    assert_eq!(cache.events().listener_count("get_item.post"), 1);
    assert_eq!(cache.remove_plugin(&plugin).unwrap_err().kind(), ErrorKind::Logic);
}

// =============================================================================
// Plugins through the factory
// =============================================================================

#[test]
fn serializer_round_trips_a_map_through_a_string_only_backend() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageFactory::new()
        .create(
            "filesystem",
            &json!({"cache_dir": dir.path(), "namespace": "scenario"}),
            &json!(["Serializer"]),
        )
        .unwrap();

    let profile = json!({"name": "alice", "roles": ["admin", "ops"], "age": 41});
    assert!(storage.set_item("profile", profile.clone()).unwrap());
    assert_eq!(storage.get_item("profile").unwrap(), Some(profile));
}

#[test]
fn memory_with_two_plugins_keeps_options() {
    let storage = StorageFactory::new()
        .create(
            "Memory",
            &json!({"ttl": 9999, "namespace": "test"}),
            &json!(["Serializer", "ClearExpiredByFactor"]),
        )
        .unwrap();

    let plugins = storage.plugins().unwrap();
    assert_eq!(plugins.plugin_registry().len(), 2);
    assert_eq!(storage.options().ttl, 9999.0);
    assert_eq!(storage.options().namespace, "test");
}

#[test]
fn shared_plugin_instance_is_attached_once() {
    let mut factory = StorageFactory::new();
    let shared: Arc<dyn Plugin> = Arc::new(Serializer::new());
    factory.plugins_mut().register_instance("Serializer", Arc::clone(&shared));

    let storage = factory
        .create_from_config(&json!({
            "adapter": "memory",
            "plugins": ["serializer", {"name": "Serializer", "priority": 9}]
        }))
        .unwrap();
    let registry = storage.plugins().unwrap().plugin_registry();
    assert_eq!(registry.len(), 1);
    assert!(storage.plugins().unwrap().has_plugin(&shared));
}

#[test]
fn unknown_plugin_fails_and_two_phase_keeps_the_adapter() {
    let factory = StorageFactory::new();
    let err = factory
        .create("memory", &json!({}), &json!(["NoSuchPlugin"]))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::ServiceNotFound);

    let storage = factory.create_adapter("memory", &json!({})).unwrap();
    assert!(factory
        .attach_plugins(storage.as_ref(), &json!(["ExceptionHandler", "NoSuchPlugin"]))
        .is_err());
    assert_eq!(storage.plugins().unwrap().plugin_registry().len(), 1);
    assert!(storage.set_item("still", json!("works")).unwrap());
}

#[test]
fn unknown_adapter_is_service_not_found() {
    let err = StorageFactory::new()
        .create("Memcached", &Value::Null, &Value::Null)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::ServiceNotFound);
}

#[test]
fn ttl_beyond_duration_range_is_rejected_up_front() {
    let err = StorageFactory::new()
        .create("memory", &json!({"ttl": 1e20}), &json!([]))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let storage = StorageFactory::new().create("memory", &json!({}), &json!([])).unwrap();
    let err = storage
        .set_options(AdapterOptions::default().with_ttl(1e20))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(storage.options().ttl, 0.0);
    assert!(storage.set_item("k", json!(1)).unwrap());
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn unreadable_adapter_misses_without_events() {
    let cache = Adapter::new(MemoryBackend::new());
    cache.set_item("k", json!(1)).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    cache.events().attach("get_item.pre", 0, move |_event: &mut Event<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let options = AdapterOptions {
        readable: false,
        ..cache.options()
    };
    cache.set_options(options).unwrap();
    assert_eq!(cache.get_item("k").unwrap(), None);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn namespaces_isolate_items() {
    let cache = Adapter::new(MemoryBackend::new());
    cache.set_item("k", json!("first")).unwrap();
    cache.set_options(cache.options().with_namespace("other")).unwrap();
    assert_eq!(cache.get_item("k").unwrap(), None);

    let flushable = cache.as_clear_by_namespace().unwrap();
    assert!(flushable.clear_by_namespace("cache").unwrap());
    cache.set_options(cache.options().with_namespace("cache")).unwrap();
    assert_eq!(cache.get_item("k").unwrap(), None);
}
