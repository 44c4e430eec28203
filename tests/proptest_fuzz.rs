//! Property-based tests (fuzzing) for the adapter pipeline.
//!
//! Uses proptest to generate random keys, values, priorities and configs and
//! verify the crate never panics, only returns clean errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::Value;

use pluggable_cache::plugin::Serializer;
use pluggable_cache::storage::{Adapter, BlackHoleBackend, FilesystemBackend, FilesystemOptions, MemoryBackend};
use pluggable_cache::{
    AdapterOptions, ErrorKind, Event, EventManager, Params, PluginCapable, StorageAdapter, StorageConfig,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Arbitrary JSON without floats (they may not survive a text round trip bit for bit)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}"
}

// =============================================================================
// Event ordering
// =============================================================================

proptest! {
    /// Listeners fire by descending priority, in attachment order on ties
    #[test]
    fn listeners_fire_in_priority_order(priorities in prop::collection::vec(-5i32..5, 1..20)) {
        let events = EventManager::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        for (index, priority) in priorities.iter().enumerate() {
            let sink = Arc::clone(&fired);
            events.attach("probe", *priority, move |_event: &mut Event<'_>| {
                sink.lock().push(index);
                Ok(())
            });
        }

        let target = Adapter::new(BlackHoleBackend::new());
        let mut event = Event::new("probe", &target, Params::None);
        events.emit(&mut event).unwrap();

        let mut expected: Vec<usize> = (0..priorities.len()).collect();
        expected.sort_by_key(|&i| std::cmp::Reverse(priorities[i]));
        prop_assert_eq!(fired.lock().clone(), expected);
    }

    /// Detaching any subset leaves exactly the others
    #[test]
    fn detach_removes_only_its_listener(count in 1usize..15, drop_mask in any::<u16>()) {
        let events = EventManager::new();
        let handles: Vec<_> = (0..count)
            .map(|_| events.attach("probe", 0, |_event: &mut Event<'_>| Ok(())))
            .collect();

        let mut kept = count;
        for (index, handle) in handles.iter().enumerate() {
            if drop_mask & (1 << index) != 0 {
                prop_assert!(events.detach(*handle));
                prop_assert!(!events.detach(*handle));
                kept -= 1;
            }
        }
        prop_assert_eq!(events.listener_count("probe"), kept);
    }
}

// =============================================================================
// Round trips
// =============================================================================

proptest! {
    /// Memory stores any JSON value as-is
    #[test]
    fn memory_round_trip(key in key_strategy(), value in arbitrary_json_strategy()) {
        let cache = Adapter::new(MemoryBackend::new());
        prop_assert!(cache.set_item(&key, value.clone()).unwrap());
        prop_assert_eq!(cache.get_item(&key).unwrap(), Some(value));
    }

    /// The serializer gives back what went in
    #[test]
    fn serializer_round_trip(key in key_strategy(), value in arbitrary_json_strategy()) {
        let cache = Adapter::new(MemoryBackend::new());
        cache.add_plugin(Arc::new(Serializer::new()), 1).unwrap();
        prop_assert!(cache.set_item(&key, value.clone()).unwrap());
        prop_assert_eq!(cache.get_item(&key).unwrap(), Some(value));
    }
}

// =============================================================================
// Malformed input never panics
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary keys either work or are rejected as invalid arguments
    #[test]
    fn key_normalisation_never_panics(key in ".{0,300}") {
        let dir = tempfile::tempdir().unwrap();
        let options = FilesystemOptions {
            cache_dir: dir.path().to_path_buf(),
            ..FilesystemOptions::default()
        };
        let cache = Adapter::with_options(FilesystemBackend::new(), AdapterOptions::default(), options).unwrap();

        match cache.get_item(&key) {
            Ok(found) => prop_assert_eq!(found, None),
            Err(err) => prop_assert_eq!(err.kind(), ErrorKind::InvalidArgument),
        }
        if key.is_empty() {
            prop_assert!(cache.has_item(&key).is_err());
        }
    }

    /// Key patterns are applied, never panicked on
    #[test]
    fn key_pattern_filters(key in "[a-z0-9]{1,12}") {
        let options = AdapterOptions::default().with_key_pattern("^[a-z]+$");
        let cache = Adapter::with_options(MemoryBackend::new(), options, Default::default()).unwrap();
        let accepted = key.chars().all(|c| c.is_ascii_lowercase());
        prop_assert_eq!(cache.set_item(&key, Value::Bool(true)).is_ok(), accepted);
    }

    /// Configuration parsing only ever fails with InvalidArgument
    #[test]
    fn config_parsing_never_panics(config in arbitrary_json_strategy()) {
        if let Err(err) = StorageConfig::parse(&config) {
            prop_assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    /// Adapter options from arbitrary maps are either accepted or invalid
    #[test]
    fn adapter_options_from_arbitrary_json(config in arbitrary_json_strategy()) {
        if let Err(err) = Adapter::from_config(MemoryBackend::new(), &config) {
            prop_assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }
}
