// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Pluggable Cache
//!
//! A storage-agnostic cache: one synchronous interface over several stores,
//! decorated by plugins that intercept every operation through events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StorageFactory                         │
//! │  • name → adapter (AdapterManager)                         │
//! │  • name → plugin  (PluginManager), attached by priority    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Adapter<B> (StorageAdapter)                │
//! │  • key normalisation, readable/writable switches           │
//! │  • <op>.pre → native call → <op>.post / <op>.exception     │
//! │  • datatype coercion against the Capabilities snapshot     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Backends                            │
//! │  memory · filesystem · black hole · redis · mongodb        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use pluggable_cache::StorageFactory;
//! use serde_json::json;
//!
//! let factory = StorageFactory::new();
//! let cache = factory
//!     .create("memory", &json!({"namespace": "app", "ttl": 60}), &json!(["serializer"]))
//!     .unwrap();
//!
//! cache.set_item("user", json!({"name": "alice"})).unwrap();
//! assert_eq!(cache.get_item("user").unwrap(), Some(json!({"name": "alice"})));
//! assert_eq!(cache.increment_item("visits", 1).unwrap(), Some(1));
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: the [`StorageAdapter`] surface, the generic [`storage::Adapter`]
//!   and the bundled backends
//! - [`event`]: the priority-ordered [`EventManager`] and the mutable [`Event`]
//! - [`plugin`]: the [`Plugin`] trait and the bundled plugins
//! - [`capabilities`]: per-backend datatype, TTL and key rules
//! - [`manager`] and [`factory`]: name registries and the composition root
//! - [`metrics`]: counters and histograms emitted on every dispatch

pub mod capabilities;
pub mod error;
pub mod event;
pub mod factory;
pub mod manager;
pub mod metrics;
pub mod plugin;
pub mod storage;
pub mod value;

pub use capabilities::{Capabilities, CapabilitiesBuilder, DatatypeSupport};
pub use error::{CacheError, CacheResult, ErrorKind};
pub use event::{Event, EventManager, ListenerHandle, Operation, Outcome, Params};
pub use factory::{PluginSpec, StorageConfig, StorageFactory};
pub use manager::{AdapterManager, PluginManager};
pub use metrics::LatencyTimer;
pub use plugin::Plugin;
pub use storage::{AdapterOptions, PluginCapable, StorageAdapter};
pub use value::{Datatype, Metadata, Value};
