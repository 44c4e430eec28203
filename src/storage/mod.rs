// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage adapters.
//!
//! - [`traits`]: the public [`StorageAdapter`] contract and the optional
//!   capability traits
//! - [`backend`]: the native-operation contract a store implements
//! - [`adapter`]: the generic [`Adapter`] wiring a backend into the event bus
//! - Backends: memory, filesystem, black hole, Redis and MongoDB (the last two
//!   behind cargo features)

pub mod adapter;
pub mod backend;
pub mod black_hole;
pub mod filesystem;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;
pub mod options;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use adapter::Adapter;
pub use backend::{Backend, Context, Features};
pub use black_hole::{BlackHoleBackend, BlackHoleOptions};
pub use filesystem::{FilesystemBackend, FilesystemOptions};
pub use memory::{MemoryBackend, MemoryOptions};
#[cfg(feature = "mongodb")]
pub use self::mongodb::{MongoDbBackend, MongoDbOptions};
pub use options::AdapterOptions;
#[cfg(feature = "redis")]
pub use self::redis::{RedisBackend, RedisOptions, RedisServer};
pub use traits::{
    AvailableSpace, ClearByNamespace, ClearByPrefix, ClearExpired, Expirable, Flushable, Optimizable, PluginCapable,
    StorageAdapter, TotalSpace,
};
