// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process backend.
//!
//! Items live in a `DashMap` keyed by namespace; each namespace holds a plain
//! `HashMap` guarded by its shard lock, so add, replace, check-and-set and
//! increment are atomic within the process.
//!
//! Expiry is evaluated on read against the current `ttl` option (or the
//! item's own timeout set through `Expirable`); expired entries linger until
//! `clear_expired` runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;
use crate::error::{CacheError, CacheResult};
use crate::value::{Metadata, Value};

use super::backend::{next_counter, Backend, Context, Features};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryOptions {
    /// Upper bound on stored bytes; 0 means unlimited
    #[serde(default)]
    pub memory_limit: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    mtime: SystemTime,
    size: u64,
    /// Overrides the `ttl` option when set
    timeout: Option<Duration>,
}

impl Entry {
    fn new(key: &str, value: Value) -> Self {
        let size = (key.len() + value.to_string().len()) as u64;
        Self {
            value,
            mtime: SystemTime::now(),
            size,
            timeout: None,
        }
    }

    fn lifetime(&self, ttl: Duration) -> Option<Duration> {
        self.timeout.or((!ttl.is_zero()).then_some(ttl))
    }

    fn is_expired(&self, ttl: Duration, now: SystemTime) -> bool {
        match self.lifetime(ttl) {
            Some(lifetime) => now.duration_since(self.mtime).unwrap_or_default() > lifetime,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: DashMap<String, HashMap<String, Entry>>,
    used: AtomicU64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.data.iter().map(|ns| ns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<R>(&self, ctx: &Context<'_, MemoryOptions>, key: &str, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let namespace = self.data.get(&ctx.options.namespace)?;
        let entry = namespace.get(key)?;
        if entry.is_expired(ctx.ttl(), SystemTime::now()) {
            return None;
        }
        Some(f(entry))
    }

    fn write<R>(&self, ctx: &Context<'_, MemoryOptions>, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        let mut namespace = self.data.entry(ctx.options.namespace.clone()).or_default();
        f(&mut namespace)
    }

    /// Insert under an already held namespace lock, enforcing the memory limit.
    fn store(&self, ctx: &Context<'_, MemoryOptions>, items: &mut HashMap<String, Entry>, key: &str, value: Value) -> CacheResult<()> {
        let entry = Entry::new(key, value);
        let replaced = items.get(key).map_or(0, |old| old.size);
        let limit = ctx.backend.memory_limit;
        if limit > 0 {
            let projected = self.used.load(Ordering::SeqCst).saturating_sub(replaced) + entry.size;
            if projected > limit {
                return Err(CacheError::runtime(format!(
                    "Memory usage exceeds the limit of {} bytes",
                    limit
                )));
            }
        }
        self.used.fetch_add(entry.size, Ordering::SeqCst);
        self.release(replaced);
        items.insert(key.to_string(), entry);
        Ok(())
    }

    fn release(&self, bytes: u64) {
        // saturating: concurrent flushes may already have reset the counter
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| Some(used.saturating_sub(bytes)));
    }

    fn live<'m>(items: &'m HashMap<String, Entry>, key: &str, ttl: Duration) -> Option<&'m Entry> {
        items.get(key).filter(|e| !e.is_expired(ttl, SystemTime::now()))
    }
}

fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

impl Backend for MemoryBackend {
    type Options = MemoryOptions;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn features(&self) -> Features {
        Features::all()
    }

    fn capabilities(&self, _ctx: &Context<'_, MemoryOptions>) -> Capabilities {
        Capabilities::builder()
            .all_datatypes()
            .metadata(["mtime"])
            .min_ttl(Duration::from_secs(1))
            .max_ttl(None)
            .static_ttl(false)
            .ttl_precision(Duration::from_millis(50))
            .unlimited_key_length()
            .namespace_is_prefix(false)
            .build()
    }

    fn get(&self, ctx: &Context<'_, MemoryOptions>, key: &str) -> CacheResult<Option<Value>> {
        Ok(self.read(ctx, key, |e| e.value.clone()))
    }

    fn has(&self, ctx: &Context<'_, MemoryOptions>, key: &str) -> CacheResult<bool> {
        Ok(self.read(ctx, key, |_| ()).is_some())
    }

    fn metadata(&self, ctx: &Context<'_, MemoryOptions>, key: &str) -> CacheResult<Option<Metadata>> {
        Ok(self.read(ctx, key, |e| {
            let mut metadata = Metadata::new();
            metadata.insert("mtime".into(), Value::from(unix_seconds(e.mtime)));
            metadata
        }))
    }

    fn set(&self, ctx: &Context<'_, MemoryOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        self.write(ctx, |items| self.store(ctx, items, key, value.clone()))?;
        Ok(true)
    }

    fn add(&self, ctx: &Context<'_, MemoryOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        self.write(ctx, |items| {
            if Self::live(items, key, ctx.ttl()).is_some() {
                return Ok(false);
            }
            self.store(ctx, items, key, value.clone()).map(|()| true)
        })
    }

    fn replace(&self, ctx: &Context<'_, MemoryOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        self.write(ctx, |items| {
            if Self::live(items, key, ctx.ttl()).is_none() {
                return Ok(false);
            }
            self.store(ctx, items, key, value.clone()).map(|()| true)
        })
    }

    fn check_and_set(
        &self,
        ctx: &Context<'_, MemoryOptions>,
        token: &Value,
        key: &str,
        value: &Value,
    ) -> CacheResult<bool> {
        self.write(ctx, |items| {
            match Self::live(items, key, ctx.ttl()) {
                Some(current) if current.value == *token => {}
                _ => return Ok(false),
            }
            self.store(ctx, items, key, value.clone()).map(|()| true)
        })
    }

    fn touch(&self, ctx: &Context<'_, MemoryOptions>, key: &str) -> CacheResult<bool> {
        let ttl = ctx.ttl();
        Ok(self.write(ctx, |items| match items.get_mut(key) {
            Some(entry) if !entry.is_expired(ttl, SystemTime::now()) => {
                entry.mtime = SystemTime::now();
                true
            }
            _ => false,
        }))
    }

    fn remove(&self, ctx: &Context<'_, MemoryOptions>, key: &str) -> CacheResult<bool> {
        let ttl = ctx.ttl();
        let removed = self.write(ctx, |items| items.remove(key));
        Ok(match removed {
            Some(entry) => {
                self.release(entry.size);
                !entry.is_expired(ttl, SystemTime::now())
            }
            None => false,
        })
    }

    fn increment(&self, ctx: &Context<'_, MemoryOptions>, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        self.write(ctx, |items| {
            let current = Self::live(items, key, ctx.ttl()).map(|e| &e.value);
            let next = next_counter(key, current, amount)?;
            self.store(ctx, items, key, Value::from(next))?;
            Ok(Some(next))
        })
    }

    fn flush(&self, _ctx: &Context<'_, MemoryOptions>) -> CacheResult<bool> {
        self.data.clear();
        self.used.store(0, Ordering::SeqCst);
        Ok(true)
    }

    fn clear_expired(&self, ctx: &Context<'_, MemoryOptions>) -> CacheResult<bool> {
        let ttl = ctx.ttl();
        let now = SystemTime::now();
        let mut freed = 0;
        for mut namespace in self.data.iter_mut() {
            namespace.retain(|_, entry| {
                let keep = !entry.is_expired(ttl, now);
                if !keep {
                    freed += entry.size;
                }
                keep
            });
        }
        self.release(freed);
        Ok(true)
    }

    fn clear_by_namespace(&self, _ctx: &Context<'_, MemoryOptions>, namespace: &str) -> CacheResult<bool> {
        if let Some((_, items)) = self.data.remove(namespace) {
            self.release(items.values().map(|e| e.size).sum());
        }
        Ok(true)
    }

    fn clear_by_prefix(&self, ctx: &Context<'_, MemoryOptions>, prefix: &str) -> CacheResult<bool> {
        let freed = self.write(ctx, |items| {
            let mut freed = 0;
            items.retain(|key, entry| {
                let keep = !key.starts_with(prefix);
                if !keep {
                    freed += entry.size;
                }
                keep
            });
            freed
        });
        self.release(freed);
        Ok(true)
    }

    fn optimize(&self, _ctx: &Context<'_, MemoryOptions>) -> CacheResult<bool> {
        self.data.retain(|_, items| !items.is_empty());
        for mut namespace in self.data.iter_mut() {
            namespace.shrink_to_fit();
        }
        self.data.shrink_to_fit();
        Ok(true)
    }

    fn total_space(&self, ctx: &Context<'_, MemoryOptions>) -> CacheResult<u64> {
        Ok(match ctx.backend.memory_limit {
            0 => u64::MAX,
            limit => limit,
        })
    }

    fn available_space(&self, ctx: &Context<'_, MemoryOptions>) -> CacheResult<u64> {
        let total = self.total_space(ctx)?;
        Ok(total.saturating_sub(self.used.load(Ordering::SeqCst)))
    }

    fn set_timeout(&self, ctx: &Context<'_, MemoryOptions>, key: &str, timeout: Duration) -> CacheResult<bool> {
        let ttl = ctx.ttl();
        Ok(self.write(ctx, |items| match items.get_mut(key) {
            Some(entry) if !entry.is_expired(ttl, SystemTime::now()) => {
                entry.mtime = SystemTime::now();
                entry.timeout = Some(timeout);
                true
            }
            _ => false,
        }))
    }

    fn remaining_timeout(&self, ctx: &Context<'_, MemoryOptions>, key: &str) -> CacheResult<Option<Duration>> {
        let ttl = ctx.ttl();
        Ok(self
            .read(ctx, key, |entry| {
                entry.lifetime(ttl).map(|lifetime| {
                    let age = SystemTime::now().duration_since(entry.mtime).unwrap_or_default();
                    lifetime.saturating_sub(age)
                })
            })
            .flatten())
    }
}
