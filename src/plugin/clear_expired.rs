// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sweep expired items now and then, piggybacking on writes.
//!
//! After a successful or failed `set_item(s)` / `add_item(s)`, one write in
//! `clearing_factor` (on average) triggers `clear_expired` on the target.
//! Targets without that capability are left alone. Also registered as
//! `ExpiredItemsSweeper`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::CacheResult;
use crate::event::{Event, EventManager, Listener, ListenerHandle, Operation};
use crate::metrics;
use crate::value::Value;

use super::{attach_each, parse_options, roll, Plugin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearExpiredOptions {
    /// 0 disables sweeping
    #[serde(default = "default_clearing_factor")]
    pub clearing_factor: u32,
}

fn default_clearing_factor() -> u32 {
    1000
}

impl Default for ClearExpiredOptions {
    fn default() -> Self {
        Self {
            clearing_factor: default_clearing_factor(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClearExpiredByFactor {
    options: ClearExpiredOptions,
}

impl ClearExpiredByFactor {
    #[must_use]
    pub fn new(options: ClearExpiredOptions) -> Self {
        Self { options }
    }

    pub fn from_options(options: &Value) -> CacheResult<Self> {
        Ok(Self::new(parse_options("clear_expired_by_factor", options)?))
    }

    fn on_write_post(&self, event: &mut Event<'_>) -> CacheResult<()> {
        if !roll(self.options.clearing_factor) {
            return Ok(());
        }
        let target = event.target();
        if let Some(sweeper) = target.as_clear_expired() {
            debug!(adapter = target.name(), "Clearing expired items");
            sweeper.clear_expired()?;
            metrics::record_sweep("clear_expired");
        }
        Ok(())
    }
}

impl Plugin for ClearExpiredByFactor {
    fn name(&self) -> &'static str {
        "clear_expired_by_factor"
    }

    fn options(&self) -> Value {
        json!({ "clearing_factor": self.options.clearing_factor })
    }

    fn attach(self: Arc<Self>, events: &EventManager, priority: i32) -> Vec<ListenerHandle> {
        let plugin = Arc::clone(&self);
        let listener: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_write_post(event));
        attach_each(
            events,
            &[Operation::SetItem, Operation::SetItems, Operation::AddItem, Operation::AddItems],
            Operation::post,
            priority,
            &listener,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Adapter, AdapterOptions, MemoryBackend, MemoryOptions, PluginCapable, StorageAdapter};
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_factor_one_sweeps_every_write() {
        let cache = Adapter::with_options(
            MemoryBackend::new(),
            AdapterOptions::default().with_ttl(0.05),
            MemoryOptions::default(),
        )
        .unwrap();
        cache.set_item("old", json!(1)).unwrap();
        sleep(Duration::from_millis(120));
        assert_eq!(cache.backend().len(), 1);

        let plugin = ClearExpiredByFactor::new(ClearExpiredOptions { clearing_factor: 1 });
        cache.add_plugin(Arc::new(plugin), 1).unwrap();
        cache.set_item("fresh", json!(2)).unwrap();
        assert_eq!(cache.backend().len(), 1);
        assert_eq!(cache.get_item("fresh").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_factor_zero_never_sweeps() {
        let cache = Adapter::with_options(
            MemoryBackend::new(),
            AdapterOptions::default().with_ttl(0.05),
            MemoryOptions::default(),
        )
        .unwrap();
        cache.set_item("old", json!(1)).unwrap();
        sleep(Duration::from_millis(120));

        let plugin = ClearExpiredByFactor::from_options(&json!({"clearing_factor": 0})).unwrap();
        cache.add_plugin(Arc::new(plugin), 1).unwrap();
        cache.set_item("fresh", json!(2)).unwrap();
        assert_eq!(cache.backend().len(), 2);
    }

    #[test]
    fn test_default_options() {
        let plugin = ClearExpiredByFactor::from_options(&Value::Null).unwrap();
        assert_eq!(plugin.options(), json!({"clearing_factor": 1000}));
    }
}
