// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run `optimize` on the target after one in `optimizing_factor` removals.

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
pub struct OptimizeOptions {
    /// 0 disables optimizing
    #[serde(default = "default_optimizing_factor")]
    pub optimizing_factor: u32,
}

fn default_optimizing_factor() -> u32 {
    1000
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            optimizing_factor: default_optimizing_factor(),
        }
    }
}

#[derive(Debug, Default)]
pub struct OptimizeByFactor {
    options: OptimizeOptions,
}

impl OptimizeByFactor {
    #[must_use]
    pub fn new(options: OptimizeOptions) -> Self {
        Self { options }
    }

    pub fn from_options(options: &Value) -> CacheResult<Self> {
        Ok(Self::new(parse_options("optimize_by_factor", options)?))
    }

    fn on_remove_post(&self, event: &mut Event<'_>) -> CacheResult<()> {
        if !roll(self.options.optimizing_factor) {
            return Ok(());
        }
        let target = event.target();
        if let Some(optimizable) = target.as_optimizable() {
            debug!(adapter = target.name(), "Optimizing storage");
            optimizable.optimize()?;
            metrics::record_sweep("optimize");
        }
        Ok(())
    }
}

impl Plugin for OptimizeByFactor {
    fn name(&self) -> &'static str {
        "optimize_by_factor"
    }

    fn options(&self) -> Value {
        json!({ "optimizing_factor": self.options.optimizing_factor })
    }

    fn attach(self: Arc<Self>, events: &EventManager, priority: i32) -> Vec<ListenerHandle> {
        let plugin = Arc::clone(&self);
        let listener: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_remove_post(event));
        attach_each(
            events,
            &[Operation::RemoveItem, Operation::RemoveItems],
            Operation::post,
            priority,
            &listener,
        )
    }
}
