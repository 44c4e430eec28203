// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Plugins: bundles of event listeners attached to an adapter's bus.
//!
//! | Plugin | Listens on | Effect |
//! |---|---|---|
//! | [`Serializer`] | write `.pre`, read `.post`, increments | values stored as text |
//! | [`ClearExpiredByFactor`] | `set_item(s)`/`add_item(s)` `.post` | probabilistic `clear_expired` |
//! | [`OptimizeByFactor`] | `remove_item(s)` `.post` | probabilistic `optimize` |
//! | [`ExceptionHandler`] | every `.exception` | callback, optional suppression |
//! | [`IgnoreUserAbort`] | write `.pre` | drains in-flight writes on abort |
//!
//! A plugin returns the handles of the listeners it attached; the adapter
//! keeps them so removing the plugin detaches exactly those.

pub mod clear_expired;
pub mod exception_handler;
pub mod ignore_user_abort;
pub mod optimize;
pub mod serializer;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Map;

use crate::error::{CacheError, CacheResult};
use crate::event::{EventManager, Listener, ListenerHandle, Operation};
use crate::value::Value;

pub use clear_expired::{ClearExpiredByFactor, ClearExpiredOptions};
pub use exception_handler::{ExceptionCallback, ExceptionHandler, ExceptionHandlerOptions};
pub use ignore_user_abort::{AbortSignal, IgnoreUserAbort, IgnoreUserAbortOptions};
pub use optimize::{OptimizeByFactor, OptimizeOptions};
pub use serializer::{JsonSerializer, Serializer, SerializerAdapter, SerializerOptions};

/// Priority used when a configuration names none.
pub const DEFAULT_PRIORITY: i32 = 1;

pub trait Plugin: Send + Sync + 'static {
    /// Canonical registry name.
    fn name(&self) -> &'static str;

    /// Options as a flat map.
    fn options(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Attach this plugin's listeners and return their handles.
    fn attach(self: Arc<Self>, events: &EventManager, priority: i32) -> Vec<ListenerHandle>;
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name())
            .field("options", &self.options())
            .finish()
    }
}

/// Attach one listener to the `event_name` of every operation in `ops`.
pub(crate) fn attach_each(
    events: &EventManager,
    ops: &[Operation],
    event_name: fn(&Operation) -> String,
    priority: i32,
    listener: &Listener,
) -> Vec<ListenerHandle> {
    ops.iter()
        .map(|op| events.attach_listener(event_name(op), priority, Arc::clone(listener)))
        .collect()
}

/// Parse plugin options. `null` means defaults; anything but a map is rejected.
pub(crate) fn parse_options<T: DeserializeOwned + Default>(plugin: &str, options: &Value) -> CacheResult<T> {
    match options {
        Value::Null => Ok(T::default()),
        Value::Object(_) => serde_json::from_value(options.clone())
            .map_err(|e| CacheError::invalid(format!("Invalid options for plugin '{}': {}", plugin, e))),
        other => Err(CacheError::invalid(format!(
            "Options of plugin '{}' must be a map, got {}",
            plugin, other
        ))),
    }
}

/// Roll a `1/factor` chance. A zero factor never fires.
pub(crate) fn roll(factor: u32) -> bool {
    use rand::Rng;
    factor > 0 && rand::thread_rng().gen_range(0..factor) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        factor: u32,
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(parse_options::<Sample>("p", &Value::Null).unwrap(), Sample::default());
        assert_eq!(parse_options::<Sample>("p", &json!({"factor": 3})).unwrap().factor, 3);
        let err = parse_options::<Sample>("p", &json!([1])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        let err = parse_options::<Sample>("p", &json!({"factor": "x"})).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_roll_bounds() {
        assert!(!roll(0));
        assert!(roll(1));
    }
}
