// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Keep writes whole across a client abort or shutdown.
//!
//! The host owns an [`AbortSignal`] and flips it when the client goes away or
//! the process starts shutting down. Every write in flight holds a guard
//! until its dispatch ends, so the host can wait for them to drain:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pluggable_cache::plugin::{AbortSignal, IgnoreUserAbort, IgnoreUserAbortOptions};
//!
//! let signal = AbortSignal::new();
//! let plugin = Arc::new(IgnoreUserAbort::new(IgnoreUserAbortOptions::default(), signal.clone()));
//! // ... attach `plugin`, serve requests ...
//! signal.abort();
//! assert!(signal.wait_for_writes(Duration::from_secs(5)));
//! ```
//!
//! Once aborted, new writes are refused with their failure result when
//! `exit_on_abort` is set; otherwise they proceed as usual.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::CacheResult;
use crate::event::{Event, EventManager, Listener, ListenerHandle, Operation, Outcome};
use crate::metrics;
use crate::value::Value;

use super::{attach_each, parse_options, Plugin};

#[derive(Debug, Default)]
struct SignalState {
    aborted: AtomicBool,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

/// Shared abort flag plus a count of writes in flight.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    state: Arc<SignalState>,
}

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.state.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        *self.state.in_flight.lock()
    }

    /// Block until no write is in flight. Returns `false` on timeout.
    pub fn wait_for_writes(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self.state.in_flight.lock();
        while *in_flight > 0 {
            if self.state.drained.wait_until(&mut in_flight, deadline).timed_out() {
                return *in_flight == 0;
            }
        }
        true
    }

    fn guard(&self) -> WriteGuard {
        *self.state.in_flight.lock() += 1;
        WriteGuard {
            state: Arc::clone(&self.state),
        }
    }
}

/// Counts one write as in flight until dropped.
struct WriteGuard {
    state: Arc<SignalState>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let mut in_flight = self.state.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.state.drained.notify_all();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreUserAbortOptions {
    /// Refuse new writes once aborted
    #[serde(default = "default_exit_on_abort")]
    pub exit_on_abort: bool,
}

fn default_exit_on_abort() -> bool {
    true
}

impl Default for IgnoreUserAbortOptions {
    fn default() -> Self {
        Self {
            exit_on_abort: default_exit_on_abort(),
        }
    }
}

#[derive(Debug, Default)]
pub struct IgnoreUserAbort {
    options: IgnoreUserAbortOptions,
    signal: AbortSignal,
}

impl IgnoreUserAbort {
    #[must_use]
    pub fn new(options: IgnoreUserAbortOptions, signal: AbortSignal) -> Self {
        Self { options, signal }
    }

    /// Plugin with its own signal, reachable through [`IgnoreUserAbort::signal`].
    pub fn from_options(options: &Value) -> CacheResult<Self> {
        Ok(Self::new(parse_options("ignore_user_abort", options)?, AbortSignal::new()))
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    fn on_write_pre(&self, event: &mut Event<'_>) -> CacheResult<()> {
        let Some(op) = event.operation() else {
            return Ok(());
        };
        if self.signal.is_aborted() && self.options.exit_on_abort {
            if let Some(refused) = Outcome::fallback(op, event.params()) {
                warn!(adapter = event.target().name(), operation = %op, "Write refused after abort");
                metrics::record_aborted_write(op.as_str());
                event.set_result(refused);
                event.stop_propagation();
            }
            return Ok(());
        }
        event.hold(self.signal.guard());
        Ok(())
    }
}

impl Plugin for IgnoreUserAbort {
    fn name(&self) -> &'static str {
        "ignore_user_abort"
    }

    fn options(&self) -> Value {
        json!({ "exit_on_abort": self.options.exit_on_abort })
    }

    fn attach(self: Arc<Self>, events: &EventManager, priority: i32) -> Vec<ListenerHandle> {
        let writes: Vec<Operation> = Operation::ALL.into_iter().filter(Operation::is_write).collect();
        let plugin = Arc::clone(&self);
        let listener: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_write_pre(event));
        attach_each(events, &writes, Operation::pre, priority, &listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Adapter, MemoryBackend, PluginCapable, StorageAdapter};
    use std::thread;

    #[test]
    fn test_guard_held_for_dispatch() {
        let cache = Adapter::new(MemoryBackend::new());
        let signal = AbortSignal::new();
        let plugin = IgnoreUserAbort::new(IgnoreUserAbortOptions::default(), signal.clone());
        cache.add_plugin(Arc::new(plugin), 1).unwrap();

        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let probe = signal.clone();
        cache.events().attach("set_item.post", 0, move |_event: &mut Event<'_>| {
            *sink.lock() = Some(probe.in_flight());
            Ok(())
        });

        assert!(cache.set_item("k", json!(1)).unwrap());
        assert_eq!(*observed.lock(), Some(1));
        assert_eq!(signal.in_flight(), 0);
    }

    #[test]
    fn test_writes_refused_after_abort() {
        let cache = Adapter::new(MemoryBackend::new());
        let plugin = Arc::new(IgnoreUserAbort::from_options(&Value::Null).unwrap());
        let signal = plugin.signal().clone();
        cache.add_plugin(plugin, 1).unwrap();

        signal.abort();
        assert!(!cache.set_item("k", json!(1)).unwrap());
        assert_eq!(cache.get_item("k").unwrap(), None);
        assert!(signal.wait_for_writes(Duration::from_millis(10)));
    }

    #[test]
    fn test_writes_continue_without_exit() {
        let cache = Adapter::new(MemoryBackend::new());
        let signal = AbortSignal::new();
        let options = IgnoreUserAbortOptions { exit_on_abort: false };
        cache.add_plugin(Arc::new(IgnoreUserAbort::new(options, signal.clone())), 1).unwrap();

        signal.abort();
        assert!(cache.set_item("k", json!(1)).unwrap());
        assert_eq!(cache.get_item("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_wait_for_writes_times_out() {
        let signal = AbortSignal::new();
        let guard = signal.guard();
        assert!(!signal.wait_for_writes(Duration::from_millis(20)));

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(guard);
        });
        assert!(signal.wait_for_writes(Duration::from_secs(5)));
        releaser.join().unwrap();
    }
}
