// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Priority-ordered publish/subscribe bus owned by each adapter.
//!
//! Within one event name listeners fire in descending priority; equal
//! priorities fire in attachment order. Emission iterates a snapshot taken
//! when it starts, so a listener may attach, detach or emit again (including
//! calling back into the adapter) without disturbing the running iteration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CacheResult;

use super::Event;

/// Listener callback.
pub type Listener = Arc<dyn Fn(&mut Event<'_>) -> CacheResult<()> + Send + Sync>;

/// Opaque token returned by [`EventManager::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

struct Entry {
    handle: ListenerHandle,
    priority: i32,
    callback: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Sorted by priority, descending; FIFO within a priority.
    by_event: HashMap<String, Vec<Entry>>,
    /// Reverse index for detach.
    events_by_handle: HashMap<ListenerHandle, String>,
}

#[derive(Default)]
pub struct EventManager {
    registry: RwLock<Registry>,
}

impl EventManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<F>(&self, event: impl Into<String>, priority: i32, callback: F) -> ListenerHandle
    where
        F: Fn(&mut Event<'_>) -> CacheResult<()> + Send + Sync + 'static,
    {
        self.attach_listener(event, priority, Arc::new(callback))
    }

    pub fn attach_listener(&self, event: impl Into<String>, priority: i32, callback: Listener) -> ListenerHandle {
        let event = event.into();
        let mut registry = self.registry.write();
        registry.next_id += 1;
        let handle = ListenerHandle(registry.next_id);

        let entries = registry.by_event.entry(event.clone()).or_default();
        // after every listener of equal or higher priority
        let position = entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(entries.len());
        entries.insert(position, Entry { handle, priority, callback });
        registry.events_by_handle.insert(handle, event);
        handle
    }

    /// Remove a listener. Unknown or already detached handles are a no-op.
    pub fn detach(&self, handle: ListenerHandle) -> bool {
        let mut registry = self.registry.write();
        let Some(event) = registry.events_by_handle.remove(&handle) else {
            return false;
        };
        if let Some(entries) = registry.by_event.get_mut(&event) {
            entries.retain(|e| e.handle != handle);
            if entries.is_empty() {
                registry.by_event.remove(&event);
            }
        }
        true
    }

    /// Run the listeners registered for `event.name()`.
    ///
    /// Stops early when a listener stops propagation. A listener error aborts
    /// the emission and is returned as-is.
    pub fn emit(&self, event: &mut Event<'_>) -> CacheResult<()> {
        let snapshot: Vec<Listener> = {
            let registry = self.registry.read();
            match registry.by_event.get(event.name()) {
                Some(entries) => entries.iter().map(|e| Arc::clone(&e.callback)).collect(),
                None => return Ok(()),
            }
        };

        for listener in snapshot {
            if event.propagation_is_stopped() {
                break;
            }
            listener(event)?;
        }
        Ok(())
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.read().by_event.get(event).map_or(0, Vec::len)
    }

    /// Priorities of the listeners of `event`, in firing order.
    pub fn priorities(&self, event: &str) -> Vec<i32> {
        self.registry
            .read()
            .by_event
            .get(event)
            .map(|entries| entries.iter().map(|e| e.priority).collect())
            .unwrap_or_default()
    }

    /// Names of events with at least one listener, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().by_event.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn total_listeners(&self) -> usize {
        self.registry.read().events_by_handle.len()
    }

    pub fn clear_listeners(&self, event: &str) {
        let mut registry = self.registry.write();
        if let Some(entries) = registry.by_event.remove(event) {
            for entry in entries {
                registry.events_by_handle.remove(&entry.handle);
            }
        }
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("listeners", &self.total_listeners())
            .finish_non_exhaustive()
    }
}
