// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event interception for storage adapters.
//!
//! Every dispatched operation walks through up to three emissions on the
//! adapter's [`EventManager`]:
//!
//! ```text
//!   <op>.pre ──stop?──► short-circuit: event result is returned, nothing else runs
//!      │
//!      ▼
//!   native backend call ──Err──► <op>.exception ──error cleared?──► fallback result
//!      │                                 │
//!      ▼                                 └──► error returned to caller
//!   <op>.post (listeners may replace the result)
//! ```
//!
//! One [`Event`] value lives for the whole dispatch; only its name changes
//! between phases. Listeners receive it by `&mut`, so writes to the
//! parameter bag or the result slot are visible to later listeners and to
//! the adapter.

mod manager;
mod operation;
mod outcome;
mod params;

use std::any::Any;

use crate::error::CacheError;
use crate::storage::StorageAdapter;

pub use manager::{EventManager, Listener, ListenerHandle};
pub use operation::{Operation, CAPABILITIES_CHANGED_EVENT, OPTION_EVENT};
pub use outcome::{OperationResult, Outcome};
pub use params::Params;

/// Event passed by exclusive reference through the listener chain.
pub struct Event<'a> {
    name: String,
    target: &'a dyn StorageAdapter,
    operation: Option<Operation>,
    params: Params,
    result: Option<Outcome>,
    error: Option<CacheError>,
    stopped: bool,
    guards: Vec<Box<dyn Any + Send>>,
}

impl<'a> Event<'a> {
    pub fn new(name: impl Into<String>, target: &'a dyn StorageAdapter, params: Params) -> Self {
        Self {
            name: name.into(),
            target,
            operation: None,
            params,
            result: None,
            error: None,
            stopped: false,
            guards: Vec::new(),
        }
    }

    pub(crate) fn for_operation(op: Operation, target: &'a dyn StorageAdapter, params: Params) -> Self {
        let mut event = Self::new(op.pre(), target, params);
        event.operation = Some(op);
        event
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    /// The adapter that emitted the event. Listeners may call back into it.
    pub fn target(&self) -> &'a dyn StorageAdapter {
        self.target
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn result(&self) -> Option<&Outcome> {
        self.result.as_ref()
    }

    pub fn result_mut(&mut self) -> Option<&mut Outcome> {
        self.result.as_mut()
    }

    pub fn set_result(&mut self, result: Outcome) {
        self.result = Some(result);
    }

    pub fn take_result(&mut self) -> Option<Outcome> {
        self.result.take()
    }

    /// Error raised by the native call (only present on `<op>.exception`).
    pub fn error(&self) -> Option<&CacheError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: CacheError) {
        self.error = Some(error);
    }

    /// Remove the error; the dispatch then returns the result slot instead.
    pub fn take_error(&mut self) -> Option<CacheError> {
        self.error.take()
    }

    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn propagation_is_stopped(&self) -> bool {
        self.stopped
    }

    /// Keep `guard` alive until the dispatch that owns this event ends.
    pub fn hold<G: Any + Send>(&mut self, guard: G) {
        self.guards.push(Box::new(guard));
    }
}

impl std::fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("target", &self.target.name())
            .field("params", &self.params)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}
