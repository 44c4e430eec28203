// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Observe, and optionally swallow, backend errors.
//!
//! On every `<op>.exception` the callback (if any) sees the error. With
//! `throw_exceptions = false` the error is cleared and the caller receives
//! the operation's neutral result instead: a miss, `false`, an empty map, or
//! every key reported as failed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::event::{Event, EventManager, Listener, ListenerHandle, Operation, Outcome};
use crate::value::Value;

use super::{attach_each, parse_options, Plugin};

pub type ExceptionCallback = Arc<dyn Fn(&CacheError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandlerOptions {
    #[serde(default = "default_throw")]
    pub throw_exceptions: bool,
}

fn default_throw() -> bool {
    true
}

impl Default for ExceptionHandlerOptions {
    fn default() -> Self {
        Self {
            throw_exceptions: default_throw(),
        }
    }
}

#[derive(Default)]
pub struct ExceptionHandler {
    options: ExceptionHandlerOptions,
    callback: Option<ExceptionCallback>,
}

impl ExceptionHandler {
    #[must_use]
    pub fn new(options: ExceptionHandlerOptions) -> Self {
        Self { options, callback: None }
    }

    pub fn from_options(options: &Value) -> CacheResult<Self> {
        Ok(Self::new(parse_options("exception_handler", options)?))
    }

    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CacheError) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    fn on_exception(&self, event: &mut Event<'_>) -> CacheResult<()> {
        let Some(error) = event.error() else {
            return Ok(());
        };
        if let Some(callback) = &self.callback {
            callback(error);
        }
        if self.options.throw_exceptions {
            return Ok(());
        }

        let Some(op) = event.operation() else {
            return Ok(());
        };
        let Some(fallback) = Outcome::fallback(op, event.params()) else {
            return Ok(());
        };
        if let Some(error) = event.take_error() {
            warn!(adapter = event.target().name(), operation = %op, error = %error, "Suppressed storage error");
        }
        event.set_result(fallback);
        Ok(())
    }
}

impl std::fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionHandler")
            .field("options", &self.options)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Plugin for ExceptionHandler {
    fn name(&self) -> &'static str {
        "exception_handler"
    }

    fn options(&self) -> Value {
        json!({ "throw_exceptions": self.options.throw_exceptions })
    }

    fn attach(self: Arc<Self>, events: &EventManager, priority: i32) -> Vec<ListenerHandle> {
        let plugin = Arc::clone(&self);
        let listener: Listener = Arc::new(move |event: &mut Event<'_>| plugin.on_exception(event));
        attach_each(events, &Operation::ALL, Operation::exception, priority, &listener)
    }
}
