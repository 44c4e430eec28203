// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy shared by adapters, plugins and the factory.
//!
//! Every failure maps onto one [`ErrorKind`]:
//!
//! - `InvalidArgument`: malformed caller input (bad key, bad option, missing
//!   config field). Surfaced immediately, never retried.
//! - `Runtime`: backend communication failure, corrupt stored record,
//!   misconfigured adapter. A plugin listening on `<op>.exception` may
//!   suppress it.
//! - `ExtensionNotLoaded`: the backend client is not available (feature
//!   compiled out). Fatal at construction.
//! - `Logic`: wiring bug, e.g. adding a plugin twice or to an adapter that
//!   cannot host events.
//! - `ServiceNotFound`: adapter or plugin name could not be resolved.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the crate.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Runtime,
    ExtensionNotLoaded,
    Logic,
    ServiceNotFound,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::Runtime => write!(f, "runtime"),
            Self::ExtensionNotLoaded => write!(f, "extension_not_loaded"),
            Self::Logic => write!(f, "logic"),
            Self::ServiceNotFound => write!(f, "service_not_found"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{message}")]
    Runtime {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Extension not loaded: {0}")]
    ExtensionNotLoaded(String),

    #[error("Logic error: {0}")]
    Logic(String),

    #[error("No {kind} registered under '{name}'")]
    ServiceNotFound { kind: &'static str, name: String },

    /// Optional capability requested from a backend that lacks it.
    #[error("Operation '{0}' is not supported by this adapter")]
    Unsupported(&'static str),
}

impl CacheError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            source: None,
        }
    }

    /// Runtime error carrying the native client error as its cause.
    pub fn runtime_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Runtime {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Runtime { .. } | Self::Unsupported(_) => ErrorKind::Runtime,
            Self::ExtensionNotLoaded(_) => ErrorKind::ExtensionNotLoaded,
            Self::Logic(_) => ErrorKind::Logic,
            Self::ServiceNotFound { .. } => ErrorKind::ServiceNotFound,
        }
    }

    #[must_use]
    pub fn is_runtime(&self) -> bool {
        self.kind() == ErrorKind::Runtime
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::runtime_with(format!("I/O failure: {}", err), err)
    }
}
