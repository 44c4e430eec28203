// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Options shared by every adapter.
//!
//! Backend-specific settings live in the backend's own options type; both
//! are deserialized from the same flat map, so a config such as
//!
//! ```json
//! { "namespace": "sessions", "ttl": 600, "cache_dir": "/var/cache/app" }
//! ```
//!
//! feeds `namespace`/`ttl` here and `cache_dir` to the filesystem backend.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterOptions {
    /// Logical partition of the key space
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Joins namespace and key on stores where the namespace is a key prefix
    #[serde(default = "default_namespace_separator")]
    pub namespace_separator: String,

    /// Item lifetime in seconds; 0 means no expiry
    #[serde(default)]
    pub ttl: f64,

    /// Regular expression every key must match; empty accepts any key
    #[serde(default)]
    pub key_pattern: String,

    /// When false, reads return a miss without touching the backend
    #[serde(default = "default_true")]
    pub readable: bool,

    /// When false, writes report failure without touching the backend
    #[serde(default = "default_true")]
    pub writable: bool,
}

fn default_namespace() -> String {
    "cache".to_string()
}

fn default_namespace_separator() -> String {
    ":".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            namespace_separator: default_namespace_separator(),
            ttl: 0.0,
            key_pattern: String::new(),
            readable: true,
            writable: true,
        }
    }
}

impl AdapterOptions {
    /// Check the values and compile `key_pattern`.
    pub fn validate(&self) -> CacheResult<Option<Regex>> {
        Duration::try_from_secs_f64(self.ttl).map_err(|_| {
            CacheError::invalid(format!(
                "TTL must be a non-negative number of seconds that fits a duration, got {}",
                self.ttl
            ))
        })?;

        if self.key_pattern.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.key_pattern).map(Some).map_err(|e| {
            CacheError::invalid(format!("Invalid key pattern '{}': {}", self.key_pattern, e))
        })
    }

    #[must_use]
    pub fn ttl_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.ttl).unwrap_or(Duration::ZERO)
    }

    /// `namespace` + `namespace_separator`, or nothing for an empty namespace.
    #[must_use]
    pub fn namespace_prefix(&self) -> String {
        if self.namespace.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.namespace, self.namespace_separator)
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: f64) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.key_pattern = pattern.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = AdapterOptions::default();
        assert_eq!(options.namespace, "cache");
        assert_eq!(options.namespace_separator, ":");
        assert_eq!(options.ttl_duration(), Duration::ZERO);
        assert!(options.readable && options.writable);
        assert_eq!(options.namespace_prefix(), "cache:");
    }

    #[test]
    fn test_deserialize_partial_map_ignores_backend_fields() {
        let options: AdapterOptions =
            serde_json::from_value(json!({"ttl": 9999, "namespace": "test", "cache_dir": "/tmp"})).unwrap();
        assert_eq!(options.ttl, 9999.0);
        assert_eq!(options.namespace, "test");
        assert!(options.writable);
    }

    #[test]
    fn test_validate_rejects_negative_ttl_and_bad_pattern() {
        assert!(AdapterOptions::default().with_ttl(-1.0).validate().is_err());
        let err = AdapterOptions::default().with_key_pattern("[").validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        let compiled = AdapterOptions::default().with_key_pattern("^[a-z]+$").validate().unwrap();
        assert!(compiled.unwrap().is_match("abc"));
    }

    #[test]
    fn test_validate_rejects_ttl_beyond_duration_range() {
        for ttl in [1e20, f64::MAX, f64::INFINITY, f64::NAN] {
            let err = AdapterOptions::default().with_ttl(ttl).validate().unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
            assert_eq!(AdapterOptions::default().with_ttl(ttl).ttl_duration(), Duration::ZERO);
        }
        assert!(AdapterOptions::default().with_ttl(1e9).validate().is_ok());
    }

    #[test]
    fn test_empty_namespace_has_no_prefix() {
        assert_eq!(AdapterOptions::default().with_namespace("").namespace_prefix(), "");
    }
}
