// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Declarative description of what an adapter supports.
//!
//! A [`Capabilities`] value is immutable once published. Adapters hand out
//! `Arc<Capabilities>` snapshots; plugins that change the picture (the
//! serializer widening the datatypes, for instance) build a *derived*
//! snapshot through [`Capabilities::to_builder`] instead of mutating.
//!
//! # Example
//!
//! ```
//! use pluggable_cache::{Capabilities, Datatype, DatatypeSupport};
//! use std::time::Duration;
//!
//! let caps = Capabilities::builder()
//!     .datatype(Datatype::String, DatatypeSupport::Native)
//!     .datatype(Datatype::Integer, DatatypeSupport::CastTo(Datatype::String))
//!     .min_ttl(Duration::from_secs(1))
//!     .static_ttl(true)
//!     .max_key_length(255)
//!     .build();
//!
//! assert_eq!(caps.support_for(Datatype::Array), DatatypeSupport::Unsupported);
//! assert!(caps.check_ttl(Duration::from_millis(500)).is_err());
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::value::{self, Datatype, Value};

/// How an adapter handles one datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatatypeSupport {
    /// Stored and returned as-is
    Native,
    /// Rejected on write
    Unsupported,
    /// Converted to another datatype on write
    CastTo(Datatype),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capabilities {
    supported_datatypes: BTreeMap<Datatype, DatatypeSupport>,
    supported_metadata: BTreeSet<String>,
    min_ttl: Duration,
    max_ttl: Option<Duration>,
    static_ttl: bool,
    ttl_precision: Duration,
    uses_request_time: bool,
    max_key_length: Option<usize>,
    namespace_is_prefix: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supported_datatypes: Datatype::ALL
                .iter()
                .map(|t| (*t, DatatypeSupport::Unsupported))
                .collect(),
            supported_metadata: BTreeSet::new(),
            min_ttl: Duration::ZERO,
            max_ttl: None,
            static_ttl: true,
            ttl_precision: Duration::from_secs(1),
            uses_request_time: false,
            max_key_length: None,
            namespace_is_prefix: true,
        }
    }
}

impl Capabilities {
    #[must_use]
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder {
            inner: Capabilities::default(),
        }
    }

    /// Start a derived snapshot from this one.
    #[must_use]
    pub fn to_builder(&self) -> CapabilitiesBuilder {
        CapabilitiesBuilder { inner: self.clone() }
    }

    pub fn supported_datatypes(&self) -> &BTreeMap<Datatype, DatatypeSupport> {
        &self.supported_datatypes
    }

    #[must_use]
    pub fn support_for(&self, datatype: Datatype) -> DatatypeSupport {
        self.supported_datatypes
            .get(&datatype)
            .copied()
            .unwrap_or(DatatypeSupport::Unsupported)
    }

    pub fn supported_metadata(&self) -> &BTreeSet<String> {
        &self.supported_metadata
    }

    pub fn min_ttl(&self) -> Duration {
        self.min_ttl
    }

    /// `None` means unlimited.
    pub fn max_ttl(&self) -> Option<Duration> {
        self.max_ttl
    }

    /// Whether the TTL is fixed at write time (`true`) or evaluated on read
    /// against the adapter's current TTL option (`false`).
    pub fn static_ttl(&self) -> bool {
        self.static_ttl
    }

    pub fn ttl_precision(&self) -> Duration {
        self.ttl_precision
    }

    pub fn uses_request_time(&self) -> bool {
        self.uses_request_time
    }

    /// `None` means unlimited.
    pub fn max_key_length(&self) -> Option<usize> {
        self.max_key_length
    }

    pub fn namespace_is_prefix(&self) -> bool {
        self.namespace_is_prefix
    }

    /// Validate a configured TTL.
    ///
    /// Static-TTL stores cannot honour a TTL below `min_ttl`; it is rejected
    /// rather than silently extended. A zero TTL means "no expiry".
    pub fn check_ttl(&self, ttl: Duration) -> CacheResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        if self.static_ttl && !self.min_ttl.is_zero() && ttl < self.min_ttl {
            return Err(CacheError::invalid(format!(
                "TTL of {:?} is below the minimum of {:?} supported by this adapter",
                ttl, self.min_ttl
            )));
        }
        if let Some(max) = self.max_ttl {
            if ttl > max {
                return Err(CacheError::invalid(format!(
                    "TTL of {:?} exceeds the maximum of {:?} supported by this adapter",
                    ttl, max
                )));
            }
        }
        Ok(())
    }

    /// Apply the datatype rules to a value about to be written.
    pub fn coerce<'v>(&self, value: &'v Value) -> CacheResult<Cow<'v, Value>> {
        let datatype = Datatype::of(value);
        match self.support_for(datatype) {
            DatatypeSupport::Native => Ok(Cow::Borrowed(value)),
            DatatypeSupport::CastTo(target) => value::cast(value, target).map(Cow::Owned),
            DatatypeSupport::Unsupported => Err(CacheError::invalid(format!(
                "Values of type '{}' are not supported by this adapter",
                datatype
            ))),
        }
    }
}

/// Builder for [`Capabilities`].
#[derive(Debug, Clone)]
pub struct CapabilitiesBuilder {
    inner: Capabilities,
}

impl CapabilitiesBuilder {
    #[must_use]
    pub fn datatype(mut self, datatype: Datatype, support: DatatypeSupport) -> Self {
        self.inner.supported_datatypes.insert(datatype, support);
        self
    }

    /// Mark every datatype as natively supported.
    #[must_use]
    pub fn all_datatypes(mut self) -> Self {
        for t in Datatype::ALL {
            self.inner.supported_datatypes.insert(t, DatatypeSupport::Native);
        }
        self
    }

    #[must_use]
    pub fn metadata<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.supported_metadata = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn min_ttl(mut self, ttl: Duration) -> Self {
        self.inner.min_ttl = ttl;
        self
    }

    #[must_use]
    pub fn max_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.inner.max_ttl = ttl;
        self
    }

    #[must_use]
    pub fn static_ttl(mut self, static_ttl: bool) -> Self {
        self.inner.static_ttl = static_ttl;
        self
    }

    #[must_use]
    pub fn ttl_precision(mut self, precision: Duration) -> Self {
        self.inner.ttl_precision = precision;
        self
    }

    #[must_use]
    pub fn uses_request_time(mut self, flag: bool) -> Self {
        self.inner.uses_request_time = flag;
        self
    }

    #[must_use]
    pub fn max_key_length(mut self, len: usize) -> Self {
        self.inner.max_key_length = Some(len);
        self
    }

    #[must_use]
    pub fn unlimited_key_length(mut self) -> Self {
        self.inner.max_key_length = None;
        self
    }

    #[must_use]
    pub fn namespace_is_prefix(mut self, flag: bool) -> Self {
        self.inner.namespace_is_prefix = flag;
        self
    }

    #[must_use]
    pub fn build(self) -> Capabilities {
        self.inner
    }
}
