// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MongoDB backend.
//!
//! One document per item in a single collection:
//!
//! ```text
//! { _id: ObjectId, ns: "cache", key: "user", value: <bson>, expires: Date | null }
//! ```
//!
//! Values keep their structure (arrays and objects become BSON documents).
//! Expired documents are treated as missing on read and deleted lazily, or in
//! bulk by `clear_expired`.

use std::time::Duration;

use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::sync::{Client, Collection};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capabilities::Capabilities;
use crate::error::{CacheError, CacheResult};
use crate::value::{Metadata, Value};

use super::backend::{Backend, Context, Features};
use super::AdapterOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoDbOptions {
    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_server() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "cache".to_string()
}

fn default_collection() -> String {
    "cache".to_string()
}

impl Default for MongoDbOptions {
    fn default() -> Self {
        Self {
            server: default_server(),
            database: default_database(),
            collection: default_collection(),
        }
    }
}

#[derive(Default)]
pub struct MongoDbBackend {
    collection: Mutex<Option<(u64, Collection<Document>)>>,
}

impl std::fmt::Debug for MongoDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDbBackend")
            .field("connected", &self.collection.lock().is_some())
            .finish()
    }
}

fn mongo_error(err: mongodb::error::Error) -> CacheError {
    CacheError::runtime_with(format!("MongoDB error: {}", err), err)
}

/// Value of a stored document, `None` once its expiry has passed.
///
/// A document without a `value` field or with a non-date `expires` is corrupt.
pub(crate) fn decode_record(record: &Document, now: DateTime) -> CacheResult<Option<Value>> {
    match record.get("expires") {
        None | Some(Bson::Null) => {}
        Some(Bson::DateTime(expires)) => {
            if *expires <= now {
                return Ok(None);
            }
        }
        Some(other) => {
            return Err(CacheError::runtime(format!(
                "The found item's 'expires' field is not a date: {}",
                other
            )))
        }
    }
    let value = record
        .get("value")
        .ok_or_else(|| CacheError::runtime("The found item is missing its 'value' field"))?;
    Ok(Some(value.clone().into_relaxed_extjson()))
}

fn expiry(ttl: Duration, now: DateTime) -> Bson {
    if ttl.is_zero() {
        return Bson::Null;
    }
    let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    Bson::DateTime(DateTime::from_millis(now.timestamp_millis().saturating_add(millis)))
}

impl MongoDbBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, ctx: &Context<'_, MongoDbOptions>) -> CacheResult<Collection<Document>> {
        let mut slot = self.collection.lock();
        if let Some((generation, collection)) = slot.as_ref() {
            if *generation == ctx.generation {
                return Ok(collection.clone());
            }
        }
        let options = ctx.backend;
        let client = Client::with_uri_str(&options.server)
            .map_err(|e| CacheError::runtime_with(format!("Can't connect to MongoDB at '{}'", options.server), e))?;
        let collection = client
            .database(&options.database)
            .collection::<Document>(&options.collection);
        debug!(database = %options.database, collection = %options.collection, "Opened MongoDB collection");
        *slot = Some((ctx.generation, collection.clone()));
        Ok(collection)
    }

    fn filter(ctx: &Context<'_, MongoDbOptions>, key: &str) -> Document {
        doc! { "ns": ctx.options.namespace.as_str(), "key": key }
    }

    fn find(&self, ctx: &Context<'_, MongoDbOptions>, key: &str) -> CacheResult<Option<Document>> {
        let collection = self.collection(ctx)?;
        let filter = Self::filter(ctx, key);
        let Some(record) = collection.find_one(filter.clone()).run().map_err(mongo_error)? else {
            return Ok(None);
        };
        if decode_record(&record, DateTime::now())?.is_none() {
            collection.delete_one(filter).run().map_err(mongo_error)?;
            return Ok(None);
        }
        Ok(Some(record))
    }
}

impl Backend for MongoDbBackend {
    type Options = MongoDbOptions;

    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn features(&self) -> Features {
        Features {
            flush: true,
            clear_expired: true,
            clear_by_namespace: true,
            ..Features::default()
        }
    }

    fn capabilities(&self, _ctx: &Context<'_, MongoDbOptions>) -> Capabilities {
        Capabilities::builder()
            .all_datatypes()
            .metadata(["_id"])
            .min_ttl(Duration::ZERO)
            .static_ttl(true)
            .ttl_precision(Duration::from_secs(1))
            .unlimited_key_length()
            .namespace_is_prefix(false)
            .build()
    }

    fn validate_options(&self, _options: &AdapterOptions, backend: &MongoDbOptions) -> CacheResult<()> {
        if backend.server.trim().is_empty() {
            return Err(CacheError::invalid("MongoDB server is empty"));
        }
        if backend.database.is_empty() || backend.collection.is_empty() {
            return Err(CacheError::invalid("MongoDB database and collection must be named"));
        }
        Ok(())
    }

    fn get(&self, ctx: &Context<'_, MongoDbOptions>, key: &str) -> CacheResult<Option<Value>> {
        match self.find(ctx, key)? {
            Some(record) => decode_record(&record, DateTime::now()),
            None => Ok(None),
        }
    }

    fn metadata(&self, ctx: &Context<'_, MongoDbOptions>, key: &str) -> CacheResult<Option<Metadata>> {
        Ok(self.find(ctx, key)?.map(|record| {
            let mut metadata = Metadata::new();
            if let Some(id) = record.get("_id") {
                metadata.insert("_id".to_string(), id.clone().into_relaxed_extjson());
            }
            metadata
        }))
    }

    fn set(&self, ctx: &Context<'_, MongoDbOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        let stored = mongodb::bson::to_bson(value)
            .map_err(|e| CacheError::runtime_with(format!("Can't encode the value of '{}'", key), e))?;
        let record = doc! {
            "ns": ctx.options.namespace.as_str(),
            "key": key,
            "value": stored,
            "expires": expiry(ctx.ttl(), DateTime::now()),
        };
        let collection = self.collection(ctx)?;
        collection
            .replace_one(Self::filter(ctx, key), record)
            .upsert(true)
            .run()
            .map_err(mongo_error)?;
        Ok(true)
    }

    fn remove(&self, ctx: &Context<'_, MongoDbOptions>, key: &str) -> CacheResult<bool> {
        let result = self
            .collection(ctx)?
            .delete_one(Self::filter(ctx, key))
            .run()
            .map_err(mongo_error)?;
        Ok(result.deleted_count > 0)
    }

    fn flush(&self, ctx: &Context<'_, MongoDbOptions>) -> CacheResult<bool> {
        self.collection(ctx)?.drop().run().map_err(mongo_error)?;
        Ok(true)
    }

    fn clear_expired(&self, ctx: &Context<'_, MongoDbOptions>) -> CacheResult<bool> {
        let result = self
            .collection(ctx)?
            .delete_many(doc! { "expires": { "$ne": Bson::Null, "$lte": DateTime::now() } })
            .run()
            .map_err(mongo_error)?;
        debug!(deleted = result.deleted_count, "Cleared expired MongoDB items");
        Ok(true)
    }

    fn clear_by_namespace(&self, ctx: &Context<'_, MongoDbOptions>, namespace: &str) -> CacheResult<bool> {
        self.collection(ctx)?
            .delete_many(doc! { "ns": namespace })
            .run()
            .map_err(mongo_error)?;
        Ok(true)
    }
}
