// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! File-per-item backend.
//!
//! Layout:
//!
//! ```text
//! {cache_dir}/{namespace}/{h0}/{h1}/.../{key}.{suffix}
//! ```
//!
//! where `h0..` are two-hex-digit slices of `sha256(key)`, `dir_level` of
//! them. Files hold the item as text; scalars are cast to strings and
//! containers are rejected. Writes go to a hidden temporary file that is
//! renamed into place.
//!
//! Expiry uses the file mtime and the current `ttl` option. Increment, add,
//! replace and check-and-set serialise through a process-local lock only;
//! they are not atomic across processes sharing `cache_dir`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::capabilities::{Capabilities, DatatypeSupport};
use crate::error::{CacheError, CacheResult};
use crate::value::{self, Datatype, Metadata, Value};

use super::backend::{next_counter, Backend, Context, Features};
use super::AdapterOptions;

const MAX_DIR_LEVEL: u8 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemOptions {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Hash directory depth, 0..=16
    #[serde(default = "default_dir_level")]
    pub dir_level: u8,

    /// Item file extension
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("pluggable-cache")
}

fn default_dir_level() -> u8 {
    1
}

fn default_suffix() -> String {
    "dat".to_string()
}

impl Default for FilesystemOptions {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            dir_level: default_dir_level(),
            suffix: default_suffix(),
        }
    }
}

fn is_storable_name(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
}

#[derive(Debug, Default)]
pub struct FilesystemBackend {
    lock: Mutex<()>,
}

impl FilesystemBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace_dir(ctx: &Context<'_, FilesystemOptions>) -> PathBuf {
        ctx.backend.cache_dir.join(&ctx.options.namespace)
    }

    fn item_path(ctx: &Context<'_, FilesystemOptions>, key: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        let mut path = Self::namespace_dir(ctx);
        for level in 0..usize::from(ctx.backend.dir_level) {
            path.push(&hash[level * 2..level * 2 + 2]);
        }
        path.push(format!("{}.{}", key, ctx.backend.suffix));
        path
    }

    fn is_expired(mtime: SystemTime, ttl: Duration) -> bool {
        !ttl.is_zero() && SystemTime::now().duration_since(mtime).unwrap_or_default() > ttl
    }

    /// File metadata of a live item.
    fn live_metadata(ctx: &Context<'_, FilesystemOptions>, path: &Path) -> CacheResult<Option<fs::Metadata>> {
        match fs::metadata(path) {
            Ok(meta) => {
                let mtime = meta.modified()?;
                Ok((!Self::is_expired(mtime, ctx.ttl())).then_some(meta))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read(ctx: &Context<'_, FilesystemOptions>, key: &str) -> CacheResult<Option<String>> {
        let path = Self::item_path(ctx, key);
        if Self::live_metadata(ctx, &path)?.is_none() {
            return Ok(None);
        }
        match fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                CacheError::runtime_with(format!("Corrupt cache file '{}'", path.display()), e)
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(ctx: &Context<'_, FilesystemOptions>, key: &str, value: &Value) -> CacheResult<()> {
        let text = value::stored_text(value)?;
        let path = Self::item_path(ctx, key);
        let dir = path
            .parent()
            .ok_or_else(|| CacheError::runtime(format!("Cache path '{}' has no parent", path.display())))?;
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(".{}.{:016x}.tmp", key, rand::random::<u64>()));
        if let Err(e) = fs::write(&tmp, text.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CacheError::from(e)
        })
    }

    /// Item files below the namespace directory with their keys.
    fn items(ctx: &Context<'_, FilesystemOptions>) -> CacheResult<Vec<(String, PathBuf)>> {
        let suffix = ctx.backend.suffix.as_str();
        let mut found = Vec::new();
        walk(&Self::namespace_dir(ctx), &mut |path: &Path| {
            if path.extension().and_then(|e| e.to_str()) == Some(suffix) {
                if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                    if !key.starts_with('.') {
                        found.push((key.to_string(), path.to_path_buf()));
                    }
                }
            }
        })?;
        Ok(found)
    }
}

fn walk(dir: &Path, visit: &mut dyn FnMut(&Path)) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(&path, visit)?;
        } else {
            visit(&path);
        }
    }
    Ok(())
}

/// Remove empty directories below `dir`; returns whether `dir` is now empty.
fn prune(dir: &Path) -> io::Result<bool> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    let mut empty = true;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() && prune(&path)? {
            fs::remove_dir(&path)?;
        } else {
            empty = false;
        }
    }
    Ok(empty)
}

fn remove_quietly(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn unix_seconds(time: io::Result<SystemTime>) -> Option<Value> {
    let secs = time.ok()?.duration_since(UNIX_EPOCH).ok()?.as_secs_f64();
    Some(Value::from(secs))
}

impl Backend for FilesystemBackend {
    type Options = FilesystemOptions;

    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn features(&self) -> Features {
        Features {
            flush: true,
            clear_expired: true,
            clear_by_namespace: true,
            clear_by_prefix: true,
            optimize: true,
            ..Features::default()
        }
    }

    fn capabilities(&self, _ctx: &Context<'_, FilesystemOptions>) -> Capabilities {
        let as_string = DatatypeSupport::CastTo(Datatype::String);
        Capabilities::builder()
            .datatype(Datatype::Null, as_string)
            .datatype(Datatype::Boolean, as_string)
            .datatype(Datatype::Integer, as_string)
            .datatype(Datatype::Double, as_string)
            .datatype(Datatype::String, DatatypeSupport::Native)
            .metadata(["mtime", "ctime", "atime", "filespec"])
            .min_ttl(Duration::from_secs(1))
            .static_ttl(false)
            .ttl_precision(Duration::from_secs(1))
            .max_key_length(251)
            .namespace_is_prefix(false)
            .build()
    }

    fn validate_options(&self, options: &AdapterOptions, backend: &FilesystemOptions) -> CacheResult<()> {
        if backend.dir_level > MAX_DIR_LEVEL {
            return Err(CacheError::invalid(format!(
                "dir_level must be between 0 and {}, got {}",
                MAX_DIR_LEVEL, backend.dir_level
            )));
        }
        if !is_storable_name(&options.namespace) {
            return Err(CacheError::invalid(format!(
                "The namespace '{}' can't be used as a directory name",
                options.namespace
            )));
        }
        if backend.suffix.is_empty() || !backend.suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CacheError::invalid(format!("Invalid file suffix '{}'", backend.suffix)));
        }
        Ok(())
    }

    fn validate_key(&self, key: &str) -> CacheResult<()> {
        if is_storable_name(key) {
            Ok(())
        } else {
            Err(CacheError::invalid(format!(
                "The key '{}' may only contain letters, digits and '_', '+', '-'",
                key
            )))
        }
    }

    fn get(&self, ctx: &Context<'_, FilesystemOptions>, key: &str) -> CacheResult<Option<Value>> {
        Ok(Self::read(ctx, key)?.map(Value::String))
    }

    fn has(&self, ctx: &Context<'_, FilesystemOptions>, key: &str) -> CacheResult<bool> {
        Ok(Self::live_metadata(ctx, &Self::item_path(ctx, key))?.is_some())
    }

    fn metadata(&self, ctx: &Context<'_, FilesystemOptions>, key: &str) -> CacheResult<Option<Metadata>> {
        let path = Self::item_path(ctx, key);
        let Some(meta) = Self::live_metadata(ctx, &path)? else {
            return Ok(None);
        };

        let mut metadata = Metadata::new();
        for (field, time) in [("mtime", meta.modified()), ("atime", meta.accessed()), ("ctime", meta.created())] {
            if let Some(secs) = unix_seconds(time) {
                metadata.insert(field.into(), secs);
            }
        }
        metadata.insert("filespec".into(), Value::from(path.display().to_string()));
        Ok(Some(metadata))
    }

    fn set(&self, ctx: &Context<'_, FilesystemOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        Self::write(ctx, key, value)?;
        Ok(true)
    }

    fn add(&self, ctx: &Context<'_, FilesystemOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        let _guard = self.lock.lock();
        if self.has(ctx, key)? {
            return Ok(false);
        }
        Self::write(ctx, key, value)?;
        Ok(true)
    }

    fn replace(&self, ctx: &Context<'_, FilesystemOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        let _guard = self.lock.lock();
        if !self.has(ctx, key)? {
            return Ok(false);
        }
        Self::write(ctx, key, value)?;
        Ok(true)
    }

    fn check_and_set(
        &self,
        ctx: &Context<'_, FilesystemOptions>,
        token: &Value,
        key: &str,
        value: &Value,
    ) -> CacheResult<bool> {
        let _guard = self.lock.lock();
        let Ok(expected) = value::stored_text(token) else {
            return Ok(false);
        };
        if Self::read(ctx, key)?.as_deref() != Some(expected.as_str()) {
            return Ok(false);
        }
        Self::write(ctx, key, value)?;
        Ok(true)
    }

    fn touch(&self, ctx: &Context<'_, FilesystemOptions>, key: &str) -> CacheResult<bool> {
        let path = Self::item_path(ctx, key);
        if Self::live_metadata(ctx, &path)?.is_none() {
            return Ok(false);
        }
        let file = match File::options().write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.set_modified(SystemTime::now())?;
        Ok(true)
    }

    fn remove(&self, ctx: &Context<'_, FilesystemOptions>, key: &str) -> CacheResult<bool> {
        Ok(remove_quietly(&Self::item_path(ctx, key))?)
    }

    fn increment(&self, ctx: &Context<'_, FilesystemOptions>, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        let _guard = self.lock.lock();
        let current = Self::read(ctx, key)?.map(Value::String);
        let next = next_counter(key, current.as_ref(), amount)?;
        Self::write(ctx, key, &Value::from(next))?;
        Ok(Some(next))
    }

    fn flush(&self, ctx: &Context<'_, FilesystemOptions>) -> CacheResult<bool> {
        let entries = match fs::read_dir(&ctx.backend.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        debug!(cache_dir = %ctx.backend.cache_dir.display(), "Flushed filesystem cache");
        Ok(true)
    }

    fn clear_expired(&self, ctx: &Context<'_, FilesystemOptions>) -> CacheResult<bool> {
        let ttl = ctx.ttl();
        if ttl.is_zero() {
            return Ok(true);
        }
        let mut removed = 0usize;
        for (_, path) in Self::items(ctx)? {
            let expired = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(|mtime| Self::is_expired(mtime, ttl))
                .unwrap_or(false);
            if expired && remove_quietly(&path)? {
                removed += 1;
            }
        }
        debug!(namespace = %ctx.options.namespace, removed, "Cleared expired cache files");
        Ok(true)
    }

    fn clear_by_namespace(&self, ctx: &Context<'_, FilesystemOptions>, namespace: &str) -> CacheResult<bool> {
        if !is_storable_name(namespace) {
            return Err(CacheError::invalid(format!("Invalid namespace '{}'", namespace)));
        }
        match fs::remove_dir_all(ctx.backend.cache_dir.join(namespace)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_by_prefix(&self, ctx: &Context<'_, FilesystemOptions>, prefix: &str) -> CacheResult<bool> {
        for (key, path) in Self::items(ctx)? {
            if key.starts_with(prefix) {
                remove_quietly(&path)?;
            }
        }
        Ok(true)
    }

    fn optimize(&self, ctx: &Context<'_, FilesystemOptions>) -> CacheResult<bool> {
        prune(&Self::namespace_dir(ctx))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Adapter, StorageAdapter};
    use crate::ErrorKind;
    use serde_json::json;
    use std::thread;

    fn adapter(dir: &Path) -> Adapter<FilesystemBackend> {
        Adapter::with_options(
            FilesystemBackend::new(),
            AdapterOptions::default(),
            FilesystemOptions {
                cache_dir: dir.to_path_buf(),
                dir_level: 2,
                ..FilesystemOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_scalars_are_cast_to_strings() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        cache.set_item("int", json!(123)).unwrap();
        cache.set_item("flag", json!(true)).unwrap();
        cache.set_item("nothing", json!(null)).unwrap();
        assert_eq!(cache.get_item("int").unwrap(), Some(json!("123")));
        assert_eq!(cache.get_item("flag").unwrap(), Some(json!("1")));
        assert_eq!(cache.get_item("nothing").unwrap(), Some(json!("")));
    }

    #[test]
    fn test_containers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        let err = cache.set_item("k", json!({"a": 1})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        cache.set_item("key", json!("value")).unwrap();

        let hash = hex::encode(Sha256::digest(b"key"));
        let expected = dir
            .path()
            .join("cache")
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join("key.dat");
        assert_eq!(fs::read_to_string(&expected).unwrap(), "value");

        let metadata = cache.get_metadata("key").unwrap().unwrap();
        assert_eq!(metadata["filespec"], json!(expected.display().to_string()));
        assert!(metadata.contains_key("mtime"));
    }

    #[test]
    fn test_unsafe_keys_and_namespaces_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        assert_eq!(cache.get_item("../etc").unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(cache.get_item("a/b").unwrap_err().kind(), ErrorKind::InvalidArgument);
        let err = cache
            .set_options(AdapterOptions::default().with_namespace("../up"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(cache.get_item(&"k".repeat(252)).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_increment_serialises_within_process() {
        let dir = tempfile::tempdir().unwrap();
        let cache = std::sync::Arc::new(adapter(dir.path()));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let cache = std::sync::Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..25 {
                        cache.increment_item("n", 1).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(cache.get_item("n").unwrap(), Some(json!("100")));
    }

    #[test]
    fn test_check_and_set_compares_stored_text() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        cache.set_item("k", json!(5)).unwrap();
        assert!(cache.check_and_set_item(&json!(5), "k", json!(6)).unwrap());
        assert!(!cache.check_and_set_item(&json!(5), "k", json!(7)).unwrap());
        assert_eq!(cache.get_item("k").unwrap(), Some(json!("6")));
    }

    #[test]
    fn test_expiry_and_clear_expired() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        cache.set_item("old", json!("v")).unwrap();

        let path = FilesystemBackend::item_path(
            &Context {
                options: &AdapterOptions::default(),
                backend: &cache.backend_options(),
                generation: 0,
            },
            "old",
        );
        let past = SystemTime::now() - Duration::from_secs(120);
        File::options().write(true).open(&path).unwrap().set_modified(past).unwrap();

        cache.set_options(AdapterOptions::default().with_ttl(60.0)).unwrap();
        assert_eq!(cache.get_item("old").unwrap(), None);
        assert!(!cache.touch_item("old").unwrap());

        cache.as_clear_expired().unwrap().clear_expired().unwrap();
        assert!(!path.exists());
        cache.as_optimizable().unwrap().optimize().unwrap();
        assert!(!path.parent().unwrap().exists());
    }

    #[test]
    fn test_clear_by_prefix_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        cache.set_item("user_1", json!("a")).unwrap();
        cache.set_item("user_2", json!("b")).unwrap();
        cache.set_item("post_1", json!("c")).unwrap();

        cache.as_clear_by_prefix().unwrap().clear_by_prefix("user_").unwrap();
        assert_eq!(
            cache.has_items(&["user_1", "user_2", "post_1"]).unwrap(),
            vec!["post_1".to_string()]
        );

        cache.as_flushable().unwrap().flush().unwrap();
        assert!(!cache.has_item("post_1").unwrap());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_remove_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = adapter(dir.path());
        cache.set_item("k", json!("v")).unwrap();
        assert!(cache.remove_item("k").unwrap());
        assert!(!cache.remove_item("k").unwrap());
        assert_eq!(cache.remove_items(&["k"]).unwrap(), vec!["k".to_string()]);
    }
}
