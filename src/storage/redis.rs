// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend.
//!
//! Keys are stored as `{namespace}{separator}{key}` in the configured
//! database; values are Redis strings, so scalars are cast to text and
//! containers are rejected (attach the serializer plugin to store them).
//!
//! The connection is opened lazily on first use and reopened after an option
//! change or a dropped connection. The server version reported by `INFO`
//! feeds the capabilities: Redis 2+ supports a minimum TTL of one second.
//!
//! ```text
//! set_item("user", "alice")  ─►  SET cache:user alice EX <ttl>
//! add_item(..)               ─►  SET .. NX
//! replace_item(..)           ─►  SET .. XX
//! check_and_set_item(..)     ─►  WATCH / GET / MULTI SET EXEC
//! increment_item(..)         ─►  MULTI SET .. 0 EX <ttl> NX, INCRBY EXEC
//! clear_by_prefix("u")       ─►  SCAN MATCH cache:u* + DEL
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use redis::{Client, Commands, Connection, IntoConnectionInfo, RedisError, RedisResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capabilities::{Capabilities, DatatypeSupport};
use crate::error::{CacheError, CacheResult};
use crate::value::{self, Datatype, Value};

use super::backend::{Backend, Context, Features};
use super::AdapterOptions;

const DEFAULT_PORT: u16 = 6379;
const DELETE_CHUNK: usize = 500;

/// Server address: a URL/`host[:port]` string or an explicit host and port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RedisServer {
    Uri(String),
    HostPort {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
    },
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl RedisServer {
    /// Connection URL understood by the client.
    pub fn to_url(&self) -> CacheResult<String> {
        match self {
            Self::Uri(server) => normalize_server(server),
            Self::HostPort { host, port } => {
                if host.trim().is_empty() {
                    return Err(CacheError::invalid("Redis server host is empty"));
                }
                Ok(format!("redis://{}:{}", host.trim(), port))
            }
        }
    }
}

/// Turn `host`, `host:port`, a socket path or a URL into a client URL.
pub fn normalize_server(server: &str) -> CacheResult<String> {
    let server = server.trim();
    if server.is_empty() {
        return Err(CacheError::invalid("Redis server address is empty"));
    }
    if server.contains("://") {
        return Ok(server.to_string());
    }
    if server.starts_with('/') {
        return Ok(format!("redis+unix://{}", server));
    }

    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| CacheError::invalid(format!("Invalid port in Redis server '{}'", server)))?;
            (host, port)
        }
        None => (server, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(CacheError::invalid(format!("Missing host in Redis server '{}'", server)));
    }
    Ok(format!("redis://{}:{}", host, port))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisOptions {
    #[serde(default = "default_server")]
    pub server: RedisServer,

    #[serde(default)]
    pub database: i64,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,
}

fn default_server() -> RedisServer {
    RedisServer::Uri(format!("127.0.0.1:{}", DEFAULT_PORT))
}

fn default_connect_timeout() -> f64 {
    5.0
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            server: default_server(),
            database: 0,
            username: None,
            password: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl RedisOptions {
    /// `connect_timeout` as a duration; zero, negative or out-of-range values are rejected.
    pub fn connect_timeout(&self) -> CacheResult<Duration> {
        Duration::try_from_secs_f64(self.connect_timeout)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| {
                CacheError::invalid(format!(
                    "connect_timeout must be a positive number of seconds, got {}",
                    self.connect_timeout
                ))
            })
    }
}

struct Resource {
    generation: u64,
    connection: Connection,
    major_version: u32,
}

#[derive(Default)]
pub struct RedisBackend {
    resource: Mutex<Option<Resource>>,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connected", &self.resource.lock().is_some())
            .finish()
    }
}

fn redis_error(err: RedisError) -> CacheError {
    CacheError::runtime_with(format!("Redis error: {}", err), err)
}

fn connect(options: &RedisOptions, generation: u64) -> CacheResult<Resource> {
    let url = options.server.to_url()?;
    let mut info = url
        .as_str()
        .into_connection_info()
        .map_err(|e| CacheError::invalid(format!("Invalid Redis server '{}': {}", url, e)))?;
    info.redis.db = options.database;
    if options.username.is_some() {
        info.redis.username = options.username.clone();
    }
    if options.password.is_some() {
        info.redis.password = options.password.clone();
    }

    let client = Client::open(info).map_err(redis_error)?;
    let mut connection = client
        .get_connection_with_timeout(options.connect_timeout()?)
        .map_err(|e| CacheError::runtime_with(format!("Can't connect to Redis at '{}'", url), e))?;

    let server_info: String = redis::cmd("INFO").arg("server").query(&mut connection).map_err(redis_error)?;
    let major_version = parse_major_version(&server_info).unwrap_or(0);
    debug!(server = %url, database = options.database, major_version, "Connected to Redis");

    Ok(Resource {
        generation,
        connection,
        major_version,
    })
}

fn parse_major_version(info: &str) -> Option<u32> {
    info.lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .and_then(|version| version.trim().split('.').next())
        .and_then(|major| major.parse().ok())
}

fn info_field(info: &str, field: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.strip_prefix(field)?.strip_prefix(':'))
        .and_then(|v| v.trim().parse().ok())
}

/// Escape glob metacharacters for `SCAN MATCH`.
fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `INCRBY`/`DECRBY` in one MULTI block. With a TTL, a missing counter is first
/// created as `0` with that expiry; an existing counter keeps its own.
fn counter_step(command: &str, key: &str, amount: i64, ttl: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    if !ttl.is_zero() {
        pipe.cmd("SET").arg(key).arg(0).arg("EX").arg(ttl_seconds(ttl)).arg("NX").ignore();
    }
    pipe.cmd(command).arg(key).arg(amount);
    pipe
}

/// Whole seconds, rounded up so a sub-second remainder never shortens the TTL.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

fn set_command(key: &str, value: &Value, ttl: Duration, condition: Option<&str>) -> CacheResult<redis::Cmd> {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value::stored_text(value)?);
    if !ttl.is_zero() {
        cmd.arg("EX").arg(ttl_seconds(ttl));
    }
    if let Some(condition) = condition {
        cmd.arg(condition);
    }
    Ok(cmd)
}

impl RedisBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_connection<T>(
        &self,
        ctx: &Context<'_, RedisOptions>,
        op: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> CacheResult<T> {
        let mut slot = self.resource.lock();
        let stale = slot.as_ref().map_or(true, |r| r.generation != ctx.generation);
        if stale {
            *slot = Some(connect(ctx.backend, ctx.generation)?);
        }
        let resource = slot
            .as_mut()
            .ok_or_else(|| CacheError::runtime("Redis connection unavailable"))?;

        match op(&mut resource.connection) {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() || e.is_timeout() {
                    debug!(error = %e, "Dropping Redis connection");
                    *slot = None;
                }
                Err(redis_error(e))
            }
        }
    }

    fn major_version(&self, ctx: &Context<'_, RedisOptions>) -> Option<u32> {
        let mut slot = self.resource.lock();
        if let Some(resource) = slot.as_ref().filter(|r| r.generation == ctx.generation) {
            return Some(resource.major_version);
        }
        match connect(ctx.backend, ctx.generation) {
            Ok(resource) => {
                let version = resource.major_version;
                *slot = Some(resource);
                Some(version)
            }
            Err(e) => {
                debug!(error = %e, "Redis version unknown");
                None
            }
        }
    }

    fn delete_matching(&self, ctx: &Context<'_, RedisOptions>, pattern: String) -> CacheResult<bool> {
        self.with_connection(ctx, |conn| {
            let keys: Vec<String> = conn.scan_match::<_, String>(&pattern)?.collect();
            for chunk in keys.chunks(DELETE_CHUNK) {
                redis::cmd("DEL").arg(chunk).query::<i64>(conn)?;
            }
            debug!(pattern = %pattern, deleted = keys.len(), "Deleted matching Redis keys");
            Ok(true)
        })
    }
}

impl Backend for RedisBackend {
    type Options = RedisOptions;

    fn name(&self) -> &'static str {
        "redis"
    }

    fn features(&self) -> Features {
        Features {
            flush: true,
            clear_by_namespace: true,
            clear_by_prefix: true,
            total_space: true,
            expirable: true,
            ..Features::default()
        }
    }

    /// Unreachable servers are assumed to be a current release.
    fn capabilities(&self, ctx: &Context<'_, RedisOptions>) -> Capabilities {
        let min_ttl = match self.major_version(ctx) {
            Some(major) if major < 2 => Duration::ZERO,
            _ => Duration::from_secs(1),
        };
        let as_string = DatatypeSupport::CastTo(Datatype::String);
        Capabilities::builder()
            .datatype(Datatype::Null, as_string)
            .datatype(Datatype::Boolean, as_string)
            .datatype(Datatype::Integer, as_string)
            .datatype(Datatype::Double, as_string)
            .datatype(Datatype::String, DatatypeSupport::Native)
            .min_ttl(min_ttl)
            .max_ttl(None)
            .static_ttl(true)
            .ttl_precision(Duration::from_secs(1))
            .max_key_length(255)
            .namespace_is_prefix(true)
            .build()
    }

    fn validate_options(&self, _options: &AdapterOptions, backend: &RedisOptions) -> CacheResult<()> {
        backend.server.to_url()?;
        backend.connect_timeout()?;
        Ok(())
    }

    fn get(&self, ctx: &Context<'_, RedisOptions>, key: &str) -> CacheResult<Option<Value>> {
        let key = ctx.prefixed(key);
        let found: Option<String> = self.with_connection(ctx, |conn| redis::cmd("GET").arg(&key).query(conn))?;
        Ok(found.map(Value::String))
    }

    fn get_many(&self, ctx: &Context<'_, RedisOptions>, keys: &[String]) -> CacheResult<BTreeMap<String, Value>> {
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }
        let prefixed: Vec<String> = keys.iter().map(|k| ctx.prefixed(k)).collect();
        let values: Vec<Option<String>> =
            self.with_connection(ctx, |conn| redis::cmd("MGET").arg(&prefixed).query(conn))?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), Value::String(v))))
            .collect())
    }

    fn has(&self, ctx: &Context<'_, RedisOptions>, key: &str) -> CacheResult<bool> {
        let key = ctx.prefixed(key);
        self.with_connection(ctx, |conn| redis::cmd("EXISTS").arg(&key).query(conn))
    }

    fn set(&self, ctx: &Context<'_, RedisOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        let cmd = set_command(&ctx.prefixed(key), value, ctx.ttl(), None)?;
        let reply: Option<String> = self.with_connection(ctx, |conn| cmd.query(conn))?;
        Ok(reply.is_some())
    }

    fn set_many(&self, ctx: &Context<'_, RedisOptions>, items: &BTreeMap<String, Value>) -> CacheResult<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in items {
            pipe.add_command(set_command(&ctx.prefixed(key), value, ctx.ttl(), None)?);
        }
        let replies: Vec<Option<String>> = self.with_connection(ctx, |conn| pipe.query(conn))?;
        Ok(items
            .keys()
            .zip(replies)
            .filter(|(_, reply)| reply.is_none())
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn add(&self, ctx: &Context<'_, RedisOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        let cmd = set_command(&ctx.prefixed(key), value, ctx.ttl(), Some("NX"))?;
        let reply: Option<String> = self.with_connection(ctx, |conn| cmd.query(conn))?;
        Ok(reply.is_some())
    }

    fn replace(&self, ctx: &Context<'_, RedisOptions>, key: &str, value: &Value) -> CacheResult<bool> {
        let cmd = set_command(&ctx.prefixed(key), value, ctx.ttl(), Some("XX"))?;
        let reply: Option<String> = self.with_connection(ctx, |conn| cmd.query(conn))?;
        Ok(reply.is_some())
    }

    fn check_and_set(
        &self,
        ctx: &Context<'_, RedisOptions>,
        token: &Value,
        key: &str,
        value: &Value,
    ) -> CacheResult<bool> {
        let Ok(expected) = value::stored_text(token) else {
            return Ok(false);
        };
        let key = ctx.prefixed(key);
        let set = set_command(&key, value, ctx.ttl(), None)?;

        self.with_connection(ctx, |conn| {
            redis::cmd("WATCH").arg(&key).query::<()>(conn)?;
            let current: Option<String> = redis::cmd("GET").arg(&key).query(conn)?;
            if current.as_deref() != Some(expected.as_str()) {
                redis::cmd("UNWATCH").query::<()>(conn)?;
                return Ok(false);
            }
            let mut pipe = redis::pipe();
            pipe.atomic().add_command(set);
            // EXEC replies nil when the watched key changed in between
            let applied: Option<Vec<redis::Value>> = pipe.query(conn)?;
            Ok(applied.is_some())
        })
    }

    fn touch(&self, ctx: &Context<'_, RedisOptions>, key: &str) -> CacheResult<bool> {
        let key = ctx.prefixed(key);
        let ttl = ctx.ttl();
        self.with_connection(ctx, |conn| {
            if ttl.is_zero() {
                redis::cmd("EXISTS").arg(&key).query(conn)
            } else {
                redis::cmd("EXPIRE").arg(&key).arg(ttl_seconds(ttl)).query(conn)
            }
        })
    }

    fn remove(&self, ctx: &Context<'_, RedisOptions>, key: &str) -> CacheResult<bool> {
        let key = ctx.prefixed(key);
        let deleted: i64 = self.with_connection(ctx, |conn| redis::cmd("DEL").arg(&key).query(conn))?;
        Ok(deleted > 0)
    }

    fn remove_many(&self, ctx: &Context<'_, RedisOptions>, keys: &[String]) -> CacheResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DEL").arg(ctx.prefixed(key));
        }
        let deleted: Vec<i64> = self.with_connection(ctx, |conn| pipe.query(conn))?;
        Ok(keys
            .iter()
            .zip(deleted)
            .filter(|(_, count)| *count == 0)
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn increment(&self, ctx: &Context<'_, RedisOptions>, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        let key = ctx.prefixed(key);
        let (next,): (i64,) =
            self.with_connection(ctx, |conn| counter_step("INCRBY", &key, amount, ctx.ttl()).query(conn))?;
        Ok(Some(next))
    }

    fn decrement(&self, ctx: &Context<'_, RedisOptions>, key: &str, amount: i64) -> CacheResult<Option<i64>> {
        let key = ctx.prefixed(key);
        let (next,): (i64,) =
            self.with_connection(ctx, |conn| counter_step("DECRBY", &key, amount, ctx.ttl()).query(conn))?;
        Ok(Some(next))
    }

    fn flush(&self, ctx: &Context<'_, RedisOptions>) -> CacheResult<bool> {
        self.with_connection(ctx, |conn| redis::cmd("FLUSHDB").query::<()>(conn))?;
        Ok(true)
    }

    fn clear_by_namespace(&self, ctx: &Context<'_, RedisOptions>, namespace: &str) -> CacheResult<bool> {
        let pattern = format!(
            "{}{}*",
            escape_glob(namespace),
            escape_glob(&ctx.options.namespace_separator)
        );
        self.delete_matching(ctx, pattern)
    }

    fn clear_by_prefix(&self, ctx: &Context<'_, RedisOptions>, prefix: &str) -> CacheResult<bool> {
        let pattern = format!("{}*", escape_glob(&ctx.prefixed(prefix)));
        self.delete_matching(ctx, pattern)
    }

    fn total_space(&self, ctx: &Context<'_, RedisOptions>) -> CacheResult<u64> {
        let info: String = self.with_connection(ctx, |conn| redis::cmd("INFO").arg("memory").query(conn))?;
        let limit = info_field(&info, "maxmemory").filter(|max| *max > 0);
        Ok(limit
            .or_else(|| info_field(&info, "total_system_memory"))
            .or_else(|| info_field(&info, "used_memory"))
            .unwrap_or(0))
    }

    fn set_timeout(&self, ctx: &Context<'_, RedisOptions>, key: &str, timeout: Duration) -> CacheResult<bool> {
        let key = ctx.prefixed(key);
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self.with_connection(ctx, |conn| redis::cmd("PEXPIRE").arg(&key).arg(millis).query(conn))
    }

    fn remaining_timeout(&self, ctx: &Context<'_, RedisOptions>, key: &str) -> CacheResult<Option<Duration>> {
        let key = ctx.prefixed(key);
        let millis: i64 = self.with_connection(ctx, |conn| redis::cmd("PTTL").arg(&key).query(conn))?;
        // -2: missing, -1: no expiry
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}
