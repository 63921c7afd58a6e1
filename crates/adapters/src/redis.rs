// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis lease backend
//!
//! Each lease is a hash at `<namespace>:<name>` holding `owner` and
//! `data`, expired by Redis itself through a millisecond `PEXPIRE`.
//! Every state change is a Lua script so check-and-set is atomic.

use async_trait::async_trait;
use leash_core::{client_id, validate_ttl, Client, Lock, LockError, LockInfo};
use redis::aio::MultiplexedConnection;
use redis::Script;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Smallest TTL Redis can express with PEXPIRE
pub const MIN_TTL: Duration = Duration::from_millis(1);

pub const DEFAULT_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_NAMESPACE: &str = "leash";

const ACQUIRE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'owner', ARGV[1], 'data', ARGV[2])
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return 1
";

const REFRESH: &str = r"
if redis.call('HGET', KEYS[1], 'owner') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'data', ARGV[2])
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return 1
";

const RELEASE: &str = r"
if redis.call('HGET', KEYS[1], 'owner') ~= ARGV[1] then
    return 0
end
redis.call('DEL', KEYS[1])
return 1
";

/// Where and under which key prefix leases live
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisOptions {
    pub url: String,
    pub namespace: String,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RedisOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn key(&self, name: &str) -> String {
        let namespace = if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        };
        format!("{namespace}:{name}")
    }
}

struct Scripts {
    acquire: Script,
    refresh: Script,
    release: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            acquire: Script::new(ACQUIRE),
            refresh: Script::new(REFRESH),
            release: Script::new(RELEASE),
        }
    }
}

/// Client over a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisClient {
    id: String,
    options: RedisOptions,
    scripts: Arc<Scripts>,
    conn: Option<MultiplexedConnection>,
}

impl RedisClient {
    /// Unconnected client with a fresh identity
    pub fn new(options: RedisOptions) -> Self {
        Self {
            id: client_id(),
            options,
            scripts: Arc::new(Scripts::load()),
            conn: None,
        }
    }

    /// Connected client with a fresh identity
    pub async fn connect(options: RedisOptions) -> Result<Self, LockError> {
        let mut client = Self::new(options);
        client.reconnect().await?;
        Ok(client)
    }

    pub fn options(&self) -> &RedisOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

#[async_trait]
impl Client for RedisClient {
    type Lock = RedisLock;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    async fn reconnect(&mut self) -> Result<(), LockError> {
        let url = self.options.url.as_str();
        let client = redis::Client::open(url).map_err(LockError::backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(LockError::backend)?;
        self.conn = Some(conn);
        tracing::debug!(url = %self.options.url, client = %self.id, "connected to redis");
        Ok(())
    }

    async fn close(&mut self) {
        self.conn = None;
    }

    fn duplicate(&self) -> Self {
        Self {
            conn: None,
            ..self.clone()
        }
    }

    fn new_lock(&self, name: &str) -> RedisLock {
        RedisLock {
            name: name.to_string(),
            key: self.options.key(name),
            owner: self.id.clone(),
            ttl: Duration::ZERO,
            data: String::new(),
            scripts: Arc::clone(&self.scripts),
            conn: self.conn.clone(),
        }
    }
}

/// Lease handle minted by a `RedisClient`
pub struct RedisLock {
    name: String,
    key: String,
    owner: String,
    ttl: Duration,
    data: String,
    scripts: Arc<Scripts>,
    conn: Option<MultiplexedConnection>,
}

impl RedisLock {
    fn conn(&self) -> Result<MultiplexedConnection, LockError> {
        self.conn.clone().ok_or(LockError::Disconnected)
    }

    async fn write(&self, script: &Script, ttl: Option<Duration>) -> Result<bool, LockError> {
        let mut conn = self.conn()?;
        let mut invocation = script.prepare_invoke();
        invocation.key(&self.key).arg(&self.owner);
        if let Some(ttl) = ttl {
            invocation.arg(&self.data).arg(ttl.as_millis() as u64);
        }
        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(LockError::backend)?;
        Ok(applied == 1)
    }
}

#[async_trait]
impl Lock for RedisLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn data(&self) -> &str {
        &self.data
    }

    fn set_data(&mut self, data: String) {
        self.data = data;
    }

    async fn acquire(&mut self, ttl: Duration) -> Result<(), LockError> {
        validate_ttl(ttl, MIN_TTL)?;
        self.ttl = ttl;
        if !self.write(&self.scripts.acquire, Some(ttl)).await? {
            return Err(LockError::held(&self.name));
        }
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), LockError> {
        validate_ttl(self.ttl, MIN_TTL)?;
        if !self.write(&self.scripts.refresh, Some(self.ttl)).await? {
            return Err(LockError::not_owned(&self.name));
        }
        Ok(())
    }

    async fn refresh_ttl(&mut self, ttl: Duration) -> Result<(), LockError> {
        validate_ttl(ttl, MIN_TTL)?;
        self.ttl = ttl;
        self.refresh().await
    }

    async fn release(&mut self) -> Result<(), LockError> {
        if !self.write(&self.scripts.release, None).await? {
            return Err(LockError::not_owned(&self.name));
        }
        Ok(())
    }

    async fn info(&self) -> Result<LockInfo, LockError> {
        let mut conn = self.conn()?;
        let (owner, data, pttl): (Option<String>, Option<String>, i64) = redis::pipe()
            .atomic()
            .hget(&self.key, "owner")
            .hget(&self.key, "data")
            .pttl(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(LockError::backend)?;

        match owner {
            Some(owner) if pttl > 0 => Ok(LockInfo {
                name: self.name.clone(),
                acquired: true,
                owner,
                ttl: Duration::from_millis(pttl as u64),
                data: data.unwrap_or_default(),
            }),
            _ => Ok(LockInfo::free(&self.name)),
        }
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
