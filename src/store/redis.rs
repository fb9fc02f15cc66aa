// src/store/redis.rs

//! Redis-backed [`KeyValueStore`].
//!
//! Uses an async `ConnectionManager` (pooled, reconnecting). Job records are
//! Redis hashes, workflow records plain strings, TTLs native `EXPIRE`.
//! Record writes use `SET KEEPTTL` (Redis 6.0+) so they never clear an expiry
//! set by another worker. Locks
//! are `SET NX PX` plus a compare-and-delete Lua script so a worker can never
//! release a lease that has already passed to someone else.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use tracing::debug;

use crate::errors::Result;

use super::KeyValueStore;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Escape MATCH metacharacters so `prefix` is matched literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        debug!(url = %url, "connected to redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.exists(key).await?)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        // SCAN rather than KEYS so large namespaces don't block the server.
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.expire(key, ttl.as_secs() as i64).await?)
    }

    async fn persist(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.persist::<_, ()>(key).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.manager.clone();
        // -2: missing, -1: no expiry.
        let secs: i64 = conn.ttl(key).await?;
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.hexists(key, field).await?)
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.hvals(key).await?)
    }

    async fn set_nx_px(&self, key: &str, value: &str, hold: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(hold.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}
