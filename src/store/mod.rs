// src/store/mod.rs

//! Key-value store abstraction.
//!
//! All workflow state lives behind [`KeyValueStore`]; nothing is shared
//! between worker invocations in memory. The trait covers exactly the
//! operations the [`Client`](crate::client::Client) and [`StoreLock`] need:
//! plain string keys for workflow records, hashes for job records, TTLs, and
//! an atomic set-if-absent / compare-and-delete pair for locks.
//!
//! - [`memory::MemoryStore`] keeps everything in process (tests, single node).
//! - [`redis::RedisStore`] is the production backend (feature `redis-backend`).

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

pub mod lock;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use lock::StoreLock;
pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a string key. An existing TTL is kept.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key of any kind. Missing keys are ignored.
    async fn del(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// All live keys starting with `prefix`, in no particular order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Set a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remove any TTL from a key.
    async fn persist(&self, key: &str) -> Result<()>;

    /// Remaining TTL in whole seconds (rounded up), or `None` when the key is
    /// absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool>;

    async fn hvals(&self, key: &str) -> Result<Vec<String>>;

    /// Set `key` to `value` with a lease of `hold`, only if it does not exist.
    async fn set_nx_px(&self, key: &str, value: &str, hold: Duration) -> Result<bool>;

    /// Delete `key` only if it currently holds `value`.
    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool>;
}

impl std::fmt::Debug for dyn KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyValueStore")
    }
}
