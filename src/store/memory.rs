// src/store/memory.rs

//! In-process [`KeyValueStore`].
//!
//! ## Limitations
//! - Not persistent (state is lost on restart)
//! - Not distributed (one process only)
//! - Expired keys are treated as absent on read and purged on the next write

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::errors::{FlowError, Result};

use super::KeyValueStore;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every key. Handy between test cases sharing one store.
    pub async fn flush(&self) {
        self.entries.write().await.clear();
    }

    fn purge(entries: &mut HashMap<String, Entry>) {
        entries.retain(|_, entry| !entry.is_expired());
    }
}

fn wrong_type(key: &str) -> FlowError {
    FlowError::Store(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                Value::Hash(_) => Err(wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        Self::purge(&mut entries);
        let expires_at = entries.get(key).and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired()))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Self::purge(&mut entries);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn persist(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = None;
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let entries = self.entries.read().await;
        let remaining = entries
            .get(key)
            .filter(|e| !e.is_expired())
            .and_then(|e| e.expires_at)
            .map(|exp| exp.saturating_duration_since(Instant::now()));

        Ok(remaining.map(|d| Duration::from_secs(d.as_secs_f64().ceil() as u64)))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                Value::Hash(h) => Ok(h.get(field).cloned()),
                Value::Str(_) => Err(wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        Self::purge(&mut entries);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(BTreeMap::new())));
        match &mut entry.value {
            Value::Hash(h) => {
                h.insert(field.to_string(), value.to_string());
                Ok(())
            }
            Value::Str(_) => Err(wrong_type(key)),
        }
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self.hget(key, field).await?.is_some())
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                Value::Hash(h) => Ok(h.values().cloned().collect()),
                Value::Str(_) => Err(wrong_type(key)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn set_nx_px(&self, key: &str, value: &str, hold: Duration) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Self::purge(&mut entries);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + hold),
            },
        );
        Ok(true)
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let matches = matches!(
            entries.get(key),
            Some(Entry { value: Value::Str(s), .. }) if s == value
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}
