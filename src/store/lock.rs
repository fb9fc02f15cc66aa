// src/store/lock.rs

//! Short-lived exclusive lock over a [`KeyValueStore`].
//!
//! `try_acquire` polls `set_nx_px` until it wins or the wait runs out; it
//! never errors on contention, it returns `None`. What to do about a
//! contended lock is the caller's decision (the worker reschedules itself).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::config::LockSection;
use crate::errors::{FlowError, Result};

use super::KeyValueStore;

/// Timing for one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimings {
    pub wait: Duration,
    pub hold: Duration,
    pub retry_interval: Duration,
}

impl From<&LockSection> for LockTimings {
    fn from(section: &LockSection) -> Self {
        Self {
            wait: section.wait(),
            hold: section.hold(),
            retry_interval: section.retry_interval(),
        }
    }
}

/// A held lock. Release it explicitly; if the holder dies the lease expires
/// after `hold`.
#[derive(Debug)]
#[must_use = "a held lock must be released"]
pub struct StoreLock {
    store: Arc<dyn KeyValueStore>,
    key: String,
    token: String,
}

impl StoreLock {
    pub async fn try_acquire(
        store: &Arc<dyn KeyValueStore>,
        key: &str,
        timings: LockTimings,
    ) -> Result<Option<StoreLock>> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + timings.wait;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if store.set_nx_px(key, &token, timings.hold).await? {
                debug!(lock = %key, attempts, "lock acquired");
                return Ok(Some(StoreLock {
                    store: Arc::clone(store),
                    key: key.to_string(),
                    token,
                }));
            }

            if Instant::now() + timings.retry_interval > deadline {
                debug!(lock = %key, attempts, "lock still held after bounded wait");
                return Ok(None);
            }

            tokio::time::sleep(timings.retry_interval).await;
        }
    }

    /// Like [`try_acquire`](Self::try_acquire), but contention is an error.
    pub async fn acquire(
        store: &Arc<dyn KeyValueStore>,
        key: &str,
        timings: LockTimings,
    ) -> Result<StoreLock> {
        Self::try_acquire(store, key, timings)
            .await?
            .ok_or_else(|| FlowError::LockAcquisitionTimeout(key.to_string()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `false` if the lease had already expired and the key was taken
    /// over (or dropped) in the meantime.
    pub async fn release(self) -> Result<bool> {
        let released = self.store.del_if_eq(&self.key, &self.token).await?;
        debug!(lock = %self.key, released, "lock released");
        Ok(released)
    }
}
