// src/config/model.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::monitor::JobCounters;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// concurrency = 5
/// namespace = "safe"
/// redis_url = "redis://localhost:6379"
/// graph_definition_file = "Safeflow.graph.toml"
/// ttl = -1
/// job_delay = 0
/// silent_fail = false
///
/// [lock]
/// wait_ms = 3000
/// hold_ms = 10000
/// ```
///
/// Every key is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfiguration {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_graph_definition_file")]
    pub graph_definition_file: PathBuf,

    /// Default expiry in seconds for finished workflows; `-1` keeps them
    /// forever.
    #[serde(default = "default_ttl")]
    pub ttl: i64,

    /// Delay in seconds applied to every job hand-off.
    #[serde(default)]
    pub job_delay: u64,

    /// Swallow job errors after the job has been marked failed.
    #[serde(default)]
    pub silent_fail: bool,

    #[serde(default)]
    pub lock: LockSection,
}

impl Default for RawConfiguration {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            namespace: default_namespace(),
            redis_url: default_redis_url(),
            graph_definition_file: default_graph_definition_file(),
            ttl: default_ttl(),
            job_delay: 0,
            silent_fail: false,
            lock: LockSection::default(),
        }
    }
}

/// `[lock]` section: timing of the per-edge enqueue lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LockSection {
    /// How long a worker keeps trying before giving up and rescheduling.
    #[serde(default = "default_lock_wait_ms")]
    pub wait_ms: u64,

    /// Lease on the lock; a crashed holder stops blocking others after this.
    #[serde(default = "default_lock_hold_ms")]
    pub hold_ms: u64,

    #[serde(default = "default_lock_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Delay of the self-redelivery issued when the lock stays contended.
    #[serde(default = "default_reschedule_delay_ms")]
    pub reschedule_delay_ms: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            wait_ms: default_lock_wait_ms(),
            hold_ms: default_lock_hold_ms(),
            retry_interval_ms: default_lock_retry_interval_ms(),
            reschedule_delay_ms: default_reschedule_delay_ms(),
        }
    }
}

impl LockSection {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_millis(self.reschedule_delay_ms)
    }
}

fn default_concurrency() -> usize {
    5
}

fn default_namespace() -> String {
    "safe".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_graph_definition_file() -> PathBuf {
    PathBuf::from("Safeflow.graph.toml")
}

fn default_ttl() -> i64 {
    -1
}

fn default_lock_wait_ms() -> u64 {
    3_000
}

fn default_lock_hold_ms() -> u64 {
    10_000
}

fn default_lock_retry_interval_ms() -> u64 {
    500
}

fn default_reschedule_delay_ms() -> u64 {
    2_000
}

/// Validated configuration.
///
/// Obtain one through [`load_and_validate`](crate::config::load_and_validate),
/// `Configuration::try_from(raw)` or `Configuration::default()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub concurrency: usize,
    pub namespace: String,
    pub redis_url: String,
    pub graph_definition_file: PathBuf,
    pub ttl: i64,
    pub job_delay: u64,
    pub silent_fail: bool,
    pub lock: LockSection,
}

impl Configuration {
    pub(crate) fn new_unchecked(raw: RawConfiguration) -> Self {
        Self {
            concurrency: raw.concurrency,
            namespace: raw.namespace,
            redis_url: raw.redis_url,
            graph_definition_file: raw.graph_definition_file,
            ttl: raw.ttl,
            job_delay: raw.job_delay,
            silent_fail: raw.silent_fail,
            lock: raw.lock,
        }
    }

    /// Default TTL as a duration, or `None` when workflows never expire.
    pub fn default_ttl(&self) -> Option<Duration> {
        ttl_from_secs(self.ttl)
    }

    pub fn job_delay(&self) -> Option<Duration> {
        (self.job_delay > 0).then(|| Duration::from_secs(self.job_delay))
    }

    /// Canonical path of the graph definition file, if it exists.
    pub fn graph_definition_path(&self) -> Option<PathBuf> {
        std::fs::canonicalize(&self.graph_definition_file).ok()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::new_unchecked(RawConfiguration::default())
    }
}

/// Interprets a TTL in seconds; zero or negative means "never expire".
pub fn ttl_from_secs(secs: i64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs as u64))
}

/// Called with the job's error whenever a job body fails.
pub type ErrorMonitor = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Called with the job's Monitor Store counters after every worker invocation.
pub type MonitorCallback = Arc<dyn Fn(Option<&JobCounters>) + Send + Sync>;

/// Callback options. Not part of the TOML file.
#[derive(Clone, Default)]
pub struct Hooks {
    pub error_monitor: Option<ErrorMonitor>,
    pub monitor_callback: Option<MonitorCallback>,
}

impl Hooks {
    pub fn with_error_monitor(
        mut self,
        f: impl Fn(&anyhow::Error) + Send + Sync + 'static,
    ) -> Self {
        self.error_monitor = Some(Arc::new(f));
        self
    }

    pub fn with_monitor_callback(
        mut self,
        f: impl Fn(Option<&JobCounters>) + Send + Sync + 'static,
    ) -> Self {
        self.monitor_callback = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("error_monitor", &self.error_monitor.is_some())
            .field("monitor_callback", &self.monitor_callback.is_some())
            .finish()
    }
}
