#![allow(dead_code)]

use std::sync::Arc;

use safeflow::client::{Client, LinkedRecords};
use safeflow::config::{Configuration, Hooks, RawConfiguration};
use safeflow::dag::Registry;
use safeflow::errors::Result;
use safeflow::exec::{Delivery, DeliveryReceiver, InProcessQueue, Worker, WorkerPool};
use safeflow::monitor::MemoryMonitor;
use safeflow::store::MemoryStore;

use crate::fake_queue::RecordingQueue;
use crate::fixtures;

/// Builder for `Configuration` to simplify test setup.
pub struct ConfigBuilder {
    raw: RawConfiguration,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawConfiguration::default(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.raw.namespace = namespace.to_string();
        self
    }

    pub fn ttl(mut self, ttl: i64) -> Self {
        self.raw.ttl = ttl;
        self
    }

    pub fn silent_fail(mut self, val: bool) -> Self {
        self.raw.silent_fail = val;
        self
    }

    pub fn job_delay(mut self, secs: u64) -> Self {
        self.raw.job_delay = secs;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.raw.concurrency = concurrency;
        self
    }

    /// Short lock timings so contention tests finish quickly.
    pub fn fast_locks(mut self) -> Self {
        self.raw.lock.wait_ms = 50;
        self.raw.lock.retry_interval_ms = 10;
        self.raw.lock.hold_ms = 1_000;
        self.raw.lock.reschedule_delay_ms = 20;
        self
    }

    pub fn build(self) -> Configuration {
        Configuration::try_from(self.raw).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A client over in-memory collaborators, with handles to each of them.
pub struct Harness {
    pub client: Client,
    pub store: MemoryStore,
    pub monitor: MemoryMonitor,
    pub queue: RecordingQueue,
}

impl Harness {
    /// Fixture registry, default configuration.
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.client.clone())
    }

    /// Perform recorded deliveries (ignoring their delays) until none are
    /// left. Returns every delivery with its outcome, in execution order.
    pub async fn drain(&self) -> Vec<(Delivery, Result<()>)> {
        let worker = self.worker();
        let mut performed = Vec::new();
        loop {
            let batch = self.queue.take();
            if batch.is_empty() {
                break;
            }
            for delivery in batch {
                let outcome = worker
                    .perform(&delivery.workflow_id, &delivery.job_name)
                    .await;
                performed.push((delivery, outcome));
            }
        }
        performed
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HarnessBuilder {
    registry: Registry,
    config: Configuration,
    hooks: Hooks,
    linked_records: Option<Arc<dyn LinkedRecords>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            registry: fixtures::registry(),
            config: Configuration::default(),
            hooks: Hooks::default(),
            linked_records: None,
        }
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Adjust the fixture registry in place.
    pub fn with_registry(mut self, f: impl FnOnce(&mut Registry)) -> Self {
        f(&mut self.registry);
        self
    }

    pub fn config(mut self, config: Configuration) -> Self {
        self.config = config;
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn linked_records(mut self, resolver: Arc<dyn LinkedRecords>) -> Self {
        self.linked_records = Some(resolver);
        self
    }

    fn client_over(
        &self,
        store: &MemoryStore,
        monitor: &MemoryMonitor,
        queue: Arc<dyn safeflow::exec::QueueBackend>,
    ) -> Client {
        let client = Client::new(Arc::new(store.clone()), queue, self.registry.clone())
            .with_config(self.config.clone())
            .with_monitor(Arc::new(monitor.clone()))
            .with_hooks(self.hooks.clone());
        match self.linked_records.as_ref() {
            Some(resolver) => client.with_linked_records(Arc::clone(resolver)),
            None => client,
        }
    }

    /// Deliveries are recorded, not performed.
    pub fn build(self) -> Harness {
        let store = MemoryStore::new();
        let monitor = MemoryMonitor::new();
        let queue = RecordingQueue::new();
        let client = self.client_over(&store, &monitor, Arc::new(queue.clone()));
        Harness {
            client,
            store,
            monitor,
            queue,
        }
    }

    /// Deliveries go to an in-process queue; drain it with the returned pool.
    pub fn build_with_pool(self) -> PoolHarness {
        let store = MemoryStore::new();
        let monitor = MemoryMonitor::new();
        let (queue, receiver) = InProcessQueue::channel();
        let client = self.client_over(&store, &monitor, Arc::new(queue));
        PoolHarness {
            client,
            store,
            monitor,
            receiver,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PoolHarness {
    pub client: Client,
    pub store: MemoryStore,
    pub monitor: MemoryMonitor,
    pub receiver: DeliveryReceiver,
}

impl PoolHarness {
    pub fn into_pool(self) -> (Client, MemoryStore, MemoryMonitor, WorkerPool) {
        let pool = WorkerPool::new(self.client.clone(), self.receiver);
        (self.client, self.store, self.monitor, pool)
    }
}
