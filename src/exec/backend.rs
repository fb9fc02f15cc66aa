// src/exec/backend.rs

//! Pluggable queue backend abstraction.
//!
//! The [`Client`](crate::client::Client) hands jobs to workers through a
//! `QueueBackend` instead of a concrete queue. A delivery is only
//! `(workflow id, job name)` plus routing: workers always reload state from
//! the store, so deliveries may be duplicated or reordered freely.
//!
//! - [`InProcessQueue`] feeds a [`WorkerPool`](crate::exec::WorkerPool)
//!   running in the same process.
//! - Tests can provide their own `QueueBackend` that, for example, records
//!   deliveries and lets the test drive the worker by hand.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{FlowError, Result};

/// One request to run `job_name` of `workflow_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub workflow_id: String,
    pub job_name: String,
    /// Do not hand this to a worker before `delay` has passed.
    pub delay: Option<Duration>,
    /// Named queue requested by the job, if any.
    pub queue: Option<String>,
}

/// Trait abstracting how deliveries reach workers.
pub trait QueueBackend: Send + Sync {
    fn enqueue(&self, delivery: Delivery) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Unbounded in-process queue.
///
/// Tracks deliveries that are queued, delayed or being performed, so a
/// consumer can tell when the system has gone idle.
#[derive(Debug, Clone)]
pub struct InProcessQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    outstanding: Arc<AtomicUsize>,
}

/// Consuming half of an [`InProcessQueue`].
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::UnboundedReceiver<Delivery>,
    outstanding: Arc<AtomicUsize>,
}

impl InProcessQueue {
    pub fn channel() -> (InProcessQueue, DeliveryReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outstanding = Arc::new(AtomicUsize::new(0));
        (
            InProcessQueue {
                tx,
                outstanding: Arc::clone(&outstanding),
            },
            DeliveryReceiver { rx, outstanding },
        )
    }
}

impl QueueBackend for InProcessQueue {
    fn enqueue(&self, delivery: Delivery) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();
        let outstanding = Arc::clone(&self.outstanding);

        Box::pin(async move {
            if tx.is_closed() {
                return Err(FlowError::Queue("delivery channel closed".to_string()));
            }
            outstanding.fetch_add(1, Ordering::SeqCst);

            match delivery.delay {
                Some(delay) if !delay.is_zero() => {
                    debug!(job = %delivery.job_name, ?delay, "delayed delivery scheduled");
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if tx.send(delivery).is_err() {
                            outstanding.fetch_sub(1, Ordering::SeqCst);
                        }
                    });
                    Ok(())
                }
                _ => tx.send(delivery).map_err(|_| {
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                    FlowError::Queue("delivery channel closed".to_string())
                }),
            }
        })
    }
}

impl DeliveryReceiver {
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Deliveries queued, delayed or not yet marked complete.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Handle used by a worker task to mark its delivery complete.
    pub fn completion(&self) -> Completion {
        Completion {
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

/// Marks one delivery as fully handled.
#[derive(Debug)]
#[must_use]
pub struct Completion {
    outstanding: Arc<AtomicUsize>,
}

impl Completion {
    pub fn complete(self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
