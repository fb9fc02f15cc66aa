// src/exec/executor_loop.rs

//! Worker pool draining an [`InProcessQueue`](crate::exec::InProcessQueue).

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::client::Client;
use crate::errors::Result;
use crate::exec::backend::{Delivery, DeliveryReceiver};
use crate::exec::worker::Worker;

/// Totals for one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub performed: usize,
    /// Deliveries whose `perform` returned an error, with the error message.
    pub failed: Vec<(Delivery, String)>,
}

/// Runs up to `concurrency` worker invocations at once.
///
/// A failed delivery is logged and reported; the in-process queue does not
/// retry it.
pub struct WorkerPool {
    worker: Worker,
    receiver: DeliveryReceiver,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Concurrency comes from the client's configuration.
    pub fn new(client: Client, receiver: DeliveryReceiver) -> Self {
        let concurrency = client.config().concurrency.max(1);
        Self {
            worker: Worker::new(client),
            receiver,
            permits: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Run until no delivery is queued, delayed or in flight.
    pub async fn run_until_idle(self) -> Result<PoolReport> {
        self.run_loop(true).await
    }

    /// Run until every [`InProcessQueue`](crate::exec::InProcessQueue) handle
    /// is dropped.
    pub async fn run(self) -> Result<PoolReport> {
        self.run_loop(false).await
    }

    async fn run_loop(mut self, exit_when_idle: bool) -> Result<PoolReport> {
        info!(concurrency = self.permits.available_permits(), "worker pool started");

        let mut report = PoolReport::default();
        let mut tasks: JoinSet<(Delivery, Result<()>)> = JoinSet::new();

        loop {
            if exit_when_idle && tasks.is_empty() && self.receiver.outstanding() == 0 {
                break;
            }

            tokio::select! {
                delivery = self.receiver.recv() => {
                    let Some(delivery) = delivery else {
                        break;
                    };
                    self.spawn_delivery(&mut tasks, delivery).await?;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let (delivery, outcome) = joined
                        .map_err(|e| anyhow::anyhow!("worker task panicked: {e}"))?;
                    report.performed += 1;
                    if let Err(err) = outcome {
                        error!(
                            workflow = %delivery.workflow_id,
                            job = %delivery.job_name,
                            error = %err,
                            "delivery failed"
                        );
                        report.failed.push((delivery, err.to_string()));
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (delivery, outcome) =
                joined.map_err(|e| anyhow::anyhow!("worker task panicked: {e}"))?;
            report.performed += 1;
            if let Err(err) = outcome {
                report.failed.push((delivery, err.to_string()));
            }
        }

        info!(
            performed = report.performed,
            failed = report.failed.len(),
            "worker pool finished"
        );
        Ok(report)
    }

    async fn spawn_delivery(
        &self,
        tasks: &mut JoinSet<(Delivery, Result<()>)>,
        delivery: Delivery,
    ) -> Result<()> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("worker pool semaphore closed: {e}"))?;
        let worker = self.worker.clone();
        let completion = self.receiver.completion();

        debug!(workflow = %delivery.workflow_id, job = %delivery.job_name, "delivery picked up");
        tasks.spawn(async move {
            let outcome = worker
                .perform(&delivery.workflow_id, &delivery.job_name)
                .await;
            completion.complete();
            drop(permit);
            (delivery, outcome)
        });
        Ok(())
    }
}
