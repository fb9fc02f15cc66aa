use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use safeflow::errors::Result;
use safeflow::exec::{Delivery, QueueBackend};

/// A fake queue that records every delivery and runs nothing.
///
/// Tests drive the worker by hand from the recorded deliveries.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered and not yet taken.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.deliveries.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Job names of the recorded deliveries, in order.
    pub fn job_names(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.job_name.clone())
            .collect()
    }
}

impl QueueBackend for RecordingQueue {
    fn enqueue(&self, delivery: Delivery) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let deliveries = Arc::clone(&self.deliveries);

        Box::pin(async move {
            deliveries.lock().unwrap().push(delivery);
            Ok(())
        })
    }
}
