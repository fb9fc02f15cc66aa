// src/exec/mod.rs

//! Job execution layer.
//!
//! - [`backend`] provides the `QueueBackend` trait the client hands jobs to,
//!   and the in-process implementation.
//! - [`worker`] performs one delivery: run the job body, record the outcome,
//!   advance outgoing edges under a lock.
//! - [`executor_loop`] owns the pool that drains the in-process queue with
//!   bounded concurrency.

pub mod backend;
pub mod executor_loop;
pub mod worker;

pub use backend::{Completion, Delivery, DeliveryReceiver, InProcessQueue, QueueBackend};
pub use executor_loop::{PoolReport, WorkerPool};
pub use worker::{EdgeAdvance, Worker};
