// src/lib.rs

//! Durable DAG workflow engine.
//!
//! A workflow is a directed acyclic graph of jobs persisted in a key-value
//! store. Workers execute one job per delivery, record the outcome, and
//! enqueue children whose parents have all succeeded. Edge advancement is
//! serialised by a per-child store lock, so a child with several parents is
//! enqueued once even when the parents finish concurrently.

pub mod client;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod monitor;
pub mod store;
pub mod types;

pub use client::{Client, LinkedRecords, WorkflowFilter};
pub use dag::{
    IncomingPayload, Job, JobContext, JobType, Perform, Registry, RunOptions, Workflow,
    WorkflowBuilder, WorkflowDefinition,
};
pub use errors::{FlowError, Result};
pub use exec::{Delivery, InProcessQueue, QueueBackend, Worker, WorkerPool};
pub use types::{RecordRef, WorkflowStatus};
