// src/dag/mod.rs

//! Workflow and job model.
//!
//! - [`job`]: the job record and its timestamp-driven state machine.
//! - [`workflow`]: a persisted DAG of jobs and its derived status.
//! - [`builder`]: declaring jobs and edges, dependency resolution.
//! - [`registry`]: name → implementation lookup for job and workflow types.
//! - [`context`]: what a running job body sees.

pub mod builder;
pub mod context;
pub mod job;
pub mod registry;
pub mod workflow;

pub use builder::{Edge, RunOptions, WorkflowBuilder};
pub use context::{IncomingPayload, JobContext};
pub use job::Job;
pub use registry::{JobFactory, JobType, Perform, Registry, WorkflowDefinition};
pub use workflow::{Workflow, WorkflowRecord};
