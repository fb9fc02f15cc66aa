// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Job not found: {job} (workflow {workflow_id})")]
    JobNotFound { workflow_id: String, job: String },

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    #[error("Job '{job}' depends on '{dependency}', which is not part of the workflow")]
    DependencyNotFound { job: String, dependency: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    /// Never surfaced by the worker; a contended edge lock turns into a
    /// delayed redelivery instead.
    #[error("Could not acquire lock: {0}")]
    LockAcquisitionTimeout(String),

    #[error("Job '{job}' failed: {source}")]
    JobFailed {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Monitor store error: {0}")]
    Monitor(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    pub(crate) fn job_not_found(workflow_id: &str, job: &str) -> Self {
        FlowError::JobNotFound {
            workflow_id: workflow_id.to_string(),
            job: job.to_string(),
        }
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for FlowError {
    fn from(err: redis::RedisError) -> Self {
        FlowError::Store(format!("Redis error: {}", err))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;
