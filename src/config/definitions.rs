// src/config/definitions.rs

//! Graph definition file: the list of workflow types a process expects to
//! run.
//!
//! ```toml
//! workflows = ["IngestWorkflow", "ReportWorkflow"]
//! ```
//!
//! Workflow types are still registered in code; this file lets a deployment
//! assert that every type it depends on was actually registered, see
//! [`Registry::ensure_declared`](crate::dag::Registry::ensure_declared).

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{FlowError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphDefinitions {
    #[serde(default)]
    pub workflows: Vec<String>,
}

pub fn load_definitions(path: impl AsRef<Path>) -> Result<GraphDefinitions> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let defs: GraphDefinitions = toml::from_str(&contents)?;

    for name in defs.workflows.iter() {
        if name.trim().is_empty() {
            return Err(FlowError::ConfigError(format!(
                "{}: workflow names must not be empty",
                path.display()
            )));
        }
    }

    Ok(defs)
}
