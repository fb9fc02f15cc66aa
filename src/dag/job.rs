// src/dag/job.rs

//! A single DAG node: identity, edges by name, parameters, lifecycle
//! timestamps and output.
//!
//! Every predicate is derived from which timestamps are set; there is no
//! separate state enum to keep in sync with the stored record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::client::Client;
use crate::dag::registry::Registry;
use crate::errors::Result;
use crate::types::{now, Timestamp};

/// Separator between type and id in a job name (`"Prepare|3f2c..."`).
pub const NAME_SEPARATOR: char = '|';

/// Field order matches the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub klass: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub incoming: Vec<String>,
    #[serde(default)]
    pub outgoing: Vec<String>,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    #[serde(default)]
    pub enqueued_at: Option<Timestamp>,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub failed_at: Option<Timestamp>,
    #[serde(default = "empty_params", deserialize_with = "params_or_empty")]
    pub params: Value,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub output_payload: Option<Value>,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

fn params_or_empty<'de, D>(deserializer: D) -> std::result::Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => empty_params(),
        Some(v) => v,
    })
}

impl Job {
    pub fn new(workflow_id: impl Into<String>, klass: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            klass: klass.into(),
            queue: None,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            finished_at: None,
            enqueued_at: None,
            started_at: None,
            failed_at: None,
            params: empty_params(),
            workflow_id: workflow_id.into(),
            output_payload: None,
        }
    }

    /// Unique DAG-node identifier: `"{klass}|{id}"`.
    pub fn name(&self) -> String {
        format!("{}{}{}", self.klass, NAME_SEPARATOR, self.id)
    }

    /// Split a job name into `(klass, id)`. Returns `None` for a bare type.
    pub fn split_name(name: &str) -> Option<(&str, &str)> {
        name.split_once(NAME_SEPARATOR)
            .filter(|(klass, id)| !klass.is_empty() && !id.is_empty())
    }

    /// Decode a stored record. The type must be registered.
    pub fn from_record(raw: &str, registry: &Registry) -> Result<Job> {
        let job: Job = serde_json::from_str(raw)?;
        registry.ensure_job(&job.klass)?;
        Ok(job)
    }

    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn output(&mut self, data: Value) {
        self.output_payload = Some(data);
    }

    pub fn enqueue(&mut self) {
        self.enqueued_at = Some(now());
        self.started_at = None;
        self.finished_at = None;
        self.failed_at = None;
    }

    pub fn start(&mut self) {
        self.started_at = Some(now());
        self.failed_at = None;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(now());
    }

    pub fn fail(&mut self) {
        let ts = now();
        self.finished_at = Some(ts);
        self.failed_at = Some(ts);
    }

    pub fn is_enqueued(&self) -> bool {
        self.enqueued_at.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    pub fn is_succeeded(&self) -> bool {
        self.is_finished() && !self.is_failed()
    }

    pub fn is_running(&self) -> bool {
        self.is_started() && !self.is_finished()
    }

    /// Source node of the DAG.
    pub fn has_no_dependencies(&self) -> bool {
        self.incoming.is_empty()
    }

    /// Readiness given an already-computed answer for the parents.
    pub fn is_ready_given(&self, parents_succeeded: bool) -> bool {
        !self.is_running()
            && !self.is_enqueued()
            && !self.is_finished()
            && !self.is_failed()
            && parents_succeeded
    }

    /// Whether this job may be enqueued now.
    ///
    /// Parents are read from the store through `client`, never from in-memory
    /// copies: they are usually finished by other worker invocations.
    pub async fn is_ready_to_start(&self, client: &Client) -> Result<bool> {
        if !self.is_ready_given(true) {
            return Ok(false);
        }
        for name in self.incoming.iter() {
            let parent = client.find_job(&self.workflow_id, name).await?;
            if !parent.is_succeeded() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
