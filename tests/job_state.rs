// tests/job_state.rs

mod common;
use crate::common::TestResult;

use serde_json::{json, Value};

use safeflow::dag::{Job, Registry};
use safeflow::errors::FlowError;
use safeflow_test_utils::fixtures;

fn job() -> Job {
    Job::new("wf-1", "Prepare", "abc")
}

#[test]
fn test_name_joins_type_and_id() {
    assert_eq!(job().name(), "Prepare|abc");
    assert_eq!(Job::split_name("Prepare|abc"), Some(("Prepare", "abc")));
    assert_eq!(Job::split_name("Prepare"), None);
    assert_eq!(Job::split_name("|abc"), None);
}

#[test]
fn test_fail_sets_finished_and_failed() {
    let mut job = job();
    job.fail();

    assert!(job.is_finished());
    assert!(job.is_failed());
    assert!(!job.is_succeeded());
    assert_eq!(job.finished_at, job.failed_at);
}

#[test]
fn test_finish_marks_success() {
    let mut job = job();
    job.start();
    assert!(job.is_running());

    job.finish();
    assert!(job.is_finished());
    assert!(!job.is_failed());
    assert!(job.is_succeeded());
    assert!(!job.is_running());
}

#[test]
fn test_enqueue_resets_everything_else() {
    let mut job = job();
    job.start();
    job.fail();

    job.enqueue();
    assert!(job.is_enqueued());
    assert_eq!(job.started_at, None);
    assert_eq!(job.finished_at, None);
    assert_eq!(job.failed_at, None);
}

#[test]
fn test_start_clears_failure() {
    let mut job = job();
    job.fail();
    job.start();

    assert!(job.is_started());
    assert!(!job.is_failed());
}

#[test]
fn test_ready_given_requires_untouched_job() {
    let mut job = job();
    assert!(job.is_ready_given(true));
    assert!(!job.is_ready_given(false));

    job.enqueue();
    assert!(!job.is_ready_given(true));

    let mut finished = self::job();
    finished.finish();
    assert!(!finished.is_ready_given(true));
}

#[test]
fn test_record_uses_expected_fields() -> TestResult {
    let mut job = job();
    job.queue = Some("critical".into());
    job.incoming = vec!["Other|1".into()];
    job.params = json!({ "some_id": 4 });
    job.output(json!({ "ok": true }));

    let value: Value = serde_json::from_str(&job.to_record()?)?;
    let object = value.as_object().ok_or("record is not an object")?;

    for key in [
        "id",
        "klass",
        "queue",
        "incoming",
        "outgoing",
        "finished_at",
        "enqueued_at",
        "started_at",
        "failed_at",
        "params",
        "workflow_id",
        "output_payload",
    ] {
        assert!(object.contains_key(key), "missing field {key}");
    }
    assert_eq!(object["klass"], json!("Prepare"));
    assert_eq!(object["finished_at"], Value::Null);
    assert_eq!(object["output_payload"], json!({ "ok": true }));

    let decoded = Job::from_record(&job.to_record()?, &fixtures::registry())?;
    assert_eq!(decoded, job);
    Ok(())
}

#[test]
fn test_missing_fields_take_defaults() -> TestResult {
    let job = Job::from_record(r#"{"id":"1","klass":"Prepare"}"#, &fixtures::registry())?;

    assert_eq!(job.params, json!({}));
    assert!(job.incoming.is_empty());
    assert!(job.outgoing.is_empty());
    assert!(job.queue.is_none());
    assert!(!job.is_enqueued());
    Ok(())
}

#[test]
fn test_null_params_become_empty_object() -> TestResult {
    let job = Job::from_record(
        r#"{"id":"1","klass":"Prepare","params":null}"#,
        &fixtures::registry(),
    )?;
    assert_eq!(job.params, json!({}));
    Ok(())
}

#[test]
fn test_unregistered_type_is_rejected() {
    let raw = job().to_record().unwrap();

    match Job::from_record(&raw, &Registry::new()) {
        Err(FlowError::UnknownJobType(name)) => assert_eq!(name, "Prepare"),
        other => panic!("Expected UnknownJobType, got: {:?}", other),
    }
}
