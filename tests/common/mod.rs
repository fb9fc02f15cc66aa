#![allow(dead_code)]

use std::error::Error;

pub use safeflow_test_utils::builders::{ConfigBuilder, Harness, HarnessBuilder};
pub use safeflow_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;
