// src/config/validate.rs

use crate::config::model::{Configuration, RawConfiguration};
use crate::errors::{FlowError, Result};

impl TryFrom<RawConfiguration> for Configuration {
    type Error = FlowError;

    fn try_from(raw: RawConfiguration) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(Configuration::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfiguration) -> Result<()> {
    validate_concurrency(cfg)?;
    validate_namespace(cfg)?;
    validate_ttl(cfg)?;
    validate_lock(cfg)?;
    Ok(())
}

fn validate_concurrency(cfg: &RawConfiguration) -> Result<()> {
    if cfg.concurrency == 0 {
        return Err(FlowError::ConfigError(
            "concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

const GLOB_CHARS: [char; 5] = ['*', '?', '[', ']', '\\'];

fn validate_namespace(cfg: &RawConfiguration) -> Result<()> {
    if cfg.namespace.trim().is_empty() {
        return Err(FlowError::ConfigError(
            "namespace must not be empty".to_string(),
        ));
    }
    // Keys are dot-separated; a dot in the namespace would make
    // `{ns}.workflows.*` ambiguous.
    if cfg.namespace.contains('.') {
        return Err(FlowError::ConfigError(format!(
            "namespace '{}' must not contain '.'",
            cfg.namespace
        )));
    }
    // Key listing matches `{ns}.` as a glob prefix.
    if let Some(c) = cfg.namespace.chars().find(|c| GLOB_CHARS.contains(c)) {
        return Err(FlowError::ConfigError(format!(
            "namespace '{}' must not contain glob character '{c}'",
            cfg.namespace
        )));
    }
    Ok(())
}

fn validate_ttl(cfg: &RawConfiguration) -> Result<()> {
    if cfg.ttl != -1 && cfg.ttl <= 0 {
        return Err(FlowError::ConfigError(format!(
            "ttl must be -1 (never expire) or a positive number of seconds (got {})",
            cfg.ttl
        )));
    }
    Ok(())
}

fn validate_lock(cfg: &RawConfiguration) -> Result<()> {
    let lock = &cfg.lock;
    for (key, value) in [
        ("lock.wait_ms", lock.wait_ms),
        ("lock.hold_ms", lock.hold_ms),
        ("lock.retry_interval_ms", lock.retry_interval_ms),
        ("lock.reschedule_delay_ms", lock.reschedule_delay_ms),
    ] {
        if value == 0 {
            return Err(FlowError::ConfigError(format!("{key} must be >= 1 (got 0)")));
        }
    }

    if lock.retry_interval_ms > lock.wait_ms {
        return Err(FlowError::ConfigError(format!(
            "lock.retry_interval_ms ({}) must not exceed lock.wait_ms ({})",
            lock.retry_interval_ms, lock.wait_ms
        )));
    }

    Ok(())
}
