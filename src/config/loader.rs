// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Configuration, RawConfiguration};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated form.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for
/// anything that will actually run workflows.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfiguration> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfiguration = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks concurrency, namespace, TTL and lock timings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Configuration> {
    let raw_config = load_from_path(&path)?;
    let config = Configuration::try_from(raw_config)?;
    Ok(config)
}

/// Default config path: `SAFEFLOW_CONFIG` if set, else `Safeflow.toml` in
/// the current working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("SAFEFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Safeflow.toml"))
}
