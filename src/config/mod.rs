// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`]: the TOML-backed data model plus non-serializable [`Hooks`].
//! - [`loader`]: reads a config file from disk.
//! - [`validate`]: checks basic invariants (`TryFrom<RawConfiguration>`).
//! - [`definitions`]: the graph definition file listing workflow types.

pub mod definitions;
pub mod loader;
pub mod model;
pub mod validate;

pub use definitions::{load_definitions, GraphDefinitions};
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ttl_from_secs, Configuration, ErrorMonitor, Hooks, LockSection, MonitorCallback,
    RawConfiguration,
};
