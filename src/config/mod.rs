// src/config/mod.rs

//! Configuration loading and validation for runwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate value ranges and turn a raw file into a `ConfigFile`
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_from_path, load_or_default};
pub use model::{
    ConfigFile, ProgressSection, RawConfigFile, ScriptSection, SupervisorSection,
};
