//! Support library for the `dbinventory-agent` binary.
//!
//! Settings loading lives here so it can be tested without spawning the
//! binary.

pub mod settings;

pub use settings::{AgentSettings, CONFIG_FILE_NAME, DEFAULT_CONFIG_DIR};
