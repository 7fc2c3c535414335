//! Configuration and artifact storage.

pub mod config;
pub mod file_handler;

pub use config::{ConfigError, TrackerConfig};
pub use file_handler::{ArtifactStore, FileArtifactStore};
