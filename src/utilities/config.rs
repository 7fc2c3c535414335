//! Tracker and server configuration.
//!
//! Values come from built-in defaults, then an optional YAML file named by
//! `TASKMASTER_CONFIG`, then environment variables:
//! - `TASKMASTER_AUTO_APPROVAL_THRESHOLD` - Confidence in `[0, 1]` at which approval is AUTO. Defaults to `0.75`.
//! - `TASKMASTER_ARTIFACTS_DIR` - Directory for request snapshots and notes. Defaults to `./taskmaster-artifacts`.
//! - `TASKMASTER_EVENT_POLICY` - `overwrite` or `reject_terminal`. Defaults to `overwrite`.
//! - `HOST` - Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Server port. Defaults to `8080`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tracker::scoring::DEFAULT_AUTO_DECISION_THRESHOLD;
use crate::tracker::{EventOverwritePolicy, TaskMaster};

pub const CONFIG_PATH_VAR: &str = "TASKMASTER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Confidence at or above which approvals are recorded as AUTO.
    pub auto_approval_threshold: f64,

    pub artifacts_dir: PathBuf,

    pub event_policy: EventOverwritePolicy,

    pub host: String,

    pub port: u16,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            auto_approval_threshold: DEFAULT_AUTO_DECISION_THRESHOLD,
            artifacts_dir: PathBuf::from("./taskmaster-artifacts"),
            event_policy: EventOverwritePolicy::Overwrite,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl TrackerConfig {
    /// Load from the process environment, reading the YAML file named by
    /// `TASKMASTER_CONFIG` first when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(Path::new(&path))?,
            _ => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("TASKMASTER_AUTO_APPROVAL_THRESHOLD") {
            self.auto_approval_threshold = raw.trim().parse().map_err(|_| {
                ConfigError::InvalidValue("TASKMASTER_AUTO_APPROVAL_THRESHOLD".to_string(), raw.clone())
            })?;
        }
        if let Some(dir) = lookup("TASKMASTER_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("TASKMASTER_EVENT_POLICY") {
            self.event_policy = raw.parse().map_err(|_| {
                ConfigError::InvalidValue("TASKMASTER_EVENT_POLICY".to_string(), raw.clone())
            })?;
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(raw) = lookup("PORT") {
            self.port = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string(), raw.clone()))?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.auto_approval_threshold) {
            return Err(ConfigError::InvalidValue(
                "auto_approval_threshold".to_string(),
                self.auto_approval_threshold.to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// A fresh tracker using this threshold and event policy.
    pub fn build_tracker(&self) -> TaskMaster {
        TaskMaster::new()
            .with_auto_decision_threshold(self.auto_approval_threshold)
            .with_event_policy(self.event_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default().with_overrides(lookup(&[])).unwrap();
        assert_eq!(config.auto_approval_threshold, 0.75);
        assert_eq!(config.event_policy, EventOverwritePolicy::Overwrite);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_env_overrides() {
        let config = TrackerConfig::default()
            .with_overrides(lookup(&[
                ("TASKMASTER_AUTO_APPROVAL_THRESHOLD", "0.9"),
                ("TASKMASTER_EVENT_POLICY", "reject_terminal"),
                ("TASKMASTER_ARTIFACTS_DIR", "/var/lib/taskmaster"),
                ("HOST", "0.0.0.0"),
                ("PORT", "9000"),
            ]))
            .unwrap();
        assert_eq!(config.auto_approval_threshold, 0.9);
        assert_eq!(config.event_policy, EventOverwritePolicy::RejectTerminal);
        assert_eq!(config.artifacts_dir, PathBuf::from("/var/lib/taskmaster"));
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");

        let tracker = config.build_tracker();
        assert_eq!(tracker.auto_decision_threshold(), 0.9);
        assert_eq!(tracker.event_policy(), EventOverwritePolicy::RejectTerminal);
    }

    #[test]
    fn test_invalid_values() {
        let err = TrackerConfig::default()
            .with_overrides(lookup(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key, _) if key == "PORT"));

        assert!(TrackerConfig::default()
            .with_overrides(lookup(&[("TASKMASTER_AUTO_APPROVAL_THRESHOLD", "1.5")]))
            .is_err());
        assert!(TrackerConfig::default()
            .with_overrides(lookup(&[("TASKMASTER_EVENT_POLICY", "ignore")]))
            .is_err());
    }

    #[test]
    fn test_yaml_file_with_partial_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskmaster.yaml");
        std::fs::write(&path, "auto_approval_threshold: 0.6\nevent_policy: reject_terminal\n").unwrap();

        let config = TrackerConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.auto_approval_threshold, 0.6);
        assert_eq!(config.event_policy, EventOverwritePolicy::RejectTerminal);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_yaml_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(
            TrackerConfig::from_yaml_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "port: [not, a, number]\n").unwrap();
        assert!(matches!(
            TrackerConfig::from_yaml_file(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }
}
