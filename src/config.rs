use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::RetryPolicy;
use crate::error::ConfigError;
use crate::types::WorkerId;

/// A capability reference: registry name plus free-form constructor args.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl CapabilityConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub min_workers: usize,
    pub max_rounds: u64,
    pub stop_accuracy: f64,
    pub selector: CapabilityConfig,
    pub aggregator: CapabilityConfig,
    /// Bound on each response-collection phase. `None` waits forever.
    pub response_timeout_secs: Option<f64>,
    /// Bound on waiting for `min_workers` registrations. `None` waits forever.
    pub registration_timeout_secs: Option<f64>,
    pub empty_selection_retry_ms: u64,
    pub max_empty_selection_retries: u32,
    /// Sent to every worker as its argument update after registration.
    pub worker_args: Option<Value>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_rounds: 10,
            stop_accuracy: 0.9,
            selector: CapabilityConfig::named("all"),
            aggregator: CapabilityConfig::named("fedavg"),
            response_timeout_secs: None,
            registration_timeout_secs: None,
            empty_selection_retry_ms: 1_000,
            max_empty_selection_retries: 3,
            worker_args: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn registration_timeout(&self) -> Option<Duration> {
        self.registration_timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn empty_selection_retry(&self) -> Duration {
        Duration::from_millis(self.empty_selection_retry_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_workers == 0 {
            return Err(ConfigError::Invalid("min_workers must be at least 1".to_string()));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.stop_accuracy) {
            return Err(ConfigError::Invalid(format!(
                "stop_accuracy {} outside [0, 1]",
                self.stop_accuracy
            )));
        }
        for (name, value) in [
            ("response_timeout_secs", self.response_timeout_secs),
            ("registration_timeout_secs", self.registration_timeout_secs),
        ] {
            if let Some(secs) = value {
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(ConfigError::Invalid(format!("{} must be positive", name)));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: WorkerId,
    pub trainer: CapabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving `spn.log` and `client_logs/<id>_spn.log`.
    pub log_dir: PathBuf,
    pub model_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            model_path: PathBuf::from("logs/best.model"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub coordinator: CoordinatorConfig,
    pub output: OutputConfig,
    pub retry: RetryPolicy,
    pub workers: Vec<WorkerConfig>,
}

impl ExperimentConfig {
    /// Loads a TOML or YAML file, picked by extension, then applies
    /// environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut config: ExperimentConfig = match extension.as_deref() {
            Some("toml") => toml::from_str(&raw).map_err(|e| parse_error(e.to_string()))?,
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&raw).map_err(|e| parse_error(e.to_string()))?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FEDROUNDS_LOG_DIR") {
            self.output.log_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("FEDROUNDS_MODEL_PATH") {
            self.output.model_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;

        let mut seen = std::collections::HashSet::new();
        for worker in &self.workers {
            if worker.id.trim().is_empty() || worker.id.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "worker id '{}' must be non-empty without whitespace",
                    worker.id
                )));
            }
            if !seen.insert(worker.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate worker id '{}'",
                    worker.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExperimentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coordinator.selector.name, "all");
        assert_eq!(config.coordinator.response_timeout(), None);
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.toml");
        std::fs::write(
            &path,
            r#"
[coordinator]
min_workers = 2
max_rounds = 5
stop_accuracy = 0.95
response_timeout_secs = 2.5
worker_args = { learning_rate = 0.3 }

[coordinator.selector]
name = "rotating"
args = { count = 1 }

[[workers]]
id = "sta1"
trainer = { name = "mean_estimator", args = { dims = 2 } }

[[workers]]
id = "sta2"
trainer = { name = "mean_estimator" }
"#,
        )
        .unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.coordinator.max_rounds, 5);
        assert_eq!(config.coordinator.selector.args, json!({"count": 1}));
        assert_eq!(config.coordinator.aggregator.name, "fedavg");
        assert_eq!(
            config.coordinator.response_timeout(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.coordinator.worker_args, Some(json!({"learning_rate": 0.3})));
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.workers[1].trainer.args, Value::Null);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.yaml");
        std::fs::write(
            &path,
            "coordinator:\n  min_workers: 1\n  stop_accuracy: 0.5\nworkers:\n  - id: a\n    trainer:\n      name: mean_estimator\n",
        )
        .unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.coordinator.min_workers, 1);
        assert_eq!(config.workers[0].id, "a");
    }

    #[test]
    fn test_rejects_invalid_configs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            ExperimentConfig::load(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let mut config = ExperimentConfig::default();
        config.coordinator.min_workers = 0;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.workers = vec![
            WorkerConfig {
                id: "a".to_string(),
                trainer: CapabilityConfig::named("mean_estimator"),
            },
            WorkerConfig {
                id: "a".to_string(),
                trainer: CapabilityConfig::named("mean_estimator"),
            },
        ];
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.coordinator.response_timeout_secs = Some(0.0);
        assert!(config.validate().is_err());
    }
}
