//! Full in-process experiment, then trace reconstruction over its logs.

use serde_json::json;

use fedrounds::capabilities::Registry;
use fedrounds::config::{CapabilityConfig, WorkerConfig};
use fedrounds::simulation::run_experiment;
use fedrounds::storage::BestModel;
use fedrounds::trace;
use fedrounds::types::Decision;
use fedrounds::ExperimentConfig;

fn experiment(dir: &std::path::Path) -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.coordinator.min_workers = 3;
    config.coordinator.max_rounds = 3;
    config.coordinator.stop_accuracy = 1.0;
    config.coordinator.response_timeout_secs = Some(5.0);
    config.coordinator.worker_args = Some(json!({"learning_rate": 0.4}));
    config.output.log_dir = dir.join("logs");
    config.output.model_path = dir.join("best.json");
    config.workers = (1..=3)
        .map(|i| WorkerConfig {
            id: format!("sta{}", i),
            trainer: CapabilityConfig {
                name: "mean_estimator".to_string(),
                args: json!({"dims": 3, "samples": 16, "seed": i}),
            },
        })
        .collect();
    config
}

#[tokio::test]
async fn test_simulated_experiment_leaves_reconstructable_logs() {
    let dir = tempfile::tempdir().unwrap();
    let config = experiment(dir.path());
    let report = run_experiment(&config, &Registry::with_builtins())
        .await
        .unwrap();

    assert_eq!(report.experiment.decision, Decision::StopRounds);
    assert_eq!(report.experiment.rounds.len(), 3);
    assert_eq!(report.workers.len(), 3);
    for round in &report.experiment.rounds {
        assert_eq!(round.trained.len(), 3);
        assert!(round.mean_accuracy.is_some());
    }

    let accuracies: Vec<f64> = report
        .experiment
        .rounds
        .iter()
        .filter_map(|r| r.mean_accuracy)
        .collect();
    assert!(accuracies[2] > accuracies[0]);

    let saved: BestModel =
        serde_json::from_slice(&std::fs::read(&config.output.model_path).unwrap()).unwrap();
    assert_eq!(saved.round, 3);
    assert_eq!(saved.weights[0].len(), 3);

    let traces = trace::reconstruct_dir(&report.log_dir).unwrap();
    assert_eq!(traces.server.len(), 3);
    assert!(traces.server.iter().all(|row| row.t_compute.is_some()));
    assert_eq!(traces.clients.len(), 9);
    assert!(traces
        .clients
        .iter()
        .all(|row| row.selected == Some(true) && row.trained == Some(true)));
    assert_eq!(traces.arrivals.arrivals.len(), 3);
    assert_eq!(traces.arrivals.min_workers, Some(3));
}

#[tokio::test]
async fn test_invalid_trainer_name_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = experiment(dir.path());
    config.workers[0].trainer.name = "resnet".to_string();

    let err = run_experiment(&config, &Registry::with_builtins())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sta1"));
}

#[tokio::test]
async fn test_too_few_workers_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = experiment(dir.path());
    config.workers.truncate(2);

    assert!(run_experiment(&config, &Registry::with_builtins())
        .await
        .is_err());
    assert!(!config.output.log_dir.exists());
}

#[test]
fn test_demo_config_builds() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/experiment.toml");
    let config = ExperimentConfig::load(&path).unwrap();
    assert_eq!(config.workers.len(), 3);
    assert_eq!(config.retry.max_retries, 3);

    let registry = Registry::with_builtins();
    assert!(registry
        .selector(&config.coordinator.selector.name, &config.coordinator.selector.args)
        .is_ok());
    for worker in &config.workers {
        assert!(registry
            .trainer(&worker.trainer.name, &worker.id, &worker.trainer.args)
            .is_ok());
    }
}
