//! In-process experiment: one coordinator and every configured worker
//! exchanging messages over a [`MemoryBus`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::capabilities::Registry;
use crate::channel::{Channel, MemoryBus};
use crate::config::ExperimentConfig;
use crate::coordinator::{Coordinator, ExperimentSummary};
use crate::event_log::EventLog;
use crate::storage::FileModelStore;
use crate::trace::LogSet;
use crate::worker::{WorkerAgent, WorkerSummary};

const WORKER_SHUTDOWN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub experiment: ExperimentSummary,
    pub workers: Vec<WorkerSummary>,
    pub log_dir: PathBuf,
    pub model_path: PathBuf,
}

pub async fn run_experiment(config: &ExperimentConfig, registry: &Registry) -> Result<SimulationReport> {
    config.validate()?;
    if config.workers.len() < config.coordinator.min_workers {
        anyhow::bail!(
            "{} workers configured but the coordinator waits for {}",
            config.workers.len(),
            config.coordinator.min_workers
        );
    }
    let log_dir = config.output.log_dir.clone();
    let bus = MemoryBus::new();
    let channel: Arc<dyn Channel> = Arc::new(bus);

    let coordinator_log = LogSet::coordinator_log_path(&log_dir);
    let events = EventLog::file(&coordinator_log)
        .with_context(|| format!("Failed to open {}", coordinator_log.display()))?;
    let store = Arc::new(FileModelStore::new(&config.output.model_path));
    let coordinator = Coordinator::from_registry(
        config.coordinator.clone(),
        registry,
        Arc::clone(&channel),
        store,
    )?
    .with_events(events)
    .with_retry(config.retry.clone());
    let coordinator = Arc::new(coordinator);

    let mut agents = Vec::new();
    for worker in &config.workers {
        let trainer = registry
            .trainer(&worker.trainer.name, &worker.id, &worker.trainer.args)
            .with_context(|| format!("Failed to build trainer for {}", worker.id))?;
        let path = LogSet::worker_log_path(&log_dir, &worker.id);
        let events = EventLog::file(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        agents.push(
            WorkerAgent::new(worker.id.clone(), Arc::clone(&channel), trainer)
                .with_events(events)
                .with_retry(config.retry.clone()),
        );
    }

    // Subscribe before any worker announces itself.
    let dispatcher = coordinator.listen().await?;
    let handles: Vec<_> = agents
        .into_iter()
        .map(|agent| (agent.id().to_string(), tokio::spawn(agent.run())))
        .collect();
    log::info!(
        "Simulating {} workers, logs in {}",
        handles.len(),
        log_dir.display()
    );

    let outcome = coordinator.run_rounds().await;
    dispatcher.abort();
    let experiment = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            for (_, handle) in &handles {
                handle.abort();
            }
            return Err(e).context("Experiment aborted");
        }
    };

    let mut workers = Vec::new();
    for (id, mut handle) in handles {
        match tokio::time::timeout(WORKER_SHUTDOWN, &mut handle).await {
            Ok(Ok(Ok(summary))) => workers.push(summary),
            Ok(Ok(Err(e))) => log::warn!("Worker {} failed: {}", id, e),
            Ok(Err(e)) => log::warn!("Worker {} task ended abnormally: {}", id, e),
            Err(_) => {
                log::warn!("Worker {} did not stop in time", id);
                handle.abort();
            }
        }
    }

    Ok(SimulationReport {
        experiment,
        workers,
        log_dir,
        model_path: config.output.model_path.clone(),
    })
}
