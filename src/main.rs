use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use fedrounds::capabilities::Registry;
use fedrounds::simulation::run_experiment;
use fedrounds::trace::{self, LogSet};
use fedrounds::ExperimentConfig;

#[derive(Parser)]
#[command(name = "fedrounds")]
#[command(about = "Federated-learning round coordination and trace reconstruction", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a whole experiment in-process over the in-memory bus
    Simulate {
        #[arg(short, long, help = "Experiment config (.toml, .yaml or .yml)")]
        config: PathBuf,
    },
    /// Rebuild per-round timing tables from event logs
    Trace {
        #[arg(short, long, help = "Directory holding spn.log and client_logs/")]
        logs: PathBuf,
        #[arg(short, long, help = "Output directory for the CSV tables")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { config } => simulate(&config).await?,
        Commands::Trace { logs, out } => reconstruct(&logs, &out)?,
    }

    Ok(())
}

async fn simulate(path: &Path) -> Result<()> {
    let config = ExperimentConfig::load(path)?;
    let registry = Registry::with_builtins();
    let report = run_experiment(&config, &registry).await?;

    println!(
        "Experiment stopped after {} rounds ({})",
        report.experiment.rounds.len(),
        report.experiment.decision.as_str()
    );
    for round in &report.experiment.rounds {
        let accuracy = round
            .mean_accuracy
            .map(|a| format!("{:.4}", a))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  round {:>3}: selected {}, trained {}, accuracy {}",
            round.round,
            round.selected.len(),
            round.trained.len(),
            accuracy
        );
    }
    if let Some(best) = &report.experiment.best {
        println!(
            "Best model: round {} accuracy {:.4} -> {}",
            best.round,
            best.accuracy,
            report.model_path.display()
        );
    }
    println!("Event logs: {}", report.log_dir.display());
    Ok(())
}

fn reconstruct(logs: &Path, out: &Path) -> Result<()> {
    let log_set = LogSet::discover(logs)?;
    let report = trace::reconstruct(&log_set)
        .with_context(|| format!("Failed to reconstruct traces in {}", logs.display()))?;
    let written = trace::write_report(&report, out)?;

    if let (Some(min), Some(registered)) = (
        report.arrivals.min_workers,
        report.arrivals.registered,
    ) {
        println!("Started with {} of {} required workers", registered, min);
    }
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
