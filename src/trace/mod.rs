//! Offline trace reconstruction.
//!
//! Reads the coordinator's event log and one log per worker, groups each by
//! round and correlates matching markers into per-round duration tables.
//! Latencies between two logs are plain timestamp differences: the clocks
//! are not synchronized and no skew correction is attempted.

pub mod parser;
pub mod report;
pub mod timeline;

pub use parser::LineParser;
pub use report::{ArrivalSummary, ClientRow, ServerRow, TraceReport};
pub use timeline::{RoundEvents, Timeline};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::TraceError;
use crate::types::WorkerId;

pub const COORDINATOR_LOG: &str = "spn.log";
pub const WORKER_LOG_DIR: &str = "client_logs";
pub const WORKER_LOG_SUFFIX: &str = "_spn.log";

/// Event log locations under one experiment directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSet {
    pub coordinator: PathBuf,
    pub workers: BTreeMap<WorkerId, PathBuf>,
}

impl LogSet {
    pub fn discover(dir: &Path) -> Result<Self, TraceError> {
        let coordinator = dir.join(COORDINATOR_LOG);
        if !coordinator.is_file() {
            return Err(TraceError::MissingCoordinatorLog(dir.to_path_buf()));
        }

        let mut workers = BTreeMap::new();
        let worker_dir = dir.join(WORKER_LOG_DIR);
        if worker_dir.is_dir() {
            let entries = std::fs::read_dir(&worker_dir).map_err(|source| TraceError::Read {
                path: worker_dir.clone(),
                source,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Some(worker) = name.strip_suffix(WORKER_LOG_SUFFIX) {
                    if !worker.is_empty() {
                        workers.insert(worker.to_string(), path.clone());
                    }
                }
            }
        } else {
            log::warn!("No worker logs under {}", worker_dir.display());
        }

        Ok(Self {
            coordinator,
            workers,
        })
    }

    /// Path of a worker's event log inside an experiment directory.
    pub fn worker_log_path(dir: &Path, worker: &str) -> PathBuf {
        dir.join(WORKER_LOG_DIR)
            .join(format!("{}{}", worker, WORKER_LOG_SUFFIX))
    }

    pub fn coordinator_log_path(dir: &Path) -> PathBuf {
        dir.join(COORDINATOR_LOG)
    }
}

/// Parses and correlates every log in `logs`.
pub fn reconstruct(logs: &LogSet) -> Result<TraceReport, TraceError> {
    let parser = LineParser::new()?;
    let coordinator = Timeline::from_records(parser.read(&logs.coordinator)?);

    let mut workers = BTreeMap::new();
    for (worker, path) in &logs.workers {
        workers.insert(worker.clone(), Timeline::from_records(parser.read(path)?));
    }

    let report = TraceReport::build(&coordinator, &workers);
    log::info!(
        "Reconstructed {} rounds across {} workers",
        report.server.len(),
        workers.len()
    );
    Ok(report)
}

pub fn reconstruct_dir(dir: &Path) -> Result<TraceReport, TraceError> {
    reconstruct(&LogSet::discover(dir)?)
}

/// Writes `server.csv`, `clients.csv` and `arrivals.csv` into `out`.
pub fn write_report(report: &TraceReport, out: &Path) -> Result<Vec<PathBuf>, TraceError> {
    let write_error = |path: &Path, source| TraceError::Write {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(out).map_err(|e| write_error(out, e))?;

    let files = [
        ("server.csv", report.server_csv()),
        ("clients.csv", report.clients_csv()),
        ("arrivals.csv", report.arrivals_csv()),
    ];
    let mut written = Vec::new();
    for (name, contents) in files {
        let path = out.join(name);
        std::fs::write(&path, contents).map_err(|e| write_error(&path, e))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("spn.log"), "").unwrap();
        std::fs::create_dir(dir.path().join("client_logs")).unwrap();
        std::fs::write(LogSet::worker_log_path(dir.path(), "sta1"), "").unwrap();
        std::fs::write(LogSet::worker_log_path(dir.path(), "sta_2"), "").unwrap();
        std::fs::write(dir.path().join("client_logs").join("notes.txt"), "").unwrap();

        let logs = LogSet::discover(dir.path()).unwrap();
        assert_eq!(
            logs.workers.keys().cloned().collect::<Vec<_>>(),
            vec!["sta1".to_string(), "sta_2".to_string()]
        );
    }

    #[test]
    fn test_missing_coordinator_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LogSet::discover(dir.path()),
            Err(TraceError::MissingCoordinatorLog(_))
        ));
    }
}
