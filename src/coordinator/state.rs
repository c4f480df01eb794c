use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::capabilities::Contribution;
use crate::storage::BestModel;
use crate::types::{
    accuracy_of, EvalReport, Metrics, ModelEntry, Phase, RoundId, TrainResult, Weights, WorkerId,
    WorkerStatus,
};

/// How a response message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Counted,
    /// Same worker already answered this phase.
    Duplicate,
    /// Wrong round, or the phase that expected it is over.
    Stale,
    /// Sender is not part of the round.
    NotExpected,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub ready: bool,
    pub initial_accuracy: Option<f64>,
    pub initial_metrics: Metrics,
    pub last_metrics: Option<Metrics>,
    pub last_weights: Option<Weights>,
    pub times_selected: u64,
    pub times_trained: u64,
    pub times_failed: u64,
    pub missed_responses: u64,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, initial_accuracy: Option<f64>, initial_metrics: Metrics) -> Self {
        Self {
            id,
            status: WorkerStatus::Registered,
            ready: false,
            initial_accuracy,
            initial_metrics,
            last_metrics: None,
            last_weights: None,
            times_selected: 0,
            times_trained: 0,
            times_failed: 0,
            missed_responses: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseSpan {
    pub phase: Phase,
    pub started: DateTime<Local>,
    pub ended: Option<DateTime<Local>>,
}

/// The single active round.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: RoundId,
    pub started_at: DateTime<Local>,
    pub selected: Vec<WorkerId>,
    /// Pool snapshot that received selection notices; all of them evaluate.
    pub participants: Vec<WorkerId>,
    pub train_results: BTreeMap<WorkerId, TrainResult>,
    pub eval_reports: BTreeMap<WorkerId, Metrics>,
    pub spans: Vec<PhaseSpan>,
    pub mean_accuracy: Option<f64>,
}

impl Round {
    pub fn new(id: RoundId, participants: Vec<WorkerId>, selected: Vec<WorkerId>) -> Self {
        Self {
            id,
            started_at: Local::now(),
            selected,
            participants,
            train_results: BTreeMap::new(),
            eval_reports: BTreeMap::new(),
            spans: Vec::new(),
            mean_accuracy: None,
        }
    }

    pub fn train_complete(&self) -> bool {
        self.train_results.len() >= self.selected.len()
    }

    pub fn eval_complete(&self) -> bool {
        self.eval_reports.len() >= self.participants.len()
    }

    pub fn missing_train(&self) -> Vec<WorkerId> {
        self.selected
            .iter()
            .filter(|id| !self.train_results.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn missing_eval(&self) -> Vec<WorkerId> {
        self.participants
            .iter()
            .filter(|id| !self.eval_reports.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Usable training results, in worker-id order.
    pub fn contributions(&self) -> Vec<Contribution> {
        self.train_results
            .values()
            .filter_map(|result| match (&result.weights, result.sample_count) {
                (Some(weights), Some(sample_count)) if result.success => Some(Contribution {
                    worker: result.id.clone(),
                    weights: weights.clone(),
                    sample_count,
                    training_args: result.training_args.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn failed_workers(&self) -> Vec<WorkerId> {
        self.train_results
            .values()
            .filter(|result| !is_usable(result))
            .map(|result| result.id.clone())
            .collect()
    }

    /// Mean of the reported accuracies; reports without one are skipped.
    pub fn compute_mean_accuracy(&self) -> Option<f64> {
        let accuracies: Vec<f64> = self.eval_reports.values().filter_map(accuracy_of).collect();
        if accuracies.is_empty() {
            return None;
        }
        Some(accuracies.iter().sum::<f64>() / accuracies.len() as f64)
    }

    pub fn begin_phase(&mut self, phase: Phase) {
        self.spans.push(PhaseSpan {
            phase,
            started: Local::now(),
            ended: None,
        });
    }

    pub fn end_phase(&mut self, phase: Phase) {
        if let Some(span) = self
            .spans
            .iter_mut()
            .rev()
            .find(|span| span.phase == phase && span.ended.is_none())
        {
            span.ended = Some(Local::now());
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        (Local::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// A success without weights or a sample count is treated as a failure.
pub fn is_usable(result: &TrainResult) -> bool {
    result.success && result.weights.is_some() && result.sample_count.is_some()
}

/// Everything the coordinator owns. Mutated only through the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub phase: Phase,
    /// Last round started; 0 before the first.
    pub round_id: RoundId,
    /// Registration order.
    pub pool: Vec<WorkerId>,
    pub workers: HashMap<WorkerId, WorkerRecord>,
    pub round: Option<Round>,
    pub global: Option<ModelEntry>,
    pub best: Option<BestModel>,
    pub decided: Option<RoundId>,
    pub persisted: bool,
    pub round_durations: Vec<f64>,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self {
            phase: Phase::Init,
            round_id: 0,
            pool: Vec::new(),
            workers: HashMap::new(),
            round: None,
            global: None,
            best: None,
            decided: None,
            persisted: false,
            round_durations: Vec::new(),
        }
    }
}

impl CoordinatorState {
    pub fn is_registered(&self, worker: &str) -> bool {
        self.workers.contains_key(worker)
    }

    /// Returns false when the worker was already in the pool.
    pub fn register(
        &mut self,
        worker: WorkerId,
        initial_accuracy: Option<f64>,
        initial_metrics: Metrics,
    ) -> bool {
        if self.workers.contains_key(&worker) {
            return false;
        }
        self.pool.push(worker.clone());
        self.workers.insert(
            worker.clone(),
            WorkerRecord::new(worker, initial_accuracy, initial_metrics),
        );
        true
    }

    /// Returns true the first time the worker reports ready.
    pub fn mark_ready(&mut self, worker: &str) -> bool {
        match self.workers.get_mut(worker) {
            Some(record) if !record.ready => {
                record.ready = true;
                true
            }
            _ => false,
        }
    }

    pub fn start_round(&mut self, round: Round) {
        for id in &round.participants {
            if let Some(record) = self.workers.get_mut(id) {
                if round.selected.contains(id) {
                    record.status = WorkerStatus::Selected;
                    record.times_selected += 1;
                } else if record.status != WorkerStatus::NonResponsive {
                    record.status = WorkerStatus::Registered;
                }
            }
        }
        self.round_id = round.id;
        self.phase = Phase::Select;
        self.round = Some(round);
    }

    pub fn enter_phase(&mut self, phase: Phase) {
        if let Some(round) = self.round.as_mut() {
            round.end_phase(self.phase);
            round.begin_phase(phase);
        }
        self.phase = phase;
    }

    pub fn accept_train(&mut self, result: TrainResult) -> ResponseOutcome {
        if !matches!(self.phase, Phase::Select | Phase::AwaitTrain) {
            return ResponseOutcome::Stale;
        }
        let Some(round) = self.round.as_mut() else {
            return ResponseOutcome::Stale;
        };
        if result.round != round.id {
            return ResponseOutcome::Stale;
        }
        if !round.selected.contains(&result.id) {
            return ResponseOutcome::NotExpected;
        }
        if round.train_results.contains_key(&result.id) {
            return ResponseOutcome::Duplicate;
        }

        if let Some(record) = self.workers.get_mut(&result.id) {
            record.status = WorkerStatus::Reporting;
            if is_usable(&result) {
                record.times_trained += 1;
                record.last_weights = result.weights.clone();
            } else {
                record.times_failed += 1;
            }
        }
        round.train_results.insert(result.id.clone(), result);
        ResponseOutcome::Counted
    }

    pub fn accept_eval(&mut self, report: EvalReport) -> ResponseOutcome {
        if !matches!(self.phase, Phase::Aggregate | Phase::AwaitEval) {
            return ResponseOutcome::Stale;
        }
        let Some(round) = self.round.as_mut() else {
            return ResponseOutcome::Stale;
        };
        if report.round != round.id {
            return ResponseOutcome::Stale;
        }
        if !round.participants.contains(&report.id) {
            return ResponseOutcome::NotExpected;
        }
        if round.eval_reports.contains_key(&report.id) {
            return ResponseOutcome::Duplicate;
        }

        if let Some(record) = self.workers.get_mut(&report.id) {
            record.status = WorkerStatus::Reporting;
            record.last_metrics = Some(report.metrics.clone());
        }
        round.eval_reports.insert(report.id, report.metrics);
        ResponseOutcome::Counted
    }

    pub fn mark_non_responsive(&mut self, workers: &[WorkerId]) {
        for id in workers {
            if let Some(record) = self.workers.get_mut(id) {
                record.status = WorkerStatus::NonResponsive;
                record.missed_responses += 1;
            }
        }
    }

    pub fn train_complete(&self) -> bool {
        self.round.as_ref().is_some_and(Round::train_complete)
    }

    pub fn eval_complete(&self) -> bool {
        self.round.as_ref().is_some_and(Round::eval_complete)
    }
}
