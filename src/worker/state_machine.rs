use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Idle,
    Training,
    ReportTrain,
    WaitAgg,
    Evaluating,
    ReportEval,
    Stopped,
}

impl WorkerState {
    pub fn as_str(&self) -> &str {
        match self {
            WorkerState::Idle => "Idle",
            WorkerState::Training => "Training",
            WorkerState::ReportTrain => "ReportTrain",
            WorkerState::WaitAgg => "WaitAgg",
            WorkerState::Evaluating => "Evaluating",
            WorkerState::ReportEval => "ReportEval",
            WorkerState::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerEvent {
    Selected,
    NotSelected,
    TrainingFinished,
    TrainReported,
    AggregateReceived,
    Evaluated,
    EvalReported,
    StopReceived,
}

pub struct WorkerStateMachine;

impl WorkerStateMachine {
    pub fn next(state: WorkerState, event: WorkerEvent) -> Option<WorkerState> {
        let next = match (state, event) {
            (WorkerState::Stopped, _) => return None,
            (_, WorkerEvent::StopReceived) => WorkerState::Stopped,

            // A worker that missed an aggregated model can still be selected again.
            (WorkerState::Idle | WorkerState::WaitAgg, WorkerEvent::Selected) => {
                WorkerState::Training
            }
            (WorkerState::Idle | WorkerState::WaitAgg, WorkerEvent::NotSelected) => {
                WorkerState::Idle
            }
            (WorkerState::Training, WorkerEvent::TrainingFinished) => WorkerState::ReportTrain,
            (WorkerState::ReportTrain, WorkerEvent::TrainReported) => WorkerState::WaitAgg,

            // Unselected workers evaluate the aggregated model too.
            (WorkerState::Idle | WorkerState::WaitAgg, WorkerEvent::AggregateReceived) => {
                WorkerState::Evaluating
            }
            (WorkerState::Evaluating, WorkerEvent::Evaluated) => WorkerState::ReportEval,
            (WorkerState::ReportEval, WorkerEvent::EvalReported) => WorkerState::Idle,

            _ => return None,
        };
        Some(next)
    }

    pub fn transition(
        worker: &str,
        state: &mut WorkerState,
        event: WorkerEvent,
    ) -> Result<WorkerState, WorkerError> {
        let next = Self::next(*state, event).ok_or_else(|| WorkerError::InvalidTransition {
            worker: worker.to_string(),
            state: format!("{} on {:?}", state.as_str(), event),
        })?;
        *state = next;
        Ok(next)
    }
}
