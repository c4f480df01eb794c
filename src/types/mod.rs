pub mod event;
pub mod message;

pub use event::{EventRecord, EventTag};
pub use message::{
    AggregatedModel, Envelope, EvalReport, ModelEntry, Payload, ReadyNotice, RegisterNotice,
    SelectionNotice, ServerArgs, StopNotice, Topic, TrainResult,
};

use serde::{Deserialize, Serialize};

pub type WorkerId = String;
pub type RoundId = u64;

/// Model parameters, one vector per layer.
pub type Weights = Vec<Vec<f32>>;

/// Free-form evaluation metrics. Workers must report an `accuracy` entry.
pub type Metrics = serde_json::Map<String, serde_json::Value>;

pub const ACCURACY_KEY: &str = "accuracy";

/// Reads the accuracy entry out of a metrics object.
pub fn accuracy_of(metrics: &Metrics) -> Option<f64> {
    metrics.get(ACCURACY_KEY).and_then(|v| v.as_f64())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,       // Waiting for the minimum worker count
    Select,     // Choosing participants, publishing selection notices
    AwaitTrain, // Collecting training results
    Aggregate,  // Combining results into a new global model
    AwaitEval,  // Collecting evaluation metrics
    Decide,     // Stop or continue
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Init => "Init",
            Phase::Select => "Select",
            Phase::AwaitTrain => "AwaitTrain",
            Phase::Aggregate => "Aggregate",
            Phase::AwaitEval => "AwaitEval",
            Phase::Decide => "Decide",
            Phase::Terminated => "Terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Registered,
    Selected,
    Reporting,
    NonResponsive,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorkerStatus::Registered => "Registered",
            WorkerStatus::Selected => "Selected",
            WorkerStatus::Reporting => "Reporting",
            WorkerStatus::NonResponsive => "NonResponsive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Continue,
    StopAccuracy,
    StopRounds,
}

impl Decision {
    pub fn is_stop(&self) -> bool {
        !matches!(self, Decision::Continue)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Decision::Continue => "continue",
            Decision::StopAccuracy => "accuracy",
            Decision::StopRounds => "rounds",
        }
    }
}
