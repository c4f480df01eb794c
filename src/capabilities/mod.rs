pub mod aggregators;
pub mod mean_estimator;
pub mod registry;
pub mod selectors;

pub use aggregators::{FedAvgAggregator, MeanAggregator};
pub use mean_estimator::MeanEstimatorTrainer;
pub use registry::Registry;
pub use selectors::{AllSelector, RotatingSelector};

use anyhow::Result;
use serde_json::Value;

use crate::error::TrainerError;
use crate::types::{Metrics, RoundId, Weights, WorkerId};

/// Local training and evaluation, owned exclusively by one worker agent.
///
/// Methods are synchronous; the agent runs `train` on a blocking task so a
/// stop notice can be observed while training is in progress.
pub trait Trainer: Send {
    fn train(&mut self) -> Result<(), TrainerError>;

    fn weights(&self) -> Weights;

    fn sample_count(&self) -> u64;

    /// Accuracy of the current weights on local data.
    fn evaluate(&mut self) -> Result<f64, TrainerError>;

    /// Full metric set; must contain `accuracy`.
    fn all_metrics(&mut self) -> Result<Metrics, TrainerError>;

    fn set_weights(&mut self, weights: Weights);

    fn set_config(&mut self, args: &Value) -> Result<(), TrainerError>;

    fn extra_training_args(&self) -> Option<Value> {
        None
    }

    fn on_aggregation_extra_info(&mut self, _info: &Value) {}
}

/// Chooses the participants of a round.
pub trait Selector: Send + Sync {
    fn name(&self) -> &str;

    fn select(&self, pool: &[WorkerId], round: RoundId) -> Vec<WorkerId>;
}

/// One successful training result handed to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub worker: WorkerId,
    pub weights: Weights,
    pub sample_count: u64,
    pub training_args: Option<Value>,
}

/// Combines per-worker results into a new global model.
pub trait Aggregator: Send + Sync {
    fn name(&self) -> &str;

    fn aggregate(&self, contributions: &[Contribution]) -> Result<Weights>;

    /// Extra information forwarded to every trainer with the aggregated model.
    fn extra_info(&self) -> Option<Value> {
        None
    }
}
