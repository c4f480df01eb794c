use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::{RoundId, Weights};

/// Best global model seen during an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModel {
    pub round: RoundId,
    pub accuracy: f64,
    pub weights: Weights,
}

impl BestModel {
    /// Ties go to the newer model.
    pub fn is_improved_by(&self, accuracy: f64) -> bool {
        accuracy >= self.accuracy
    }
}

/// Durable storage for the best model, written by the coordinator only.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save_best(&self, model: &BestModel) -> Result<(), StorageError>;
}
