use serde::Deserialize;
use serde_json::{json, Value};

use super::Trainer;
use crate::error::TrainerError;
use crate::types::{Metrics, Weights};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeanEstimatorArgs {
    pub dims: usize,
    pub samples: usize,
    pub seed: u64,
    pub learning_rate: f32,
    pub epochs: usize,
    /// Every n-th call to `train` fails. 0 disables failures.
    pub fail_every: usize,
}

impl Default for MeanEstimatorArgs {
    fn default() -> Self {
        Self {
            dims: 4,
            samples: 64,
            seed: 0,
            learning_rate: 0.5,
            epochs: 1,
            fail_every: 0,
        }
    }
}

/// Synthetic trainer that estimates the mean of a deterministic local shard.
///
/// Accuracy is `1 / (1 + mse)` between the model and the shard mean, so it
/// approaches 1.0 as training converges.
pub struct MeanEstimatorTrainer {
    args: MeanEstimatorArgs,
    data: Vec<Vec<f32>>,
    weights: Vec<f32>,
    train_calls: usize,
}

impl MeanEstimatorTrainer {
    pub fn new(args: MeanEstimatorArgs) -> Self {
        let data = (0..args.samples)
            .map(|i| {
                (0..args.dims)
                    .map(|j| {
                        let h = (i as u64 * 31 + j as u64 * 17 + args.seed * 7) % 13;
                        1.0 + j as f32 + (h as f32 - 6.0) / 10.0
                    })
                    .collect()
            })
            .collect();

        Self {
            weights: vec![0.0; args.dims],
            args,
            data,
            train_calls: 0,
        }
    }

    pub fn from_value(args: &Value) -> Result<Self, TrainerError> {
        let args: MeanEstimatorArgs = if args.is_null() {
            MeanEstimatorArgs::default()
        } else {
            serde_json::from_value(args.clone()).map_err(|e| TrainerError::Config(e.to_string()))?
        };
        if args.dims == 0 || args.samples == 0 {
            return Err(TrainerError::Config(
                "dims and samples must be positive".to_string(),
            ));
        }
        Ok(Self::new(args))
    }

    fn shard_mean(&self) -> Vec<f32> {
        let n = self.data.len() as f32;
        (0..self.args.dims)
            .map(|j| self.data.iter().map(|row| row[j]).sum::<f32>() / n)
            .collect()
    }

    fn mse(&self) -> f64 {
        let mean = self.shard_mean();
        let sum: f64 = self
            .weights
            .iter()
            .zip(&mean)
            .map(|(w, m)| ((w - m) as f64).powi(2))
            .sum();
        sum / self.args.dims as f64
    }
}

impl Trainer for MeanEstimatorTrainer {
    fn train(&mut self) -> Result<(), TrainerError> {
        self.train_calls += 1;
        if self.args.fail_every > 0 && self.train_calls % self.args.fail_every == 0 {
            return Err(TrainerError::Training(format!(
                "simulated failure on call {}",
                self.train_calls
            )));
        }

        let mean = self.shard_mean();
        for _ in 0..self.args.epochs.max(1) {
            for (w, m) in self.weights.iter_mut().zip(&mean) {
                *w += self.args.learning_rate * (m - *w);
            }
        }
        Ok(())
    }

    fn weights(&self) -> Weights {
        vec![self.weights.clone()]
    }

    fn sample_count(&self) -> u64 {
        self.data.len() as u64
    }

    fn evaluate(&mut self) -> Result<f64, TrainerError> {
        Ok(1.0 / (1.0 + self.mse()))
    }

    fn all_metrics(&mut self) -> Result<Metrics, TrainerError> {
        let accuracy = self.evaluate()?;
        let mut metrics = Metrics::new();
        metrics.insert("accuracy".to_string(), json!(accuracy));
        metrics.insert("mse".to_string(), json!(self.mse()));
        metrics.insert("samples".to_string(), json!(self.data.len()));
        Ok(metrics)
    }

    fn set_weights(&mut self, weights: Weights) {
        match weights.into_iter().next() {
            Some(layer) if layer.len() == self.args.dims => self.weights = layer,
            _ => log::warn!("Ignoring aggregated weights with unexpected shape"),
        }
    }

    fn set_config(&mut self, args: &Value) -> Result<(), TrainerError> {
        let learning_rate = args
            .get("learning_rate")
            .and_then(Value::as_f64)
            .map(|lr| lr as f32)
            .unwrap_or(self.args.learning_rate);
        if !(0.0..=1.0).contains(&learning_rate) {
            return Err(TrainerError::Config(format!(
                "learning_rate {} outside [0, 1]",
                learning_rate
            )));
        }

        self.args.learning_rate = learning_rate;
        if let Some(epochs) = args.get("epochs").and_then(Value::as_u64) {
            self.args.epochs = epochs as usize;
        }
        Ok(())
    }

    fn extra_training_args(&self) -> Option<Value> {
        Some(json!({ "learning_rate": self.args.learning_rate, "epochs": self.args.epochs }))
    }
}
