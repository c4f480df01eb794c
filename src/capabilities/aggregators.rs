use anyhow::{anyhow, bail, Result};

use super::{Aggregator, Contribution};
use crate::types::Weights;

/// Federated averaging: layer-wise mean weighted by sample count.
pub struct FedAvgAggregator;

impl Aggregator for FedAvgAggregator {
    fn name(&self) -> &str {
        "fedavg"
    }

    fn aggregate(&self, contributions: &[Contribution]) -> Result<Weights> {
        let total: u64 = contributions.iter().map(|c| c.sample_count).sum();
        if total == 0 {
            return weighted_average(contributions, |_| 1.0);
        }
        weighted_average(contributions, |c| c.sample_count as f64)
    }
}

/// Unweighted layer-wise mean.
pub struct MeanAggregator;

impl Aggregator for MeanAggregator {
    fn name(&self) -> &str {
        "mean"
    }

    fn aggregate(&self, contributions: &[Contribution]) -> Result<Weights> {
        weighted_average(contributions, |_| 1.0)
    }
}

fn weighted_average(
    contributions: &[Contribution],
    weight_of: impl Fn(&Contribution) -> f64,
) -> Result<Weights> {
    let first = contributions
        .first()
        .ok_or_else(|| anyhow!("No contributions to aggregate"))?;

    let shape: Vec<usize> = first.weights.iter().map(Vec::len).collect();
    let mut sum: Vec<Vec<f64>> = shape.iter().map(|len| vec![0.0; *len]).collect();
    let mut total_weight = 0.0;

    for contribution in contributions {
        let layer_lens: Vec<usize> = contribution.weights.iter().map(Vec::len).collect();
        if layer_lens != shape {
            bail!(
                "Weights from {} have shape {:?}, expected {:?}",
                contribution.worker,
                layer_lens,
                shape
            );
        }

        let w = weight_of(contribution);
        total_weight += w;
        for (acc_layer, layer) in sum.iter_mut().zip(&contribution.weights) {
            for (acc, value) in acc_layer.iter_mut().zip(layer) {
                *acc += w * *value as f64;
            }
        }
    }

    if total_weight <= 0.0 {
        bail!("Total aggregation weight is zero");
    }

    Ok(sum
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .map(|v| (v / total_weight) as f32)
                .collect()
        })
        .collect())
}
