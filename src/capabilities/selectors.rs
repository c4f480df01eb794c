use super::Selector;
use crate::types::{RoundId, WorkerId};

/// Selects the whole pool every round.
pub struct AllSelector;

impl Selector for AllSelector {
    fn name(&self) -> &str {
        "all"
    }

    fn select(&self, pool: &[WorkerId], _round: RoundId) -> Vec<WorkerId> {
        pool.to_vec()
    }
}

/// Selects a window of `count` workers that slides along the pool each round,
/// so every worker participates in turn.
pub struct RotatingSelector {
    count: usize,
}

impl RotatingSelector {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl Selector for RotatingSelector {
    fn name(&self) -> &str {
        "rotating"
    }

    fn select(&self, pool: &[WorkerId], round: RoundId) -> Vec<WorkerId> {
        if pool.is_empty() || self.count == 0 {
            return Vec::new();
        }
        if self.count >= pool.len() {
            return pool.to_vec();
        }

        let start = (round.saturating_sub(1) as usize * self.count) % pool.len();
        (0..self.count)
            .map(|offset| pool[(start + offset) % pool.len()].clone())
            .collect()
    }
}
