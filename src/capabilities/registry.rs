use std::collections::HashMap;

use serde_json::Value;

use super::{
    AllSelector, Aggregator, FedAvgAggregator, MeanAggregator, MeanEstimatorTrainer,
    RotatingSelector, Selector, Trainer,
};
use crate::error::ConfigError;
use crate::types::WorkerId;

pub type TrainerFactory =
    Box<dyn Fn(&WorkerId, &Value) -> Result<Box<dyn Trainer>, ConfigError> + Send + Sync>;
pub type SelectorFactory =
    Box<dyn Fn(&Value) -> Result<Box<dyn Selector>, ConfigError> + Send + Sync>;
pub type AggregatorFactory =
    Box<dyn Fn(&Value) -> Result<Box<dyn Aggregator>, ConfigError> + Send + Sync>;

/// Named constructors for every pluggable capability, looked up by the
/// names used in the experiment configuration.
#[derive(Default)]
pub struct Registry {
    trainers: HashMap<String, TrainerFactory>,
    selectors: HashMap<String, SelectorFactory>,
    aggregators: HashMap<String, AggregatorFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // Selectors
        registry.register_selector("all", |_| Ok(Box::new(AllSelector)));
        registry.register_selector("rotating", |args| {
            let count = args
                .get("count")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    ConfigError::Invalid("rotating selector needs a numeric 'count'".to_string())
                })?;
            Ok(Box::new(RotatingSelector::new(count as usize)))
        });

        // Aggregators
        registry.register_aggregator("fedavg", |_| Ok(Box::new(FedAvgAggregator)));
        registry.register_aggregator("mean", |_| Ok(Box::new(MeanAggregator)));

        // Trainers
        registry.register_trainer("mean_estimator", |worker, args| {
            MeanEstimatorTrainer::from_value(args)
                .map(|t| Box::new(t) as Box<dyn Trainer>)
                .map_err(|e| ConfigError::Invalid(format!("trainer for {}: {}", worker, e)))
        });

        registry
    }

    pub fn register_trainer<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&WorkerId, &Value) -> Result<Box<dyn Trainer>, ConfigError> + Send + Sync + 'static,
    {
        self.trainers.insert(name.into(), Box::new(factory));
    }

    pub fn register_selector<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Selector>, ConfigError> + Send + Sync + 'static,
    {
        self.selectors.insert(name.into(), Box::new(factory));
    }

    pub fn register_aggregator<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Aggregator>, ConfigError> + Send + Sync + 'static,
    {
        self.aggregators.insert(name.into(), Box::new(factory));
    }

    pub fn trainer(
        &self,
        name: &str,
        worker: &WorkerId,
        args: &Value,
    ) -> Result<Box<dyn Trainer>, ConfigError> {
        let factory = self
            .trainers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCapability {
                kind: "trainer",
                name: name.to_string(),
            })?;
        factory(worker, args)
    }

    pub fn selector(&self, name: &str, args: &Value) -> Result<Box<dyn Selector>, ConfigError> {
        let factory = self
            .selectors
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCapability {
                kind: "selector",
                name: name.to_string(),
            })?;
        factory(args)
    }

    pub fn aggregator(&self, name: &str, args: &Value) -> Result<Box<dyn Aggregator>, ConfigError> {
        let factory = self
            .aggregators
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCapability {
                kind: "aggregator",
                name: name.to_string(),
            })?;
        factory(args)
    }

    pub fn has_trainer(&self, name: &str) -> bool {
        self.trainers.contains_key(name)
    }

    pub fn has_selector(&self, name: &str) -> bool {
        self.selectors.contains_key(name)
    }

    pub fn has_aggregator(&self, name: &str) -> bool {
        self.aggregators.contains_key(name)
    }
}
