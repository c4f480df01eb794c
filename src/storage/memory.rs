use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::traits::{BestModel, ModelStore};
use crate::error::StorageError;

/// Keeps every saved model in memory.
#[derive(Clone, Default)]
pub struct MemoryModelStore {
    saved: Arc<RwLock<Vec<BestModel>>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<BestModel> {
        match self.saved.read() {
            Ok(saved) => saved.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saved().len()
    }
}

#[async_trait]
impl ModelStore for MemoryModelStore {
    async fn save_best(&self, model: &BestModel) -> Result<(), StorageError> {
        let mut saved = match self.saved.write() {
            Ok(saved) => saved,
            Err(poisoned) => poisoned.into_inner(),
        };
        saved.push(model.clone());
        Ok(())
    }
}
