use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::traits::{BestModel, ModelStore};
use crate::error::StorageError;

/// Writes the best model as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    path: PathBuf,
}

impl FileModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ModelStore for FileModelStore {
    async fn save_best(&self, model: &BestModel) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(model)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|e| self.io_error(e))?;

        log::info!(
            "Saved best model (round {}, accuracy {:.4}) to {}",
            model.round,
            model.accuracy,
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::new(dir.path().join("out").join("best.model"));
        let model = BestModel {
            round: 4,
            accuracy: 0.9,
            weights: vec![vec![0.5, 1.5]],
        };

        store.save_best(&model).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let decoded: BestModel = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, model);
    }

    #[tokio::test]
    async fn test_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = FileModelStore::new(blocker.join("best.model"));

        let model = BestModel {
            round: 1,
            accuracy: 0.1,
            weights: vec![],
        };
        assert!(matches!(
            store.save_best(&model).await,
            Err(StorageError::Io { .. })
        ));
    }
}
