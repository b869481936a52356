//! On-disk storage for uploaded workbooks: `<root>/<merchant_id>/<task_id>.xlsx`

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::domain::TaskId;

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, merchant_id: i64, task_id: TaskId) -> PathBuf {
        self.root
            .join(merchant_id.to_string())
            .join(format!("{task_id}.xlsx"))
    }

    /// Writes the upload and returns where it landed
    pub async fn save(&self, merchant_id: i64, task_id: TaskId, data: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.path_for(merchant_id, task_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        debug!(path = %path.display(), size_bytes = data.len(), "upload stored");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_creates_merchant_directory() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let task_id = TaskId::new();

        let path = store.save(42, task_id, b"workbook").await.unwrap();
        assert_eq!(path, dir.path().join("42").join(format!("{task_id}.xlsx")));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"workbook");
    }
}
