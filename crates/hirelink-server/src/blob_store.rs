//! Disk-backed storage for message attachments.
//!
//! Files are stored flat under the upload directory, keyed by a fresh
//! UUID. The original filename and content type travel in the message
//! metadata, never in the on-disk name, so no client input reaches the
//! filesystem path.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// Verify that a resolved path stays within the base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ServerError::BadRequest("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    base_path: PathBuf,
    max_size: usize,
}

impl AttachmentStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::Internal(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Attachment store initialized");

        Ok(Self { base_path, max_size })
    }

    pub async fn store(&self, data: &[u8]) -> Result<Uuid, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty attachment".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::AttachmentTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let path = self.path_for(&id)?;

        fs::write(&path, data).await.map_err(|e| {
            ServerError::Internal(format!("Failed to write attachment {id}: {e}"))
        })?;

        debug!(id = %id, size = data.len(), "Stored attachment");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Vec<u8>, ServerError> {
        let path = self.path_for(&id)?;

        if !path.exists() {
            return Err(ServerError::AttachmentNotFound(id));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::Internal(format!("Failed to read attachment {id}: {e}"))
        })?;

        debug!(id = %id, size = data.len(), "Retrieved attachment");
        Ok(data)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServerError> {
        let path = self.path_for(&id)?;

        if !path.exists() {
            return Err(ServerError::AttachmentNotFound(id));
        }

        fs::remove_file(&path).await.map_err(|e| {
            ServerError::Internal(format!("Failed to delete attachment {id}: {e}"))
        })?;

        debug!(id = %id, "Deleted attachment");
        Ok(())
    }

    fn path_for(&self, id: &Uuid) -> Result<PathBuf, ServerError> {
        let raw = self.base_path.join(id.to_string());
        ensure_within(&self.base_path, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (AttachmentStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path().to_path_buf(), 1024)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn store_and_get() {
        let (store, _dir) = test_store().await;
        let data = b"resume.pdf bytes";

        let id = store.store(data).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), data);
    }

    #[tokio::test]
    async fn delete_removes() {
        let (store, _dir) = test_store().await;
        let id = store.store(b"delete-me").await.unwrap();

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.is_err());
    }

    #[tokio::test]
    async fn oversize_rejected() {
        let (store, _dir) = test_store().await;
        let big = vec![0u8; 2048];
        assert!(matches!(
            store.store(&big).await,
            Err(ServerError::AttachmentTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn empty_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.store(b"").await.is_err());
    }

    #[tokio::test]
    async fn missing_is_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(ServerError::AttachmentNotFound(_))
        ));
    }
}
