// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Blob Store
//!
//! One directory per container under a base directory. Suitable for a
//! single-node deployment; the last-modified timestamp comes from file
//! metadata, so the template cache TTL survives restarts.
//!
//! Overwrites are atomic: content is written to a temporary file in the
//! container directory and renamed over the target.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::storage::{validate_blob_name, Blob, BlobProperties, BlobStore, StorageError};

pub struct LocalBlobStore {
    /// Base directory for all containers (e.g., "/var/lib/provisioning/blobs")
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::IoError(format!(
                "Failed to create base directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(Self { base_path })
    }

    fn container_path(&self, container: &str) -> Result<PathBuf, StorageError> {
        validate_blob_name(container)?;
        Ok(self.base_path.join(container))
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_blob_name(name)?;
        Ok(self.container_path(container)?.join(name))
    }

    async fn read_properties(
        container: &str,
        name: &str,
        path: &Path,
    ) -> Result<Option<BlobProperties>, StorageError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::IoError(format!(
                    "Failed to stat {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::IoError(format!("No modification time for {}: {}", path.display(), e)))?;

        Ok(Some(BlobProperties {
            container: container.to_string(),
            name: name.to_string(),
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(modified),
        }))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, container: &str, name: &str) -> Result<Blob, StorageError> {
        let path = self.blob_path(container, name)?;
        let properties = Self::read_properties(container, name, &path)
            .await?
            .ok_or_else(|| StorageError::not_found(container, name))?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(container, name))
            }
            Err(e) => {
                return Err(StorageError::IoError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(Blob { properties, content })
    }

    async fn properties(
        &self,
        container: &str,
        name: &str,
    ) -> Result<Option<BlobProperties>, StorageError> {
        let path = self.blob_path(container, name)?;
        Self::read_properties(container, name, &path).await
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        content: &[u8],
    ) -> Result<BlobProperties, StorageError> {
        let dir = self.container_path(container)?;
        let path = self.blob_path(container, name)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to create container {}: {}", dir.display(), e)))?;

        let temp_path = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
        let write_result = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::IoError(format!(
                "Failed to write {}: {}",
                path.display(),
                e
            )));
        }

        Self::read_properties(container, name, &path)
            .await?
            .ok_or_else(|| StorageError::not_found(container, name))
    }
}
