// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Blob Store - Anti-Corruption Layer for durable object storage
//!
//! Two logical containers are used by the pipeline:
//!
//! - job files, keyed by file name (written once at intake)
//! - cached templates, keyed by template base name (overwritten on refresh)
//!
//! A blob's last-modified timestamp is the template cache's freshness signal,
//! so implementations must set it on every `put`. Overwrites must be atomic:
//! a reader sees either the old or the new content, never a partial write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Metadata of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    pub container: String,
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub properties: BlobProperties,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, container: &str, name: &str) -> Result<Blob, StorageError>;

    /// Properties only, or `None` when the blob does not exist.
    async fn properties(&self, container: &str, name: &str)
        -> Result<Option<BlobProperties>, StorageError>;

    /// Create or atomically overwrite a blob.
    async fn put(&self, container: &str, name: &str, content: &[u8])
        -> Result<BlobProperties, StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {container}/{name}")]
    NotFound { container: String, name: String },

    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl StorageError {
    pub fn not_found(container: &str, name: &str) -> Self {
        Self::NotFound {
            container: container.to_string(),
            name: name.to_string(),
        }
    }
}

/// Reject names that would escape their container.
pub fn validate_blob_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
