// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! In-memory blob store. Timestamps come from the injected [`Clock`], which
//! lets tests age a cached template without sleeping.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::clock::Clock;
use crate::domain::storage::{validate_blob_name, Blob, BlobProperties, BlobStore, StorageError};

#[derive(Clone)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<(String, String), Blob>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBlobStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, container: &str, name: &str) -> Result<Blob, StorageError> {
        self.blobs
            .read()
            .get(&(container.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(container, name))
    }

    async fn properties(
        &self,
        container: &str,
        name: &str,
    ) -> Result<Option<BlobProperties>, StorageError> {
        Ok(self
            .blobs
            .read()
            .get(&(container.to_string(), name.to_string()))
            .map(|blob| blob.properties.clone()))
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        content: &[u8],
    ) -> Result<BlobProperties, StorageError> {
        validate_blob_name(name)?;
        let properties = BlobProperties {
            container: container.to_string(),
            name: name.to_string(),
            size: content.len() as u64,
            last_modified: self.clock.now(),
        };
        self.blobs.write().insert(
            (container.to_string(), name.to_string()),
            Blob {
                properties: properties.clone(),
                content: content.to_vec(),
            },
        );
        Ok(properties)
    }
}
