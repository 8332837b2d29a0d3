// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Template Cache Manager Application Service
//!
//! Keeps a copy of every provisioning template in blob storage so that the
//! apply stage never reads the canonical source directly. A cached template
//! is refreshed when:
//!
//! 1. the caller forces it, or no cached blob exists
//! 2. the blob's last-modified time is older than the TTL (one hour by default)
//!
//! Otherwise the cache is left alone. A failed fetch is returned as an error
//! and leaves the previous blob (if any) untouched; the blob store overwrites
//! atomically.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::clock::Clock;
use crate::domain::events::TemplateEvent;
use crate::domain::hosting::{HostingError, TemplateSource};
use crate::domain::site::Tenant;
use crate::domain::storage::{Blob, BlobStore, StorageError};
use crate::domain::template::{template_blob_name, CacheOutcome, RefreshReason};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum TemplateCacheError {
    #[error("Template URL '{0}' has no file name")]
    InvalidTemplateUrl(String),

    #[error("Failed to fetch template '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: HostingError,
    },

    #[error("Template cache storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct TemplateCacheManager {
    source: Arc<dyn TemplateSource>,
    blobs: Arc<dyn BlobStore>,
    container: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl TemplateCacheManager {
    pub fn new(
        source: Arc<dyn TemplateSource>,
        blobs: Arc<dyn BlobStore>,
        container: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            source,
            blobs,
            container: container.into(),
            ttl,
            clock,
            event_bus,
        }
    }

    /// Make sure the cached copy of `template_url` exists and is fresh.
    pub async fn ensure_fresh(
        &self,
        tenant: &Tenant,
        template_url: &str,
        force: bool,
    ) -> Result<CacheOutcome, TemplateCacheError> {
        let blob_name = self.blob_name(template_url)?;

        let reason = if force {
            Some(RefreshReason::Forced)
        } else {
            match self.blobs.properties(&self.container, &blob_name).await? {
                None => Some(RefreshReason::Missing),
                Some(properties) => {
                    let age = self.clock.now().signed_duration_since(properties.last_modified);
                    debug!(
                        template_url = %template_url,
                        age_secs = age.num_seconds(),
                        "Cached template found"
                    );
                    (age > self.ttl).then_some(RefreshReason::Stale)
                }
            }
        };

        let outcome = match reason {
            Some(reason) => {
                let content = self
                    .source
                    .fetch_template(tenant, template_url)
                    .await
                    .map_err(|source| TemplateCacheError::Fetch {
                        url: template_url.to_string(),
                        source,
                    })?;
                self.blobs.put(&self.container, &blob_name, &content).await?;
                metrics::counter!(
                    "provisioning_template_cache_refresh_total",
                    "reason" => reason.as_str()
                )
                .increment(1);
                CacheOutcome::Updated(reason)
            }
            None => CacheOutcome::Fresh,
        };

        info!(
            template_url = %template_url,
            blob = %blob_name,
            outcome = %outcome,
            "Template cache validated"
        );
        self.event_bus.publish_template_event(TemplateEvent::CacheValidated {
            template_url: template_url.to_string(),
            outcome,
            validated_at: self.clock.now(),
        });
        Ok(outcome)
    }

    /// Read the cached copy of a template.
    pub async fn cached_template(&self, template_url: &str) -> Result<Blob, TemplateCacheError> {
        let blob_name = self.blob_name(template_url)?;
        Ok(self.blobs.get(&self.container, &blob_name).await?)
    }

    fn blob_name(&self, template_url: &str) -> Result<String, TemplateCacheError> {
        let name = template_blob_name(template_url);
        if name.is_empty() {
            return Err(TemplateCacheError::InvalidTemplateUrl(template_url.to_string()));
        }
        Ok(name)
    }
}
