// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Site metadata updates.
//!
//! An update arrives with only the absolute site URL and the new title.
//! [`ProcessUpdateRequestStage`] resolves which status record belongs to the
//! site; [`UpdateMetadataStage`] then writes the record and the site.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::{subscriptions, StageContext, StageError, StageHandler};
use crate::domain::job::UpdateSiteJob;
use crate::domain::messaging::{labels, Message, Subscription, Topic};
use crate::domain::repository::{RepositoryError, StatusStore};
use crate::domain::site::{relative_site_url, site_type_code};
use crate::domain::status::{StatusKey, StatusPatch};

pub struct ProcessUpdateRequestStage {
    ctx: StageContext,
    status_store: Arc<dyn StatusStore>,
}

impl ProcessUpdateRequestStage {
    pub fn new(ctx: StageContext, status_store: Arc<dyn StatusStore>) -> Self {
        Self { ctx, status_store }
    }
}

#[async_trait]
impl StageHandler for ProcessUpdateRequestStage {
    fn subscription(&self) -> Subscription {
        subscriptions::UPDATE_SITE_REQUESTS
    }

    async fn handle(&self, message: &Message) -> Result<(), StageError> {
        let job: UpdateSiteJob = message.decode()?;
        let relative_url = relative_site_url(&job.url).map_err(StageError::permanent)?;

        let record = self
            .status_store
            .find_by_url(&relative_url)
            .await
            .map_err(StageError::retryable)?;
        let Some(record) = record else {
            self.ctx.integrity_warning(
                self.name(),
                format!("No status record for site '{}', update dropped", relative_url),
            );
            return Ok(());
        };

        let Some(code) = site_type_code(&relative_url) else {
            self.ctx.integrity_warning(
                self.name(),
                format!("Cannot derive a site type from '{}', update dropped", relative_url),
            );
            return Ok(());
        };

        // Registration keys by template URL; updates address (site type, id)
        let target = StatusKey::new(code.clone(), record.key.row_key.clone());
        let record = if record.key == target {
            record
        } else {
            let moved = self
                .status_store
                .rekey(&record.key, &target)
                .await
                .map_err(StageError::retryable)?;
            info!(from = %record.key, to = %target, "Status record re-keyed");
            moved
        };

        let resolved = UpdateSiteJob {
            site_type: Some(code),
            id: Some(record.key.row_key.clone()),
            ..job
        };
        info!(
            url = %resolved.url,
            site_type = ?resolved.site_type,
            id = ?resolved.id,
            "Site update resolved"
        );
        let successor = Message::new(Topic::UpdateSites, labels::UPDATE_SITE_METADATA, &resolved)?;
        self.ctx.publish(successor).await
    }
}

pub struct UpdateMetadataStage {
    ctx: StageContext,
    status_store: Arc<dyn StatusStore>,
}

impl UpdateMetadataStage {
    pub fn new(ctx: StageContext, status_store: Arc<dyn StatusStore>) -> Self {
        Self { ctx, status_store }
    }
}

#[async_trait]
impl StageHandler for UpdateMetadataStage {
    fn subscription(&self) -> Subscription {
        subscriptions::UPDATE_METADATA
    }

    async fn handle(&self, message: &Message) -> Result<(), StageError> {
        let job: UpdateSiteJob = message.decode()?;
        let (Some(site_type), Some(id)) = (job.site_type.clone(), job.id.clone()) else {
            return Err(StageError::permanent(format!(
                "Update for '{}' was never resolved to a status record",
                job.url
            )));
        };
        let site_url = Url::parse(&job.url).map_err(StageError::permanent)?;

        let key = StatusKey::new(site_type, id);
        let patch = StatusPatch::title(job.title.clone()).with_updated(self.ctx.clock.now());
        match self.status_store.merge(&key, &patch).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound(detail)) => {
                self.ctx.integrity_warning(
                    self.name(),
                    format!("{}, title of '{}' left unchanged", detail, job.url),
                );
                return Ok(());
            }
            Err(e) => return Err(StageError::retryable(e)),
        }

        match self
            .ctx
            .hosting
            .set_web_title(&self.ctx.tenant, &site_url, &job.title)
            .await
        {
            Ok(()) => {
                info!(url = %job.url, title = %job.title, "Site metadata updated");
                Ok(())
            }
            Err(e) => {
                warn!(url = %job.url, "Failed to set site title: {}", e);
                Err(e.into())
            }
        }
    }
}
