// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Create site collection: request the site from the hosting platform and
//! hand the wait over to a durable monitor.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{subscriptions, StageContext, StageError, StageHandler};
use crate::application::site_monitor::SiteCreationMonitor;
use crate::domain::job::{CreateSiteJob, JobFile, ProvisioningStatus};
use crate::domain::messaging::{Message, Subscription};
use crate::domain::monitor::MonitorContext;
use crate::domain::site::{SiteCreationRequest, TEAM_SITE_TEMPLATE};

pub struct CreateSiteStage {
    ctx: StageContext,
    monitor: Arc<SiteCreationMonitor>,
}

impl CreateSiteStage {
    pub fn new(ctx: StageContext, monitor: Arc<SiteCreationMonitor>) -> Self {
        Self { ctx, monitor }
    }

    fn creation_request(&self, job_file: &JobFile) -> Result<SiteCreationRequest, StageError> {
        let url = self
            .ctx
            .tenant
            .resolve_site_url(&job_file.relative_url)
            .map_err(StageError::permanent)?;
        Ok(SiteCreationRequest {
            url,
            title: job_file.site_title.clone(),
            template: TEAM_SITE_TEMPLATE.to_string(),
            owner: job_file.owner.clone(),
            storage_maximum_level: job_file.storage_maximum_level,
            storage_warning_level: job_file.storage_warning_level,
            user_code_maximum_level: job_file.user_code_maximum_level,
            user_code_warning_level: job_file.user_code_warning_level,
            time_zone_id: job_file.time_zone,
        })
    }
}

#[async_trait]
impl StageHandler for CreateSiteStage {
    fn subscription(&self) -> Subscription {
        subscriptions::CREATE_SITE
    }

    async fn handle(&self, message: &Message) -> Result<(), StageError> {
        let job: CreateSiteJob = message.decode()?;
        let job_file = self.ctx.read_job_file(&job.file_name_with_extension).await?;

        let request = match self.creation_request(&job_file) {
            Ok(request) => request,
            Err(e) => {
                warn!(list_item_id = %job.list_item_id, "Cannot build site creation request: {}", e);
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedCreatingSite)
                    .await?;
                return Ok(());
            }
        };

        match self.ctx.hosting.create_site(&self.ctx.tenant, &request).await {
            Ok(()) => {
                info!(list_item_id = %job.list_item_id, site_url = %request.url, "Site creation requested");
            }
            // A redelivery after an accepted request; the monitor sorts it out.
            Err(e) if e.is_conflict() => {
                info!(list_item_id = %job.list_item_id, site_url = %request.url, "Site creation already requested");
            }
            Err(e) if e.is_transient() => return Err(StageError::retryable(e)),
            Err(e) => {
                warn!(list_item_id = %job.list_item_id, site_url = %request.url, "Site creation failed: {}", e);
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedCreatingSite)
                    .await?;
                return Ok(());
            }
        }

        let context = MonitorContext {
            site_url: request.url,
            list_item_id: job.list_item_id,
            file_name_with_extension: job.file_name_with_extension.clone(),
            template_url: job_file.provisioning_template_url.clone(),
            requested_at: self.ctx.clock.now(),
            site_created: false,
        };
        self.monitor
            .start(context)
            .await
            .map_err(StageError::retryable)?;
        Ok(())
    }

    async fn on_dead_letter(&self, message: &Message, _reason: &str) {
        if let Ok(job) = message.decode::<CreateSiteJob>() {
            self.ctx
                .status
                .report_final(job.list_item_id, ProvisioningStatus::FailedCreatingSite)
                .await;
        }
    }
}
