// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Apply template: the last stage of a new site. Loads the cached template,
//! applies it with the job's parameter overrides and reports the outcome.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{subscriptions, StageContext, StageError, StageHandler};
use crate::application::template_apply::{ApplyOutcome, TemplateApplicationExecutor};
use crate::application::template_cache::{TemplateCacheError, TemplateCacheManager};
use crate::domain::hosting::TemplateEngine;
use crate::domain::job::{ApplyTemplateJob, JobFile, ProvisioningStatus};
use crate::domain::messaging::{labels, Message, Subscription, Topic};
use crate::domain::storage::StorageError;
use crate::domain::template::{template_blob_name, ProvisioningTemplate};

pub struct ApplyTemplateStage {
    ctx: StageContext,
    cache: Arc<TemplateCacheManager>,
    engine: Arc<dyn TemplateEngine>,
    executor: Arc<TemplateApplicationExecutor>,
}

impl ApplyTemplateStage {
    pub fn new(
        ctx: StageContext,
        cache: Arc<TemplateCacheManager>,
        engine: Arc<dyn TemplateEngine>,
        executor: Arc<TemplateApplicationExecutor>,
    ) -> Self {
        Self {
            ctx,
            cache,
            engine,
            executor,
        }
    }

    async fn prepare(&self, job: &ApplyTemplateJob) -> Result<(JobFile, ProvisioningTemplate), StageError> {
        let job_file = self.ctx.read_job_file(&job.file_name_with_extension).await?;
        let blob = self
            .cache
            .cached_template(&job_file.provisioning_template_url)
            .await
            .map_err(|e| match e {
                TemplateCacheError::Storage(StorageError::IoError(_)) => StageError::retryable(e),
                e => StageError::permanent(e),
            })?;
        let name = template_blob_name(&job_file.provisioning_template_url);
        let template = self
            .engine
            .load(&name, &blob.content)
            .await
            .map_err(StageError::permanent)?;
        Ok((job_file, template))
    }
}

#[async_trait]
impl StageHandler for ApplyTemplateStage {
    fn subscription(&self) -> Subscription {
        subscriptions::APPLY_TEMPLATE
    }

    async fn handle(&self, message: &Message) -> Result<(), StageError> {
        let job: ApplyTemplateJob = message.decode()?;
        if !job.checked {
            warn!(
                list_item_id = %job.list_item_id,
                message_id = %message.id,
                "Template cache not validated for this job, dropping"
            );
            return Ok(());
        }

        self.ctx
            .status
            .report(job.list_item_id, ProvisioningStatus::ApplyingTemplate)
            .await?;

        let (job_file, template) = match self.prepare(&job).await {
            Ok(prepared) => prepared,
            Err(e @ StageError::Retryable(_)) => {
                warn!(list_item_id = %job.list_item_id, "Template not readable yet: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!(list_item_id = %job.list_item_id, "Cannot load template: {}", e);
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedApplyingTemplate)
                    .await?;
                return Ok(());
            }
        };

        let site_url = match self.ctx.tenant.resolve_site_url(&job_file.relative_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(list_item_id = %job.list_item_id, "{}", e);
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedApplyingTemplate)
                    .await?;
                return Ok(());
            }
        };

        let outcome = self
            .executor
            .apply(
                &self.ctx.tenant,
                job.list_item_id,
                &site_url,
                template,
                &job_file.template_parameters,
            )
            .await;

        match outcome {
            ApplyOutcome::Applied { attempts } => {
                let successor =
                    Message::new(Topic::Defaults, labels::SET_DEFAULT_COLUMN_VALUES, &job)?;
                self.ctx.publish(successor).await?;
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::Provisioned)
                    .await?;
                info!(list_item_id = %job.list_item_id, site_url = %site_url, attempts, "Site provisioned");
            }
            ApplyOutcome::Failed { attempts, last_error } => {
                warn!(
                    list_item_id = %job.list_item_id,
                    site_url = %site_url,
                    attempts,
                    "Giving up on template: {}",
                    last_error
                );
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedApplyingTemplate)
                    .await?;
            }
        }
        Ok(())
    }

    async fn on_dead_letter(&self, message: &Message, _reason: &str) {
        if let Ok(job) = message.decode::<ApplyTemplateJob>() {
            if job.checked {
                self.ctx
                    .status
                    .report_final(job.list_item_id, ProvisioningStatus::FailedApplyingTemplate)
                    .await;
            }
        }
    }
}
