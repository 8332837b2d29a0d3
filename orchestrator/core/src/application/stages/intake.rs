// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Process new site request: fetch the job file from the provisioning site,
//! keep a validated copy in blob storage and hand the job to the new-sites
//! topic.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{subscriptions, StageContext, StageError, StageHandler};
use crate::domain::job::{CreateSiteJob, JobFile, ProvisioningStatus};
use crate::domain::messaging::{labels, Message, Subscription, Topic};

pub struct IntakeStage {
    ctx: StageContext,
}

impl IntakeStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for IntakeStage {
    fn subscription(&self) -> Subscription {
        subscriptions::NEW_SITE_REQUESTS
    }

    async fn handle(&self, message: &Message) -> Result<(), StageError> {
        let job: CreateSiteJob = message.decode()?;
        info!(
            list_item_id = %job.list_item_id,
            file = %job.file_name_with_extension,
            message_id = %message.id,
            "Processing new site request"
        );

        let file_url = self
            .ctx
            .tenant
            .provisioning_file_url(&job.folder_path, &job.file_name_with_extension);
        let bytes = match self.ctx.hosting.download_file(&self.ctx.tenant, &file_url).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_transient() => return Err(StageError::retryable(e)),
            Err(e) => {
                warn!(list_item_id = %job.list_item_id, file_url = %file_url, "Job file unavailable: {}", e);
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedInvalidJobFile)
                    .await?;
                return Ok(());
            }
        };

        let job_file = match JobFile::from_bytes(&bytes) {
            Ok(job_file) => job_file,
            Err(e) => {
                warn!(list_item_id = %job.list_item_id, file_url = %file_url, "Invalid job file: {}", e);
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedInvalidJobFile)
                    .await?;
                return Ok(());
            }
        };

        let normalized = job_file.to_json().map_err(StageError::permanent)?;
        self.ctx
            .blobs
            .put(
                &self.ctx.job_files_container,
                &job.file_name_with_extension,
                normalized.as_bytes(),
            )
            .await
            .map_err(StageError::retryable)?;

        let successor = Message::new(Topic::NewSites, labels::CREATE_SITE_COLLECTION, &job)?;
        self.ctx.publish(successor).await?;

        self.ctx
            .status
            .report(job.list_item_id, ProvisioningStatus::CreatingSite)
            .await?;
        Ok(())
    }

    async fn on_dead_letter(&self, message: &Message, _reason: &str) {
        if let Ok(job) = message.decode::<CreateSiteJob>() {
            self.ctx
                .status
                .report_final(job.list_item_id, ProvisioningStatus::FailedInvalidJobFile)
                .await;
        }
    }
}
