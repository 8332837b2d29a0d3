// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{subscriptions, StageContext, StageError, StageHandler};
use crate::application::template_cache::TemplateCacheManager;
use crate::domain::job::{ApplyTemplateJob, ProvisioningStatus};
use crate::domain::messaging::{labels, Message, Subscription, Topic};

/// Validates the template cache for a job, then passes a checked copy of the
/// job on to the apply stage.
pub struct TemplateCacheStage {
    ctx: StageContext,
    cache: Arc<TemplateCacheManager>,
}

impl TemplateCacheStage {
    pub fn new(ctx: StageContext, cache: Arc<TemplateCacheManager>) -> Self {
        Self { ctx, cache }
    }
}

#[async_trait]
impl StageHandler for TemplateCacheStage {
    fn subscription(&self) -> Subscription {
        subscriptions::UPDATE_TEMPLATE
    }

    async fn handle(&self, message: &Message) -> Result<(), StageError> {
        let job: ApplyTemplateJob = message.decode()?;

        match self
            .cache
            .ensure_fresh(&self.ctx.tenant, &job.provisioning_template_url, false)
            .await
        {
            Ok(outcome) => {
                info!(
                    list_item_id = %job.list_item_id,
                    "{}",
                    outcome.describe(&job.provisioning_template_url)
                );
                let successor = Message::new(
                    Topic::UpdateSites,
                    labels::APPLY_SITE_TEMPLATE,
                    &job.into_checked(),
                )?;
                self.ctx.publish(successor).await
            }
            Err(e) => {
                warn!(list_item_id = %job.list_item_id, "Template cache validation failed: {}", e);
                self.ctx
                    .status
                    .report(job.list_item_id, ProvisioningStatus::FailedTemplateCache)
                    .await?;
                Ok(())
            }
        }
    }

    async fn on_dead_letter(&self, message: &Message, _reason: &str) {
        if let Ok(job) = message.decode::<ApplyTemplateJob>() {
            self.ctx
                .status
                .report_final(job.list_item_id, ProvisioningStatus::FailedTemplateCache)
                .await;
        }
    }
}
