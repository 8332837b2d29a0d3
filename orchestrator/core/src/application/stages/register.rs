// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{subscriptions, StageContext, StageError, StageHandler};
use crate::domain::job::CreateSiteJob;
use crate::domain::messaging::{Message, Subscription};
use crate::domain::repository::StatusStore;
use crate::domain::status::StatusRecord;

/// Seeds the status record of a new site. Runs alongside site creation on
/// the same messages; it owns no tracking status of its own.
pub struct RegisterSiteStage {
    ctx: StageContext,
    status_store: Arc<dyn StatusStore>,
}

impl RegisterSiteStage {
    pub fn new(ctx: StageContext, status_store: Arc<dyn StatusStore>) -> Self {
        Self { ctx, status_store }
    }
}

#[async_trait]
impl StageHandler for RegisterSiteStage {
    fn subscription(&self) -> Subscription {
        subscriptions::REGISTER_SITE
    }

    async fn handle(&self, message: &Message) -> Result<(), StageError> {
        let job: CreateSiteJob = message.decode()?;
        let job_file = self.ctx.read_job_file(&job.file_name_with_extension).await?;

        let record = StatusRecord::registered(&job_file);
        let key = self
            .status_store
            .insert_or_replace(&record)
            .await
            .map_err(StageError::retryable)?;

        info!(
            list_item_id = %job.list_item_id,
            url = %record.url,
            key = %key,
            "Site registered"
        );
        Ok(())
    }
}
