// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Pipeline Stages
//!
//! Each stage is a stateless handler bound to one subscription. A handler
//! receives a message, does its work, publishes zero or more successors and
//! writes the job's status to the tracking list.
//!
//! # Failure policy
//!
//! Business failures (a job file that does not parse, a site the platform
//! refuses to create) are absorbed: the handler writes a terminal failure
//! status and returns `Ok`. Only infrastructure trouble surfaces as a
//! [`StageError`], which the coordinator turns into a redelivery or a
//! dead letter. Stages that own a tracking item implement
//! [`StageHandler::on_dead_letter`] so a dead-lettered job still ends with a
//! terminal status.

pub mod apply_template;
pub mod create_site;
pub mod intake;
pub mod register;
pub mod site_metadata;
pub mod template_cache;

pub use apply_template::ApplyTemplateStage;
pub use create_site::CreateSiteStage;
pub use intake::IntakeStage;
pub use register::RegisterSiteStage;
pub use site_metadata::{ProcessUpdateRequestStage, UpdateMetadataStage};
pub use template_cache::TemplateCacheStage;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::clock::Clock;
use crate::domain::events::PipelineEvent;
use crate::domain::hosting::{HostingError, SiteHostingClient, TrackingList};
use crate::domain::job::{JobFile, ListItemId, ProvisioningStatus};
use crate::domain::messaging::{Message, MessageError, MessagePublisher, Subscription};
use crate::domain::site::Tenant;
use crate::domain::storage::{BlobStore, StorageError};
use crate::infrastructure::event_bus::EventBus;

/// Subscriptions of the built-in stages.
pub mod subscriptions {
    use crate::domain::messaging::{labels, Subscription, Topic};

    pub const NEW_SITE_REQUESTS: Subscription =
        Subscription::new("new-site-requests", Topic::SiteOperations, labels::NEW_SITE);
    pub const UPDATE_SITE_REQUESTS: Subscription =
        Subscription::new("update-site-requests", Topic::SiteOperations, labels::UPDATE_SITE_METADATA);
    pub const REGISTER_SITE: Subscription =
        Subscription::new("register-site", Topic::NewSites, labels::CREATE_SITE_COLLECTION);
    pub const CREATE_SITE: Subscription =
        Subscription::new("create-site", Topic::NewSites, labels::CREATE_SITE_COLLECTION);
    pub const UPDATE_TEMPLATE: Subscription =
        Subscription::new("update-template", Topic::UpdateSites, labels::UPDATE_SITE_TEMPLATE);
    pub const APPLY_TEMPLATE: Subscription =
        Subscription::new("apply-template", Topic::UpdateSites, labels::APPLY_SITE_TEMPLATE);
    pub const UPDATE_METADATA: Subscription =
        Subscription::new("update-metadata", Topic::UpdateSites, labels::UPDATE_SITE_METADATA);
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    fn name(&self) -> &'static str {
        self.subscription().name
    }

    fn subscription(&self) -> Subscription;

    async fn handle(&self, message: &Message) -> Result<(), StageError>;

    /// Called once a message will not be delivered again.
    async fn on_dead_letter(&self, _message: &Message, _reason: &str) {}
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Payload does not have the shape this stage expects. Never retried.
    #[error(transparent)]
    Decode(#[from] MessageError),

    /// Worth another delivery.
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Permanent(String),
}

impl StageError {
    pub fn retryable(err: impl std::fmt::Display) -> Self {
        Self::Retryable(err.to_string())
    }

    pub fn permanent(err: impl std::fmt::Display) -> Self {
        Self::Permanent(err.to_string())
    }
}

impl From<HostingError> for StageError {
    fn from(err: HostingError) -> Self {
        if err.is_transient() {
            Self::Retryable(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

/// Writes job status to the tracking list and announces it on the event bus.
#[derive(Clone)]
pub struct StatusReporter {
    tenant: Tenant,
    tracking: Arc<dyn TrackingList>,
    event_bus: EventBus,
}

impl StatusReporter {
    pub fn new(tenant: Tenant, tracking: Arc<dyn TrackingList>, event_bus: EventBus) -> Self {
        Self {
            tenant,
            tracking,
            event_bus,
        }
    }

    pub async fn report(
        &self,
        list_item_id: ListItemId,
        status: ProvisioningStatus,
    ) -> Result<(), HostingError> {
        self.tracking
            .set_job_status(&self.tenant, list_item_id, &status)
            .await?;
        if status.is_terminal() {
            info!(list_item_id = %list_item_id, status = %status, "Job reached terminal status");
        } else {
            info!(list_item_id = %list_item_id, status = %status, "Job status updated");
        }
        self.event_bus.publish_pipeline_event(PipelineEvent::StatusWritten {
            list_item_id,
            status: status.as_str().to_string(),
            written_at: Utc::now(),
        });
        Ok(())
    }

    /// Best-effort terminal write used when a message is given up on.
    pub async fn report_final(&self, list_item_id: ListItemId, status: ProvisioningStatus) {
        if let Err(e) = self.report(list_item_id, status).await {
            warn!(list_item_id = %list_item_id, "Failed to write terminal status: {}", e);
        }
    }
}

/// Collaborators shared by every stage.
#[derive(Clone)]
pub struct StageContext {
    pub tenant: Tenant,
    pub hosting: Arc<dyn SiteHostingClient>,
    pub blobs: Arc<dyn BlobStore>,
    pub job_files_container: String,
    pub publisher: Arc<dyn MessagePublisher>,
    pub status: StatusReporter,
    pub event_bus: EventBus,
    pub clock: Arc<dyn Clock>,
}

impl StageContext {
    /// Read a job file previously stored at intake.
    pub async fn read_job_file(&self, file_name: &str) -> Result<JobFile, JobFileReadError> {
        let blob = self.blobs.get(&self.job_files_container, file_name).await?;
        JobFile::from_bytes(&blob.content).map_err(|e| JobFileReadError::Invalid(e.to_string()))
    }

    pub async fn publish(&self, message: Message) -> Result<(), StageError> {
        self.publisher.publish(message).await.map_err(StageError::retryable)
    }

    /// Log and announce a record that should exist but does not.
    pub fn integrity_warning(&self, stage: &str, detail: String) {
        warn!(stage, "Data integrity warning: {}", detail);
        self.event_bus.publish_pipeline_event(PipelineEvent::DataIntegrityWarning {
            stage: stage.to_string(),
            detail,
            detected_at: self.clock.now(),
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobFileReadError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Stored job file is invalid: {0}")]
    Invalid(String),
}

impl JobFileReadError {
    /// The job file does not exist or cannot be parsed: redelivery will not help.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Storage(StorageError::NotFound { .. }) | Self::Invalid(_) => true,
            Self::Storage(_) => false,
        }
    }
}

impl From<JobFileReadError> for StageError {
    fn from(err: JobFileReadError) -> Self {
        if err.is_permanent() {
            Self::Permanent(err.to_string())
        } else {
            Self::Retryable(err.to_string())
        }
    }
}
