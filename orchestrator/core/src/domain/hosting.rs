// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! # Site-Hosting Collaborators
//!
//! Interfaces to the platform that actually hosts the sites. The pipeline
//! never talks to the platform directly; every call goes through one of the
//! traits below with the [`Tenant`] passed explicitly.
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`SiteHostingClient`] | intake, create-site, monitor, metadata update, site queries |
//! | [`TrackingList`] | every stage (status writes) |
//! | [`TemplateSource`] | template cache manager |
//! | [`TemplateEngine`] | template application executor |
//!
//! The REST adapter lives in `crate::infrastructure::hosting`.

use async_trait::async_trait;
use url::Url;

use crate::domain::job::{ListItemId, ProvisioningStatus};
use crate::domain::site::{SiteCreationRequest, SiteState, Tenant};
use crate::domain::template::ProvisioningTemplate;

#[async_trait]
pub trait SiteHostingClient: Send + Sync {
    /// Request creation of a site collection. Returns once the request is
    /// accepted; creation itself completes asynchronously.
    async fn create_site(
        &self,
        tenant: &Tenant,
        request: &SiteCreationRequest,
    ) -> Result<(), HostingError>;

    /// Lifecycle state of a live site. Fails with `NotFound` while the
    /// platform does not know the URL yet.
    async fn site_status(&self, tenant: &Tenant, site_url: &Url) -> Result<SiteState, HostingError>;

    /// State of a soft-deleted site at the same URL, if any.
    async fn deleted_site_status(
        &self,
        tenant: &Tenant,
        site_url: &Url,
    ) -> Result<SiteState, HostingError>;

    async fn web_title(&self, tenant: &Tenant, site_url: &Url) -> Result<String, HostingError>;

    async fn set_web_title(
        &self,
        tenant: &Tenant,
        site_url: &Url,
        title: &str,
    ) -> Result<(), HostingError>;

    /// Raw bytes of a file addressed by its server-relative URL.
    async fn download_file(
        &self,
        tenant: &Tenant,
        server_relative_url: &str,
    ) -> Result<Vec<u8>, HostingError>;
}

/// The external list that operators watch for job progress.
#[async_trait]
pub trait TrackingList: Send + Sync {
    async fn set_job_status(
        &self,
        tenant: &Tenant,
        list_item_id: ListItemId,
        status: &ProvisioningStatus,
    ) -> Result<(), HostingError>;
}

/// Canonical (uncached) template storage.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch_template(&self, tenant: &Tenant, template_url: &str) -> Result<Vec<u8>, HostingError>;
}

/// Callbacks raised while a template is applied. Purely informational.
pub trait ApplyObserver: Send + Sync {
    fn progress(&self, message: &str, step: u32, total: u32);
    fn message(&self, kind: &str, message: &str);
}

#[async_trait]
pub trait TemplateEngine: Send + Sync {
    /// Parse cached template bytes into a template with its parameter table.
    async fn load(&self, name: &str, content: &[u8]) -> Result<ProvisioningTemplate, HostingError>;

    async fn apply(
        &self,
        tenant: &Tenant,
        site_url: &Url,
        template: &ProvisioningTemplate,
        observer: &dyn ApplyObserver,
    ) -> Result<(), HostingError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HostingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Template error: {0}")]
    Template(String),
}

impl HostingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The platform refused because the resource already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Rejected { status: 409, .. })
    }

    /// Worth another delivery attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
