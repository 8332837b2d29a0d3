// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Site-Hosting Gateway REST Adapter
//!
//! Implements every hosting collaborator against a gateway service that
//! fronts the site-hosting platform. The gateway owns platform credentials;
//! this adapter only presents a bearer API key.
//!
//! # API Endpoints
//!
//! All paths are below `/api/tenants/{tenant}`:
//!
//! - `POST /sites` - Request site creation (`409` when already requested)
//! - `GET /sites/status?url=` - Live site status
//! - `GET /deleted-sites/status?url=` - Recycle bin status
//! - `GET /webs/title?url=` / `PUT /webs/title` - Web title
//! - `GET /files?path=` - Download a file by server-relative URL
//! - `PUT /lists/{list}/items/{id}/fields/{field}` - Tracking list status
//! - `GET /templates?url=` - Canonical template content
//! - `POST /templates/load` / `POST /templates/apply` - Template engine

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::hosting::{
    ApplyObserver, HostingError, SiteHostingClient, TemplateEngine, TemplateSource, TrackingList,
};
use crate::domain::job::{ListItemId, ProvisioningStatus};
use crate::domain::site::{SiteCreationRequest, SiteState, Tenant};
use crate::domain::template::ProvisioningTemplate;

pub struct RestHostingGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    list_title: String,
    status_field: String,
}

impl RestHostingGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, HostingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HostingError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            list_title: "PnPProvisioningJobs".to_string(),
            status_field: "PnPProvisioningJobStatus".to_string(),
        })
    }

    /// Tracking list and status column written by [`TrackingList::set_job_status`].
    pub fn with_tracking_list(mut self, list_title: impl Into<String>, status_field: impl Into<String>) -> Self {
        self.list_title = list_title.into();
        self.status_field = status_field.into();
        self
    }

    fn build_url(&self, tenant: &Tenant, path: &str) -> String {
        format!("{}/api/tenants/{}{}", self.base_url, tenant.id, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, HostingError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| HostingError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| format!("HTTP {}", status));
        debug!(status = status.as_u16(), what, "Gateway request rejected");
        if status == StatusCode::NOT_FOUND {
            return Err(HostingError::NotFound(format!("{}: {}", what, body)));
        }
        Err(HostingError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, HostingError> {
        response
            .json::<T>()
            .await
            .map_err(|e| HostingError::InvalidResponse(e.to_string()))
    }

    async fn bytes(response: Response) -> Result<Vec<u8>, HostingError> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| HostingError::Transport(e.to_string()))
    }

    async fn state(&self, tenant: &Tenant, path: &str, site_url: &Url) -> Result<SiteState, HostingError> {
        let request = self
            .client
            .get(self.build_url(tenant, path))
            .query(&[("url", site_url.as_str())]);
        let response = self.send(request, site_url.as_str()).await?;
        let body: SiteStatusResponse = Self::json(response).await?;
        Ok(SiteState::parse(&body.status))
    }
}

#[derive(Debug, Deserialize)]
struct SiteStatusResponse {
    status: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WebTitle {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    title: String,
}

#[derive(Debug, Serialize)]
struct FieldValue<'a> {
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct LoadTemplateRequest<'a> {
    name: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct LoadTemplateResponse {
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyTemplateRequest<'a> {
    site_url: &'a str,
    name: &'a str,
    parameters: &'a BTreeMap<String, String>,
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApplyTemplateResponse {
    #[serde(default)]
    progress: Vec<ProgressEntry>,
    #[serde(default)]
    messages: Vec<MessageEntry>,
}

#[derive(Debug, Deserialize)]
struct ProgressEntry {
    message: String,
    step: u32,
    total: u32,
}

#[derive(Debug, Deserialize)]
struct MessageEntry {
    kind: String,
    message: String,
}

#[async_trait]
impl SiteHostingClient for RestHostingGateway {
    async fn create_site(&self, tenant: &Tenant, request: &SiteCreationRequest) -> Result<(), HostingError> {
        let http = self.client.post(self.build_url(tenant, "/sites")).json(request);
        self.send(http, request.url.as_str()).await?;
        Ok(())
    }

    async fn site_status(&self, tenant: &Tenant, site_url: &Url) -> Result<SiteState, HostingError> {
        self.state(tenant, "/sites/status", site_url).await
    }

    async fn deleted_site_status(&self, tenant: &Tenant, site_url: &Url) -> Result<SiteState, HostingError> {
        self.state(tenant, "/deleted-sites/status", site_url).await
    }

    async fn web_title(&self, tenant: &Tenant, site_url: &Url) -> Result<String, HostingError> {
        let request = self
            .client
            .get(self.build_url(tenant, "/webs/title"))
            .query(&[("url", site_url.as_str())]);
        let response = self.send(request, site_url.as_str()).await?;
        let body: WebTitle = Self::json(response).await?;
        Ok(body.title)
    }

    async fn set_web_title(&self, tenant: &Tenant, site_url: &Url, title: &str) -> Result<(), HostingError> {
        let request = self.client.put(self.build_url(tenant, "/webs/title")).json(&WebTitle {
            url: Some(site_url.to_string()),
            title: title.to_string(),
        });
        self.send(request, site_url.as_str()).await?;
        Ok(())
    }

    async fn download_file(&self, tenant: &Tenant, server_relative_url: &str) -> Result<Vec<u8>, HostingError> {
        let request = self
            .client
            .get(self.build_url(tenant, "/files"))
            .query(&[("path", server_relative_url)]);
        let response = self.send(request, server_relative_url).await?;
        Self::bytes(response).await
    }
}

#[async_trait]
impl TrackingList for RestHostingGateway {
    async fn set_job_status(
        &self,
        tenant: &Tenant,
        list_item_id: ListItemId,
        status: &ProvisioningStatus,
    ) -> Result<(), HostingError> {
        let path = format!(
            "/lists/{}/items/{}/fields/{}",
            self.list_title, list_item_id, self.status_field
        );
        let request = self
            .client
            .put(self.build_url(tenant, &path))
            .json(&FieldValue { value: status.as_str() });
        self.send(request, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl TemplateSource for RestHostingGateway {
    async fn fetch_template(&self, tenant: &Tenant, template_url: &str) -> Result<Vec<u8>, HostingError> {
        let request = self
            .client
            .get(self.build_url(tenant, "/templates"))
            .query(&[("url", template_url)]);
        let response = self.send(request, template_url).await?;
        Self::bytes(response).await
    }
}

#[async_trait]
impl TemplateEngine for RestHostingGateway {
    async fn load(&self, name: &str, content: &[u8]) -> Result<ProvisioningTemplate, HostingError> {
        // Loading does not depend on the tenant; the gateway exposes it globally.
        let request = self
            .client
            .post(format!("{}/api/templates/load", self.base_url))
            .json(&LoadTemplateRequest {
                name,
                content: BASE64.encode(content),
            });
        let response = self.send(request, name).await?;
        let body: LoadTemplateResponse = Self::json(response).await?;
        Ok(ProvisioningTemplate {
            name: name.to_string(),
            parameters: body.parameters,
            content: content.to_vec(),
        })
    }

    async fn apply(
        &self,
        tenant: &Tenant,
        site_url: &Url,
        template: &ProvisioningTemplate,
        observer: &dyn ApplyObserver,
    ) -> Result<(), HostingError> {
        let request = self
            .client
            .post(self.build_url(tenant, "/templates/apply"))
            .json(&ApplyTemplateRequest {
                site_url: site_url.as_str(),
                name: &template.name,
                parameters: &template.parameters,
                content: BASE64.encode(&template.content),
            });
        let response = self.send(request, site_url.as_str()).await?;
        let report: ApplyTemplateResponse = Self::json(response).await.unwrap_or_default();
        for entry in &report.progress {
            observer.progress(&entry.message, entry.step, entry.total);
        }
        for entry in &report.messages {
            observer.message(&entry.kind, &entry.message);
        }
        Ok(())
    }
}
