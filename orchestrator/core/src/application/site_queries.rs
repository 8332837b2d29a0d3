// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Synchronous site queries served by the HTTP API.

use std::sync::Arc;
use tracing::debug;

use crate::domain::hosting::SiteHostingClient;
use crate::domain::site::{site_type_code, SiteExistsResult, Tenant};

pub struct SiteQueryService {
    tenant: Tenant,
    hosting: Arc<dyn SiteHostingClient>,
}

impl SiteQueryService {
    pub fn new(tenant: Tenant, hosting: Arc<dyn SiteHostingClient>) -> Self {
        Self { tenant, hosting }
    }

    /// Best-effort existence check. Any failure, including an unresolvable
    /// URL, is reported as `exists: false`.
    pub async fn site_exists(&self, relative_url: &str) -> SiteExistsResult {
        let mut result = SiteExistsResult {
            relative_url: Some(relative_url.to_string()),
            site_type: site_type_code(relative_url),
            ..Default::default()
        };

        let url = match self.tenant.resolve_site_url(relative_url) {
            Ok(url) => url,
            Err(e) => {
                debug!(relative_url, "Cannot resolve site URL: {}", e);
                return result;
            }
        };
        result.absolute_uri = Some(url.to_string());

        match self.hosting.web_title(&self.tenant, &url).await {
            Ok(title) => {
                result.title = Some(title);
                result.exists = true;
            }
            Err(e) => debug!(site_url = %url, "Site does not exist or is unreachable: {}", e),
        }
        result
    }
}
