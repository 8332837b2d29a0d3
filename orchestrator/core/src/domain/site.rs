// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Sites and the tenant that hosts them.
//!
//! [`Tenant`] is resolved once at the trust boundary (process start-up) and
//! passed explicitly into every collaborator call.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Web template used for every new site collection.
pub const TEAM_SITE_TEMPLATE: &str = "STS#0";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Site-hosting tenant the pipeline provisions into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: TenantId,
    /// Root URL that relative site URLs resolve against.
    pub url: Url,
    /// Administration endpoint used for site creation and status queries.
    pub admin_url: Url,
    /// Site holding the tracking list, job files and canonical templates.
    pub provisioning_site_url: Url,
}

#[derive(Debug, thiserror::Error)]
pub enum SiteUrlError {
    #[error("Invalid site URL '{url}': {reason}")]
    Invalid { url: String, reason: String },
}

impl Tenant {
    /// Resolve a site-relative URL (e.g. `/sites/ABCD`) against the tenant root.
    ///
    /// The result always stays on the tenant's origin: absolute and
    /// scheme-relative inputs are rejected.
    pub fn resolve_site_url(&self, relative_url: &str) -> Result<Url, SiteUrlError> {
        let invalid = |reason: String| SiteUrlError::Invalid {
            url: relative_url.to_string(),
            reason,
        };
        if !relative_url.starts_with('/') {
            return Err(invalid("must start with '/'".to_string()));
        }
        let url = self.url.join(relative_url).map_err(|e| invalid(e.to_string()))?;
        if url.origin() != self.url.origin() {
            return Err(invalid(format!("resolves outside tenant {}", self.url)));
        }
        Ok(url)
    }

    /// Server-relative URL of a file inside the provisioning site.
    pub fn provisioning_file_url(&self, folder_path: &str, file_name: &str) -> String {
        let site_path = self.provisioning_site_url.path().trim_end_matches('/');
        format!("{}/{}{}", site_path, folder_path, file_name)
    }
}

/// Path and query part of an absolute site URL.
pub fn relative_site_url(absolute_url: &str) -> Result<String, SiteUrlError> {
    let url = Url::parse(absolute_url).map_err(|e| SiteUrlError::Invalid {
        url: absolute_url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

/// Four-letter site type code embedded in the site path.
///
/// `/sites/abcd-project` and `/teams/abcd-project` both yield `ABCD`.
pub fn site_type_code(relative_url: &str) -> Option<String> {
    let rest = relative_url
        .strip_prefix("/sites/")
        .or_else(|| relative_url.strip_prefix("/teams/"))?;
    let code: String = rest.chars().take(4).collect();
    if code.chars().count() < 4 || code.contains('/') {
        return None;
    }
    Some(code.to_uppercase())
}

/// Lifecycle state of a site as reported by the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteState {
    Active,
    Creating,
    Recycled,
    Other(String),
}

impl SiteState {
    /// Interpret the platform's status text (case-insensitive).
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "creating" => Self::Creating,
            "recycled" => Self::Recycled,
            _ => Self::Other(status.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_recycled(&self) -> bool {
        matches!(self, Self::Recycled)
    }
}

impl fmt::Display for SiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Creating => f.write_str("Creating"),
            Self::Recycled => f.write_str("Recycled"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Properties of a new site collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCreationRequest {
    pub url: Url,
    pub title: String,
    pub template: String,
    pub owner: String,
    pub storage_maximum_level: i64,
    pub storage_warning_level: i64,
    pub user_code_maximum_level: i64,
    pub user_code_warning_level: i64,
    pub time_zone_id: i32,
}

/// Result of the synchronous "does this site exist" query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SiteExistsResult {
    pub title: Option<String>,
    pub absolute_uri: Option<String>,
    pub relative_url: Option<String>,
    #[serde(rename = "Type")]
    pub site_type: Option<String>,
    pub exists: bool,
}
