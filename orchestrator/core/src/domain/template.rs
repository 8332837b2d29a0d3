// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! # Provisioning Templates
//!
//! A template is an opaque document produced and consumed by the template
//! engine collaborator. The pipeline only needs three things from it: the
//! raw bytes (cached in blob storage), the named-parameter table (merged with
//! the job's overrides before applying) and the name of its cache blob.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A template loaded by the engine and ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningTemplate {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
    pub content: Vec<u8>,
}

impl ProvisioningTemplate {
    /// Merge job-level overrides into the parameter table. Overrides win.
    pub fn merge_parameters(&mut self, overrides: &BTreeMap<String, String>) {
        for (name, value) in overrides {
            self.parameters.insert(name.clone(), value.clone());
        }
    }
}

/// Blob name of the cached copy of a template: the base name of its URL.
///
/// `https://host/sites/prov/Templates/t1.xml?web=1` caches as `t1.xml`.
pub fn template_blob_name(template_url: &str) -> String {
    let without_query = template_url
        .split(['?', '#'])
        .next()
        .unwrap_or(template_url);
    without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query)
        .to_string()
}

/// Why a cached template was refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    Forced,
    Missing,
    Stale,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forced => "forced",
            Self::Missing => "missing",
            Self::Stale => "stale",
        }
    }
}

/// Result of a cache validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CacheOutcome {
    Updated(RefreshReason),
    Fresh,
}

impl CacheOutcome {
    pub fn was_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    /// Operator-facing description, as returned by the validation endpoint.
    pub fn describe(&self, template_url: &str) -> String {
        match self {
            Self::Updated(RefreshReason::Forced) | Self::Updated(RefreshReason::Missing) => format!(
                "Template {} updated because 'update' parameter was provided or template did not yet exist in blob storage.",
                template_url
            ),
            Self::Updated(RefreshReason::Stale) => format!(
                "Template {} updated because template in blob storage was too old.",
                template_url
            ),
            Self::Fresh => format!(
                "Template {} not updated because template in blob storage was still valid.",
                template_url
            ),
        }
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated(reason) => write!(f, "updated ({})", reason.as_str()),
            Self::Fresh => f.write_str("not updated"),
        }
    }
}
