// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Status Record: one row of provisioning progress per site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::job::JobFile;

/// Provisioning status code stored on a freshly registered site.
pub const STATUS_REGISTERED: i32 = 0;

/// (partition key, row key) pair addressing one status record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusKey {
    pub partition_key: String,
    pub row_key: String,
}

impl StatusKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition_key, self.row_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusRecord {
    #[serde(flatten)]
    pub key: StatusKey,
    pub title: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub provisioning_status: i32,
    pub updated: Option<DateTime<Utc>>,
    pub provisioning_template_url: String,
}

impl StatusRecord {
    /// Record seeded at registration, keyed by (template URL, relative URL).
    ///
    /// Registration is optimistic: it happens before the site exists.
    pub fn registered(job_file: &JobFile) -> Self {
        Self {
            key: StatusKey::new(
                job_file.provisioning_template_url.clone(),
                job_file.relative_url.clone(),
            ),
            title: job_file.site_title.clone(),
            url: job_file.relative_url.clone(),
            provisioning_status: STATUS_REGISTERED,
            updated: None,
            provisioning_template_url: job_file.provisioning_template_url.clone(),
        }
    }

    /// Apply a merge-style partial update: only supplied fields change.
    pub fn merge(&mut self, patch: &StatusPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(status) = patch.provisioning_status {
            self.provisioning_status = status;
        }
        if let Some(updated) = patch.updated {
            self.updated = Some(updated);
        }
        if let Some(template_url) = &patch.provisioning_template_url {
            self.provisioning_template_url = template_url.clone();
        }
    }
}

/// Partial update of a status record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub provisioning_status: Option<i32>,
    pub updated: Option<DateTime<Utc>>,
    pub provisioning_template_url: Option<String>,
}

impl StatusPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_registered_record_keys() {
        let job_file = JobFile {
            relative_url: "/sites/ABCD".to_string(),
            site_title: "ABCD".to_string(),
            owner: "o".to_string(),
            storage_maximum_level: 0,
            storage_warning_level: 0,
            user_code_maximum_level: 0,
            user_code_warning_level: 0,
            time_zone: 0,
            provisioning_template_url: "t1.xml".to_string(),
            template_parameters: BTreeMap::new(),
        };
        let record = StatusRecord::registered(&job_file);
        assert_eq!(record.key, StatusKey::new("t1.xml", "/sites/ABCD"));
        assert_eq!(record.provisioning_status, STATUS_REGISTERED);
        assert!(record.updated.is_none());
    }

    #[test]
    fn test_merge_only_changes_supplied_fields() {
        let mut record = StatusRecord {
            key: StatusKey::new("ABCD", "/sites/ABCD"),
            title: "Old".to_string(),
            url: "/sites/ABCD".to_string(),
            provisioning_status: 3,
            updated: None,
            provisioning_template_url: "t1.xml".to_string(),
        };
        record.merge(&StatusPatch::title("New"));
        assert_eq!(record.title, "New");
        assert_eq!(record.provisioning_status, 3);
        assert_eq!(record.provisioning_template_url, "t1.xml");
    }
}
