// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! # Provisioning Jobs
//!
//! Value objects that travel between stages as message bodies, plus the
//! declarative [`JobFile`] that is written once at intake and read by every
//! downstream stage.
//!
//! Jobs are never mutated after a stage publishes them. A stage that needs
//! to add information (for example the `checked` flag) publishes a copy.
//!
//! Field names on the wire are PascalCase so that jobs produced by the
//! tracking list's workflow deserialize without a mapping layer.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of the job's item in the external tracking list.
///
/// This is the single correlation key used to report status back to the
/// system of record at every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListItemId(pub i64);

impl fmt::Display for ListItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to create a new site, produced at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateSiteJob {
    #[serde(rename = "ListItemID")]
    pub list_item_id: ListItemId,
    /// Folder of the job file inside the provisioning site, with trailing slash.
    #[serde(default)]
    pub folder_path: String,
    pub file_name_with_extension: String,
}

/// Request to (re)apply a provisioning template to an existing site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplyTemplateJob {
    #[serde(rename = "ListItemID")]
    pub list_item_id: ListItemId,
    pub file_name_with_extension: String,
    pub provisioning_template_url: String,
    /// Set once the template cache has been validated for this job.
    #[serde(default)]
    pub checked: bool,
}

impl ApplyTemplateJob {
    /// Copy of this job marked as cache-validated.
    pub fn into_checked(self) -> Self {
        Self {
            checked: true,
            ..self
        }
    }
}

/// Request to update metadata of an existing site.
///
/// `site_type` and `id` are empty at intake and filled in by the stage that
/// resolves the status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateSiteJob {
    pub url: String,
    pub title: String,
    #[serde(rename = "Type", default)]
    pub site_type: Option<String>,
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
}

/// Batch of site updates submitted through the HTTP intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateSiteRequest {
    #[serde(rename = "Type")]
    pub request_type: String,
    pub sites: Vec<UpdateSiteJob>,
}

/// Declarative description of the site to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobFile {
    pub relative_url: String,
    pub site_title: String,
    pub owner: String,
    #[serde(default)]
    pub storage_maximum_level: i64,
    #[serde(default)]
    pub storage_warning_level: i64,
    #[serde(default)]
    pub user_code_maximum_level: i64,
    #[serde(default)]
    pub user_code_warning_level: i64,
    #[serde(default)]
    pub time_zone: i32,
    pub provisioning_template_url: String,
    #[serde(default, deserialize_with = "unique_parameters")]
    pub template_parameters: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("Job file is not valid text: {0}")]
    Encoding(String),

    #[error("Job file is not a valid job description: {0}")]
    Format(#[from] serde_json::Error),
}

impl JobFile {
    /// Parse a job file from the raw bytes stored on the provisioning site.
    ///
    /// Accepts UTF-16LE with a byte order mark (the tracking list's default
    /// encoding) as well as UTF-8 with or without a BOM.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, JobFileError> {
        let text = decode_text(bytes)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, JobFileError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, JobFileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Decode job file bytes into text.
pub fn decode_text(bytes: &[u8]) -> Result<String, JobFileError> {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => {
            if rest.len() % 2 != 0 {
                return Err(JobFileError::Encoding("odd UTF-16 byte count".to_string()));
            }
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).map_err(|e| JobFileError::Encoding(e.to_string()))
        }
        [0xEF, 0xBB, 0xBF, rest @ ..] => {
            String::from_utf8(rest.to_vec()).map_err(|e| JobFileError::Encoding(e.to_string()))
        }
        _ => String::from_utf8(bytes.to_vec()).map_err(|e| JobFileError::Encoding(e.to_string())),
    }
}

// Template parameter names must be unique; a plain map would keep the last
// duplicate silently.
fn unique_parameters<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ParameterVisitor;

    impl<'de> Visitor<'de> for ParameterVisitor {
        type Value = BTreeMap<String, String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object of template parameter names to values")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut parameters = BTreeMap::new();
            while let Some((name, value)) = access.next_entry::<String, serde_json::Value>()? {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                if parameters.insert(name.clone(), value).is_some() {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate template parameter '{}'",
                        name
                    )));
                }
            }
            Ok(parameters)
        }
    }

    deserializer.deserialize_map(ParameterVisitor)
}

/// Human-readable status written to the tracking list.
///
/// Each stage overwrites the previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningStatus {
    CreatingSite,
    ApplyingTemplate,
    Provisioned,
    FailedInvalidJobFile,
    FailedCreatingSite,
    FailedRecycledConflict,
    FailedTemplateCache,
    FailedApplyingTemplate,
}

impl ProvisioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatingSite => "Running (creating site collection)",
            Self::ApplyingTemplate => "Running (applying template)",
            Self::Provisioned => "Provisioned",
            Self::FailedInvalidJobFile => "Failed (invalid job file)",
            Self::FailedCreatingSite => "Failed (error while creating site collection)",
            Self::FailedRecycledConflict => "Failed (site with same URL exists in recycle bin)",
            Self::FailedTemplateCache => "Failed (error while validating template cache)",
            Self::FailedApplyingTemplate => "Failed (error while applying template)",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::CreatingSite | Self::ApplyingTemplate)
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
