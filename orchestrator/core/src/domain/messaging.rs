// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! # Message Channels
//!
//! Stages never call each other. A stage publishes a [`Message`] on a
//! [`Topic`] with a label, and every subscription on that topic whose label
//! filter matches receives its own copy. Delivery is at-least-once.
//!
//! ## Topology
//!
//! | Subscription | Topic | Label |
//! |---|---|---|
//! | `new-site-requests` | `site-operations` | `NewSite` |
//! | `update-site-requests` | `site-operations` | `UpdateSiteMetadata` |
//! | `register-site` | `new-sites` | `CreateSiteCollection` |
//! | `create-site` | `new-sites` | `CreateSiteCollection` |
//! | `update-template` | `update-sites` | `UpdateSiteTemplate` |
//! | `apply-template` | `update-sites` | `ApplySiteTemplate` |
//! | `update-metadata` | `update-sites` | `UpdateSiteMetadata` |
//!
//! The `defaults` topic receives `SetDefaultColumnValues` and has no
//! subscription inside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod labels {
    pub const NEW_SITE: &str = "NewSite";
    pub const CREATE_SITE_COLLECTION: &str = "CreateSiteCollection";
    pub const UPDATE_SITE_TEMPLATE: &str = "UpdateSiteTemplate";
    pub const APPLY_SITE_TEMPLATE: &str = "ApplySiteTemplate";
    pub const UPDATE_SITE_METADATA: &str = "UpdateSiteMetadata";
    pub const SET_DEFAULT_COLUMN_VALUES: &str = "SetDefaultColumnValues";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    SiteOperations,
    NewSites,
    UpdateSites,
    Defaults,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiteOperations => "site-operations",
            Self::NewSites => "new-sites",
            Self::UpdateSites => "update-sites",
            Self::Defaults => "defaults",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivery of a job between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: Topic,
    pub label: String,
    pub body: serde_json::Value,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Message {
    pub fn new<T: Serialize>(
        topic: Topic,
        label: impl Into<String>,
        body: &T,
    ) -> Result<Self, MessageError> {
        let body = serde_json::to_value(body).map_err(|e| MessageError::Encode(e.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            topic,
            label: label.into(),
            body,
            delivery_count: 0,
            enqueued_at: Utc::now(),
        })
    }

    /// Decode the body into the job type a stage expects.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        serde_json::from_value(self.body.clone()).map_err(|e| MessageError::Decode {
            message_id: self.id,
            reason: e.to_string(),
        })
    }
}

/// A named subscription: one topic, one label filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub name: &'static str,
    pub topic: Topic,
    pub label: &'static str,
}

impl Subscription {
    pub const fn new(name: &'static str, topic: Topic, label: &'static str) -> Self {
        Self { name, topic, label }
    }

    pub fn accepts(&self, message: &Message) -> bool {
        message.topic == self.topic && message.label == self.label
    }
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MessageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Failed to encode message body: {0}")]
    Encode(String),

    #[error("Failed to decode message {message_id}: {reason}")]
    Decode { message_id: Uuid, reason: String },

    #[error("Message bus is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{CreateSiteJob, ListItemId};

    #[test]
    fn test_message_decode() {
        let job = CreateSiteJob {
            list_item_id: ListItemId(12),
            folder_path: "Jobs/".to_string(),
            file_name_with_extension: "job1.json".to_string(),
        };
        let message = Message::new(Topic::NewSites, labels::CREATE_SITE_COLLECTION, &job).unwrap();
        assert_eq!(message.body["FileNameWithExtension"], "job1.json");
        let decoded: CreateSiteJob = message.decode().unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_decode_wrong_shape_fails() {
        let message = Message::new(Topic::NewSites, labels::CREATE_SITE_COLLECTION, &"text").unwrap();
        let err = message.decode::<CreateSiteJob>().unwrap_err();
        assert!(matches!(err, MessageError::Decode { .. }));
    }

    #[test]
    fn test_subscription_label_filter() {
        let subscription = Subscription::new("register-site", Topic::NewSites, labels::CREATE_SITE_COLLECTION);
        let accepted = Message::new(Topic::NewSites, labels::CREATE_SITE_COLLECTION, &1).unwrap();
        let other_label = Message::new(Topic::NewSites, labels::SET_DEFAULT_COLUMN_VALUES, &1).unwrap();
        let other_topic = Message::new(Topic::UpdateSites, labels::CREATE_SITE_COLLECTION, &1).unwrap();
        assert!(subscription.accepts(&accepted));
        assert!(!subscription.accepts(&other_label));
        assert!(!subscription.accepts(&other_topic));
    }
}
