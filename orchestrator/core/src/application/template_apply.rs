// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Template Application Executor
//!
//! Applies a loaded template to a site with bounded retries. Attempts run
//! back to back; the engine's own calls are expected to handle throttling.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::events::TemplateEvent;
use crate::domain::hosting::{ApplyObserver, TemplateEngine};
use crate::domain::job::ListItemId;
use crate::domain::site::Tenant;
use crate::domain::template::ProvisioningTemplate;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Applied { attempts } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

pub struct TemplateApplicationExecutor {
    engine: Arc<dyn TemplateEngine>,
    max_retries: u32,
    event_bus: EventBus,
}

impl TemplateApplicationExecutor {
    pub fn new(engine: Arc<dyn TemplateEngine>, max_retries: u32, event_bus: EventBus) -> Self {
        Self {
            engine,
            max_retries,
            event_bus,
        }
    }

    /// Merge `overrides` into the template parameters and apply it to
    /// `site_url`, making at most `1 + max_retries` attempts.
    pub async fn apply(
        &self,
        tenant: &Tenant,
        list_item_id: ListItemId,
        site_url: &Url,
        mut template: ProvisioningTemplate,
        overrides: &BTreeMap<String, String>,
    ) -> ApplyOutcome {
        template.merge_parameters(overrides);
        let total = self.max_retries + 1;
        let observer = EventObserver {
            list_item_id,
            event_bus: self.event_bus.clone(),
        };

        let mut last_error = String::new();
        for attempt in 1..=total {
            debug!(
                list_item_id = %list_item_id,
                site_url = %site_url,
                attempt,
                total,
                "Applying template"
            );
            match self.engine.apply(tenant, site_url, &template, &observer).await {
                Ok(()) => {
                    metrics::counter!("provisioning_template_apply_attempts_total", "outcome" => "success")
                        .increment(1);
                    info!(
                        list_item_id = %list_item_id,
                        site_url = %site_url,
                        template = %template.name,
                        attempts = attempt,
                        "Template applied"
                    );
                    self.event_bus.publish_template_event(TemplateEvent::TemplateApplied {
                        list_item_id,
                        site_url: site_url.to_string(),
                        attempts: attempt,
                        applied_at: Utc::now(),
                    });
                    return ApplyOutcome::Applied { attempts: attempt };
                }
                Err(e) => {
                    metrics::counter!("provisioning_template_apply_attempts_total", "outcome" => "failure")
                        .increment(1);
                    warn!(
                        list_item_id = %list_item_id,
                        site_url = %site_url,
                        "Apply attempt {}/{} failed: {}",
                        attempt,
                        total,
                        e
                    );
                    self.event_bus.publish_template_event(TemplateEvent::ApplyAttemptFailed {
                        list_item_id,
                        site_url: site_url.to_string(),
                        attempt,
                        total,
                        error: e.to_string(),
                        failed_at: Utc::now(),
                    });
                    last_error = e.to_string();
                }
            }
        }

        ApplyOutcome::Failed {
            attempts: total,
            last_error,
        }
    }
}

/// Forwards engine callbacks to the log and the event bus.
struct EventObserver {
    list_item_id: ListItemId,
    event_bus: EventBus,
}

impl ApplyObserver for EventObserver {
    fn progress(&self, message: &str, step: u32, total: u32) {
        debug!(list_item_id = %self.list_item_id, step, total, "{}", message);
        self.event_bus.publish_template_event(TemplateEvent::ApplyProgress {
            list_item_id: self.list_item_id,
            message: message.to_string(),
            step,
            total,
        });
    }

    fn message(&self, kind: &str, message: &str) {
        debug!(list_item_id = %self.list_item_id, kind, "{}", message);
        self.event_bus.publish_template_event(TemplateEvent::ApplyMessage {
            list_item_id: self.list_item_id,
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hosting::HostingError;
    use crate::domain::site::TenantId;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Fails the first `failures` calls, records the parameters it saw.
    struct FlakyEngine {
        failures: u32,
        calls: Mutex<Vec<BTreeMap<String, String>>>,
    }

    #[async_trait]
    impl TemplateEngine for FlakyEngine {
        async fn load(&self, name: &str, content: &[u8]) -> Result<ProvisioningTemplate, HostingError> {
            Ok(ProvisioningTemplate {
                name: name.to_string(),
                parameters: BTreeMap::new(),
                content: content.to_vec(),
            })
        }

        async fn apply(
            &self,
            _tenant: &Tenant,
            _site_url: &Url,
            template: &ProvisioningTemplate,
            observer: &dyn ApplyObserver,
        ) -> Result<(), HostingError> {
            let mut calls = self.calls.lock();
            calls.push(template.parameters.clone());
            observer.progress("Fields", 1, 1);
            if calls.len() as u32 <= self.failures {
                return Err(HostingError::Template("list already exists".to_string()));
            }
            Ok(())
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            id: TenantId("contoso".to_string()),
            url: Url::parse("https://contoso.example.com").unwrap(),
            admin_url: Url::parse("https://contoso-admin.example.com").unwrap(),
            provisioning_site_url: Url::parse("https://contoso.example.com/sites/provisioning").unwrap(),
        }
    }

    fn template() -> ProvisioningTemplate {
        ProvisioningTemplate {
            name: "t1.xml".to_string(),
            parameters: BTreeMap::from([("Department".to_string(), "Default".to_string())]),
            content: b"<template/>".to_vec(),
        }
    }

    async fn run(failures: u32) -> (ApplyOutcome, Arc<FlakyEngine>) {
        let engine = Arc::new(FlakyEngine {
            failures,
            calls: Mutex::new(Vec::new()),
        });
        let executor = TemplateApplicationExecutor::new(engine.clone(), 3, EventBus::new(64));
        let site = Url::parse("https://contoso.example.com/sites/ABCD").unwrap();
        let overrides = BTreeMap::from([("Department".to_string(), "Finance".to_string())]);
        let outcome = executor
            .apply(&tenant(), ListItemId(1), &site, template(), &overrides)
            .await;
        (outcome, engine)
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let (outcome, engine) = run(2).await;
        assert_eq!(outcome, ApplyOutcome::Applied { attempts: 3 });
        assert_eq!(engine.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_four_attempts() {
        let (outcome, engine) = run(10).await;
        assert!(!outcome.is_applied());
        assert_eq!(outcome.attempts(), 4);
        assert_eq!(engine.calls.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_overrides_reach_engine() {
        let (_, engine) = run(0).await;
        let calls = engine.calls.lock();
        assert_eq!(calls[0].get("Department").map(String::as_str), Some("Finance"));
    }
}
