// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve status records and monitor instances
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//! - **PostgresStatusStore** - `sites` table
//! - **PostgresMonitorRepository** - `site_monitors` table
//!
//! ## In-Memory Repositories
//! - **InMemoryStatusStore**
//! - **InMemoryMonitorRepository**

pub mod postgres_monitor;
pub mod postgres_status;

pub use postgres_monitor::PostgresMonitorRepository;
pub use postgres_status::PostgresStatusStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::monitor::{MonitorId, MonitorInstance, ResumeToken};
use crate::domain::repository::{MonitorRepository, RepositoryError, StatusStore};
use crate::domain::status::{StatusKey, StatusPatch, StatusRecord};

#[derive(Clone, Default)]
pub struct InMemoryStatusStore {
    records: Arc<RwLock<BTreeMap<StatusKey, StatusRecord>>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn all(&self) -> Vec<StatusRecord> {
        self.records.read().values().cloned().collect()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn insert_or_replace(&self, record: &StatusRecord) -> Result<StatusKey, RepositoryError> {
        let mut records = self.records.write();
        let existing_key = records
            .values()
            .find(|r| r.url == record.url)
            .map(|r| r.key.clone());
        let key = existing_key.unwrap_or_else(|| record.key.clone());
        let mut stored = record.clone();
        stored.key = key.clone();
        records.insert(key.clone(), stored);
        Ok(key)
    }

    async fn merge(&self, key: &StatusKey, patch: &StatusPatch) -> Result<StatusRecord, RepositoryError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(key)
            .ok_or_else(|| RepositoryError::NotFound(format!("status record {}", key)))?;
        record.merge(patch);
        Ok(record.clone())
    }

    async fn get(&self, key: &StatusKey) -> Result<Option<StatusRecord>, RepositoryError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<StatusRecord>, RepositoryError> {
        Ok(self.records.read().values().find(|r| r.url == url).cloned())
    }

    async fn rekey(&self, from: &StatusKey, to: &StatusKey) -> Result<StatusRecord, RepositoryError> {
        let mut records = self.records.write();
        match records.remove(from) {
            Some(mut record) => {
                record.key = to.clone();
                records.insert(to.clone(), record.clone());
                Ok(record)
            }
            None => records
                .get(to)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(format!("status record {}", from))),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMonitorRepository {
    instances: Arc<RwLock<HashMap<MonitorId, MonitorInstance>>>,
}

impl InMemoryMonitorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorRepository for InMemoryMonitorRepository {
    async fn insert_unless_active(&self, instance: &MonitorInstance) -> Result<bool, RepositoryError> {
        let mut instances = self.instances.write();
        if let Some(existing) = instances.get(&instance.id) {
            if !existing.phase.is_terminal() {
                return Ok(false);
            }
        }
        instances.insert(instance.id, instance.clone());
        Ok(true)
    }

    async fn claim(
        &self,
        id: MonitorId,
        token: ResumeToken,
        new_token: ResumeToken,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<MonitorInstance>, RepositoryError> {
        let mut instances = self.instances.write();
        match instances.get_mut(&id) {
            Some(instance) if instance.resume_token == token && !instance.phase.is_terminal() => {
                instance.resume_token = new_token;
                instance.wake_at = lease_until;
                Ok(Some(instance.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn save(&self, instance: &MonitorInstance, held: ResumeToken) -> Result<bool, RepositoryError> {
        let mut instances = self.instances.write();
        match instances.get_mut(&instance.id) {
            Some(stored) if stored.resume_token == held => {
                *stored = instance.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: MonitorId) -> Result<Option<MonitorInstance>, RepositoryError> {
        Ok(self.instances.read().get(&id).cloned())
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<MonitorInstance>, RepositoryError> {
        let mut due: Vec<MonitorInstance> = self
            .instances
            .read()
            .values()
            .filter(|i| i.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|i| i.wake_at);
        due.truncate(limit);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ListItemId;
    use crate::domain::monitor::{MonitorContext, MonitorPhase};
    use chrono::Duration;

    fn record(pk: &str, url: &str) -> StatusRecord {
        StatusRecord {
            key: StatusKey::new(pk, url),
            title: "Site".to_string(),
            url: url.to_string(),
            provisioning_status: 0,
            updated: None,
            provisioning_template_url: pk.to_string(),
        }
    }

    fn instance(now: DateTime<Utc>) -> MonitorInstance {
        MonitorInstance::start(
            MonitorContext {
                site_url: url::Url::parse("https://contoso.example.com/sites/ABCD").unwrap(),
                list_item_id: ListItemId(1),
                file_name_with_extension: "job1.json".to_string(),
                template_url: "t1.xml".to_string(),
                requested_at: now,
                site_created: false,
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_one_record_per_url() {
        let store = InMemoryStatusStore::new();
        let first = store.insert_or_replace(&record("t1.xml", "/sites/ABCD")).await.unwrap();
        let second = store.insert_or_replace(&record("t2.xml", "/sites/ABCD")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        let stored = store.find_by_url("/sites/ABCD").await.unwrap().unwrap();
        assert_eq!(stored.provisioning_template_url, "t2.xml");
    }

    #[tokio::test]
    async fn test_merge_missing_record_is_not_found() {
        let store = InMemoryStatusStore::new();
        let err = store
            .merge(&StatusKey::new("ABCD", "/sites/ABCD"), &StatusPatch::title("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rekey_moves_record_once() {
        let store = InMemoryStatusStore::new();
        let from = store.insert_or_replace(&record("t1.xml", "/sites/ABCD")).await.unwrap();
        let to = StatusKey::new("ABCD", "/sites/ABCD");

        let moved = store.rekey(&from, &to).await.unwrap();
        assert_eq!(moved.key, to);
        assert_eq!(moved.provisioning_template_url, "t1.xml");
        assert!(store.get(&from).await.unwrap().is_none());
        assert_eq!(store.len(), 1);

        // A second move of the same record finds it at its new key
        assert_eq!(store.rekey(&from, &to).await.unwrap().key, to);
        let missing = StatusKey::new("t9.xml", "/sites/NOPE");
        let err = store.rekey(&missing, &StatusKey::new("NOPE", "/sites/NOPE")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_claim_requires_current_token() {
        let repo = InMemoryMonitorRepository::new();
        let now = Utc::now();
        let instance = instance(now);
        assert!(repo.insert_unless_active(&instance).await.unwrap());
        assert!(!repo.insert_unless_active(&instance).await.unwrap());

        let lease = now + Duration::minutes(5);
        let next = ResumeToken::new();
        let claimed = repo.claim(instance.id, instance.resume_token, next, lease).await.unwrap();
        assert_eq!(claimed.map(|i| i.resume_token), Some(next));

        // The old token is spent
        let again = repo
            .claim(instance.id, instance.resume_token, ResumeToken::new(), lease)
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(repo.find_due(now, 10).await.unwrap().is_empty());
        assert_eq!(repo.find_due(lease, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_instances_are_never_due() {
        let repo = InMemoryMonitorRepository::new();
        let now = Utc::now();
        let mut instance = instance(now);
        repo.insert_unless_active(&instance).await.unwrap();
        let held = instance.resume_token;
        instance.transition(MonitorPhase::SiteFound, now).unwrap();
        instance.transition(MonitorPhase::Completed, now).unwrap();
        assert!(repo.save(&instance, held).await.unwrap());
        assert!(repo.find_due(now + Duration::days(1), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finished_instance_is_replaced_on_insert() {
        let repo = InMemoryMonitorRepository::new();
        let now = Utc::now();
        let mut finished = instance(now);
        repo.insert_unless_active(&finished).await.unwrap();
        let held = finished.resume_token;
        finished.transition(MonitorPhase::RecycledConflict, now).unwrap();
        finished.transition(MonitorPhase::Abandoned, now).unwrap();
        repo.save(&finished, held).await.unwrap();

        let fresh = instance(now + Duration::hours(1));
        assert_eq!(fresh.id, finished.id);
        assert!(repo.insert_unless_active(&fresh).await.unwrap());
        let stored = repo.find_by_id(fresh.id).await.unwrap().unwrap();
        assert_eq!(stored.phase, MonitorPhase::Started);
        assert_eq!(stored.resume_token, fresh.resume_token);
    }

    #[tokio::test]
    async fn test_save_after_losing_claim_is_rejected() {
        let repo = InMemoryMonitorRepository::new();
        let now = Utc::now();
        let instance = instance(now);
        repo.insert_unless_active(&instance).await.unwrap();

        let lease = now + Duration::minutes(5);
        let first = ResumeToken::new();
        let mut stale_run = repo
            .claim(instance.id, instance.resume_token, first, lease)
            .await
            .unwrap()
            .unwrap();
        // Lease expired; a second run takes over
        let second = ResumeToken::new();
        repo.claim(instance.id, first, second, lease + Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();

        stale_run.transition(MonitorPhase::Polling, lease).unwrap();
        stale_run.suspend_until(lease + Duration::minutes(1), lease);
        assert!(!repo.save(&stale_run, first).await.unwrap());
        let stored = repo.find_by_id(instance.id).await.unwrap().unwrap();
        assert_eq!(stored.resume_token, second);
        assert_eq!(stored.phase, MonitorPhase::Started);
    }
}
