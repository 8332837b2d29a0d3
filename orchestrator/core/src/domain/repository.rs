// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts, defined in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `StatusStore` | `StatusRecord` | `InMemoryStatusStore`, `PostgresStatusStore` |
//! | `MonitorRepository` | `MonitorInstance` | `InMemoryMonitorRepository`, `PostgresMonitorRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The implementation is selected at start-up from `spec.storage.backend` in
//! the provisioning configuration. In-memory stores are for development and
//! tests; PostgreSQL keeps status records and waiting monitors across
//! restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::monitor::{MonitorId, MonitorInstance, ResumeToken};
use crate::domain::status::{StatusKey, StatusPatch, StatusRecord};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Per-site provisioning progress.
///
/// Writes are last-writer-wins: no version check is made on merge.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert or fully replace the record at `record.key`.
    ///
    /// If a record for the same URL already exists under a different key,
    /// that record is replaced in place so only one record per URL exists.
    /// Returns the key the record was stored under.
    async fn insert_or_replace(&self, record: &StatusRecord) -> Result<StatusKey, RepositoryError>;

    /// Apply a partial update. Fails with `NotFound` when no record exists.
    async fn merge(&self, key: &StatusKey, patch: &StatusPatch) -> Result<StatusRecord, RepositoryError>;

    async fn get(&self, key: &StatusKey) -> Result<Option<StatusRecord>, RepositoryError>;

    async fn find_by_url(&self, url: &str) -> Result<Option<StatusRecord>, RepositoryError>;

    /// Move the record at `from` to `to` in one step and return it.
    ///
    /// Idempotent: when `from` is gone but `to` exists, the record at `to`
    /// is returned. Fails with `NotFound` when neither key exists.
    async fn rekey(&self, from: &StatusKey, to: &StatusKey) -> Result<StatusRecord, RepositoryError>;
}

/// Durable storage of waiting site-creation monitors.
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// Store a new instance unless a live one with the same id exists.
    /// A finished (completed or abandoned) instance is replaced.
    /// Returns `false` when a live instance was already present.
    async fn insert_unless_active(&self, instance: &MonitorInstance) -> Result<bool, RepositoryError>;

    /// Atomically take ownership of a run: succeeds only if the stored
    /// resume token equals `token`. The stored token is replaced by
    /// `new_token` and the wake time pushed to `lease_until`, so a crashed
    /// run is retried once the lease expires.
    async fn claim(
        &self,
        id: MonitorId,
        token: ResumeToken,
        new_token: ResumeToken,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<MonitorInstance>, RepositoryError>;

    /// Checkpoint the instance, but only while the stored resume token is
    /// still `held`. Returns `false` when another run has claimed it since.
    async fn save(&self, instance: &MonitorInstance, held: ResumeToken) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: MonitorId) -> Result<Option<MonitorInstance>, RepositoryError>;

    /// Non-terminal instances whose wake time has passed.
    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<MonitorInstance>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
