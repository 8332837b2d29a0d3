// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on the configured
//! storage backend. The domain layer only knows the traits.

use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repository::{MonitorRepository, StatusStore, StorageBackend};
use crate::infrastructure::repositories::{
    InMemoryMonitorRepository, InMemoryStatusStore, PostgresMonitorRepository, PostgresStatusStore,
};

/// Creates a StatusStore implementation based on the configured backend.
///
/// `pool` is ignored for the in-memory backend.
pub fn create_status_store(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn StatusStore> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresStatusStore::new(pool)),
        _ => Arc::new(InMemoryStatusStore::new()),
    }
}

/// Creates a MonitorRepository implementation based on the configured backend
pub fn create_monitor_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn MonitorRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresMonitorRepository::new(pool)),
        _ => Arc::new(InMemoryMonitorRepository::new()),
    }
}
