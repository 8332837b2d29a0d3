// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Monitor Repository
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Checkpoints of waiting site-creation monitors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::monitor::{MonitorContext, MonitorId, MonitorInstance, MonitorPhase, ResumeToken};
use crate::domain::repository::{MonitorRepository, RepositoryError};

const COLUMNS: &str =
    "id, phase, context, resume_token, wake_at, poll_count, created_at, updated_at";

pub struct PostgresMonitorRepository {
    pool: PgPool,
}

impl PostgresMonitorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn instance_from_row(row: &PgRow) -> Result<MonitorInstance, RepositoryError> {
    let phase: String = row.try_get("phase")?;
    let phase = MonitorPhase::parse(&phase)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown monitor phase '{}'", phase)))?;
    let context: serde_json::Value = row.try_get("context")?;
    let context: MonitorContext = serde_json::from_value(context)?;
    let poll_count: i32 = row.try_get("poll_count")?;

    Ok(MonitorInstance {
        id: MonitorId(row.try_get::<Uuid, _>("id")?),
        phase,
        context,
        resume_token: ResumeToken(row.try_get::<Uuid, _>("resume_token")?),
        wake_at: row.try_get("wake_at")?,
        poll_count: poll_count.max(0) as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MonitorRepository for PostgresMonitorRepository {
    async fn insert_unless_active(&self, instance: &MonitorInstance) -> Result<bool, RepositoryError> {
        let context = serde_json::to_value(&instance.context)?;
        let result = sqlx::query(
            r#"
            INSERT INTO site_monitors (
                id, phase, context, resume_token, wake_at, poll_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                phase = EXCLUDED.phase,
                context = EXCLUDED.context,
                resume_token = EXCLUDED.resume_token,
                wake_at = EXCLUDED.wake_at,
                poll_count = EXCLUDED.poll_count,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            WHERE site_monitors.phase IN ('completed', 'abandoned')
            "#,
        )
        .bind(instance.id.0)
        .bind(instance.phase.as_str())
        .bind(context)
        .bind(instance.resume_token.0)
        .bind(instance.wake_at)
        .bind(instance.poll_count as i32)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim(
        &self,
        id: MonitorId,
        token: ResumeToken,
        new_token: ResumeToken,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<MonitorInstance>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE site_monitors
            SET resume_token = $3, wake_at = $4
            WHERE id = $1 AND resume_token = $2
              AND phase NOT IN ('completed', 'abandoned')
            RETURNING {}
            "#,
            COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.0)
            .bind(token.0)
            .bind(new_token.0)
            .bind(lease_until)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(instance_from_row).transpose()
    }

    async fn save(&self, instance: &MonitorInstance, held: ResumeToken) -> Result<bool, RepositoryError> {
        let context = serde_json::to_value(&instance.context)?;
        let result = sqlx::query(
            r#"
            UPDATE site_monitors SET
                phase = $3,
                context = $4,
                resume_token = $5,
                wake_at = $6,
                poll_count = $7,
                updated_at = $8
            WHERE id = $1 AND resume_token = $2
            "#,
        )
        .bind(instance.id.0)
        .bind(held.0)
        .bind(instance.phase.as_str())
        .bind(context)
        .bind(instance.resume_token.0)
        .bind(instance.wake_at)
        .bind(instance.poll_count as i32)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: MonitorId) -> Result<Option<MonitorInstance>, RepositoryError> {
        let query = format!("SELECT {} FROM site_monitors WHERE id = $1", COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(instance_from_row).transpose()
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<MonitorInstance>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {}
            FROM site_monitors
            WHERE wake_at <= $1 AND phase NOT IN ('completed', 'abandoned')
            ORDER BY wake_at
            LIMIT $2
            "#,
            COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(instance_from_row).collect()
    }
}
