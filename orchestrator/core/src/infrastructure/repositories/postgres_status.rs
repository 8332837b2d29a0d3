// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Status Store
//!
//! `sites` table, primary key `(partition_key, row_key)`, unique on `url`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `StatusStore` on PostgreSQL

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, StatusStore};
use crate::domain::status::{StatusKey, StatusPatch, StatusRecord};

pub struct PostgresStatusStore {
    pool: PgPool,
}

impl PostgresStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<StatusRecord, RepositoryError> {
    Ok(StatusRecord {
        key: StatusKey::new(
            row.try_get::<String, _>("partition_key")?,
            row.try_get::<String, _>("row_key")?,
        ),
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        provisioning_status: row.try_get("provisioning_status")?,
        updated: row.try_get("updated")?,
        provisioning_template_url: row.try_get("provisioning_template_url")?,
    })
}

#[async_trait]
impl StatusStore for PostgresStatusStore {
    async fn insert_or_replace(&self, record: &StatusRecord) -> Result<StatusKey, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Reuse the key of an existing record for the same URL
        let existing = sqlx::query("SELECT partition_key, row_key FROM sites WHERE url = $1 FOR UPDATE")
            .bind(&record.url)
            .fetch_optional(&mut *tx)
            .await?;
        let key = match existing {
            Some(row) => StatusKey::new(
                row.try_get::<String, _>("partition_key")?,
                row.try_get::<String, _>("row_key")?,
            ),
            None => record.key.clone(),
        };

        sqlx::query(
            r#"
            INSERT INTO sites (
                partition_key, row_key, title, url,
                provisioning_status, updated, provisioning_template_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (partition_key, row_key) DO UPDATE SET
                title = EXCLUDED.title,
                url = EXCLUDED.url,
                provisioning_status = EXCLUDED.provisioning_status,
                updated = EXCLUDED.updated,
                provisioning_template_url = EXCLUDED.provisioning_template_url
            "#,
        )
        .bind(&key.partition_key)
        .bind(&key.row_key)
        .bind(&record.title)
        .bind(&record.url)
        .bind(record.provisioning_status)
        .bind(record.updated)
        .bind(&record.provisioning_template_url)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(key)
    }

    async fn merge(&self, key: &StatusKey, patch: &StatusPatch) -> Result<StatusRecord, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE sites SET
                title = COALESCE($3, title),
                url = COALESCE($4, url),
                provisioning_status = COALESCE($5, provisioning_status),
                updated = COALESCE($6, updated),
                provisioning_template_url = COALESCE($7, provisioning_template_url)
            WHERE partition_key = $1 AND row_key = $2
            RETURNING partition_key, row_key, title, url,
                      provisioning_status, updated, provisioning_template_url
            "#,
        )
        .bind(&key.partition_key)
        .bind(&key.row_key)
        .bind(&patch.title)
        .bind(&patch.url)
        .bind(patch.provisioning_status)
        .bind(patch.updated)
        .bind(&patch.provisioning_template_url)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(RepositoryError::NotFound(format!("status record {}", key))),
        }
    }

    async fn get(&self, key: &StatusKey) -> Result<Option<StatusRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT partition_key, row_key, title, url,
                   provisioning_status, updated, provisioning_template_url
            FROM sites
            WHERE partition_key = $1 AND row_key = $2
            "#,
        )
        .bind(&key.partition_key)
        .bind(&key.row_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<StatusRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT partition_key, row_key, title, url,
                   provisioning_status, updated, provisioning_template_url
            FROM sites
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn rekey(&self, from: &StatusKey, to: &StatusKey) -> Result<StatusRecord, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE sites SET partition_key = $3, row_key = $4
            WHERE partition_key = $1 AND row_key = $2
            RETURNING partition_key, row_key, title, url,
                      provisioning_status, updated, provisioning_template_url
            "#,
        )
        .bind(&from.partition_key)
        .bind(&from.row_key)
        .bind(&to.partition_key)
        .bind(&to.row_key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return record_from_row(&row);
        }
        // Already moved by an earlier delivery
        self.get(to)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("status record {}", from)))
    }
}
