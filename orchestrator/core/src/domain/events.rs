// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::ListItemId;
use crate::domain::monitor::{MonitorId, MonitorPhase};
use crate::domain::template::CacheOutcome;

/// Message handling outcomes and status writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    MessageHandled {
        stage: String,
        message_id: Uuid,
        label: String,
        handled_at: DateTime<Utc>,
    },
    MessageFailed {
        stage: String,
        message_id: Uuid,
        delivery_count: u32,
        error: String,
        failed_at: DateTime<Utc>,
    },
    MessageDeadLettered {
        stage: String,
        message_id: Uuid,
        reason: String,
        dead_lettered_at: DateTime<Utc>,
    },
    StatusWritten {
        list_item_id: ListItemId,
        status: String,
        written_at: DateTime<Utc>,
    },
    /// An expected record was missing; the message was dropped.
    DataIntegrityWarning {
        stage: String,
        detail: String,
        detected_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    MonitorStarted {
        monitor_id: MonitorId,
        site_url: String,
        started_at: DateTime<Utc>,
    },
    PhaseChanged {
        monitor_id: MonitorId,
        from: MonitorPhase,
        to: MonitorPhase,
        changed_at: DateTime<Utc>,
    },
    /// Deadline elapsed. Only observable here and in the logs; the tracking
    /// list is not updated.
    MonitorTimedOut {
        monitor_id: MonitorId,
        site_url: String,
        requested_at: DateTime<Utc>,
        timed_out_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TemplateEvent {
    CacheValidated {
        template_url: String,
        outcome: CacheOutcome,
        validated_at: DateTime<Utc>,
    },
    ApplyAttemptFailed {
        list_item_id: ListItemId,
        site_url: String,
        attempt: u32,
        total: u32,
        error: String,
        failed_at: DateTime<Utc>,
    },
    ApplyProgress {
        list_item_id: ListItemId,
        message: String,
        step: u32,
        total: u32,
    },
    ApplyMessage {
        list_item_id: ListItemId,
        kind: String,
        message: String,
    },
    TemplateApplied {
        list_item_id: ListItemId,
        site_url: String,
        attempts: u32,
        applied_at: DateTime<Utc>,
    },
}

impl TemplateEvent {
    pub fn list_item_id(&self) -> Option<ListItemId> {
        match self {
            Self::CacheValidated { .. } => None,
            Self::ApplyAttemptFailed { list_item_id, .. }
            | Self::ApplyProgress { list_item_id, .. }
            | Self::ApplyMessage { list_item_id, .. }
            | Self::TemplateApplied { list_item_id, .. } => Some(*list_item_id),
        }
    }
}
