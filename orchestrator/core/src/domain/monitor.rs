// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! # Site Creation Monitor State
//!
//! Site creation on the hosting platform is asynchronous and can take hours.
//! The monitor waiting for it is a persisted state record, not a suspended
//! task: every wait is a `wake_at` timestamp plus a fresh [`ResumeToken`]
//! saved in the monitor store, and the scheduler re-invokes the instance
//! once it is due.
//!
//! ```text
//! Started ──► SiteFound ──► Completed
//!    │   ╲──► RecycledConflict ──► Abandoned
//!    │    ╲─► TimedOut ──────────► Abandoned
//!    ▼                 ▲
//! Polling ⟲ ───────────┘ (and ──► SiteFound)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

use crate::domain::job::ListItemId;

// Namespace for deterministic monitor ids (uuid v5).
const MONITOR_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_0c2e_52b4_4d59_9a8e_3c1d_7f20_a4e1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(pub Uuid);

impl MonitorId {
    /// Same job and site always map to the same monitor, so a redelivered
    /// create-site message cannot start a second one while the first is live.
    pub fn for_job(list_item_id: ListItemId, site_url: &str) -> Self {
        let name = format!("{}|{}", list_item_id, site_url);
        Self(Uuid::new_v5(&MONITOR_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token saved before every wait. Only the holder of the current token may
/// resume the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(pub Uuid);

impl ResumeToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResumeToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    Started,
    Polling,
    SiteFound,
    RecycledConflict,
    TimedOut,
    Completed,
    Abandoned,
}

impl MonitorPhase {
    pub fn can_transition_to(&self, next: MonitorPhase) -> bool {
        use MonitorPhase::*;
        matches!(
            (self, next),
            (Started, SiteFound)
                | (Started, RecycledConflict)
                | (Started, TimedOut)
                | (Started, Polling)
                | (Polling, Polling)
                | (Polling, SiteFound)
                | (Polling, TimedOut)
                | (SiteFound, Completed)
                | (RecycledConflict, Abandoned)
                | (TimedOut, Abandoned)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Polling => "polling",
            Self::SiteFound => "site_found",
            Self::RecycledConflict => "recycled_conflict",
            Self::TimedOut => "timed_out",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "started" => Self::Started,
            "polling" => Self::Polling,
            "site_found" => Self::SiteFound,
            "recycled_conflict" => Self::RecycledConflict,
            "timed_out" => Self::TimedOut,
            "completed" => Self::Completed,
            "abandoned" => Self::Abandoned,
            _ => return None,
        })
    }
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State carried across every suspend point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorContext {
    /// Absolute URL of the site being created.
    pub site_url: Url,
    pub list_item_id: ListItemId,
    pub file_name_with_extension: String,
    pub template_url: String,
    /// When creation was requested; the deadline counts from here.
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub site_created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInstance {
    pub id: MonitorId,
    pub phase: MonitorPhase,
    pub context: MonitorContext,
    pub resume_token: ResumeToken,
    pub wake_at: DateTime<Utc>,
    pub poll_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitorInstance {
    /// New instance in `Started`, due immediately.
    pub fn start(context: MonitorContext, now: DateTime<Utc>) -> Self {
        Self {
            id: MonitorId::for_job(context.list_item_id, context.site_url.as_str()),
            phase: MonitorPhase::Started,
            context,
            resume_token: ResumeToken::new(),
            wake_at: now,
            poll_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: MonitorPhase, now: DateTime<Utc>) -> Result<(), MonitorError> {
        if !self.phase.can_transition_to(next) {
            return Err(MonitorError::InvalidTransition {
                id: self.id,
                from: self.phase,
                to: next,
            });
        }
        if next == MonitorPhase::SiteFound {
            self.context.site_created = true;
        }
        self.phase = next;
        self.updated_at = now;
        Ok(())
    }

    /// Prepare the next wait: rotate the resume token and set the wake-up time.
    pub fn suspend_until(&mut self, wake_at: DateTime<Utc>, now: DateTime<Utc>) -> ResumeToken {
        self.resume_token = ResumeToken::new();
        self.wake_at = wake_at;
        self.updated_at = now;
        self.resume_token
    }

    pub fn deadline_exceeded(&self, deadline: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.context.requested_at) > deadline
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.phase.is_terminal() && self.wake_at <= now
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Monitor {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: MonitorId,
        from: MonitorPhase,
        to: MonitorPhase,
    },

    #[error("Monitor {0} not found")]
    NotFound(MonitorId),

    #[error("Monitor {0} was claimed by another run")]
    Stale(MonitorId),

    #[error("Monitor store error: {0}")]
    Repository(#[from] crate::domain::repository::RepositoryError),

    #[error("Status write failed: {0}")]
    Status(#[from] crate::domain::hosting::HostingError),

    #[error("Failed to publish successor: {0}")]
    Publish(#[from] crate::domain::messaging::MessageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(requested_at: DateTime<Utc>) -> MonitorContext {
        MonitorContext {
            site_url: Url::parse("https://contoso.example.com/sites/ABCD").unwrap(),
            list_item_id: ListItemId(3),
            file_name_with_extension: "job1.json".to_string(),
            template_url: "t1.xml".to_string(),
            requested_at,
            site_created: false,
        }
    }

    #[test]
    fn test_monitor_id_is_deterministic() {
        let a = MonitorId::for_job(ListItemId(3), "https://contoso.example.com/sites/ABCD");
        let b = MonitorId::for_job(ListItemId(3), "https://contoso.example.com/sites/ABCD");
        let c = MonitorId::for_job(ListItemId(4), "https://contoso.example.com/sites/ABCD");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_transition_table() {
        use MonitorPhase::*;
        assert!(Started.can_transition_to(SiteFound));
        assert!(Started.can_transition_to(RecycledConflict));
        assert!(Polling.can_transition_to(Polling));
        assert!(!Polling.can_transition_to(RecycledConflict));
        assert!(!Started.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Polling));
        assert!(TimedOut.can_transition_to(Abandoned));
    }

    #[test]
    fn test_site_found_sets_created_flag() {
        let now = Utc::now();
        let mut instance = MonitorInstance::start(context(now), now);
        instance.transition(MonitorPhase::SiteFound, now).unwrap();
        assert!(instance.context.site_created);
        let err = instance.transition(MonitorPhase::Polling, now).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidTransition { .. }));
    }

    #[test]
    fn test_suspend_rotates_token() {
        let now = Utc::now();
        let mut instance = MonitorInstance::start(context(now), now);
        let before = instance.resume_token;
        let token = instance.suspend_until(now + Duration::minutes(1), now);
        assert_ne!(before, token);
        assert!(!instance.is_due(now));
        assert!(instance.is_due(now + Duration::minutes(1)));
    }

    #[test]
    fn test_deadline() {
        let now = Utc::now();
        let instance = MonitorInstance::start(context(now - Duration::hours(25)), now);
        assert!(instance.deadline_exceeded(Duration::hours(24) + Duration::minutes(10), now));
        assert!(!instance.deadline_exceeded(Duration::hours(26), now));
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!(MonitorPhase::parse("recycled_conflict"), Some(MonitorPhase::RecycledConflict));
        assert_eq!(MonitorPhase::parse("bogus"), None);
    }
}
