// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Site creation monitor: deadline guard, recycle-bin conflict, durable
//! polling across suspensions.

mod common;

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use common::Harness;
use site_provisioning_core::domain::clock::Clock;
use site_provisioning_core::domain::hosting::HostingError;
use site_provisioning_core::domain::job::ListItemId;
use site_provisioning_core::domain::messaging::{labels, Message, Subscription, Topic};
use site_provisioning_core::domain::monitor::{MonitorContext, MonitorId, MonitorPhase, ResumeToken};
use site_provisioning_core::domain::repository::MonitorRepository;
use site_provisioning_core::domain::site::SiteState;

fn context(requested_at: DateTime<Utc>) -> MonitorContext {
    MonitorContext {
        site_url: Url::parse("https://contoso.example.com/sites/ABCD").unwrap(),
        list_item_id: ListItemId(4),
        file_name_with_extension: "job1.json".to_string(),
        template_url: "t1.xml".to_string(),
        requested_at,
        site_created: false,
    }
}

fn successors(harness: &Harness) -> UnboundedReceiver<Message> {
    harness.bus.subscribe(Subscription::new(
        "test-update-template",
        Topic::UpdateSites,
        labels::UPDATE_SITE_TEMPLATE,
    ))
}

async fn phase(harness: &Harness, ctx: &MonitorContext) -> MonitorPhase {
    let id = MonitorId::for_job(ctx.list_item_id, ctx.site_url.as_str());
    harness.monitors.find_by_id(id).await.unwrap().unwrap().phase
}

#[tokio::test]
async fn test_expired_request_is_abandoned_without_query() {
    let harness = Harness::new();
    let mut successors = successors(&harness);
    let ctx = context(now(&harness) - Duration::hours(25));

    harness.monitor.start(ctx.clone()).await.unwrap();

    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Abandoned);
    assert_eq!(harness.platform.status_queries.load(Ordering::SeqCst), 0);
    assert!(successors.try_recv().is_err());
    // Timing out is not reported to the tracking list
    assert!(harness.platform.statuses_for(ListItemId(4)).is_empty());
}

#[tokio::test]
async fn test_active_site_completes_with_one_successor() {
    let harness = Harness::new();
    harness.platform.script_site_states(vec![Ok(SiteState::Active)]);
    let mut successors = successors(&harness);
    let ctx = context(now(&harness));

    harness.monitor.start(ctx.clone()).await.unwrap();

    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Completed);
    let message = successors.try_recv().unwrap();
    assert_eq!(message.body["FileNameWithExtension"], "job1.json");
    assert_eq!(message.body["ProvisioningTemplateUrl"], "t1.xml");
    assert_eq!(message.body["Checked"], false);
    assert!(successors.try_recv().is_err());
}

#[tokio::test]
async fn test_recycled_site_fails_job() {
    let harness = Harness::new();
    harness
        .platform
        .script_site_states(vec![Err(HostingError::NotFound("site".to_string()))]);
    *harness.platform.deleted_state.lock() = Ok(SiteState::Recycled);
    let mut successors = successors(&harness);
    let ctx = context(now(&harness));

    harness.monitor.start(ctx.clone()).await.unwrap();

    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Abandoned);
    assert_eq!(
        harness.platform.statuses_for(ListItemId(4)),
        vec!["Failed (site with same URL exists in recycle bin)".to_string()]
    );
    assert!(successors.try_recv().is_err());
}

#[tokio::test]
async fn test_polling_survives_suspension() {
    let harness = Harness::new();
    harness.platform.script_site_states(vec![
        Ok(SiteState::Creating),
        Err(HostingError::Transport("timeout".to_string())),
        Ok(SiteState::Active),
    ]);
    let mut successors = successors(&harness);
    let ctx = context(now(&harness));

    harness.monitor.start(ctx.clone()).await.unwrap();
    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Polling);

    // Not due yet
    assert_eq!(harness.monitor.run_due(10).await.unwrap(), 0);

    harness.clock.advance(Duration::minutes(1));
    assert_eq!(harness.monitor.run_due(10).await.unwrap(), 1);
    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Polling);

    harness.clock.advance(Duration::minutes(1));
    assert_eq!(harness.monitor.run_due(10).await.unwrap(), 1);
    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Completed);

    assert_eq!(harness.platform.status_queries.load(Ordering::SeqCst), 3);
    assert!(successors.try_recv().is_ok());
    assert!(successors.try_recv().is_err());
}

#[tokio::test]
async fn test_deadline_is_rechecked_while_polling() {
    let harness = Harness::new();
    *harness.platform.site_default.lock() = Ok(SiteState::Creating);
    let ctx = context(now(&harness) - (Duration::hours(24) + Duration::minutes(9)));

    harness.monitor.start(ctx.clone()).await.unwrap();
    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Polling);

    harness.clock.advance(Duration::minutes(2));
    harness.monitor.run_due(10).await.unwrap();
    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Abandoned);
    assert_eq!(harness.platform.status_queries.load(Ordering::SeqCst), 1);
    assert!(harness.platform.statuses_for(ListItemId(4)).is_empty());
}

#[tokio::test]
async fn test_duplicate_start_and_stale_resume_are_noops() {
    let harness = Harness::new();
    *harness.platform.site_default.lock() = Ok(SiteState::Creating);
    let ctx = context(now(&harness));

    let id = harness.monitor.start(ctx.clone()).await.unwrap();
    let again = harness.monitor.start(ctx.clone()).await.unwrap();
    assert_eq!(id, again);
    assert_eq!(harness.platform.status_queries.load(Ordering::SeqCst), 1);

    let stored = harness.monitors.find_by_id(id).await.unwrap().unwrap();
    let stale = ResumeToken::new();
    assert!(harness.monitor.resume(id, stale).await.unwrap().is_none());

    // The stored token is honoured regardless of wake time
    let resumed = harness.monitor.resume(id, stored.resume_token).await.unwrap();
    assert_eq!(resumed, Some(MonitorPhase::Polling));
    assert!(harness.monitor.resume(id, stored.resume_token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resubmitted_job_after_abandon_is_watched_again() {
    let harness = Harness::new();
    harness
        .platform
        .script_site_states(vec![Err(HostingError::NotFound("site".to_string()))]);
    *harness.platform.deleted_state.lock() = Ok(SiteState::Recycled);
    let mut successors = successors(&harness);
    let ctx = context(now(&harness));

    let first = harness.monitor.start(ctx.clone()).await.unwrap();
    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Abandoned);

    // Recycle bin emptied, job resubmitted from the tracking list
    harness.clock.advance(Duration::hours(1));
    harness.platform.script_site_states(vec![Ok(SiteState::Active)]);
    let resubmitted = MonitorContext {
        requested_at: now(&harness),
        ..ctx.clone()
    };
    let second = harness.monitor.start(resubmitted).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(phase(&harness, &ctx).await, MonitorPhase::Completed);
    assert_eq!(successors.try_recv().unwrap().body["FileNameWithExtension"], "job1.json");
}

fn now(harness: &Harness) -> DateTime<Utc> {
    harness.clock.now()
}
