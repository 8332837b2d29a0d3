// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Site Creation Monitor Application Service
//!
//! Drives persisted [`MonitorInstance`]s through their phases. A run:
//!
//! 1. claims the instance with its current resume token (rotating it and
//!    leasing the instance so a crashed run is picked up again later)
//! 2. steps through phases, saving a checkpoint on every transition
//! 3. ends either in a terminal phase or suspended with a new `wake_at`
//!
//! Between runs nothing is held in memory. [`MonitorScheduler`] wakes due
//! instances on a fixed tick.

use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::stages::StatusReporter;
use crate::domain::clock::Clock;
use crate::domain::config::MonitorConfig;
use crate::domain::events::MonitorEvent;
use crate::domain::hosting::SiteHostingClient;
use crate::domain::job::{ApplyTemplateJob, ProvisioningStatus};
use crate::domain::messaging::{labels, Message, MessagePublisher, Topic};
use crate::domain::monitor::{
    MonitorContext, MonitorError, MonitorId, MonitorInstance, MonitorPhase, ResumeToken,
};
use crate::domain::repository::MonitorRepository;
use crate::domain::site::Tenant;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub deadline: Duration,
    pub poll_interval: Duration,
    pub lease: Duration,
    pub recheck_deadline: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &MonitorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            deadline: Duration::from_std(config.deadline).context("monitor.deadline out of range")?,
            poll_interval: Duration::from_std(config.poll_interval)
                .context("monitor.poll_interval out of range")?,
            lease: Duration::from_std(config.lease).context("monitor.lease out of range")?,
            recheck_deadline: config.recheck_deadline,
        })
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::hours(24) + Duration::minutes(10),
            poll_interval: Duration::minutes(1),
            lease: Duration::minutes(5),
            recheck_deadline: true,
        }
    }
}

pub struct SiteCreationMonitor {
    tenant: Tenant,
    hosting: Arc<dyn SiteHostingClient>,
    status: StatusReporter,
    publisher: Arc<dyn MessagePublisher>,
    repository: Arc<dyn MonitorRepository>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
}

impl SiteCreationMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant: Tenant,
        hosting: Arc<dyn SiteHostingClient>,
        status: StatusReporter,
        publisher: Arc<dyn MessagePublisher>,
        repository: Arc<dyn MonitorRepository>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            tenant,
            hosting,
            status,
            publisher,
            repository,
            event_bus,
            clock,
            settings,
        }
    }

    /// Persist a new instance and run it until its first suspension.
    ///
    /// Starting a monitor while a live one exists for the same job and site
    /// is a no-op that returns the existing id. A finished monitor for the
    /// same job is replaced, so a resubmitted job is watched again.
    pub async fn start(&self, context: MonitorContext) -> Result<MonitorId, MonitorError> {
        let now = self.clock.now();
        let instance = MonitorInstance::start(context, now);
        let id = instance.id;

        if !self.repository.insert_unless_active(&instance).await? {
            info!(monitor_id = %id, "Monitor already exists, not starting another");
            return Ok(id);
        }

        info!(
            monitor_id = %id,
            list_item_id = %instance.context.list_item_id,
            site_url = %instance.context.site_url,
            "Site creation monitor started"
        );
        self.event_bus.publish_monitor_event(MonitorEvent::MonitorStarted {
            monitor_id: id,
            site_url: instance.context.site_url.to_string(),
            started_at: now,
        });

        self.resume(id, instance.resume_token).await?;
        Ok(id)
    }

    /// Resume an instance holding `token`. Returns `None` when the token is
    /// no longer current (another run claimed it, or it finished).
    pub async fn resume(
        &self,
        id: MonitorId,
        token: ResumeToken,
    ) -> Result<Option<MonitorPhase>, MonitorError> {
        let lease_until = self.clock.now() + self.settings.lease;
        let Some(instance) = self
            .repository
            .claim(id, token, ResumeToken::new(), lease_until)
            .await?
        else {
            debug!(monitor_id = %id, "Resume token is stale, skipping");
            return Ok(None);
        };

        match self.run(instance).await {
            Ok(phase) => Ok(Some(phase)),
            Err(MonitorError::Stale(id)) => {
                warn!(monitor_id = %id, "Lease lost to another run, checkpoint discarded");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resume every due instance, at most `limit`. Returns how many ran.
    pub async fn run_due(&self, limit: usize) -> Result<usize, MonitorError> {
        let due = self.repository.find_due(self.clock.now(), limit).await?;
        let mut resumed = 0;
        for instance in due {
            match self.resume(instance.id, instance.resume_token).await {
                Ok(Some(_)) => resumed += 1,
                Ok(None) => {}
                Err(e) => error!(monitor_id = %instance.id, "Monitor run failed: {}", e),
            }
        }
        Ok(resumed)
    }

    async fn run(&self, mut instance: MonitorInstance) -> Result<MonitorPhase, MonitorError> {
        let site_url = instance.context.site_url.clone();
        loop {
            let now = self.clock.now();
            match instance.phase {
                MonitorPhase::Started => {
                    if instance.deadline_exceeded(self.settings.deadline, now) {
                        self.advance(&mut instance, MonitorPhase::TimedOut).await?;
                        continue;
                    }
                    match self.hosting.site_status(&self.tenant, &site_url).await {
                        Ok(state) if state.is_active() => {
                            self.advance(&mut instance, MonitorPhase::SiteFound).await?;
                        }
                        Ok(state) => {
                            debug!(monitor_id = %instance.id, state = %state, "Site not active yet");
                            self.advance(&mut instance, MonitorPhase::Polling).await?;
                            return self.suspend(instance).await;
                        }
                        Err(e) => {
                            debug!(monitor_id = %instance.id, "Site status query failed: {}", e);
                            let recycled = matches!(
                                self.hosting.deleted_site_status(&self.tenant, &site_url).await,
                                Ok(state) if state.is_recycled()
                            );
                            if recycled {
                                self.advance(&mut instance, MonitorPhase::RecycledConflict).await?;
                            } else {
                                self.advance(&mut instance, MonitorPhase::Polling).await?;
                                return self.suspend(instance).await;
                            }
                        }
                    }
                }
                MonitorPhase::Polling => {
                    if self.settings.recheck_deadline
                        && instance.deadline_exceeded(self.settings.deadline, now)
                    {
                        self.advance(&mut instance, MonitorPhase::TimedOut).await?;
                        continue;
                    }
                    instance.poll_count += 1;
                    match self.hosting.site_status(&self.tenant, &site_url).await {
                        Ok(state) if state.is_active() => {
                            self.advance(&mut instance, MonitorPhase::SiteFound).await?;
                        }
                        result => {
                            if let Err(e) = result {
                                debug!(monitor_id = %instance.id, "Site status query failed: {}", e);
                            }
                            instance.transition(MonitorPhase::Polling, now)?;
                            return self.suspend(instance).await;
                        }
                    }
                }
                MonitorPhase::SiteFound => {
                    let job = ApplyTemplateJob {
                        list_item_id: instance.context.list_item_id,
                        file_name_with_extension: instance.context.file_name_with_extension.clone(),
                        provisioning_template_url: instance.context.template_url.clone(),
                        checked: false,
                    };
                    let message = Message::new(Topic::UpdateSites, labels::UPDATE_SITE_TEMPLATE, &job)?;
                    self.publisher.publish(message).await?;
                    info!(
                        monitor_id = %instance.id,
                        list_item_id = %job.list_item_id,
                        site_url = %site_url,
                        polls = instance.poll_count,
                        "Site is active, template update requested"
                    );
                    self.advance(&mut instance, MonitorPhase::Completed).await?;
                }
                MonitorPhase::RecycledConflict => {
                    warn!(
                        monitor_id = %instance.id,
                        site_url = %site_url,
                        "A site with the same URL is in the recycle bin"
                    );
                    self.status
                        .report(instance.context.list_item_id, ProvisioningStatus::FailedRecycledConflict)
                        .await?;
                    self.advance(&mut instance, MonitorPhase::Abandoned).await?;
                }
                MonitorPhase::TimedOut => {
                    warn!(
                        monitor_id = %instance.id,
                        site_url = %site_url,
                        requested_at = %instance.context.requested_at,
                        "Site was not created before the deadline, giving up"
                    );
                    self.event_bus.publish_monitor_event(MonitorEvent::MonitorTimedOut {
                        monitor_id: instance.id,
                        site_url: site_url.to_string(),
                        requested_at: instance.context.requested_at,
                        timed_out_at: now,
                    });
                    self.advance(&mut instance, MonitorPhase::Abandoned).await?;
                }
                MonitorPhase::Completed | MonitorPhase::Abandoned => return Ok(instance.phase),
            }
        }
    }

    // Transition, checkpoint, announce.
    async fn advance(
        &self,
        instance: &mut MonitorInstance,
        next: MonitorPhase,
    ) -> Result<(), MonitorError> {
        let from = instance.phase;
        let now = self.clock.now();
        let held = instance.resume_token;
        instance.transition(next, now)?;
        self.checkpoint(instance, held).await?;

        metrics::counter!("provisioning_monitor_transitions_total", "phase" => next.as_str())
            .increment(1);
        debug!(monitor_id = %instance.id, from = %from, to = %next, "Monitor phase changed");
        self.event_bus.publish_monitor_event(MonitorEvent::PhaseChanged {
            monitor_id: instance.id,
            from,
            to: next,
            changed_at: now,
        });
        Ok(())
    }

    async fn suspend(&self, mut instance: MonitorInstance) -> Result<MonitorPhase, MonitorError> {
        let now = self.clock.now();
        let wake_at = now + self.settings.poll_interval;
        let held = instance.resume_token;
        instance.suspend_until(wake_at, now);
        self.checkpoint(&instance, held).await?;
        debug!(monitor_id = %instance.id, wake_at = %wake_at, "Monitor suspended");
        Ok(instance.phase)
    }

    async fn checkpoint(&self, instance: &MonitorInstance, held: ResumeToken) -> Result<(), MonitorError> {
        if self.repository.save(instance, held).await? {
            Ok(())
        } else {
            Err(MonitorError::Stale(instance.id))
        }
    }
}

/// Periodically resumes due monitors until cancelled.
pub struct MonitorScheduler {
    monitor: Arc<SiteCreationMonitor>,
    tick: std::time::Duration,
    batch_size: usize,
}

impl MonitorScheduler {
    pub fn new(monitor: Arc<SiteCreationMonitor>, tick: std::time::Duration) -> Self {
        Self {
            monitor,
            tick,
            batch_size: 100,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(tick = ?self.tick, "Monitor scheduler started");
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.monitor.run_due(self.batch_size).await {
                        Ok(0) => {}
                        Ok(n) => debug!(resumed = n, "Resumed due monitors"),
                        Err(e) => error!("Failed to load due monitors: {}", e),
                    }
                }
            }
        }
        info!("Monitor scheduler stopped");
    }
}
