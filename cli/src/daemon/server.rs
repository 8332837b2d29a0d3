// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning host: builds every service from the configuration manifest
//! and runs them until shutdown.

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use site_provisioning_core::application::repository_factory::{
    create_monitor_repository, create_status_store,
};
use site_provisioning_core::application::stages::{
    ApplyTemplateStage, CreateSiteStage, IntakeStage, ProcessUpdateRequestStage, RegisterSiteStage,
    TemplateCacheStage, UpdateMetadataStage,
};
use site_provisioning_core::application::{
    MonitorScheduler, MonitorSettings, PipelineCoordinator, SiteCreationMonitor, SiteQueryService,
    StageContext, StatusReporter, TemplateApplicationExecutor, TemplateCacheManager,
};
use site_provisioning_core::domain::clock::{Clock, SystemClock};
use site_provisioning_core::domain::config::{ProvisioningConfigManifest, StorageBackendKind};
use site_provisioning_core::domain::repository::{PostgresConfig, StorageBackend};
use site_provisioning_core::domain::storage::BlobStore;
use site_provisioning_core::infrastructure::db::Database;
use site_provisioning_core::infrastructure::hosting::RestHostingGateway;
use site_provisioning_core::infrastructure::storage::{InMemoryBlobStore, LocalBlobStore};
use site_provisioning_core::infrastructure::{EventBus, InProcessMessageBus};
use site_provisioning_core::presentation::api::{app, AppState};

use super::shutdown_signal;

/// Every long-lived service of one provisioning deployment.
pub struct ProvisioningHost {
    pub config: ProvisioningConfigManifest,
    pub bus: InProcessMessageBus,
    pub event_bus: EventBus,
    pub coordinator: PipelineCoordinator,
    pub monitor: Arc<SiteCreationMonitor>,
    pub router: Router,
}

impl ProvisioningHost {
    /// Connect storage and build the pipeline. Nothing runs until [`Self::start`].
    pub async fn build(config: ProvisioningConfigManifest) -> Result<Self> {
        config
            .validate()
            .context("Configuration validation failed")?;
        let tenant = config.tenant()?;
        let spec = &config.spec;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let event_bus = EventBus::with_default_capacity();
        let bus = InProcessMessageBus::new();

        let (backend, pool) = match spec.storage.backend {
            StorageBackendKind::Postgres => {
                let url = spec
                    .storage
                    .database_url
                    .clone()
                    .context("spec.storage.database_url is required for the postgres backend")?;
                let db = Database::new(&url).await?;
                db.migrate().await?;
                info!("Connected to PostgreSQL, migrations applied");
                let pool = db.get_pool().clone();
                (
                    StorageBackend::PostgreSQL(PostgresConfig {
                        connection_string: url,
                    }),
                    Some(pool),
                )
            }
            StorageBackendKind::InMemory => {
                warn!("Using in-memory storage, status records and monitors are lost on restart");
                (StorageBackend::InMemory, None)
            }
        };
        let status_store = create_status_store(&backend, pool.clone());
        let monitors = create_monitor_repository(&backend, pool);

        let blobs: Arc<dyn BlobStore> = match &spec.storage.blob_root {
            Some(root) => Arc::new(
                LocalBlobStore::new(root.clone())
                    .with_context(|| format!("Failed to open blob root {:?}", root))?,
            ),
            None => Arc::new(InMemoryBlobStore::new(clock.clone())),
        };

        let gateway = Arc::new(
            RestHostingGateway::new(
                spec.hosting.base_url.clone(),
                spec.hosting.api_key.clone(),
                spec.hosting.timeout,
            )?
            .with_tracking_list(
                spec.tracking.list_title.clone(),
                spec.tracking.status_field.clone(),
            ),
        );

        let status = StatusReporter::new(tenant.clone(), gateway.clone(), event_bus.clone());
        let monitor = Arc::new(SiteCreationMonitor::new(
            tenant.clone(),
            gateway.clone(),
            status.clone(),
            Arc::new(bus.clone()),
            monitors,
            event_bus.clone(),
            clock.clone(),
            MonitorSettings::from_config(&spec.monitor)?,
        ));
        let cache = Arc::new(TemplateCacheManager::new(
            gateway.clone(),
            blobs.clone(),
            spec.storage.template_files_container.clone(),
            chrono::Duration::from_std(spec.templates.cache_ttl)
                .context("templates.cache_ttl out of range")?,
            clock.clone(),
            event_bus.clone(),
        ));
        let executor = Arc::new(TemplateApplicationExecutor::new(
            gateway.clone(),
            spec.templates.max_apply_retries,
            event_bus.clone(),
        ));

        let ctx = StageContext {
            tenant: tenant.clone(),
            hosting: gateway.clone(),
            blobs,
            job_files_container: spec.storage.job_files_container.clone(),
            publisher: Arc::new(bus.clone()),
            status,
            event_bus: event_bus.clone(),
            clock,
        };

        let mut coordinator = PipelineCoordinator::new(
            bus.clone(),
            event_bus.clone(),
            spec.pipeline.max_delivery_count,
        );
        coordinator
            .register(Arc::new(IntakeStage::new(ctx.clone())))
            .register(Arc::new(RegisterSiteStage::new(ctx.clone(), status_store.clone())))
            .register(Arc::new(CreateSiteStage::new(ctx.clone(), monitor.clone())))
            .register(Arc::new(TemplateCacheStage::new(ctx.clone(), cache.clone())))
            .register(Arc::new(ApplyTemplateStage::new(
                ctx.clone(),
                cache.clone(),
                gateway.clone(),
                executor,
            )))
            .register(Arc::new(ProcessUpdateRequestStage::new(
                ctx.clone(),
                status_store.clone(),
            )))
            .register(Arc::new(UpdateMetadataStage::new(ctx, status_store)));

        let router = app(AppState {
            tenant: tenant.clone(),
            publisher: Arc::new(bus.clone()),
            site_queries: Arc::new(SiteQueryService::new(tenant, gateway)),
            template_cache: cache,
        });

        Ok(Self {
            config,
            bus,
            event_bus,
            coordinator,
            monitor,
            router,
        })
    }

    /// Start stage workers and the monitor scheduler.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = self.coordinator.start(cancel.clone());
        info!(stages = ?self.coordinator.stage_names(), "Pipeline started");

        let scheduler = MonitorScheduler::new(self.monitor.clone(), self.config.spec.monitor.scheduler_tick);
        tasks.push(tokio::spawn(scheduler.run(cancel)));
        tasks
    }
}

pub async fn run_server(config: ProvisioningConfigManifest) -> Result<()> {
    let host = ProvisioningHost::build(config).await?;
    let spec = &host.config.spec;
    info!(tenant = %spec.tenant.id, "Configuration loaded");

    if let Some(port) = spec.observability.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let cancel = CancellationToken::new();
    let tasks = host.start(cancel.clone());

    let addr = format!("{}:{}", spec.api.bind_address, spec.api.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("API listening on {}", addr);

    axum::serve(listener, host.router.clone())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down pipeline");
    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }
    info!("Provisioning host stopped");

    Ok(())
}
