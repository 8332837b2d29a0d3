// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! In-memory stand-ins for the hosting platform plus a fully wired pipeline.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use site_provisioning_core::application::stages::{
    ApplyTemplateStage, CreateSiteStage, IntakeStage, ProcessUpdateRequestStage, RegisterSiteStage,
    TemplateCacheStage, UpdateMetadataStage,
};
use site_provisioning_core::application::{
    MonitorSettings, PipelineCoordinator, SiteCreationMonitor, StageContext, StageHandler,
    StatusReporter, TemplateApplicationExecutor, TemplateCacheManager,
};
use site_provisioning_core::domain::clock::ManualClock;
use site_provisioning_core::domain::hosting::{
    ApplyObserver, HostingError, SiteHostingClient, TemplateEngine, TemplateSource, TrackingList,
};
use site_provisioning_core::domain::job::{JobFile, ListItemId, ProvisioningStatus};
use site_provisioning_core::domain::site::{SiteCreationRequest, SiteState, Tenant, TenantId};
use site_provisioning_core::domain::storage::BlobStore;
use site_provisioning_core::domain::template::ProvisioningTemplate;
use site_provisioning_core::infrastructure::event_bus::EventBus;
use site_provisioning_core::infrastructure::message_bus::InProcessMessageBus;
use site_provisioning_core::infrastructure::repositories::{
    InMemoryMonitorRepository, InMemoryStatusStore,
};
use site_provisioning_core::infrastructure::storage::InMemoryBlobStore;

pub const JOB_FILES: &str = "provisioning-job-files";
pub const TEMPLATES: &str = "provisioning-templates";

pub fn tenant() -> Tenant {
    Tenant {
        id: TenantId("contoso".to_string()),
        url: Url::parse("https://contoso.example.com").unwrap(),
        admin_url: Url::parse("https://contoso-admin.example.com").unwrap(),
        provisioning_site_url: Url::parse("https://contoso.example.com/sites/provisioning").unwrap(),
    }
}

pub fn job_file(relative_url: &str, template_url: &str) -> JobFile {
    JobFile {
        relative_url: relative_url.to_string(),
        site_title: "Project ABCD".to_string(),
        owner: "owner@example.com".to_string(),
        storage_maximum_level: 1000,
        storage_warning_level: 900,
        user_code_maximum_level: 300,
        user_code_warning_level: 200,
        time_zone: 4,
        provisioning_template_url: template_url.to_string(),
        template_parameters: BTreeMap::from([("Department".to_string(), "Finance".to_string())]),
    }
}

/// Scriptable fake of every hosting collaborator.
pub struct FakePlatform {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub templates: Mutex<HashMap<String, Vec<u8>>>,
    /// Answers to successive site status queries; `site_default` once empty.
    pub site_script: Mutex<VecDeque<Result<SiteState, HostingError>>>,
    pub site_default: Mutex<Result<SiteState, HostingError>>,
    pub deleted_state: Mutex<Result<SiteState, HostingError>>,
    pub create_error: Mutex<Option<HostingError>>,
    pub created: Mutex<Vec<SiteCreationRequest>>,
    pub titles: Mutex<HashMap<String, String>>,
    pub statuses: Mutex<Vec<(ListItemId, String)>>,
    pub status_queries: AtomicU32,
    pub template_fetches: AtomicU32,
    /// Apply calls that fail before one succeeds.
    pub apply_failures: AtomicU32,
    pub apply_calls: Mutex<Vec<BTreeMap<String, String>>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            templates: Mutex::new(HashMap::new()),
            site_script: Mutex::new(VecDeque::new()),
            site_default: Mutex::new(Err(HostingError::NotFound("site".to_string()))),
            deleted_state: Mutex::new(Err(HostingError::NotFound("deleted site".to_string()))),
            create_error: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            titles: Mutex::new(HashMap::new()),
            statuses: Mutex::new(Vec::new()),
            status_queries: AtomicU32::new(0),
            template_fetches: AtomicU32::new(0),
            apply_failures: AtomicU32::new(0),
            apply_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakePlatform {
    pub fn script_site_states(&self, states: Vec<Result<SiteState, HostingError>>) {
        self.site_script.lock().extend(states);
    }

    pub fn statuses_for(&self, id: ListItemId) -> Vec<String> {
        self.statuses
            .lock()
            .iter()
            .filter(|(item, _)| *item == id)
            .map(|(_, status)| status.clone())
            .collect()
    }

    pub fn last_status(&self, id: ListItemId) -> Option<String> {
        self.statuses_for(id).pop()
    }

    pub fn apply_count(&self) -> usize {
        self.apply_calls.lock().len()
    }
}

#[async_trait]
impl SiteHostingClient for FakePlatform {
    async fn create_site(&self, _tenant: &Tenant, request: &SiteCreationRequest) -> Result<(), HostingError> {
        if let Some(err) = self.create_error.lock().clone() {
            return Err(err);
        }
        self.created.lock().push(request.clone());
        Ok(())
    }

    async fn site_status(&self, _tenant: &Tenant, _site_url: &Url) -> Result<SiteState, HostingError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        match self.site_script.lock().pop_front() {
            Some(answer) => answer,
            None => self.site_default.lock().clone(),
        }
    }

    async fn deleted_site_status(&self, _tenant: &Tenant, _site_url: &Url) -> Result<SiteState, HostingError> {
        self.deleted_state.lock().clone()
    }

    async fn web_title(&self, _tenant: &Tenant, site_url: &Url) -> Result<String, HostingError> {
        self.titles
            .lock()
            .get(site_url.as_str())
            .cloned()
            .ok_or_else(|| HostingError::NotFound(site_url.to_string()))
    }

    async fn set_web_title(&self, _tenant: &Tenant, site_url: &Url, title: &str) -> Result<(), HostingError> {
        self.titles.lock().insert(site_url.to_string(), title.to_string());
        Ok(())
    }

    async fn download_file(&self, _tenant: &Tenant, server_relative_url: &str) -> Result<Vec<u8>, HostingError> {
        self.files
            .lock()
            .get(server_relative_url)
            .cloned()
            .ok_or_else(|| HostingError::NotFound(server_relative_url.to_string()))
    }
}

#[async_trait]
impl TrackingList for FakePlatform {
    async fn set_job_status(
        &self,
        _tenant: &Tenant,
        list_item_id: ListItemId,
        status: &ProvisioningStatus,
    ) -> Result<(), HostingError> {
        self.statuses.lock().push((list_item_id, status.as_str().to_string()));
        Ok(())
    }
}

#[async_trait]
impl TemplateSource for FakePlatform {
    async fn fetch_template(&self, _tenant: &Tenant, template_url: &str) -> Result<Vec<u8>, HostingError> {
        self.template_fetches.fetch_add(1, Ordering::SeqCst);
        self.templates
            .lock()
            .get(template_url)
            .cloned()
            .ok_or_else(|| HostingError::NotFound(template_url.to_string()))
    }
}

#[async_trait]
impl TemplateEngine for FakePlatform {
    async fn load(&self, name: &str, content: &[u8]) -> Result<ProvisioningTemplate, HostingError> {
        Ok(ProvisioningTemplate {
            name: name.to_string(),
            parameters: BTreeMap::from([("Department".to_string(), "Default".to_string())]),
            content: content.to_vec(),
        })
    }

    async fn apply(
        &self,
        _tenant: &Tenant,
        _site_url: &Url,
        template: &ProvisioningTemplate,
        observer: &dyn ApplyObserver,
    ) -> Result<(), HostingError> {
        self.apply_calls.lock().push(template.parameters.clone());
        observer.progress("Lists", 1, 1);
        let remaining = self.apply_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.apply_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(HostingError::Template("apply failed".to_string()));
        }
        Ok(())
    }
}

/// Every component wired against in-memory stores and one [`FakePlatform`].
pub struct Harness {
    pub tenant: Tenant,
    pub platform: Arc<FakePlatform>,
    pub clock: ManualClock,
    pub bus: InProcessMessageBus,
    pub event_bus: EventBus,
    pub blobs: Arc<InMemoryBlobStore>,
    pub status_store: Arc<InMemoryStatusStore>,
    pub monitors: Arc<InMemoryMonitorRepository>,
    pub monitor: Arc<SiteCreationMonitor>,
    pub cache: Arc<TemplateCacheManager>,
    pub executor: Arc<TemplateApplicationExecutor>,
    pub ctx: StageContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        let tenant = tenant();
        let platform = Arc::new(FakePlatform::default());
        let clock = ManualClock::new(now);
        let bus = InProcessMessageBus::new();
        let event_bus = EventBus::new(1024);
        let blobs = Arc::new(InMemoryBlobStore::new(Arc::new(clock.clone())));
        let status_store = Arc::new(InMemoryStatusStore::new());
        let monitors = Arc::new(InMemoryMonitorRepository::new());
        let status = StatusReporter::new(tenant.clone(), platform.clone(), event_bus.clone());

        let monitor = Arc::new(SiteCreationMonitor::new(
            tenant.clone(),
            platform.clone(),
            status.clone(),
            Arc::new(bus.clone()),
            monitors.clone(),
            event_bus.clone(),
            Arc::new(clock.clone()),
            MonitorSettings::default(),
        ));
        let cache = Arc::new(TemplateCacheManager::new(
            platform.clone(),
            blobs.clone(),
            TEMPLATES,
            chrono::Duration::hours(1),
            Arc::new(clock.clone()),
            event_bus.clone(),
        ));
        let executor = Arc::new(TemplateApplicationExecutor::new(
            platform.clone(),
            3,
            event_bus.clone(),
        ));
        let ctx = StageContext {
            tenant: tenant.clone(),
            hosting: platform.clone(),
            blobs: blobs.clone(),
            job_files_container: JOB_FILES.to_string(),
            publisher: Arc::new(bus.clone()),
            status,
            event_bus: event_bus.clone(),
            clock: Arc::new(clock.clone()),
        };

        Self {
            tenant,
            platform,
            clock,
            bus,
            event_bus,
            blobs,
            status_store,
            monitors,
            monitor,
            cache,
            executor,
            ctx,
        }
    }

    pub fn stages(&self) -> Vec<Arc<dyn StageHandler>> {
        vec![
            Arc::new(IntakeStage::new(self.ctx.clone())),
            Arc::new(RegisterSiteStage::new(self.ctx.clone(), self.status_store.clone())),
            Arc::new(CreateSiteStage::new(self.ctx.clone(), self.monitor.clone())),
            Arc::new(TemplateCacheStage::new(self.ctx.clone(), self.cache.clone())),
            Arc::new(ApplyTemplateStage::new(
                self.ctx.clone(),
                self.cache.clone(),
                self.platform.clone(),
                self.executor.clone(),
            )),
            Arc::new(ProcessUpdateRequestStage::new(self.ctx.clone(), self.status_store.clone())),
            Arc::new(UpdateMetadataStage::new(self.ctx.clone(), self.status_store.clone())),
        ]
    }

    pub fn coordinator(&self) -> PipelineCoordinator {
        let mut coordinator = PipelineCoordinator::new(self.bus.clone(), self.event_bus.clone(), 3);
        for stage in self.stages() {
            coordinator.register(stage);
        }
        coordinator
    }

    /// Store a job file in the job-files container the way intake does.
    pub async fn store_job_file(&self, file_name: &str, job_file: &JobFile) {
        let json = job_file.to_json().unwrap();
        self.blobs.put(JOB_FILES, file_name, json.as_bytes()).await.unwrap();
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
