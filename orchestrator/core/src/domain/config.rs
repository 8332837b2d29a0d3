// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

// Provisioning Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing one
// provisioning deployment:
// - the tenant that sites are created in
// - status and monitor persistence
// - the site-hosting gateway
// - pipeline, monitor and template-cache tuning
// - API and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::domain::site::{Tenant, TenantId};

pub const API_VERSION: &str = "provisioning/v1";
pub const KIND: &str = "ProvisioningConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfigManifest {
    /// API version (must be "provisioning/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ProvisioningConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ProvisioningConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfigSpec {
    pub tenant: TenantConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub hosting: HostingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub templates: TemplateConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,

    /// Root URL that relative site URLs resolve against
    pub url: String,

    /// Administration endpoint (site creation and status queries)
    pub admin_url: String,

    /// Site holding the tracking list, job files and canonical templates
    pub provisioning_site_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_list_title")]
    pub list_title: String,

    #[serde(default = "default_status_field")]
    pub status_field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackendKind,

    /// Required when backend is postgres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Filesystem root for blob containers. In-memory blobs when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_root: Option<PathBuf>,

    #[serde(default = "default_job_files_container")]
    pub job_files_container: String,

    #[serde(default = "default_template_files_container")]
    pub template_files_container: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    /// Base URL of the site-hosting gateway service
    #[serde(default = "default_hosting_base_url")]
    pub base_url: String,

    /// Usually supplied through PROVISIONING_HOSTING_API_KEY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_hosting_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deliveries before a failing message is dead-lettered
    #[serde(default = "default_max_delivery_count")]
    pub max_delivery_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Maximum time between the creation request and the site becoming active
    #[serde(default = "default_monitor_deadline", with = "humantime_serde")]
    pub deadline: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_scheduler_tick", with = "humantime_serde")]
    pub scheduler_tick: Duration,

    /// How long a claimed run may take before another run picks it up
    #[serde(default = "default_lease", with = "humantime_serde")]
    pub lease: Duration,

    /// Re-evaluate the deadline on every poll, not only at entry
    #[serde(default = "default_true")]
    pub recheck_deadline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Retries after the first apply attempt
    #[serde(default = "default_max_apply_retries")]
    pub max_apply_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Prometheus exporter port; disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

fn default_true() -> bool {
    true
}

fn default_list_title() -> String {
    "PnPProvisioningJobs".to_string()
}

fn default_status_field() -> String {
    "PnPProvisioningJobStatus".to_string()
}

fn default_backend() -> StorageBackendKind {
    StorageBackendKind::InMemory
}

fn default_job_files_container() -> String {
    "provisioning-job-files".to_string()
}

fn default_template_files_container() -> String {
    "provisioning-templates".to_string()
}

fn default_hosting_base_url() -> String {
    "http://localhost:8088".to_string()
}

fn default_hosting_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_delivery_count() -> u32 {
    10
}

fn default_monitor_deadline() -> Duration {
    Duration::from_secs(24 * 3600 + 10 * 60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_scheduler_tick() -> Duration {
    Duration::from_secs(5)
}

fn default_lease() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_apply_retries() -> u32 {
    3
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            list_title: default_list_title(),
            status_field: default_status_field(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: None,
            blob_root: None,
            job_files_container: default_job_files_container(),
            template_files_container: default_template_files_container(),
        }
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            base_url: default_hosting_base_url(),
            api_key: None,
            timeout: default_hosting_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_delivery_count: default_max_delivery_count(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            deadline: default_monitor_deadline(),
            poll_interval: default_poll_interval(),
            scheduler_tick: default_scheduler_tick(),
            lease: default_lease(),
            recheck_deadline: true,
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            max_apply_retries: default_max_apply_retries(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

impl Default for ProvisioningConfigSpec {
    fn default() -> Self {
        Self {
            tenant: TenantConfig {
                id: "contoso".to_string(),
                url: "https://contoso.example.com".to_string(),
                admin_url: "https://contoso-admin.example.com".to_string(),
                provisioning_site_url: "https://contoso.example.com/sites/provisioning".to_string(),
            },
            tracking: TrackingConfig::default(),
            storage: StorageConfig::default(),
            hosting: HostingConfig::default(),
            pipeline: PipelineConfig::default(),
            monitor: MonitorConfig::default(),
            templates: TemplateConfig::default(),
            api: ApiConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ProvisioningConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "site-provisioning".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ProvisioningConfigSpec::default(),
        }
    }
}

impl ProvisioningConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PROVISIONING_CONFIG_PATH environment variable
    /// 2. ./provisioning-config.yaml (working directory)
    /// 3. ~/.provisioning/config.yaml (user home)
    /// 4. /etc/provisioning/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PROVISIONING_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./provisioning-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".provisioning").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/provisioning/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Environment overrides for container deployments
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PROVISIONING_DATABASE_URL") {
            tracing::info!("Environment override: PROVISIONING_DATABASE_URL");
            self.spec.storage.database_url = Some(val);
        }

        if let Ok(val) = std::env::var("PROVISIONING_HOSTING_API_KEY") {
            tracing::info!("Environment override: PROVISIONING_HOSTING_API_KEY");
            self.spec.hosting.api_key = Some(val);
        }

        if let Ok(val) = std::env::var("PROVISIONING_TENANT_URL") {
            tracing::info!("Environment override: PROVISIONING_TENANT_URL={}", val);
            self.spec.tenant.url = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.tenant.id.is_empty() {
            anyhow::bail!("spec.tenant.id cannot be empty");
        }

        // Fails on any unparseable tenant URL
        self.tenant()?;

        if Url::parse(&self.spec.hosting.base_url).is_err() {
            anyhow::bail!("spec.hosting.base_url is not a valid URL: '{}'", self.spec.hosting.base_url);
        }

        if self.spec.storage.backend == StorageBackendKind::Postgres
            && self.spec.storage.database_url.as_deref().unwrap_or("").is_empty()
        {
            anyhow::bail!("spec.storage.database_url is required for the postgres backend");
        }

        if self.spec.storage.job_files_container.is_empty()
            || self.spec.storage.template_files_container.is_empty()
        {
            anyhow::bail!("blob container names cannot be empty");
        }

        if self.spec.monitor.poll_interval.is_zero() {
            anyhow::bail!("spec.monitor.poll_interval must be greater than zero");
        }

        if self.spec.monitor.scheduler_tick.is_zero() {
            anyhow::bail!("spec.monitor.scheduler_tick must be greater than zero");
        }

        if self.spec.pipeline.max_delivery_count == 0 {
            anyhow::bail!("spec.pipeline.max_delivery_count must be at least 1");
        }

        if !matches!(self.spec.observability.log_format.as_str(), "text" | "json") {
            anyhow::bail!(
                "Invalid observability.log_format: '{}'. Must be 'text' or 'json'",
                self.spec.observability.log_format
            );
        }

        Ok(())
    }

    /// Resolve the tenant identity once, at start-up.
    pub fn tenant(&self) -> anyhow::Result<Tenant> {
        let parse = |field: &str, value: &str| {
            Url::parse(value)
                .map_err(|e| anyhow::anyhow!("spec.tenant.{} is not a valid URL '{}': {}", field, value, e))
        };
        Ok(Tenant {
            id: TenantId(self.spec.tenant.id.clone()),
            url: parse("url", &self.spec.tenant.url)?,
            admin_url: parse("admin_url", &self.spec.tenant.admin_url)?,
            provisioning_site_url: parse("provisioning_site_url", &self.spec.tenant.provisioning_site_url)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: provisioning/v1
kind: ProvisioningConfig
metadata:
  name: contoso-provisioning
spec:
  tenant:
    id: contoso
    url: https://contoso.example.com
    admin_url: https://contoso-admin.example.com
    provisioning_site_url: https://contoso.example.com/sites/provisioning
  storage:
    backend: postgres
    database_url: postgres://localhost/provisioning
  monitor:
    poll_interval: 30s
    deadline: 2h
    recheck_deadline: false
  templates:
    cache_ttl: 15m
"#;

    #[test]
    fn test_default_manifest() {
        let manifest = ProvisioningConfigManifest::default();
        assert_eq!(manifest.api_version, "provisioning/v1");
        assert_eq!(manifest.kind, "ProvisioningConfig");
        assert_eq!(manifest.spec.monitor.deadline, Duration::from_secs(87_000));
        assert_eq!(manifest.spec.monitor.poll_interval, Duration::from_secs(60));
        assert_eq!(manifest.spec.templates.cache_ttl, Duration::from_secs(3600));
        assert_eq!(manifest.spec.templates.max_apply_retries, 3);
        assert_eq!(manifest.spec.tracking.list_title, "PnPProvisioningJobs");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_manifest_with_durations() {
        let manifest = ProvisioningConfigManifest::from_yaml_str(MANIFEST).unwrap();
        assert_eq!(manifest.metadata.name, "contoso-provisioning");
        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::Postgres);
        assert_eq!(manifest.spec.monitor.poll_interval, Duration::from_secs(30));
        assert_eq!(manifest.spec.monitor.deadline, Duration::from_secs(7200));
        assert!(!manifest.spec.monitor.recheck_deadline);
        assert_eq!(manifest.spec.templates.cache_ttl, Duration::from_secs(900));
        // Unspecified sections fall back to defaults
        assert_eq!(manifest.spec.pipeline.max_delivery_count, 10);
        assert_eq!(manifest.spec.storage.job_files_container, "provisioning-job-files");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_tenant_resolution() {
        let manifest = ProvisioningConfigManifest::from_yaml_str(MANIFEST).unwrap();
        let tenant = manifest.tenant().unwrap();
        assert_eq!(tenant.id.0, "contoso");
        assert_eq!(tenant.provisioning_site_url.path(), "/sites/provisioning");
    }

    #[test]
    fn test_validation() {
        let mut manifest = ProvisioningConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.metadata.name = "".to_string();
        assert!(manifest.validate().is_err());
        manifest.metadata.name = "test".to_string();

        manifest.spec.tenant.url = "not a url".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.tenant.url = "https://contoso.example.com".to_string();

        manifest.spec.monitor.poll_interval = Duration::ZERO;
        assert!(manifest.validate().is_err());
        manifest.spec.monitor.poll_interval = Duration::from_secs(60);

        manifest.spec.storage.backend = StorageBackendKind::Postgres;
        assert!(manifest.validate().is_err());
        manifest.spec.storage.database_url = Some("postgres://localhost/db".to_string());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provisioning-config.yaml");
        let manifest = ProvisioningConfigManifest::from_yaml_str(MANIFEST).unwrap();
        manifest.to_yaml_file(&path).unwrap();

        let loaded = ProvisioningConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "contoso-provisioning");
        assert_eq!(loaded.spec.monitor.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = ProvisioningConfigManifest::load_or_default(Some(PathBuf::from(
            "/nonexistent/provisioning-config.yaml",
        )));
        assert!(result.is_err());
    }
}
