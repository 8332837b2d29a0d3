// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

pub mod pipeline;
pub mod repository_factory;
pub mod site_monitor;
pub mod site_queries;
pub mod stages;
pub mod template_apply;
pub mod template_cache;

// Re-export services for convenience
pub use pipeline::PipelineCoordinator;
pub use site_monitor::{MonitorScheduler, MonitorSettings, SiteCreationMonitor};
pub use site_queries::SiteQueryService;
pub use stages::{StageContext, StageError, StageHandler, StatusReporter};
pub use template_apply::{ApplyOutcome, TemplateApplicationExecutor};
pub use template_cache::{TemplateCacheError, TemplateCacheManager};
