// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! Site Provisioning Core
//!
//! Message-driven saga that provisions collaboration sites: job intake,
//! site creation, a durable creation monitor, template caching and
//! template application, with per-job status reported to a tracking list.
//!
//! # Architecture
//!
//! - **domain:** jobs, sites, status records, monitor state, collaborator traits
//! - **application:** stages, pipeline coordinator, monitor, template services
//! - **infrastructure:** message bus, event bus, repositories, blob stores, REST gateway
//! - **presentation:** HTTP API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
