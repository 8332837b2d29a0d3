// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Jobs, sites, status records, monitor state and the interfaces of every
//! external collaborator.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types and contracts shared by all provisioning stages

pub mod clock;
pub mod config;
pub mod events;
pub mod hosting;
pub mod job;
pub mod messaging;
pub mod monitor;
pub mod repository;
pub mod site;
pub mod status;
pub mod storage;
pub mod template;
