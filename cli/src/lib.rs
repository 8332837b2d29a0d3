// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! Site provisioning CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers, logging set-up and the service host

pub mod commands;
pub mod daemon;
pub mod logging;
