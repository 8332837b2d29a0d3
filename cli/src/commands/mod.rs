// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the provisioner CLI

pub mod config;

pub use self::config::ConfigCommand;
