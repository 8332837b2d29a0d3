// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface that translates external requests into messages and
//! application service calls. No business logic lives here.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Job intake, site update requests, site and template queries |

pub mod api;
