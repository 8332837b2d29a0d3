// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Site-hosting platform adapters.

pub mod rest;

pub use rest::RestHostingGateway;
