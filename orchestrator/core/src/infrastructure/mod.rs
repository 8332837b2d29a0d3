// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod event_bus;
pub mod hosting;
pub mod message_bus;
pub mod repositories;
pub mod storage;

pub use event_bus::{DomainEvent, EventBus};
pub use message_bus::{DeadLetter, InProcessMessageBus};
