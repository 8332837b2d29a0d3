// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Blob Storage Infrastructure
//!
//! Implementations of the `BlobStore` trait for job files and cached
//! templates.

pub mod local;
pub mod memory;

pub use local::LocalBlobStore;
pub use memory::InMemoryBlobStore;
