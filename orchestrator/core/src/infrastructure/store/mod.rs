// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Document store backends
//!
//! | Backend | Revision | Durability |
//! |---------|----------|------------|
//! | [`InMemoryDocumentStore`] | monotonic counter | process lifetime |
//! | [`FileDocumentStore`] | SHA-256 of the file content | JSON file, temp + rename |

mod file;
mod memory;

pub use file::FileDocumentStore;
pub use memory::InMemoryDocumentStore;

use std::sync::Arc;

use chrono::Utc;

use crate::domain::colony_config::{StoreBackend, StoreConfig};
use crate::domain::registry::{RegistryConfig, RegistryDocument};
use crate::domain::repository::DocumentStore;

/// Build the store selected in configuration. `seed` is the config block of
/// a registry that has never been written.
pub fn from_config(config: &StoreConfig, seed: &RegistryConfig) -> Arc<dyn DocumentStore> {
    match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryDocumentStore::with_document(RegistryDocument::new(
            seed.clone(),
            Utc::now(),
        ))),
        StoreBackend::File => Arc::new(FileDocumentStore::with_seed(&config.path, seed.clone())),
    }
}
