// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod activity;
pub mod event_bus;
pub mod signals;
pub mod store;

pub use event_bus::EventBus;
pub use store::{FileDocumentStore, InMemoryDocumentStore};
