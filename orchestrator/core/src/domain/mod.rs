// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure model of the agent population. Nothing here performs I/O.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Population records, the registry aggregate, and the pure
//!   decision logic that acts on them

pub mod agent;
pub mod colony_config;
pub mod events;
pub mod lifecycle;
pub mod mentorship;
pub mod merge;
pub mod registry;
pub mod repository;
pub mod scoring;
pub mod spawning;
pub mod validation;
pub mod workload;
