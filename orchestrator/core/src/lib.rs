// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Colony Core
//!
//! Registry and lifecycle control plane for a population of autonomous
//! agents: the shared registry document, its atomic update protocol, the
//! scoring, lifecycle and spawn decision rules, and the services that drive
//! them on a schedule.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, store adapters, read API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
