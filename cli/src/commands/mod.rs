// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Colony CLI

pub mod agent;
pub mod config;
pub mod cycle;
pub mod registry;
pub mod serve;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::cycle::CycleCommand;
pub use self::registry::RegistryCommand;
