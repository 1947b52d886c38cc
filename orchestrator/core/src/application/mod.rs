// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod retry;
pub mod registry_update;
pub mod query;
pub mod evaluator;
pub mod spawner;
pub mod cleanup;
pub mod control_loop;

// Re-export services for convenience
pub use cleanup::{CleanupReport, CleanupService};
pub use control_loop::{ControlLoop, ControlTask};
pub use evaluator::{EvaluationReport, Evaluator};
pub use query::{QueryError, RegistryQueryService};
pub use registry_update::{ConflictError, RegistryUpdater, UpdateError, UpdateOutcome};
pub use retry::RetryPolicy;
pub use spawner::{SpawnError, SpawnReport, SpawnService};
