// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`colony-core`)
//!
//! Read-only HTTP surface over the registry. **No business logic lives
//! here**; every handler delegates to [`crate::application::query`].
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | Liveness |
//! | `GET /agents?specialization=` | Active agents, optionally filtered |
//! | `GET /agents/{id}` | One record, 404 when unknown |
//! | `GET /stats` | Population counts |

pub mod api;
