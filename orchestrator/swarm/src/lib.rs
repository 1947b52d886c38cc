// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `colony-swarm`: Mentor Assignment Crate
//!
//! Pairs under-performing agents with `hall_of_fame` mentors and judges each
//! pairing when its evaluation window closes. All writes go through the
//! core's atomic update protocol.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `MentorMatcher`, `MatchScore`, `MatchOutcome` |
//! | [`application`] | Application | `MentorshipService` |
//!
//! ## Key Concepts
//!
//! - **Capacity**: a mentor holds at most `capacity` active mentorships. The
//!   assignment mutator re-checks this against the fresh document, and the
//!   document validator rejects any commit that would exceed it.
//! - **No match is normal**: a mentee with no suitable mentor stays unpaired
//!   until the next pass.

pub mod domain;
pub mod application;

pub use domain::*;
