// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mentorship Domain Layer
//!
//! Pure matching and evaluation rules. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`matching`] | `MentorMatcher`, `MatchScore`, `MatchOutcome`, `NoMatchReason` |

pub mod matching;

pub use matching::*;
