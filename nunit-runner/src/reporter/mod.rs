// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the results of a test run in human and machine-readable formats.
//!
//! * [`displayer`] renders the end-of-run console report.
//! * [`labels`] echoes test output with `=> name` headers while tests run.
//! * [`teamcity`] emits TeamCity service messages.
//! * [`summary`] aggregates result documents into counts and an exit code.
//! * [`legacy`] writes NUnit 2 result files.

pub mod displayer;
mod helpers;
pub mod labels;
pub mod legacy;
pub mod summary;
pub mod teamcity;

pub use helpers::Styles;
