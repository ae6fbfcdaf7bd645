// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for `dotnet-test-nunit`.
//!
//! An NUnit engine reports progress as a sequence of small XML records
//! (`start-run`, `start-suite`, `start-test`, `test-case`, `test-suite`,
//! `test-output`) followed by a final `test-run` document. This crate turns
//! that stream into:
//!
//! * TeamCity service messages ([`reporter::teamcity`]),
//! * IDE protocol messages ([`listener`], [`sink`]),
//! * a console report, an aggregated [`ResultSummary`](reporter::summary::ResultSummary)
//!   and NUnit 3 or NUnit 2 result files.
//!
//! Records are parsed once and fanned out to every consumer through an
//! [`EventBroadcaster`](events::EventBroadcaster).

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
mod helpers;
pub mod listener;
pub mod model;
pub mod navigation;
pub mod parse;
pub mod reporter;
pub mod runner;
pub mod sink;
pub mod write_str;
pub mod xml;
