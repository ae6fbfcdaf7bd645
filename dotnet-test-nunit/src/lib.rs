// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs NUnit tests from the command line.
//!
//! The binary drives an NUnit engine over one or more test assemblies, and
//! reports what happens to the console, to result files, to TeamCity and to
//! IDEs. The heavy lifting lives in [`nunit_runner`].

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter, StderrStyles};
