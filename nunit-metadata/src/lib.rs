// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the machine-readable contracts of `dotnet-test-nunit`.
//!
//! Consumers such as IDE integrations depend on two things: the documented
//! process exit codes in [`NUnitExitCode`], and the JSON messages defined in
//! [`protocol`] that are exchanged during design-time discovery and execution.

mod errors;
mod exit_codes;
pub mod protocol;

pub use errors::*;
pub use exit_codes::*;
