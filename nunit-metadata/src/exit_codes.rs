// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `dotnet-test-nunit`.
///
/// A run that completes without infrastructure problems exits with the number
/// of failed tests, so `0` means every test passed. The remaining codes are
/// negative so they can never be confused with a failure count.
pub enum NUnitExitCode {}

impl NUnitExitCode {
    /// No errors occurred and no tests failed.
    pub const OK: i32 = 0;

    /// The command line could not be parsed or was inconsistent.
    pub const INVALID_ARG: i32 = -1;

    /// An input assembly (or its directory) could not be found or loaded.
    pub const INVALID_ASSEMBLY: i32 = -2;

    /// A test fixture was not runnable, for example because of a bad constructor.
    pub const INVALID_TEST_FIXTURE: i32 = -4;

    /// Something went wrong that the runner did not anticipate.
    pub const UNEXPECTED_ERROR: i32 = -100;

    /// Returns the exit code for a run that finished with `failed_count` failed tests.
    pub fn from_failed_count(failed_count: usize) -> i32 {
        i32::try_from(failed_count).unwrap_or(i32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_never_overlap_failure_counts() {
        for code in [
            NUnitExitCode::INVALID_ARG,
            NUnitExitCode::INVALID_ASSEMBLY,
            NUnitExitCode::INVALID_TEST_FIXTURE,
            NUnitExitCode::UNEXPECTED_ERROR,
        ] {
            assert!(code < NUnitExitCode::OK, "code {code} must be negative");
        }
        assert_eq!(NUnitExitCode::from_failed_count(0), NUnitExitCode::OK);
        assert_eq!(NUnitExitCode::from_failed_count(3), 3);
        assert_eq!(NUnitExitCode::from_failed_count(usize::MAX), i32::MAX);
    }
}
