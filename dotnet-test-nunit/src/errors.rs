// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use nunit_metadata::NUnitExitCode;
use nunit_runner::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error the runner knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("engine command parse error")]
    EngineCommandParseError {
        command: String,
        #[source]
        err: shell_words::ParseError,
    },
    #[error("engine error")]
    EngineError {
        #[from]
        err: EngineError,
    },
    #[error("IDE protocol error")]
    ProtocolError {
        #[from]
        err: ProtocolError,
    },
    #[error("writing event failed")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
}

impl ExpectedError {
    pub(crate) fn engine_command_parse_error(
        command: impl Into<String>,
        err: shell_words::ParseError,
    ) -> Self {
        Self::EngineCommandParseError {
            command: command.into(),
            err,
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. } | Self::EngineCommandParseError { .. } => {
                NUnitExitCode::INVALID_ARG
            }
            Self::EngineError { err } => match err {
                EngineError::AssemblyNotFound { .. } | EngineError::DirectoryNotFound { .. } => {
                    NUnitExitCode::INVALID_ASSEMBLY
                }
                _ => NUnitExitCode::UNEXPECTED_ERROR,
            },
            Self::CurrentDirInvalid { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ProtocolError { .. }
            | Self::WriteEventError { .. } => NUnitExitCode::UNEXPECTED_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirInvalid { err } => {
                error!("could not read the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::EngineCommandParseError { command, err } => {
                error!(
                    "failed to parse engine command `{}`",
                    command.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::EngineError { err } => {
                // Not-found errors are self-explanatory.
                error!("{err}");
                err.source()
            }
            Self::ProtocolError { err } => {
                error!("error talking to the IDE");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write test output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use test_case::test_case;

    #[test_case(
        ExpectedError::from(EngineError::AssemblyNotFound { path: Utf8PathBuf::from("a.dll") }),
        NUnitExitCode::INVALID_ASSEMBLY;
        "assembly not found"
    )]
    #[test_case(
        ExpectedError::from(EngineError::DirectoryNotFound { path: Utf8PathBuf::from("bin") }),
        NUnitExitCode::INVALID_ASSEMBLY;
        "directory not found"
    )]
    #[test_case(
        ExpectedError::from(EngineError::NoResult { assembly: Utf8PathBuf::from("a.dll") }),
        NUnitExitCode::UNEXPECTED_ERROR;
        "no result"
    )]
    #[test_case(
        ExpectedError::engine_command_parse_error(
            "dotnet 'engine.dll",
            shell_words::split("'").unwrap_err(),
        ),
        NUnitExitCode::INVALID_ARG;
        "engine command"
    )]
    #[test_case(
        ExpectedError::from(ProtocolError::InvalidLength),
        NUnitExitCode::UNEXPECTED_ERROR;
        "protocol"
    )]
    fn exit_codes(error: ExpectedError, expected: i32) {
        assert_eq!(error.process_exit_code(), expected);
    }
}
