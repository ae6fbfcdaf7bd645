// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the NUnit runner.

use crate::reporter::labels::LabelMode;
use camino::Utf8PathBuf;
use config::ConfigError;
use nunit_metadata::MessageDecodeError;
use std::{io, string::FromUtf8Error};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse nunit config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// Error returned while parsing a [`LabelMode`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for labels: {input}\n(known values: {})",
    LabelMode::variants().join(", "),
)]
pub struct LabelModeParseError {
    input: String,
}

impl LabelModeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while parsing a result output specification such as
/// `TestResult.xml;format=nunit2`.
#[derive(Clone, Debug, Error)]
#[error("invalid result specification `{input}`: {kind}")]
pub struct OutputSpecParseError {
    input: String,
    kind: OutputSpecParseErrorKind,
}

impl OutputSpecParseError {
    pub(crate) fn new(input: impl Into<String>, kind: OutputSpecParseErrorKind) -> Self {
        Self {
            input: input.into(),
            kind,
        }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &OutputSpecParseErrorKind {
        &self.kind
    }
}

/// The kind of [`OutputSpecParseError`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OutputSpecParseErrorKind {
    /// The file name was empty.
    #[error("no file name given")]
    EmptyPath,

    /// An option was not of the form `key=value`.
    #[error("option `{0}` is not of the form key=value")]
    MissingValue(String),

    /// An option key was not recognized.
    #[error("unknown option `{0}` (known options: format, transform)")]
    UnknownKey(String),
}

/// An error that occurs while parsing a single XML record produced by the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum XmlParseError {
    /// The underlying XML reader reported an error.
    #[error("malformed XML record")]
    Xml(#[from] quick_xml::Error),

    /// The record did not contain an element.
    #[error("XML record has no root element")]
    NoRootElement,

    /// The record ended before all elements were closed.
    #[error("XML record ended inside element `{name}`")]
    Unclosed {
        /// The innermost element that was left open.
        name: String,
    },
}

/// An error that occurs while writing an XML document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum XmlWriteError {
    /// An I/O error occurred.
    #[error("error writing XML")]
    Io(#[from] io::Error),

    /// The XML writer reported an error.
    #[error("error serializing XML")]
    Xml(#[from] quick_xml::Error),
}

/// A result document passed to the summary was not an NUnit 3 `test-run` document.
#[derive(Clone, Debug, Error)]
#[error("expected a `test-run` result document, found `<{root}>`")]
pub struct InvalidResultDocument {
    root: String,
}

impl InvalidResultDocument {
    pub(crate) fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

/// An error that occurs while writing an event to a reporter, sink or console.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] io::Error),

    /// An error occurred while serializing an IDE protocol message.
    #[error("error serializing protocol message")]
    Json(#[source] serde_json::Error),
}

/// An error that occurs while saving a result file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResultWriteError {
    /// The work directory could not be created.
    #[error("error creating work directory `{path}`")]
    CreateDir {
        /// The work directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The result file could not be written.
    #[error("error writing result file `{path}`")]
    Write {
        /// The result file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: XmlWriteError,
    },

    /// The requested result format is not supported.
    #[error("unsupported result format `{format}` for `{path}`, skipping")]
    UnsupportedFormat {
        /// The result file.
        path: Utf8PathBuf,

        /// The requested format.
        format: String,
    },

    /// A transform was requested; transforms are not supported.
    #[error("transform `{transform}` for `{path}` is not supported, skipping")]
    UnsupportedTransform {
        /// The result file.
        path: Utf8PathBuf,

        /// The requested transform.
        transform: String,
    },
}

impl ResultWriteError {
    /// Returns true if this error means the output was skipped rather than failed.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::UnsupportedTransform { .. }
        )
    }
}

/// An error that occurs while running or exploring an assembly through the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The assembly file does not exist.
    #[error("assembly `{path}` not found")]
    AssemblyNotFound {
        /// The assembly path.
        path: Utf8PathBuf,
    },

    /// The directory containing the assembly does not exist.
    #[error("directory `{path}` not found")]
    DirectoryNotFound {
        /// The missing directory.
        path: Utf8PathBuf,
    },

    /// The engine process could not be started.
    #[error("error spawning engine `{command}`")]
    Spawn {
        /// The engine command line.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Reading the engine's output failed.
    #[error("error reading engine output for `{assembly}`")]
    Read {
        /// The assembly being processed.
        assembly: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The engine failed without producing a `test-run` document.
    #[error("engine exited with {status} while processing `{assembly}`")]
    Exited {
        /// The assembly being processed.
        assembly: Utf8PathBuf,

        /// The exit status.
        status: String,
    },

    /// The engine exited without producing a `test-run` document.
    #[error("engine produced no result document for `{assembly}`")]
    NoResult {
        /// The assembly being processed.
        assembly: Utf8PathBuf,
    },

    /// The final result document could not be parsed.
    #[error("error parsing result document for `{assembly}`")]
    Document {
        /// The assembly being processed.
        assembly: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: XmlParseError,
    },

    /// The engine's result document was not a `test-run` document.
    #[error(transparent)]
    InvalidDocument(#[from] InvalidResultDocument),

    /// A subscriber failed while handling an event.
    #[error("error reporting test event")]
    Event(#[from] WriteEventError),
}

/// An error that occurs while talking to an IDE over the remote protocol.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// An I/O error occurred on the connection.
    #[error("error communicating with IDE")]
    Io(#[from] io::Error),

    /// A length prefix was longer than five bytes.
    #[error("invalid string length prefix")]
    InvalidLength,

    /// A length prefix announced a message larger than the runner accepts.
    #[error("message of {len} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge {
        /// The announced length.
        len: usize,

        /// The largest accepted length.
        max: usize,
    },

    /// A string was not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),

    /// A message could not be decoded.
    #[error("error decoding message from IDE")]
    Decode(#[from] MessageDecodeError),

    /// A message could not be encoded.
    #[error("error encoding message for IDE")]
    Encode(#[from] serde_json::Error),
}
