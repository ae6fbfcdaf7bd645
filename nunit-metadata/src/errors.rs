// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while decoding an IDE protocol message.
#[derive(Debug)]
pub enum MessageDecodeError {
    /// The message was not valid JSON, or did not have the expected shape.
    Json(serde_json::Error),

    /// The message had a different type from the one expected.
    UnexpectedType {
        /// The message type that was expected.
        expected: &'static str,

        /// The message type that was received.
        actual: String,
    },

    /// The message did not carry a payload.
    MissingPayload {
        /// The type of the message.
        message_type: String,
    },
}

impl fmt::Display for MessageDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Json(_) => write!(f, "error deserializing protocol message"),
            Self::UnexpectedType { expected, actual } => {
                write!(f, "expected message `{expected}`, received `{actual}`")
            }
            Self::MissingPayload { message_type } => {
                write!(f, "message `{message_type}` has no payload")
            }
        }
    }
}

impl error::Error for MessageDecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::UnexpectedType { .. } | Self::MissingPayload { .. } => None,
        }
    }
}
