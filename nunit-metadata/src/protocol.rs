// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages exchanged with an IDE during design-time discovery and execution.
//!
//! Every message is a JSON object of the form
//! `{"MessageType": "<type>", "Payload": <object>}`. How messages are framed on
//! the wire (one per line, or length-prefixed over a socket) is up to the
//! transport.

use crate::MessageDecodeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};

/// Message type names understood by IDE integrations.
pub enum MessageType {}

impl MessageType {
    /// A test was found during discovery. The payload is a test.
    pub const TEST_FOUND: &'static str = "TestDiscovery.TestFound";

    /// Discovery finished. No payload.
    pub const DISCOVERY_COMPLETED: &'static str = "TestDiscovery.Completed";

    /// A test started executing. The payload is a test.
    pub const TEST_STARTED: &'static str = "TestExecution.TestStarted";

    /// A test finished executing. The payload is a test result.
    pub const TEST_RESULT: &'static str = "TestExecution.TestResult";

    /// Execution finished. No payload.
    pub const EXECUTION_COMPLETED: &'static str = "TestExecution.Completed";

    /// The runner is waiting for a command from the IDE. No payload.
    pub const WAITING_COMMAND: &'static str = "TestRunner.WaitingCommand";

    /// The IDE asks the runner to execute a set of tests. The payload is a
    /// [`RunTestsMessage`].
    pub const EXECUTE: &'static str = "TestRunner.Execute";
}

/// A single protocol message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The message type, one of the [`MessageType`] constants.
    #[serde(rename = "MessageType")]
    pub message_type: String,

    /// The payload, if any.
    #[serde(rename = "Payload", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Message {
    /// Creates a message with the given payload.
    pub fn new<T: Serialize>(message_type: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_type: message_type.to_owned(),
            payload: Some(serde_json::to_value(payload)?),
        })
    }

    /// Creates a message without a payload.
    pub fn without_payload(message_type: &str) -> Self {
        Self {
            message_type: message_type.to_owned(),
            payload: None,
        }
    }

    /// Parses a message from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, MessageDecodeError> {
        serde_json::from_str(json).map_err(MessageDecodeError::Json)
    }

    /// Serializes the message to its JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Checks that this message has type `expected` and decodes its payload.
    pub fn decode_payload<T: DeserializeOwned>(
        &self,
        expected: &'static str,
    ) -> Result<T, MessageDecodeError> {
        if self.message_type != expected {
            return Err(MessageDecodeError::UnexpectedType {
                expected,
                actual: self.message_type.clone(),
            });
        }
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| MessageDecodeError::MissingPayload {
                message_type: self.message_type.clone(),
            })?;
        serde_json::from_value(payload).map_err(MessageDecodeError::Json)
    }
}

/// Payload of a [`MessageType::EXECUTE`] message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTestsMessage {
    /// Fully-qualified names of the tests to run. Empty means all tests.
    #[serde(rename = "Tests", default)]
    pub tests: Vec<String>,
}

/// The outcome of a single test, as reported to an IDE.
///
/// Serialized as its integer value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TestOutcome {
    /// No outcome could be determined.
    #[default]
    None,
    /// The test passed.
    Passed,
    /// The test failed.
    Failed,
    /// The test was skipped, ignored or inconclusive.
    Skipped,
    /// The test was requested but could not be found.
    NotFound,
}

impl TestOutcome {
    /// Returns the integer value used on the wire.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Passed => 1,
            Self::Failed => 2,
            Self::Skipped => 3,
            Self::NotFound => 4,
        }
    }

    /// Converts a wire value back into an outcome.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Passed),
            2 => Some(Self::Failed),
            3 => Some(Self::Skipped),
            4 => Some(Self::NotFound),
            _ => None,
        }
    }
}

impl Serialize for TestOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for TestOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i32::deserialize(deserializer)?;
        Self::from_i32(value).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid test outcome value {value}"))
        })
    }
}
