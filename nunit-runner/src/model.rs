// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalized tests and test results, as reported to IDEs.

use chrono::{DateTime, Utc};
use nunit_metadata::protocol::TestOutcome;
use serde::{Serialize, Serializer};
use std::{collections::BTreeMap, time::Duration};
use uuid::Uuid;

/// A single test, identified independently of the engine's own ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Test {
    /// Stable identity derived from the engine id, the assembly path and the
    /// fully-qualified name.
    pub id: Uuid,

    /// The fully-qualified name, e.g. `Ns.Fixture.Method(1)`.
    pub fully_qualified_name: String,

    /// The short display name.
    pub display_name: String,

    /// The source file the test is defined in, if known.
    pub code_file_path: Option<String>,

    /// The line the test is defined on, if known.
    pub line_number: Option<u32>,

    /// Test properties. Keys are unique; a repeated key keeps the last value.
    pub properties: BTreeMap<String, String>,
}

/// The result of running a [`Test`].
///
/// A result carries its own copy of the test so it stays valid after the
/// start record is discarded.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestResult {
    /// The test this is a result of.
    pub test: Test,

    /// The outcome.
    pub outcome: TestOutcome,

    /// The failure message, or the skip reason.
    pub error_message: Option<String>,

    /// The failure stack trace.
    pub error_stack_trace: Option<String>,

    /// The display name of the test.
    pub display_name: String,

    /// Output captured while the test ran.
    pub messages: Vec<String>,

    /// The machine the test ran on.
    pub computer_name: String,

    /// How long the test took. Never less than one millisecond.
    #[serde(serialize_with = "serialize_timespan")]
    pub duration: Duration,

    /// When the test started.
    pub start_time: DateTime<Utc>,

    /// When the test finished.
    pub end_time: DateTime<Utc>,
}

/// The output of parsing one engine record.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedEvent {
    /// A test started (`start-test`).
    Test(Test),

    /// A test finished (`test-case`).
    Result(TestResult),
}

fn serialize_timespan<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timespan(*duration))
}

/// Formats a duration as a .NET `TimeSpan`: `[d.]hh:mm:ss.fffffff`.
pub fn format_timespan(duration: Duration) -> String {
    let secs = duration.as_secs();
    let ticks = duration.subsec_nanos() / 100;
    let days = secs / 86_400;
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    if days > 0 {
        format!("{days}.{hours:02}:{minutes:02}:{seconds:02}.{ticks:07}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{ticks:07}")
    }
}
