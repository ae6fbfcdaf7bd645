// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation of NUnit 3 result documents.
//!
//! One [`ResultSummary`] is kept per run. The final `test-run` document of
//! every assembly is added to it, and the summary then drives the console
//! report, the result files and the exit code.

use crate::{errors::InvalidResultDocument, parse::try_parse_timestamp, xml::XmlNode};
use chrono::{DateTime, SecondsFormat, Utc};
use nunit_metadata::NUnitExitCode;
use std::fmt;

/// Counts of leaf test cases by outcome.
///
/// The outcome of a test case is its `label` attribute when present, and its
/// `result` attribute otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    /// Number of leaf test cases.
    pub test_count: usize,

    /// `Passed`.
    pub pass_count: usize,

    /// `Failed` without a more specific label.
    pub failure_count: usize,

    /// `Error` or `Cancelled`.
    pub error_count: usize,

    /// `Invalid` or `NotRunnable`. These were never run.
    pub invalid_count: usize,

    /// `Inconclusive`.
    pub inconclusive_count: usize,

    /// `Skipped`, and any outcome not listed here.
    pub skip_count: usize,

    /// `Ignored`.
    pub ignore_count: usize,

    /// `Explicit`.
    pub explicit_count: usize,

    /// Sum of the `asserts` attributes.
    pub assert_count: u64,
}

impl SummaryCounts {
    /// Counts every `test-case` below `node`.
    pub fn from_tree(node: &XmlNode) -> Self {
        let mut counts = Self::default();
        for test_case in node.descendants_named("test-case") {
            counts.add_test_case(test_case);
        }
        counts
    }

    fn add_test_case(&mut self, node: &XmlNode) {
        self.test_count += 1;
        self.assert_count += node
            .attr("asserts")
            .and_then(|asserts| asserts.parse::<u64>().ok())
            .unwrap_or(0);

        // A present label wins, even an empty one.
        let outcome = node
            .attr("label")
            .or_else(|| node.attr("result"))
            .unwrap_or_default();
        match outcome {
            "Passed" => self.pass_count += 1,
            "Failed" => self.failure_count += 1,
            "Error" | "Cancelled" => self.error_count += 1,
            "Inconclusive" => self.inconclusive_count += 1,
            "Invalid" | "NotRunnable" => self.invalid_count += 1,
            "Ignored" => self.ignore_count += 1,
            "Explicit" => self.explicit_count += 1,
            _ => self.skip_count += 1,
        }
    }

    /// Failures, errors and invalid tests.
    pub fn failed_count(&self) -> usize {
        self.failure_count + self.error_count + self.invalid_count
    }

    /// Skipped, ignored and explicit tests.
    pub fn total_skip_count(&self) -> usize {
        self.skip_count + self.ignore_count + self.explicit_count
    }

    /// Tests that actually ran: passed, failed with a failure or error, or inconclusive.
    pub fn tests_run(&self) -> usize {
        self.pass_count + self.failure_count + self.error_count + self.inconclusive_count
    }

    /// The overall verdict.
    pub fn verdict(&self) -> RunVerdict {
        if self.failed_count() > 0 {
            RunVerdict::Failed
        } else if self.total_skip_count() > 0 {
            RunVerdict::Warning
        } else {
            RunVerdict::Passed
        }
    }

    /// Counts in the shape of an NUnit 2 `test-results` header.
    pub fn legacy(&self) -> LegacyCounts {
        let skipped = self.skip_count + self.explicit_count;
        LegacyCounts {
            total: self.test_count,
            errors: self.error_count,
            failures: self.failure_count,
            not_run: skipped + self.ignore_count + self.invalid_count,
            inconclusive: self.inconclusive_count,
            ignored: self.ignore_count,
            skipped,
            invalid: self.invalid_count,
        }
    }
}

/// Header counts of an NUnit 2 result file.
///
/// NUnit 2 has no explicit outcome, so explicit tests count as skipped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LegacyCounts {
    /// All test cases.
    pub total: usize,
    /// Errors and cancellations.
    pub errors: usize,
    /// Failures.
    pub failures: usize,
    /// Skipped, ignored and not-runnable tests.
    pub not_run: usize,
    /// Inconclusive tests.
    pub inconclusive: usize,
    /// Ignored tests.
    pub ignored: usize,
    /// Skipped and explicit tests.
    pub skipped: usize,
    /// Not-runnable tests.
    pub invalid: usize,
}

/// The overall result of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunVerdict {
    /// Every test that ran passed and nothing was skipped.
    Passed,

    /// At least one test failed, errored or was invalid.
    Failed,

    /// Nothing failed but some tests were skipped, ignored or explicit.
    Warning,
}

impl RunVerdict {
    /// The value written to the `result` attribute of a `test-run` element.
    pub fn result_attr(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Warning => "Skipped",
        }
    }
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Warning => "Warning",
        })
    }
}

/// Cumulative results of a run across all assemblies.
#[derive(Clone, Debug)]
pub struct ResultSummary {
    documents: Vec<XmlNode>,
    counts: SummaryCounts,
    invalid_assemblies: usize,
    invalid_test_fixtures: usize,
    unexpected_error: bool,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration: f64,
    created: DateTime<Utc>,
}

impl Default for ResultSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSummary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
            counts: SummaryCounts::default(),
            invalid_assemblies: 0,
            invalid_test_fixtures: 0,
            unexpected_error: false,
            start_time: None,
            end_time: None,
            duration: 0.0,
            created: Utc::now(),
        }
    }

    /// Adds the final `test-run` document of one assembly.
    pub fn add_result(&mut self, document: XmlNode) -> Result<(), InvalidResultDocument> {
        if document.name() != "test-run" {
            return Err(InvalidResultDocument::new(document.name()));
        }

        if let Some(start) = document.attr("start-time").and_then(try_parse_timestamp) {
            self.start_time = Some(self.start_time.map_or(start, |s| s.min(start)));
        }
        if let Some(end) = document.attr("end-time").and_then(try_parse_timestamp) {
            self.end_time = Some(self.end_time.map_or(end, |e| e.max(end)));
        }
        self.duration += document
            .attr("duration")
            .and_then(|duration| duration.parse::<f64>().ok())
            .unwrap_or(0.0);

        self.summarize(&document);
        self.documents.push(document);
        Ok(())
    }

    fn summarize(&mut self, node: &XmlNode) {
        for child in node.children() {
            match child.name() {
                "test-case" => self.counts.add_test_case(child),
                "test-suite" => {
                    self.check_suite(child);
                    self.summarize(child);
                }
                _ => self.summarize(child),
            }
        }
    }

    fn check_suite(&mut self, suite: &XmlNode) {
        if suite.attr("result") != Some("Failed") {
            return;
        }
        match (suite.attr("type"), suite.attr("label")) {
            (Some("Assembly"), Some("Invalid")) => self.invalid_assemblies += 1,
            (Some("Assembly"), Some("Error")) => {
                self.invalid_assemblies += 1;
                self.unexpected_error = true;
            }
            (Some("TestFixture" | "SetUpFixture"), Some("Invalid")) => {
                self.invalid_test_fixtures += 1
            }
            _ => {}
        }
    }

    /// Returns the counts accumulated so far.
    pub fn finalize(&self) -> SummaryCounts {
        self.counts
    }

    /// Number of leaf test cases.
    pub fn test_count(&self) -> usize {
        self.counts.test_count
    }

    /// Number of passed tests.
    pub fn pass_count(&self) -> usize {
        self.counts.pass_count
    }

    /// Failures, errors and invalid tests.
    pub fn failed_count(&self) -> usize {
        self.counts.failed_count()
    }

    /// Skipped, ignored and explicit tests.
    pub fn total_skip_count(&self) -> usize {
        self.counts.total_skip_count()
    }

    /// The overall verdict.
    pub fn verdict(&self) -> RunVerdict {
        self.counts.verdict()
    }

    /// Assemblies that could not be loaded or run.
    pub fn invalid_assemblies(&self) -> usize {
        self.invalid_assemblies
    }

    /// Fixtures that could not be run.
    pub fn invalid_test_fixtures(&self) -> usize {
        self.invalid_test_fixtures
    }

    /// True if an assembly failed with an unexpected error.
    pub fn unexpected_error(&self) -> bool {
        self.unexpected_error
    }

    /// The earliest start time of any document, or the time the summary was created.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(self.created)
    }

    /// The latest end time of any document, or the start time.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or_else(|| self.start_time())
    }

    /// Total duration in seconds, summed over documents.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The documents added so far.
    pub fn documents(&self) -> &[XmlNode] {
        &self.documents
    }

    /// Returns the process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        if self.unexpected_error {
            NUnitExitCode::UNEXPECTED_ERROR
        } else if self.invalid_assemblies > 0 {
            NUnitExitCode::INVALID_ASSEMBLY
        } else if self.invalid_test_fixtures > 0 {
            NUnitExitCode::INVALID_TEST_FIXTURE
        } else {
            NUnitExitCode::from_failed_count(self.failed_count())
        }
    }

    /// Combines every added document into a single `test-run` tree.
    pub fn test_results(&self) -> XmlNode {
        let counts = &self.counts;
        let mut run = XmlNode::new("test-run")
            .with_attr("id", "2")
            .with_attr("testcasecount", counts.test_count.to_string())
            .with_attr("result", counts.verdict().result_attr())
            .with_attr("total", counts.test_count.to_string())
            .with_attr("passed", counts.pass_count.to_string())
            .with_attr("failed", counts.failed_count().to_string())
            .with_attr("inconclusive", counts.inconclusive_count.to_string())
            .with_attr("skipped", counts.total_skip_count().to_string())
            .with_attr("asserts", counts.assert_count.to_string())
            .with_attr("start-time", format_time(self.start_time()))
            .with_attr("end-time", format_time(self.end_time()))
            .with_attr("duration", format!("{:.6}", self.duration));

        for document in &self.documents {
            for child in document.children() {
                run.push_child(child.clone());
            }
        }
        run
    }
}

/// Formats a timestamp as `yyyy-MM-dd HH:mm:ssZ`.
pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
        .replacen('T', " ", 1)
}
