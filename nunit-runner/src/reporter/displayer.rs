// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-of-run console report.

use super::{
    Styles,
    legacy::EnvironmentInfo,
    summary::{ResultSummary, RunVerdict, format_time},
};
use crate::{
    errors::WriteEventError, helpers::trim_line_endings, runner::TestFilter,
    write_str::WriteStr, xml::XmlNode,
};
use camino::Utf8PathBuf;
use owo_colors::{OwoColorize, Style};
use swrite::{SWrite, swrite, swriteln};

/// Renders a [`ResultSummary`] as a human-readable report.
///
/// The report has up to four sections:
///
/// * tests that were not run, if any were skipped,
/// * errors and failures, if the run failed,
/// * run settings, if the engine reported any,
/// * the run summary.
pub struct ResultReporter<'a> {
    summary: &'a ResultSummary,
    results: XmlNode,
    styles: Styles,
    stop_on_error: bool,
}

impl<'a> ResultReporter<'a> {
    /// Creates a reporter for `summary`.
    pub fn new(summary: &'a ResultSummary) -> Self {
        Self {
            summary,
            results: summary.test_results(),
            styles: Styles::default(),
            stop_on_error: false,
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) -> &mut Self {
        self.styles.colorize();
        self
    }

    /// Notes that the run was asked to stop after the first error.
    pub fn set_stop_on_error(&mut self, stop_on_error: bool) -> &mut Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// The combined result tree the report is based on.
    pub fn test_results(&self) -> &XmlNode {
        &self.results
    }

    /// Writes the report.
    pub fn write_report(&self, mut writer: impl WriteStr) -> Result<(), WriteEventError> {
        let mut buf = String::new();
        self.render(&mut buf);
        writer.write_str(&buf).map_err(WriteEventError::Io)?;
        writer.write_str_flush().map_err(WriteEventError::Io)
    }

    fn render(&self, buf: &mut String) {
        let counts = self.summary.finalize();
        buf.push('\n');

        if counts.total_skip_count() > 0 {
            self.write_not_run_report(buf);
        }
        if counts.verdict() == RunVerdict::Failed {
            self.write_errors_and_failures_report(buf);
        }
        self.write_run_settings_report(buf);
        self.write_summary_report(buf);
    }

    fn write_not_run_report(&self, buf: &mut String) {
        swriteln!(buf, "{}\n", "Tests Not Run".style(self.styles.heading));
        let mut index = 0;
        self.write_not_run_results(&self.results, &mut index, buf);
    }

    fn write_not_run_results(&self, node: &XmlNode, index: &mut usize, buf: &mut String) {
        match node.name() {
            "test-case" => {
                if node.attr("result") == Some("Skipped") {
                    let style = if node.attr("label") == Some("Ignored") {
                        self.styles.warning
                    } else {
                        Style::new()
                    };
                    self.write_single_result(node, style, index, buf);
                }
            }
            "test-suite" | "test-run" => {
                for child in node.children() {
                    self.write_not_run_results(child, index, buf);
                }
            }
            _ => {}
        }
    }

    fn write_errors_and_failures_report(&self, buf: &mut String) {
        swriteln!(buf, "{}\n", "Errors and Failures".style(self.styles.heading));
        let mut index = 0;
        self.write_errors_and_failures(&self.results, &mut index, buf);

        if self.stop_on_error {
            swriteln!(
                buf,
                "{}\n",
                "Execution terminated after first error".style(self.styles.fail)
            );
        }
    }

    fn write_errors_and_failures(&self, node: &XmlNode, index: &mut usize, buf: &mut String) {
        let failed = node.attr("result") == Some("Failed");
        match node.name() {
            "test-case" => {
                if failed {
                    self.write_single_result(node, self.styles.fail, index, buf);
                }
            }
            "test-run" => {
                for child in node.children() {
                    self.write_errors_and_failures(child, index, buf);
                }
            }
            "test-suite" => {
                if failed {
                    if node.attr("type") == Some("Theory") {
                        self.write_single_result(node, self.styles.fail, index, buf);
                    } else {
                        let site = node.attr("site");
                        if !matches!(site, Some("Parent" | "Child")) {
                            self.write_single_result(node, self.styles.fail, index, buf);
                        }
                        if site == Some("SetUp") {
                            return;
                        }
                    }
                }
                for child in node.children() {
                    self.write_errors_and_failures(child, index, buf);
                }
            }
            _ => {}
        }
    }

    fn write_run_settings_report(&self, buf: &mut String) {
        let Some(settings) = self
            .results
            .child("test-suite")
            .and_then(|suite| suite.child("settings"))
        else {
            return;
        };

        let mut settings = settings.children_named("setting").peekable();
        if settings.peek().is_none() {
            return;
        }

        swriteln!(buf, "{}", "Run Settings".style(self.styles.heading));
        for setting in settings {
            let name = setting.attr("name").unwrap_or_default();
            let value = setting.attr("value").unwrap_or_default();
            swriteln!(buf, "    {name}: {}", value.style(self.styles.count));
        }
        buf.push('\n');
    }

    fn write_summary_report(&self, buf: &mut String) {
        let counts = self.summary.finalize();
        let verdict = counts.verdict();
        let overall_style = match verdict {
            RunVerdict::Passed => self.styles.pass,
            RunVerdict::Failed => self.styles.fail,
            RunVerdict::Warning => self.styles.warning,
        };

        swriteln!(buf, "{}", "Test Run Summary".style(self.styles.heading));
        swriteln!(buf, "  Overall result: {}", verdict.style(overall_style));

        swrite!(buf, "  Test Count: {}", counts.test_count.style(self.styles.count));
        swrite!(buf, ", Passed: {}", counts.pass_count.style(self.styles.count));
        self.write_count(buf, ", Failed: ", counts.failed_count(), self.styles.fail);
        swrite!(
            buf,
            ", Inconclusive: {}",
            counts.inconclusive_count.style(self.styles.count)
        );
        swriteln!(
            buf,
            ", Skipped: {}",
            counts.total_skip_count().style(self.styles.count)
        );

        if counts.failed_count() > 0 {
            swrite!(
                buf,
                "    Failed Tests - Failures: {}",
                counts.failure_count.style(self.styles.count)
            );
            self.write_count(buf, ", Errors: ", counts.error_count, self.styles.fail);
            swriteln!(buf, ", Invalid: {}", counts.invalid_count.style(self.styles.count));
        }
        if counts.total_skip_count() > 0 {
            swrite!(
                buf,
                "    Skipped Tests - Ignored: {}",
                counts.ignore_count.style(self.styles.count)
            );
            swrite!(buf, ", Explicit: {}", counts.explicit_count.style(self.styles.count));
            swriteln!(buf, ", Other: {}", counts.skip_count.style(self.styles.count));
        }

        swriteln!(buf, "  Start time: {}", format_time(self.summary.start_time()));
        swriteln!(buf, "    End time: {}", format_time(self.summary.end_time()));
        swriteln!(buf, "    Duration: {:.3} seconds", self.summary.duration());
        buf.push('\n');
    }

    fn write_count(&self, buf: &mut String, label: &str, count: usize, style: Style) {
        let style = if count > 0 { style } else { self.styles.count };
        swrite!(buf, "{label}{}", count.style(style));
    }

    fn write_single_result(&self, node: &XmlNode, style: Style, index: &mut usize, buf: &mut String) {
        let mut status = node
            .attr("label")
            .or_else(|| node.attr("result"))
            .unwrap_or_default()
            .to_owned();
        if matches!(status.as_str(), "Failed" | "Error")
            && let Some(site @ ("SetUp" | "TearDown")) = node.attr("site")
        {
            status = format!("{site} {status}");
        }

        *index += 1;
        let full_name = node.attr("fullname").unwrap_or_default();
        swriteln!(
            buf,
            "{}",
            format!("{index}) {status} : {full_name}").style(style)
        );

        for path in ["failure/message", "failure/stack-trace", "reason/message"] {
            if let Some(text) = node.path_text(path) {
                swriteln!(buf, "{}", trim_line_endings(text).style(style));
            }
        }
        buf.push('\n');
    }
}

/// Describes a run before it starts: where it runs, what it runs, and which
/// tests are selected.
pub struct RunDescription<'a> {
    environment: &'a EnvironmentInfo,
    inputs: &'a [Utf8PathBuf],
    filter: &'a TestFilter,
    styles: Styles,
}

impl<'a> RunDescription<'a> {
    /// Creates a description of a run over `inputs`.
    pub fn new(
        environment: &'a EnvironmentInfo,
        inputs: &'a [Utf8PathBuf],
        filter: &'a TestFilter,
    ) -> Self {
        Self {
            environment,
            inputs,
            filter,
            styles: Styles::default(),
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) -> &mut Self {
        self.styles.colorize();
        self
    }

    /// Writes the description.
    pub fn write(&self, mut writer: impl WriteStr) -> Result<(), WriteEventError> {
        let mut buf = String::new();

        swriteln!(buf, "{}", "Runtime Environment".style(self.styles.heading));
        swriteln!(
            buf,
            "    OS Platform: {}",
            self.environment.os_version.style(self.styles.count)
        );
        swriteln!(
            buf,
            "       Platform: {}",
            self.environment.platform.style(self.styles.count)
        );
        buf.push('\n');

        swriteln!(buf, "{}", "Test Files".style(self.styles.heading));
        for input in self.inputs {
            swriteln!(buf, "    {input}");
        }
        buf.push('\n');

        if !self.filter.is_empty() {
            swriteln!(buf, "{}", "Test Filters".style(self.styles.heading));
            for test in self.filter.tests() {
                swriteln!(buf, "    Test: {}", test.style(self.styles.count));
            }
            if let Some(where_clause) = self.filter.where_clause() {
                swriteln!(buf, "    Where: {}", where_clause.style(self.styles.count));
            }
            buf.push('\n');
        }

        writer.write_str(&buf).map_err(WriteEventError::Io)?;
        writer.write_str_flush().map_err(WriteEventError::Io)
    }
}
