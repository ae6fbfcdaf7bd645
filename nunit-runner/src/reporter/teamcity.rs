// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TeamCity service message output.
//!
//! TeamCity reads `##teamcity[...]` lines from a build's standard output.
//! Tests that run in parallel are told apart by a `flowId` attribute, and
//! nested flows are announced with `flowStarted`/`flowFinished`.
//!
//! NUnit engines link records to their parents in one of two ways:
//!
//! * Newer engines put a `parentId` attribute on every record. An empty
//!   `parentId` marks a root suite. The flow of a record is the root of its
//!   parent chain.
//! * Older engines omit `parentId` and encode the assembly in the id itself
//!   (`<assembly>-<test>`). Several suites can share one flow, so an open
//!   counter decides when the flow really starts and finishes.
//!
//! Both can appear in one run, so the scheme is chosen per record.

use crate::{
    errors::WriteEventError, events::TestEventSubscriber, helpers::file_name,
    write_str::WriteStr, xml::XmlNode,
};
use std::{collections::HashMap, fmt};
use tracing::debug;

/// How a record is linked to its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NestingScheme {
    /// The record carries a `parentId` attribute, possibly empty.
    ParentLinked,

    /// The record has no `parentId`; the flow is derived from the id.
    IdDerived,
}

/// The flow ids computed for one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowIds {
    /// The scheme the record uses.
    pub scheme: NestingScheme,

    /// The flow the record belongs to.
    pub flow_id: String,

    /// The flow test messages for this record are tagged with. Differs from
    /// `flow_id` when the record opens a flow of its own.
    pub test_flow_id: String,
}

impl FlowIds {
    /// Returns true if the record opens and closes its own child flow.
    pub fn is_flow_boundary(&self) -> bool {
        self.scheme == NestingScheme::ParentLinked && self.test_flow_id != self.flow_id
    }
}

/// Computes the flow ids of a record from its id, its `parentId` attribute
/// and the parent links recorded so far.
pub fn resolve_flow(
    parent_of: &HashMap<String, String>,
    id: &str,
    parent_id: Option<&str>,
) -> FlowIds {
    match parent_id {
        Some(parent_id) => {
            let root = find_root(parent_of, parent_id);
            let flow_id = if root.is_empty() { id } else { root };
            FlowIds {
                scheme: NestingScheme::ParentLinked,
                flow_id: flow_id.to_owned(),
                test_flow_id: id.to_owned(),
            }
        }
        None => {
            let mut parts = id.split('-');
            let flow_id = match (parts.next(), parts.next(), parts.next()) {
                (Some(assembly), Some(_), None) => assembly,
                _ => id,
            };
            FlowIds {
                scheme: NestingScheme::IdDerived,
                flow_id: flow_id.to_owned(),
                test_flow_id: flow_id.to_owned(),
            }
        }
    }
}

// Follows parent links until an id without a recorded parent. The walk is
// bounded by the number of links so a cycle cannot hang the run.
fn find_root<'a>(parent_of: &'a HashMap<String, String>, start: &'a str) -> &'a str {
    let mut id = start;
    for _ in 0..=parent_of.len() {
        match parent_of.get(id) {
            Some(parent) if !parent.is_empty() && parent != id => id = parent.as_str(),
            _ => break,
        }
    }
    id
}

/// Per-run state for turning engine records into service messages.
#[derive(Debug, Default)]
pub struct FlowTracker {
    parent_of: HashMap<String, String>,
    open_blocks: HashMap<String, isize>,
}

impl FlowTracker {
    /// Creates a tracker with no open suites or tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of suites and tests currently open.
    pub fn open_count(&self) -> usize {
        self.parent_of.len()
    }

    /// Handles one record, returning the service messages it produces.
    pub fn handle(&mut self, event: &XmlNode) -> Vec<ServiceMessage> {
        let message_name = event.name().to_ascii_lowercase();
        if message_name == "start-run" {
            self.parent_of.clear();
            self.open_blocks.clear();
            return Vec::new();
        }

        let full_name = match event.attr("fullname") {
            Some(full_name) if !full_name.is_empty() => full_name,
            _ => {
                debug!("ignoring <{message_name}> record without a fullname");
                return Vec::new();
            }
        };
        let id = event.attr("id").unwrap_or_default();
        let parent_id = event.attr("parentId");
        let flow = resolve_flow(&self.parent_of, id, parent_id);

        let mut out = Vec::new();
        match message_name.as_str() {
            "start-suite" => {
                self.parent_of
                    .insert(id.to_owned(), parent_id.unwrap_or_default().to_owned());
                let is_root = match parent_id {
                    Some(parent_id) => parent_id.is_empty(),
                    None => self.open_block(&flow.flow_id),
                };
                if is_root {
                    out.push(ServiceMessage::suite_started(full_name, &flow.flow_id));
                }
            }
            "test-suite" => {
                self.parent_of.remove(id);
                let is_root = match parent_id {
                    Some(parent_id) => parent_id.is_empty(),
                    None => self.close_block(&flow.flow_id),
                };
                if is_root {
                    out.push(ServiceMessage::suite_finished(full_name, &flow.flow_id));
                }
            }
            "start-test" => {
                self.parent_of
                    .insert(id.to_owned(), parent_id.unwrap_or_default().to_owned());
                start_test(&flow, full_name, &mut out);
            }
            "test-case" => {
                if self.parent_of.remove(id).is_none() {
                    start_test(&flow, full_name, &mut out);
                }
                finish_test(event, &flow, full_name, &mut out);
                if flow.is_flow_boundary() {
                    out.push(ServiceMessage::flow_finished(&flow.test_flow_id));
                }
            }
            _ => {}
        }
        out
    }

    // Returns true when the flow goes from no open blocks to one.
    fn open_block(&mut self, flow_id: &str) -> bool {
        self.change_blocks(flow_id, 1) == 1
    }

    // Returns true when the last open block of the flow closes.
    fn close_block(&mut self, flow_id: &str) -> bool {
        self.change_blocks(flow_id, -1) == 0
    }

    // Unmatched closes leave the count negative, so a later open on the same
    // flow only balances it.
    fn change_blocks(&mut self, flow_id: &str, delta: isize) -> isize {
        let count = self.open_blocks.entry(flow_id.to_owned()).or_default();
        *count += delta;
        let count = *count;
        if count == 0 {
            self.open_blocks.remove(flow_id);
        }
        count
    }
}

fn start_test(flow: &FlowIds, full_name: &str, out: &mut Vec<ServiceMessage>) {
    if flow.is_flow_boundary() {
        out.push(ServiceMessage::flow_started(
            &flow.test_flow_id,
            &flow.flow_id,
        ));
    }
    out.push(ServiceMessage::test_started(full_name, &flow.test_flow_id));
}

fn finish_test(event: &XmlNode, flow: &FlowIds, full_name: &str, out: &mut Vec<ServiceMessage>) {
    let flow_id = flow.test_flow_id.as_str();
    let Some(result) = event.attr("result").filter(|result| !result.is_empty()) else {
        return;
    };

    match result.to_ascii_lowercase().as_str() {
        "passed" => test_finished(event, flow_id, full_name, out),
        "inconclusive" => {
            push_output(event, flow_id, full_name, out);
            out.push(ServiceMessage::test_ignored(full_name, "Inconclusive", flow_id));
        }
        "skipped" => {
            push_output(event, flow_id, full_name, out);
            let reason = event.path_text("reason/message").unwrap_or_default();
            out.push(ServiceMessage::test_ignored(full_name, reason, flow_id));
        }
        "failed" => {
            out.push(ServiceMessage::test_failed(
                full_name,
                event.path_text("failure/message").unwrap_or_default(),
                event.path_text("failure/stack-trace").unwrap_or_default(),
                flow_id,
            ));
            test_finished(event, flow_id, full_name, out);
        }
        _ => {}
    }
}

fn test_finished(event: &XmlNode, flow_id: &str, full_name: &str, out: &mut Vec<ServiceMessage>) {
    push_output(event, flow_id, full_name, out);
    if let Some(reason) = event
        .path_text("reason/message")
        .filter(|reason| !reason.is_empty())
    {
        out.push(ServiceMessage::test_std_out(
            full_name,
            &format!("Assert.Pass message: {reason}"),
            flow_id,
        ));
    }
    out.push(ServiceMessage::test_finished(
        full_name,
        duration_millis(event.attr("duration")),
        flow_id,
    ));
}

fn push_output(event: &XmlNode, flow_id: &str, full_name: &str, out: &mut Vec<ServiceMessage>) {
    if let Some(output) = event.path_text("output").filter(|output| !output.is_empty()) {
        out.push(ServiceMessage::test_std_out(full_name, output, flow_id));
    }
}

// Whole milliseconds, truncated. Unparseable durations report 0.
fn duration_millis(duration: Option<&str>) -> i64 {
    duration
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as i64)
        .unwrap_or(0)
}

/// A single `##teamcity[...]` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceMessage {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
}

impl ServiceMessage {
    fn new(name: &'static str, attributes: &[(&'static str, &str)]) -> Self {
        Self {
            name,
            attributes: attributes
                .iter()
                .map(|(key, value)| (*key, (*value).to_owned()))
                .collect(),
        }
    }

    /// Returns the message name, e.g. `testStarted`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the unescaped value of an attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn suite_started(full_name: &str, flow_id: &str) -> Self {
        Self::new(
            "testSuiteStarted",
            &[("name", file_name(full_name)), ("flowId", flow_id)],
        )
    }

    fn suite_finished(full_name: &str, flow_id: &str) -> Self {
        Self::new(
            "testSuiteFinished",
            &[("name", file_name(full_name)), ("flowId", flow_id)],
        )
    }

    fn flow_started(flow_id: &str, parent: &str) -> Self {
        Self::new("flowStarted", &[("flowId", flow_id), ("parent", parent)])
    }

    fn flow_finished(flow_id: &str) -> Self {
        Self::new("flowFinished", &[("flowId", flow_id)])
    }

    fn test_started(full_name: &str, flow_id: &str) -> Self {
        Self::new(
            "testStarted",
            &[
                ("name", full_name),
                ("captureStandardOutput", "false"),
                ("flowId", flow_id),
            ],
        )
    }

    fn test_finished(full_name: &str, duration_ms: i64, flow_id: &str) -> Self {
        Self::new(
            "testFinished",
            &[
                ("name", full_name),
                ("duration", &duration_ms.to_string()),
                ("flowId", flow_id),
            ],
        )
    }

    fn test_failed(full_name: &str, message: &str, details: &str, flow_id: &str) -> Self {
        Self::new(
            "testFailed",
            &[
                ("name", full_name),
                ("message", message),
                ("details", details),
                ("flowId", flow_id),
            ],
        )
    }

    fn test_ignored(full_name: &str, message: &str, flow_id: &str) -> Self {
        Self::new(
            "testIgnored",
            &[("name", full_name), ("message", message), ("flowId", flow_id)],
        )
    }

    fn test_std_out(full_name: &str, out: &str, flow_id: &str) -> Self {
        Self::new(
            "testStdOut",
            &[
                ("name", full_name),
                ("out", out),
                ("flowId", flow_id),
                ("tc:tags", "tc:parseServiceMessagesInside"),
            ],
        )
    }
}

impl fmt::Display for ServiceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "##teamcity[{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(f, " {key}='{}'", Escaped(value))?;
        }
        f.write_str("]")
    }
}

/// Escapes a value for a service message attribute.
///
/// Every escape sequence starts with `|` and no replacement produces a
/// character that a later replacement would match, so a single pass gives
/// the same result as replacing `|` first, then `'`, newline, carriage
/// return, U+0086, U+2028, U+2029, `[` and finally `]`.
struct Escaped<'s>(&'s str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        let mut start = 0;

        for (i, c) in s.char_indices() {
            let escaped = match c {
                '|' => "||",
                '\'' => "|'",
                '\n' => "|n",
                '\r' => "|r",
                '\u{0086}' => "|x",
                '\u{2028}' => "|l",
                '\u{2029}' => "|p",
                '[' => "|[",
                ']' => "|]",
                _ => continue,
            };

            if start < i {
                f.write_str(&s[start..i])?;
            }
            f.write_str(escaped)?;
            start = i + c.len_utf8();
        }

        if start != s.len() {
            f.write_str(&s[start..])?;
        }
        Ok(())
    }
}

/// Writes TeamCity service messages for every record it receives.
pub struct TeamCityReporter<W> {
    tracker: FlowTracker,
    writer: W,
}

impl<W: WriteStr> TeamCityReporter<W> {
    /// Creates a reporter writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            tracker: FlowTracker::new(),
            writer,
        }
    }

    /// Consumes the reporter, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: WriteStr> TestEventSubscriber for TeamCityReporter<W> {
    fn on_event(&mut self, event: &XmlNode) -> Result<(), WriteEventError> {
        let messages = self.tracker.handle(event);
        if messages.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for message in messages {
            buf.push_str(&message.to_string());
            buf.push('\n');
        }
        self.writer.write_str(&buf).map_err(WriteEventError::Io)?;
        self.writer.write_str_flush().map_err(WriteEventError::Io)
    }
}
