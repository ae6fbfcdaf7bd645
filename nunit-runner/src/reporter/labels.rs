// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console output captured from tests, optionally preceded by test labels.
//!
//! A label is a `=> Namespace.Fixture.Test` line telling the reader which
//! test produced the output that follows.

use super::Styles;
use crate::{
    errors::{LabelModeParseError, WriteEventError},
    events::TestEventSubscriber,
    write_str::WriteStr,
    xml::XmlNode,
};
use owo_colors::OwoColorize;
use serde::Deserialize;
use std::str::FromStr;
use swrite::{SWrite, swrite, swriteln};

/// When to print test labels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// Never print labels, only output.
    Off,

    /// Print a label before output, if the output can be attributed to a test.
    #[default]
    On,

    /// Print a label when every test starts, and before suite output.
    All,

    /// Same as [`All`](Self::All).
    Before,
}

impl LabelMode {
    /// String representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &["off", "on", "all", "before"]
    }

    fn labels_at_start(self) -> bool {
        matches!(self, Self::All | Self::Before)
    }
}

impl FromStr for LabelMode {
    type Err = LabelModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = match s.to_ascii_lowercase().as_str() {
            "off" => LabelMode::Off,
            "on" => LabelMode::On,
            "all" => LabelMode::All,
            "before" => LabelMode::Before,
            _ => return Err(LabelModeParseError::new(s)),
        };
        Ok(val)
    }
}

/// Writes test output and labels to the console as records arrive.
pub struct LabelWriter<W> {
    mode: LabelMode,
    styles: Styles,
    current_label: Option<String>,
    writer: W,
}

impl<W: WriteStr> LabelWriter<W> {
    /// Creates a new label writer.
    pub fn new(mode: LabelMode, writer: W) -> Self {
        Self {
            mode,
            styles: Styles::default(),
            current_label: None,
            writer,
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) -> &mut Self {
        self.styles.colorize();
        self
    }

    /// Consumes the writer, returning the underlying output.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_label(&mut self, buf: &mut String, name: Option<&str>) {
        let Some(name) = name else { return };
        if self.current_label.as_deref() == Some(name) {
            return;
        }
        swriteln!(buf, "{}", format!("=> {name}").style(self.styles.label));
        self.current_label = Some(name.to_owned());
    }

    fn write_output(&self, buf: &mut String, text: &str, is_error: bool) {
        if is_error {
            swrite!(buf, "{}", text.style(self.styles.error_output));
        } else {
            buf.push_str(text);
        }
        if !text.ends_with('\n') {
            buf.push('\n');
        }
    }
}

impl<W: WriteStr> TestEventSubscriber for LabelWriter<W> {
    fn on_event(&mut self, event: &XmlNode) -> Result<(), WriteEventError> {
        let mut buf = String::new();
        match event.name() {
            "start-test" => {
                if self.mode.labels_at_start() {
                    self.write_label(&mut buf, event.attr("fullname"));
                }
            }
            "test-case" => {
                if let Some(output) = event.path_text("output") {
                    if self.mode == LabelMode::On {
                        self.write_label(&mut buf, event.attr("fullname"));
                    }
                    self.write_output(&mut buf, output, false);
                }
            }
            "test-suite" => {
                if let Some(output) = event.path_text("output") {
                    if self.mode != LabelMode::Off {
                        self.write_label(&mut buf, event.attr("fullname"));
                    }
                    self.write_output(&mut buf, output, false);
                }
            }
            "test-output" => {
                if self.mode == LabelMode::On {
                    self.write_label(&mut buf, event.attr("testname"));
                }
                let is_error = event.attr("stream") == Some("Error");
                self.write_output(&mut buf, event.text(), is_error);
            }
            _ => {}
        }

        if buf.is_empty() {
            return Ok(());
        }
        self.writer.write_str(&buf).map_err(WriteEventError::Io)?;
        self.writer.write_str_flush().map_err(WriteEventError::Io)
    }
}
