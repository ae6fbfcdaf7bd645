// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use owo_colors::Style;

/// Styles used by console output.
///
/// The default value has every style empty, which produces plain text.
#[derive(Debug, Default, Clone)]
pub struct Styles {
    pub(crate) is_colorized: bool,
    pub(crate) heading: Style,
    pub(crate) count: Style,
    pub(crate) pass: Style,
    pub(crate) fail: Style,
    pub(crate) warning: Style,
    pub(crate) label: Style,
    pub(crate) error_output: Style,
}

impl Styles {
    /// Returns styles for a terminal that supports color.
    pub fn colorized() -> Self {
        let mut styles = Self::default();
        styles.colorize();
        styles
    }

    pub(crate) fn colorize(&mut self) {
        self.is_colorized = true;
        self.heading = Style::new().bold();
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.warning = Style::new().yellow().bold();
        self.label = Style::new().cyan();
        self.error_output = Style::new().red();
    }

    /// Returns true if these styles emit color codes.
    pub fn is_colorized(&self) -> bool {
        self.is_colorized
    }
}
