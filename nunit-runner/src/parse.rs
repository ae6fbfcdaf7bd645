// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Converts engine records into [`Test`] and [`TestResult`] values.

use crate::{
    helpers::computer_name,
    model::{ParsedEvent, Test, TestResult},
    navigation::{NavigationData, NoNavigationData},
    xml::XmlNode,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use nunit_metadata::protocol::TestOutcome;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, sync::Arc, sync::LazyLock, time::Duration};
use uuid::Uuid;

/// Durations below this are reported as this, since some consumers cannot
/// represent a zero duration.
pub const MIN_DURATION: Duration = Duration::from_millis(1);

// A line consisting only of an optional run of dashes and a caret, which NUnit
// uses to point at the first mismatching character of a string comparison.
static CARET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*-*\^[ \t]*(\r?\n|$)").expect("caret regex is valid")
});

/// Parses engine records for a single assembly.
#[derive(Clone)]
pub struct EventParser {
    assembly: String,
    navigation: Arc<dyn NavigationData>,
    design_time: bool,
    computer_name: String,
}

impl std::fmt::Debug for EventParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventParser")
            .field("assembly", &self.assembly)
            .field("design_time", &self.design_time)
            .field("computer_name", &self.computer_name)
            .finish_non_exhaustive()
    }
}

impl EventParser {
    /// Creates a parser for records produced while running `assembly`.
    pub fn new(assembly: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            navigation: Arc::new(NoNavigationData),
            design_time: false,
            computer_name: computer_name(),
        }
    }

    /// Sets the source of file and line information.
    pub fn with_navigation(mut self, navigation: Arc<dyn NavigationData>) -> Self {
        self.navigation = navigation;
        self
    }

    /// In design-time mode, caret pointer lines are stripped from error messages.
    pub fn with_design_time(mut self, design_time: bool) -> Self {
        self.design_time = design_time;
        self
    }

    /// Overrides the machine name reported with results.
    pub fn with_computer_name(mut self, computer_name: impl Into<String>) -> Self {
        self.computer_name = computer_name.into();
        self
    }

    /// Returns the assembly path this parser was created for.
    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    /// Returns true if the parser runs on behalf of an IDE.
    pub fn is_design_time(&self) -> bool {
        self.design_time
    }

    /// Parses a `start-test` record into a test, or a `test-case` record into
    /// a result. Any other record yields `None`.
    pub fn parse(&self, node: &XmlNode) -> Option<ParsedEvent> {
        match node.name() {
            "start-test" => Some(ParsedEvent::Test(self.parse_test(node))),
            "test-case" => Some(ParsedEvent::Result(self.parse_result(node))),
            _ => None,
        }
    }

    /// Parses the test described by a `start-test` or `test-case` element.
    pub fn parse_test(&self, node: &XmlNode) -> Test {
        let fullname = node.attr("fullname").unwrap_or_default();
        let location = match (node.attr("classname"), node.attr("methodname")) {
            (Some(class_name), Some(method_name)) => {
                self.navigation.location(class_name, method_name)
            }
            _ => None,
        };

        let mut properties = BTreeMap::new();
        if let Some(props) = node.child("properties") {
            for property in props.children_named("property") {
                if let Some(name) = property.attr("name") {
                    properties.insert(
                        name.to_owned(),
                        property.attr("value").unwrap_or_default().to_owned(),
                    );
                }
            }
        }

        let (code_file_path, line_number) = match location {
            Some(location) => (Some(location.file), location.line),
            None => (None, None),
        };

        Test {
            id: test_signature(
                node.attr("id").unwrap_or_default(),
                &self.assembly,
                fullname,
            ),
            fully_qualified_name: fullname.to_owned(),
            display_name: node.attr("name").unwrap_or_default().to_owned(),
            code_file_path,
            line_number,
            properties,
        }
    }

    /// Parses a `test-case` element into a result.
    pub fn parse_result(&self, node: &XmlNode) -> TestResult {
        let test = self.parse_test(node);
        let error_message = node
            .path_text("failure/message")
            .or_else(|| node.path_text("reason/message"))
            .map(|message| {
                if self.design_time {
                    strip_caret_lines(message)
                } else {
                    message.to_owned()
                }
            });
        let messages = node
            .path_text("output")
            .map(|output| vec![output.to_owned()])
            .unwrap_or_default();

        TestResult {
            display_name: test.display_name.clone(),
            test,
            outcome: parse_outcome(node.attr("result")),
            error_message,
            error_stack_trace: node.path_text("failure/stack-trace").map(str::to_owned),
            messages,
            computer_name: self.computer_name.clone(),
            duration: parse_duration(node.attr("duration")),
            start_time: parse_timestamp(node.attr("start-time")),
            end_time: parse_timestamp(node.attr("end-time")),
        }
    }
}

/// Computes the identity of a test.
///
/// Engine ids are only unique within one assembly, and a parameterized test
/// can keep its id while its name changes, so the assembly path and the
/// fully-qualified name are hashed in too.
pub fn test_signature(id: &str, assembly: &str, fullname: &str) -> Uuid {
    let hash = Sha256::digest(format!("{id}|{assembly}|{fullname}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    Uuid::from_bytes(bytes)
}

/// Parses a duration in seconds, clamping to [`MIN_DURATION`].
pub fn parse_duration(input: Option<&str>) -> Duration {
    let secs = input
        .and_then(|input| input.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite())
        .unwrap_or(0.0);
    Duration::try_from_secs_f64(secs.max(MIN_DURATION.as_secs_f64())).unwrap_or(MIN_DURATION)
}

/// Maps an NUnit result string to an outcome.
///
/// Matching is case-sensitive and by prefix, so `Failed:Error` is a failure.
pub fn parse_outcome(input: Option<&str>) -> TestOutcome {
    let Some(input) = input else {
        return TestOutcome::None;
    };
    if input.starts_with("Passed") {
        TestOutcome::Passed
    } else if input.starts_with("Failed") {
        TestOutcome::Failed
    } else if input.starts_with("Skipped") || input.starts_with("Inconclusive") {
        TestOutcome::Skipped
    } else {
        TestOutcome::None
    }
}

/// Parses an NUnit timestamp such as `2016-06-06 19:57:35Z` or
/// `2016-06-06 19:57:35.123Z`. RFC 3339 is accepted too. Anything else,
/// including an absent value, yields the current time.
pub fn parse_timestamp(input: Option<&str>) -> DateTime<Utc> {
    input.and_then(try_parse_timestamp).unwrap_or_else(Utc::now)
}

pub(crate) fn try_parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    let naive = input.strip_suffix('Z').unwrap_or(input);
    if let Ok(time) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(time.and_utc());
    }
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Removes caret pointer lines from an assertion message.
pub fn strip_caret_lines(message: &str) -> String {
    CARET_LINE.replace_all(message, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::SourceLocation;
    use chrono::TimeZone;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use test_strategy::proptest;

    #[test_case(Some("0.0001"), 0.001; "below minimum")]
    #[test_case(Some(""), 0.001; "empty")]
    #[test_case(None, 0.001; "absent")]
    #[test_case(Some("0.017533"), 0.017533; "fractional")]
    #[test_case(Some("12.5"), 12.5; "seconds")]
    #[test_case(Some("-3"), 0.001; "negative")]
    #[test_case(Some("NaN"), 0.001; "not a number")]
    #[test_case(Some("abc"), 0.001; "garbage")]
    fn duration_parsing(input: Option<&str>, expected: f64) {
        let actual = parse_duration(input).as_secs_f64();
        assert!(
            (actual - expected).abs() < 0.000_001,
            "for {input:?}: expected {expected}, got {actual}"
        );
    }

    #[test_case(Some("Passed"), TestOutcome::Passed; "passed")]
    #[test_case(Some("Failed"), TestOutcome::Failed; "failed")]
    #[test_case(Some("Failed:Error"), TestOutcome::Failed; "failed prefix")]
    #[test_case(Some("Skipped"), TestOutcome::Skipped; "skipped")]
    #[test_case(Some("Inconclusive"), TestOutcome::Skipped; "inconclusive")]
    #[test_case(Some("passed"), TestOutcome::None; "case sensitive")]
    #[test_case(Some(""), TestOutcome::None; "empty")]
    #[test_case(None, TestOutcome::None; "absent")]
    fn outcome_parsing(input: Option<&str>, expected: TestOutcome) {
        assert_eq!(parse_outcome(input), expected);
    }

    #[test]
    fn timestamps() {
        let expected = Utc.with_ymd_and_hms(2016, 6, 6, 19, 57, 35).unwrap();
        assert_eq!(try_parse_timestamp("2016-06-06 19:57:35Z"), Some(expected));
        assert_eq!(try_parse_timestamp("2016-06-06T19:57:35Z"), Some(expected));
        assert_eq!(
            try_parse_timestamp("2016-06-06 19:57:35.250Z").map(|t| t.timestamp_millis()),
            Some(expected.timestamp_millis() + 250)
        );
        assert_eq!(try_parse_timestamp("yesterday"), None);

        let before = Utc::now();
        assert!(parse_timestamp(None) >= before);
    }

    #[test]
    fn signature_uses_all_parts() {
        let base = test_signature("0-1001", "/tmp/a.dll", "Ns.Fixture.Test");
        assert_eq!(base, test_signature("0-1001", "/tmp/a.dll", "Ns.Fixture.Test"));
        assert_ne!(base, test_signature("0-1002", "/tmp/a.dll", "Ns.Fixture.Test"));
        assert_ne!(base, test_signature("0-1001", "/tmp/b.dll", "Ns.Fixture.Test"));
        assert_ne!(base, test_signature("0-1001", "/tmp/a.dll", "Ns.Fixture.Test(1)"));
    }

    #[proptest]
    fn signature_is_deterministic(id: String, assembly: String, fullname: String) {
        assert_eq!(
            test_signature(&id, &assembly, &fullname),
            test_signature(&id, &assembly, &fullname)
        );
    }

    #[proptest]
    fn duration_is_never_below_minimum(input: String) {
        assert!(parse_duration(Some(&input)) >= MIN_DURATION);
    }

    #[test]
    fn strip_carets() {
        let message = indoc! {"
            Expected string length 5 but was 4. Strings differ at index 3.
              Expected: \"abcde\"
              But was:  \"abcd\"
              --------------^
        "};
        assert_eq!(
            strip_caret_lines(message),
            indoc! {"
                Expected string length 5 but was 4. Strings differ at index 3.
                  Expected: \"abcde\"
                  But was:  \"abcd\"
            "}
        );
        assert_eq!(strip_caret_lines("a ^ b"), "a ^ b");
    }

    struct FixedNavigation;

    impl NavigationData for FixedNavigation {
        fn location(&self, class_name: &str, method_name: &str) -> Option<SourceLocation> {
            (class_name == "Ns.Fixture" && method_name == "Fails").then(|| SourceLocation {
                file: "Fixture.cs".to_owned(),
                line: Some(42),
            })
        }
    }

    fn failing_record() -> XmlNode {
        XmlNode::parse(indoc! {r#"
            <test-case id="0-1002" name="Fails" fullname="Ns.Fixture.Fails" classname="Ns.Fixture" methodname="Fails" result="Failed" start-time="2016-06-06 19:57:35Z" end-time="2016-06-06 19:57:36Z" duration="0.017533">
              <properties>
                <property name="Category" value="Slow" />
                <property name="Category" value="Fast" />
              </properties>
              <failure>
                <message><![CDATA[Expected: 3
              But was:  2
              -----------^
            ]]></message>
                <stack-trace><![CDATA[at Ns.Fixture.Fails()]]></stack-trace>
              </failure>
              <output><![CDATA[hello
            ]]></output>
            </test-case>
        "#})
        .unwrap()
    }

    #[test]
    fn parse_result_record() {
        let parser = EventParser::new("/tmp/Project.Tests.dll")
            .with_navigation(Arc::new(FixedNavigation))
            .with_computer_name("build-agent");
        let record = failing_record();
        let Some(ParsedEvent::Result(result)) = parser.parse(&record) else {
            panic!("expected a result");
        };

        assert_eq!(
            result.test.id,
            test_signature("0-1002", "/tmp/Project.Tests.dll", "Ns.Fixture.Fails")
        );
        assert_eq!(result.test.display_name, "Fails");
        assert_eq!(result.display_name, "Fails");
        assert_eq!(result.test.code_file_path.as_deref(), Some("Fixture.cs"));
        assert_eq!(result.test.line_number, Some(42));
        assert_eq!(result.test.properties["Category"], "Fast", "last write wins");
        assert_eq!(result.outcome, TestOutcome::Failed);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Expected: 3\n  But was:  2\n  -----------^\n")
        );
        assert_eq!(
            result.error_stack_trace.as_deref(),
            Some("at Ns.Fixture.Fails()")
        );
        assert_eq!(result.messages, vec!["hello\n".to_owned()]);
        assert_eq!(result.computer_name, "build-agent");
        assert_eq!(result.duration, Duration::from_micros(17_533));
        assert_eq!(
            result.end_time - result.start_time,
            chrono::TimeDelta::seconds(1)
        );
    }

    #[test]
    fn design_time_strips_carets() {
        let parser = EventParser::new("a.dll").with_design_time(true);
        let result = parser.parse_result(&failing_record());
        assert_eq!(
            result.error_message.as_deref(),
            Some("Expected: 3\n  But was:  2\n")
        );
    }

    #[test]
    fn reason_message_fallback() {
        let record = XmlNode::parse(
            r#"<test-case id="1" name="Ignored" fullname="Ns.Ignored" result="Skipped" label="Ignored"><reason><message>skip reason</message></reason></test-case>"#,
        )
        .unwrap();
        let result = EventParser::new("a.dll").parse_result(&record);
        assert_eq!(result.outcome, TestOutcome::Skipped);
        assert_eq!(result.error_message.as_deref(), Some("skip reason"));
        assert_eq!(result.error_stack_trace, None);
        assert_eq!(result.duration, MIN_DURATION);
        assert_eq!(result.test.code_file_path, None);
    }

    #[test]
    fn other_records_are_not_parsed() {
        let parser = EventParser::new("a.dll");
        let suite = XmlNode::new("start-suite").with_attr("id", "1");
        assert_eq!(parser.parse(&suite), None);

        let start = XmlNode::new("start-test")
            .with_attr("id", "0-1001")
            .with_attr("name", "Passes")
            .with_attr("fullname", "Ns.Fixture.Passes");
        let Some(ParsedEvent::Test(test)) = parser.parse(&start) else {
            panic!("expected a test");
        };
        assert_eq!(test.fully_qualified_name, "Ns.Fixture.Passes");
    }
}
