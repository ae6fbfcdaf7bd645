// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Listeners that turn engine records into IDE protocol messages.

use crate::{
    errors::WriteEventError,
    events::TestEventSubscriber,
    parse::EventParser,
    sink::TestSink,
    xml::XmlNode,
};
use tracing::trace;

/// Reports tests starting and finishing while an assembly runs.
///
/// Messages are only sent in design-time mode; outside of it the listener
/// still parses records, which keeps parse failures visible in logs.
pub struct ExecutionListener<S> {
    parser: EventParser,
    sink: S,
}

impl<S: TestSink> ExecutionListener<S> {
    /// Creates a listener sending to `sink`.
    pub fn new(parser: EventParser, sink: S) -> Self {
        Self { parser, sink }
    }

    /// Consumes the listener, returning the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: TestSink> TestEventSubscriber for ExecutionListener<S> {
    fn on_event(&mut self, event: &XmlNode) -> Result<(), WriteEventError> {
        match event.name() {
            "start-test" => {
                let test = self.parser.parse_test(event);
                trace!("test started: {}", test.fully_qualified_name);
                if self.parser.is_design_time() {
                    self.sink.send_test_started(&test)?;
                }
            }
            "test-case" => {
                let result = self.parser.parse_result(event);
                trace!(
                    "test finished: {} ({:?})",
                    result.test.fully_qualified_name, result.outcome
                );
                if self.parser.is_design_time() {
                    self.sink.send_test_result(&result)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Reports every test case found in an explore document.
pub struct ExploreListener<S> {
    parser: EventParser,
    sink: S,
}

impl<S: TestSink> ExploreListener<S> {
    /// Creates a listener sending to `sink`.
    pub fn new(parser: EventParser, sink: S) -> Self {
        Self { parser, sink }
    }

    /// Sends one `TestDiscovery.TestFound` message per `test-case` element at
    /// any depth of `document`, returning the number of tests found.
    pub fn explore(&mut self, document: &XmlNode) -> Result<usize, WriteEventError> {
        let test_cases = if document.name() == "test-case" {
            vec![document]
        } else {
            document.descendants_named("test-case")
        };
        for test_case in &test_cases {
            let test = self.parser.parse_test(test_case);
            self.sink.send_test_found(&test)?;
        }
        Ok(test_cases.len())
    }

    /// Consumes the listener, returning the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nunit_metadata::protocol::{Message, MessageType, TestOutcome};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct MockSink {
        messages: Vec<Message>,
    }

    impl TestSink for MockSink {
        fn send_message(&mut self, message: &Message) -> Result<(), WriteEventError> {
            self.messages.push(message.clone());
            Ok(())
        }
    }

    const ERROR_TEST_CASE_XML: &str = concat!(
        r#"<test-case id="1018" name="ErrorTest" fullname="Calc.Test.CalculatorTests.ErrorTest" methodname="ErrorTest" classname="Calc.Test.CalculatorTests" result="Failed" label="Error" start-time="2016-06-06 19:57:35Z" end-time="2016-06-06 19:57:35Z" duration="0.023031" asserts="0">"#,
        r#"<failure>"#,
        r#"<message><![CDATA[System.ArgumentException : Value does not fall within the expected range.]]></message>"#,
        r#"<stack-trace><![CDATA[   at Calc.Test.CalculatorTests.ErrorTest() in D:\Src\CalculatorTests.cs:line 50]]></stack-trace>"#,
        r#"</failure>"#,
        r#"</test-case>"#,
    );

    const OUTPUT_TEST_CASE_XML: &str = concat!(
        r#"<test-case id="1020" name="TestWithTestContextOutput" fullname="Calc.Test.CalculatorTests.TestWithTestContextOutput" result="Passed" duration="0.000001" asserts="0">"#,
        "<output><![CDATA[Test context output\n]]></output>",
        r#"</test-case>"#,
    );

    const EXPLORE_XML: &str = concat!(
        r#"<test-suite type="ParameterizedMethod" id="1004" name="LoadWithFrenchCanadianCulture" fullname="Culture.LoadWithFrenchCanadianCulture" testcasecount="1">"#,
        r#"<test-case id="0-3896" name="LoadWithFrenchCanadianCulture" fullname="Culture.LoadWithFrenchCanadianCulture" methodname="LoadWithFrenchCanadianCulture" classname="Culture">"#,
        r#"<properties>"#,
        r#"<property name="SetCulture" value="fr-CA" />"#,
        r#"<property name="UICulture" value="en-CA" />"#,
        r#"</properties>"#,
        r#"</test-case>"#,
        r#"</test-suite>"#,
    );

    fn execute(design_time: bool, records: &[&str]) -> Vec<Message> {
        let parser = EventParser::new("/src/a.dll").with_design_time(design_time);
        let mut listener = ExecutionListener::new(parser, MockSink::default());
        for record in records {
            listener.on_event(&XmlNode::parse(record).unwrap()).unwrap();
        }
        listener.into_inner().messages
    }

    #[test]
    fn test_errors() {
        let messages = execute(true, &[ERROR_TEST_CASE_XML]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::TEST_RESULT);

        let payload = messages[0].payload.as_ref().unwrap();
        assert_eq!(payload["Outcome"], TestOutcome::Failed.as_i32());
        assert!(
            payload["ErrorMessage"]
                .as_str()
                .unwrap()
                .starts_with("System.ArgumentException")
        );
        assert!(
            payload["ErrorStackTrace"]
                .as_str()
                .unwrap()
                .trim()
                .starts_with("at Calc.Test.CalculatorTests.ErrorTest()")
        );
        assert_eq!(payload["StartTime"], "2016-06-06T19:57:35Z");
    }

    #[test]
    fn test_output() {
        let messages = execute(true, &[OUTPUT_TEST_CASE_XML]);
        let payload = messages[0].payload.as_ref().unwrap();
        assert_eq!(payload["Messages"][0], "Test context output\n");
        assert_eq!(payload["Outcome"], TestOutcome::Passed.as_i32());
    }

    #[test]
    fn started_and_ignored_records() {
        let messages = execute(
            true,
            &[
                r#"<start-run count="1" />"#,
                r#"<start-suite id="1-0" parentId="" fullname="a.dll" />"#,
                r#"<start-test id="1-1" parentId="1-0" name="A" fullname="Ns.A" />"#,
                r#"<test-output testname="Ns.A">hi</test-output>"#,
            ],
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::TEST_STARTED);
        assert_eq!(messages[0].payload.as_ref().unwrap()["FullyQualifiedName"], "Ns.A");
    }

    #[test]
    fn silent_outside_design_time() {
        let messages = execute(false, &[ERROR_TEST_CASE_XML, OUTPUT_TEST_CASE_XML]);
        assert!(messages.is_empty());
    }

    #[test]
    fn explore_with_properties() {
        let parser = EventParser::new("/src/a.dll").with_design_time(true);
        let mut listener = ExploreListener::new(parser, MockSink::default());
        let found = listener
            .explore(&XmlNode::parse(EXPLORE_XML).unwrap())
            .unwrap();
        assert_eq!(found, 1);

        let messages = listener.into_inner().messages;
        assert_eq!(messages[0].message_type, MessageType::TEST_FOUND);
        let payload = messages[0].payload.as_ref().unwrap();
        assert_eq!(payload["DisplayName"], "LoadWithFrenchCanadianCulture");
        assert_eq!(payload["FullyQualifiedName"], "Culture.LoadWithFrenchCanadianCulture");
        assert_ne!(payload["Id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(payload["Properties"]["SetCulture"], "fr-CA");
        assert_eq!(payload["Properties"]["UICulture"], "en-CA");
    }
}
