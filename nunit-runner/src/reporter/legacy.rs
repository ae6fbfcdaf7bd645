// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writes NUnit 3 results in the NUnit 2 `test-results` format.
//!
//! Older CI servers only understand NUnit 2 result files. The structure is
//! similar but the vocabularies differ: results are translated, derived
//! attributes such as `executed` and `success` are recomputed, and categories
//! get their own element.

use crate::{
    errors::XmlWriteError,
    helpers::computer_name,
    parse::try_parse_timestamp,
    reporter::summary::SummaryCounts,
    xml::{XmlNode, write_cdata},
};
use chrono::Utc;
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::io;

static TEST_RESULTS_TAG: &str = "test-results";
static ENVIRONMENT_TAG: &str = "environment";
static CULTURE_INFO_TAG: &str = "culture-info";
static TEST_SUITE_TAG: &str = "test-suite";
static TEST_CASE_TAG: &str = "test-case";
static CATEGORIES_TAG: &str = "categories";
static CATEGORY_TAG: &str = "category";
static PROPERTIES_TAG: &str = "properties";
static PROPERTY_TAG: &str = "property";
static REASON_TAG: &str = "reason";
static FAILURE_TAG: &str = "failure";
static MESSAGE_TAG: &str = "message";
static STACK_TRACE_TAG: &str = "stack-trace";
static RESULTS_TAG: &str = "results";

/// Details about the machine and runner, written to the header of a result file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentInfo {
    /// Version of the runner.
    pub nunit_version: String,
    /// Version of the runtime the tests ran on, if known.
    pub clr_version: String,
    /// Operating system.
    pub os_version: String,
    /// Platform.
    pub platform: String,
    /// Working directory.
    pub cwd: String,
    /// Machine name.
    pub machine_name: String,
    /// User name.
    pub user: String,
    /// User domain.
    pub user_domain: String,
    /// Culture name, e.g. `en-US`.
    pub current_culture: String,
    /// UI culture name.
    pub current_uiculture: String,
}

impl EnvironmentInfo {
    /// Collects information about the current process.
    pub fn current() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let culture = culture_from_locale(&var("LANG"));
        Self {
            nunit_version: env!("CARGO_PKG_VERSION").to_owned(),
            clr_version: String::new(),
            os_version: std::env::consts::OS.to_owned(),
            platform: std::env::consts::ARCH.to_owned(),
            cwd: std::env::current_dir()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            machine_name: computer_name(),
            user: ["USER", "USERNAME"]
                .into_iter()
                .map(var)
                .find(|user| !user.is_empty())
                .unwrap_or_default(),
            user_domain: var("USERDOMAIN"),
            current_uiculture: culture.clone(),
            current_culture: culture,
        }
    }
}

// `en_US.UTF-8` -> `en-US`. An unset or `C` locale is reported as invariant.
fn culture_from_locale(locale: &str) -> String {
    let name = locale.split(['.', '@']).next().unwrap_or_default();
    if name.is_empty() || name == "C" || name == "POSIX" {
        String::new()
    } else {
        name.replace('_', "-")
    }
}

/// Translates an NUnit 3 `result` and `label` to an NUnit 2 result.
pub fn translate_result(result: &str, label: Option<&str>) -> &'static str {
    match result {
        "Inconclusive" => "Inconclusive",
        "Failed" => match label {
            Some("Error") => "Error",
            Some("Cancelled") => "Cancelled",
            _ => "Failure",
        },
        "Skipped" => match label {
            Some("Ignored") => "Ignored",
            Some("Invalid") => "NotRunnable",
            _ => "Skipped",
        },
        _ => "Success",
    }
}

/// Writes NUnit 2 result files.
#[derive(Clone, Debug)]
pub struct LegacyResultWriter {
    environment: EnvironmentInfo,
}

impl LegacyResultWriter {
    /// Creates a writer that reports `environment` in the file header.
    pub fn new(environment: EnvironmentInfo) -> Self {
        Self { environment }
    }

    /// Writes a combined `test-run` tree as an NUnit 2 document.
    pub fn write(&self, tree: &XmlNode, writer: impl io::Write) -> Result<(), XmlWriteError> {
        let mut writer = Writer::new_with_indent(writer, b'\t', 1);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("no"))))?;
        writer.write_event(Event::Comment(BytesText::new(
            "This file represents the results of running a test suite",
        )))?;

        self.write_header(tree, &mut writer)?;
        for child in tree.children() {
            if child.name().starts_with("test-") {
                write_result_element(child, &mut writer)?;
            }
        }
        serialize_end_tag(TEST_RESULTS_TAG, &mut writer)?;

        // Add a trailing newline.
        writer.get_mut().write_all(b"\n")?;
        Ok(())
    }

    /// Writes a combined `test-run` tree to a string.
    pub fn to_string(&self, tree: &XmlNode) -> Result<String, XmlWriteError> {
        let mut buf = Vec::new();
        self.write(tree, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn write_header<W: io::Write>(
        &self,
        tree: &XmlNode,
        writer: &mut Writer<W>,
    ) -> Result<(), XmlWriteError> {
        let counts = SummaryCounts::from_tree(tree).legacy();
        let name = tree
            .child(TEST_SUITE_TAG)
            .and_then(|suite| suite.attr("fullname"))
            .unwrap_or("UNKNOWN");
        let start = tree
            .attr("start-time")
            .and_then(try_parse_timestamp)
            .unwrap_or_else(Utc::now);

        let mut tag = BytesStart::new(TEST_RESULTS_TAG);
        tag.push_attribute(("name", name));
        for (key, value) in [
            ("total", counts.total),
            ("errors", counts.errors),
            ("failures", counts.failures),
            ("not-run", counts.not_run),
            ("inconclusive", counts.inconclusive),
            ("ignored", counts.ignored),
            ("skipped", counts.skipped),
            ("invalid", counts.invalid),
        ] {
            tag.push_attribute((key, value.to_string().as_str()));
        }
        tag.push_attribute(("date", start.format("%Y-%m-%d").to_string().as_str()));
        tag.push_attribute(("time", start.format("%H:%M:%S").to_string().as_str()));
        writer.write_event(Event::Start(tag))?;

        // Use the destructuring syntax to ensure that all fields are handled.
        let EnvironmentInfo {
            nunit_version,
            clr_version,
            os_version,
            platform,
            cwd,
            machine_name,
            user,
            user_domain,
            current_culture,
            current_uiculture,
        } = &self.environment;

        let mut environment = BytesStart::new(ENVIRONMENT_TAG);
        environment.extend_attributes([
            ("nunit-version", nunit_version.as_str()),
            ("clr-version", clr_version.as_str()),
            ("os-version", os_version.as_str()),
            ("platform", platform.as_str()),
            ("cwd", cwd.as_str()),
            ("machine-name", machine_name.as_str()),
            ("user", user.as_str()),
            ("user-domain", user_domain.as_str()),
        ]);
        writer.write_event(Event::Empty(environment))?;

        let mut culture = BytesStart::new(CULTURE_INFO_TAG);
        culture.extend_attributes([
            ("current-culture", current_culture.as_str()),
            ("current-uiculture", current_uiculture.as_str()),
        ]);
        writer.write_event(Event::Empty(culture))?;
        Ok(())
    }
}

fn write_result_element<W: io::Write>(
    node: &XmlNode,
    writer: &mut Writer<W>,
) -> Result<(), XmlWriteError> {
    let is_test_case = node.name() == TEST_CASE_TAG;
    let tag_name = if is_test_case {
        TEST_CASE_TAG
    } else {
        TEST_SUITE_TAG
    };

    let mut tag = BytesStart::new(tag_name);
    if is_test_case {
        tag.push_attribute(("name", node.attr("fullname").unwrap_or_default()));
    } else {
        let suite_type = node.attr("type").unwrap_or_default();
        let translated = if suite_type == "ParameterizedMethod" {
            "ParameterizedTest"
        } else {
            suite_type
        };
        let name_attr = if matches!(suite_type, "Assembly" | "Project") {
            "fullname"
        } else {
            "name"
        };
        tag.push_attribute(("type", translated));
        tag.push_attribute(("name", node.attr(name_attr).unwrap_or_default()));
    }

    let properties: Vec<&XmlNode> = node
        .child(PROPERTIES_TAG)
        .map(|props| props.children_named(PROPERTY_TAG).collect())
        .unwrap_or_default();
    let (categories, others): (Vec<&XmlNode>, Vec<&XmlNode>) = properties
        .iter()
        .partition(|property| property.attr("name") == Some("Category"));

    if let Some(description) = properties
        .iter()
        .find(|property| property.attr("name") == Some("Description"))
        .and_then(|property| property.attr("value"))
    {
        tag.push_attribute(("description", description));
    }

    let result = node.attr("result").unwrap_or_default();
    let executed = result != "Skipped";
    tag.push_attribute(("executed", if executed { "True" } else { "False" }));
    tag.push_attribute(("result", translate_result(result, node.attr("label"))));
    if executed {
        let duration = node
            .attr("duration")
            .and_then(|duration| duration.parse::<f64>().ok())
            .unwrap_or(0.0);
        tag.push_attribute(("success", if result == "Passed" { "True" } else { "False" }));
        tag.push_attribute(("time", format!("{duration:.3}").as_str()));
        tag.push_attribute(("asserts", node.attr("asserts").unwrap_or_default()));
    }

    let reason = node.path_text("reason/message");
    let failure = node.path_text("failure/message");
    let has_content = !is_test_case || !properties.is_empty() || reason.is_some() || failure.is_some();
    if !has_content {
        writer.write_event(Event::Empty(tag))?;
        return Ok(());
    }
    writer.write_event(Event::Start(tag))?;

    if !categories.is_empty() {
        serialize_empty_start_tag(CATEGORIES_TAG, writer)?;
        for category in &categories {
            let mut tag = BytesStart::new(CATEGORY_TAG);
            tag.push_attribute(("name", category.attr("value").unwrap_or_default()));
            writer.write_event(Event::Empty(tag))?;
        }
        serialize_end_tag(CATEGORIES_TAG, writer)?;
    }

    if !others.is_empty() {
        serialize_empty_start_tag(PROPERTIES_TAG, writer)?;
        for property in &others {
            let mut tag = BytesStart::new(PROPERTY_TAG);
            tag.push_attribute(("name", property.attr("name").unwrap_or_default()));
            tag.push_attribute(("value", property.attr("value").unwrap_or_default()));
            writer.write_event(Event::Empty(tag))?;
        }
        serialize_end_tag(PROPERTIES_TAG, writer)?;
    }

    if let Some(reason) = reason {
        serialize_empty_start_tag(REASON_TAG, writer)?;
        serialize_cdata_element(MESSAGE_TAG, reason, writer)?;
        serialize_end_tag(REASON_TAG, writer)?;
    }

    if let Some(message) = failure {
        serialize_empty_start_tag(FAILURE_TAG, writer)?;
        serialize_cdata_element(MESSAGE_TAG, message, writer)?;
        match node.path_text("failure/stack-trace") {
            Some(stack_trace) => serialize_cdata_element(STACK_TRACE_TAG, stack_trace, writer)?,
            None => writer.write_event(Event::Empty(BytesStart::new(STACK_TRACE_TAG)))?,
        }
        serialize_end_tag(FAILURE_TAG, writer)?;
    }

    if !is_test_case {
        let children: Vec<&XmlNode> = node
            .children()
            .iter()
            .filter(|child| child.name().starts_with("test-"))
            .collect();
        if children.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new(RESULTS_TAG)))?;
        } else {
            serialize_empty_start_tag(RESULTS_TAG, writer)?;
            for child in children {
                write_result_element(child, writer)?;
            }
            serialize_end_tag(RESULTS_TAG, writer)?;
        }
    }

    serialize_end_tag(tag_name, writer)
}

fn serialize_cdata_element<W: io::Write>(
    tag_name: &'static str,
    text: &str,
    writer: &mut Writer<W>,
) -> Result<(), XmlWriteError> {
    serialize_empty_start_tag(tag_name, writer)?;
    write_cdata(text, writer)?;
    serialize_end_tag(tag_name, writer)
}

fn serialize_empty_start_tag<W: io::Write>(
    tag_name: &'static str,
    writer: &mut Writer<W>,
) -> Result<(), XmlWriteError> {
    writer.write_event(Event::Start(BytesStart::new(tag_name)))?;
    Ok(())
}

fn serialize_end_tag<W: io::Write>(
    tag_name: &'static str,
    writer: &mut Writer<W>,
) -> Result<(), XmlWriteError> {
    writer.write_event(Event::End(BytesEnd::new(tag_name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn environment() -> EnvironmentInfo {
        EnvironmentInfo {
            nunit_version: "0.1.0".to_owned(),
            clr_version: String::new(),
            os_version: "linux".to_owned(),
            platform: "x86_64".to_owned(),
            cwd: "/work".to_owned(),
            machine_name: "agent".to_owned(),
            user: "ci".to_owned(),
            user_domain: String::new(),
            current_culture: "en-US".to_owned(),
            current_uiculture: "en-US".to_owned(),
        }
    }

    #[test_case("Failed", None, "Failure"; "failed")]
    #[test_case("Failed", Some("Error"), "Error"; "error")]
    #[test_case("Failed", Some("Cancelled"), "Cancelled"; "cancelled")]
    #[test_case("Failed", Some("Invalid"), "Failure"; "invalid failure")]
    #[test_case("Skipped", Some("Ignored"), "Ignored"; "ignored")]
    #[test_case("Skipped", Some("Invalid"), "NotRunnable"; "not runnable")]
    #[test_case("Skipped", Some("Explicit"), "Skipped"; "explicit")]
    #[test_case("Inconclusive", None, "Inconclusive"; "inconclusive")]
    #[test_case("Passed", None, "Success"; "passed")]
    #[test_case("Warning", None, "Success"; "unknown")]
    fn result_translation(result: &str, label: Option<&str>, expected: &str) {
        assert_eq!(translate_result(result, label), expected);
    }

    #[test_case("en_US.UTF-8", "en-US"; "utf8 locale")]
    #[test_case("de_DE@euro", "de-DE"; "modifier")]
    #[test_case("C", ""; "c locale")]
    #[test_case("", ""; "unset")]
    fn culture_names(locale: &str, expected: &str) {
        assert_eq!(culture_from_locale(locale), expected);
    }

    #[test]
    fn write_document() {
        let tree = XmlNode::parse(indoc! {r#"
            <test-run start-time="2016-06-06 19:57:35Z">
              <test-suite type="Assembly" name="a.dll" fullname="/tmp/a.dll" result="Failed" duration="0.5" asserts="2">
                <properties><property name="_PID" value="12" /></properties>
                <test-suite type="ParameterizedMethod" name="Add" fullname="Ns.Fixture.Add" result="Failed" label="Error" duration="0.25" asserts="0">
                  <test-case name="Add(1)" fullname="Ns.Fixture.Add(1)" result="Failed" label="Error" duration="0.25" asserts="0">
                    <properties>
                      <property name="Category" value="Math" />
                      <property name="Description" value="adds" />
                    </properties>
                    <failure><message><![CDATA[bad ]]]]><![CDATA[> thing]]></message></failure>
                  </test-case>
                </test-suite>
                <test-case name="Ignored" fullname="Ns.Ignored" result="Skipped" label="Ignored">
                  <reason><message><![CDATA[skip reason]]></message></reason>
                </test-case>
                <test-case name="Passes" fullname="Ns.Passes" result="Passed" duration="0.0001" asserts="1" />
              </test-suite>
            </test-run>
        "#})
        .unwrap();

        let output = LegacyResultWriter::new(environment())
            .to_string(&tree)
            .unwrap();
        assert_eq!(
            output.replace('\t', "    "),
            indoc! {r#"
                <?xml version="1.0" encoding="utf-8" standalone="no"?>
                <!--This file represents the results of running a test suite-->
                <test-results name="/tmp/a.dll" total="3" errors="1" failures="0" not-run="1" inconclusive="0" ignored="1" skipped="0" invalid="0" date="2016-06-06" time="19:57:35">
                    <environment nunit-version="0.1.0" clr-version="" os-version="linux" platform="x86_64" cwd="/work" machine-name="agent" user="ci" user-domain=""/>
                    <culture-info current-culture="en-US" current-uiculture="en-US"/>
                    <test-suite type="Assembly" name="/tmp/a.dll" executed="True" result="Failure" success="False" time="0.500" asserts="2">
                        <properties>
                            <property name="_PID" value="12"/>
                        </properties>
                        <results>
                            <test-suite type="ParameterizedTest" name="Add" executed="True" result="Error" success="False" time="0.250" asserts="0">
                                <results>
                                    <test-case name="Ns.Fixture.Add(1)" description="adds" executed="True" result="Error" success="False" time="0.250" asserts="0">
                                        <categories>
                                            <category name="Math"/>
                                        </categories>
                                        <properties>
                                            <property name="Description" value="adds"/>
                                        </properties>
                                        <failure>
                                            <message><![CDATA[bad ]]]]><![CDATA[> thing]]></message>
                                            <stack-trace/>
                                        </failure>
                                    </test-case>
                                </results>
                            </test-suite>
                            <test-case name="Ns.Ignored" executed="False" result="Ignored">
                                <reason>
                                    <message><![CDATA[skip reason]]></message>
                                </reason>
                            </test-case>
                            <test-case name="Ns.Passes" executed="True" result="Success" success="True" time="0.000" asserts="1"/>
                        </results>
                    </test-suite>
                </test-results>
            "#}
        );
    }

    #[test]
    fn unknown_name_without_suites() {
        let output = LegacyResultWriter::new(environment())
            .to_string(&XmlNode::new("test-run"))
            .unwrap();
        assert!(
            output.contains(r#"<test-results name="UNKNOWN" total="0""#),
            "unexpected output: {output}"
        );
    }
}
