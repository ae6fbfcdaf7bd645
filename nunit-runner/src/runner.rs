// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running assemblies and saving their results.
//!
//! [`TestRunner`] drives an engine over every input assembly in sequence,
//! fanning records out to the configured subscribers and collecting the
//! final documents into a [`ResultSummary`]. [`ResultSaver`] then writes the
//! combined results in each requested format.

use crate::{
    errors::{
        EngineError, OutputSpecParseError, OutputSpecParseErrorKind, ResultWriteError,
        XmlWriteError,
    },
    engine::TestEngine,
    events::{EventBroadcaster, TestEventSubscriber},
    listener::{ExecutionListener, ExploreListener},
    navigation::FileNavigationData,
    parse::EventParser,
    reporter::{
        legacy::{EnvironmentInfo, LegacyResultWriter},
        summary::ResultSummary,
    },
    sink::TestSink,
    xml::XmlNode,
};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, info};

/// The result file format written when none is specified.
pub const DEFAULT_RESULT_FORMAT: &str = "nunit3";

/// Where and how to save results: `path[;format=<format>][;transform=<file>]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    /// The output file, relative to the work directory.
    pub output_path: Utf8PathBuf,

    /// The result format, `nunit3` by default.
    pub format: String,

    /// An XSLT transform to apply, if any.
    pub transform: Option<String>,
}

impl OutputSpec {
    /// Creates a specification for an NUnit 3 file.
    pub fn new(output_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            format: DEFAULT_RESULT_FORMAT.to_owned(),
            transform: None,
        }
    }
}

impl FromStr for OutputSpec {
    type Err = OutputSpecParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.split(';');
        let path = parts.next().unwrap_or_default().trim();
        if path.is_empty() {
            return Err(OutputSpecParseError::new(
                input,
                OutputSpecParseErrorKind::EmptyPath,
            ));
        }

        let mut spec = OutputSpec::new(path);
        for option in parts.map(str::trim).filter(|option| !option.is_empty()) {
            let Some((key, value)) = option.split_once('=') else {
                return Err(OutputSpecParseError::new(
                    input,
                    OutputSpecParseErrorKind::MissingValue(option.to_owned()),
                ));
            };
            match key.trim() {
                "format" => spec.format = value.trim().to_owned(),
                "transform" => spec.transform = Some(value.trim().to_owned()),
                other => {
                    return Err(OutputSpecParseError::new(
                        input,
                        OutputSpecParseErrorKind::UnknownKey(other.to_owned()),
                    ));
                }
            }
        }
        Ok(spec)
    }
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};format={}", self.output_path, self.format)?;
        if let Some(transform) = &self.transform {
            write!(f, ";transform={transform}")?;
        }
        Ok(())
    }
}

/// Selects the tests to explore or run.
///
/// Named tests and a `--where` expression are combined: a test must be one of
/// the named tests (if any were named) and match the expression (if one was
/// given).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestFilter {
    tests: Vec<String>,
    where_clause: Option<String>,
}

impl TestFilter {
    /// Creates a filter that selects every test.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tests by fully-qualified name.
    pub fn add_tests<I>(&mut self, tests: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.tests.extend(tests.into_iter().map(Into::into));
        self
    }

    /// Sets the selection expression.
    pub fn set_where(&mut self, where_clause: impl Into<String>) -> &mut Self {
        let where_clause = where_clause.into();
        let trimmed = where_clause.trim();
        self.where_clause = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        self
    }

    /// The named tests.
    pub fn tests(&self) -> &[String] {
        &self.tests
    }

    /// The selection expression, as given.
    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    /// Returns true if the filter selects every test.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty() && self.where_clause.is_none()
    }

    /// Returns the combined selection expression passed to the engine.
    pub fn to_where_clause(&self) -> Option<String> {
        let tests = self
            .tests
            .iter()
            .map(|test| format!("test == {}", quote(test)))
            .join(" || ");

        match (tests.is_empty(), &self.where_clause) {
            (true, None) => None,
            (true, Some(where_clause)) => Some(where_clause.clone()),
            (false, None) => Some(tests),
            (false, Some(where_clause)) => Some(format!("({tests}) && ({where_clause})")),
        }
    }
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Runs or explores assemblies through an engine.
pub struct TestRunner<'e> {
    engine: &'e dyn TestEngine,
    design_time: bool,
}

impl<'e> TestRunner<'e> {
    /// Creates a runner using `engine`.
    pub fn new(engine: &'e dyn TestEngine) -> Self {
        Self {
            engine,
            design_time: false,
        }
    }

    /// Sets whether the runner works on behalf of an IDE.
    pub fn set_design_time(&mut self, design_time: bool) -> &mut Self {
        self.design_time = design_time;
        self
    }

    fn parser(&self, assembly: &Utf8Path) -> EventParser {
        EventParser::new(assembly.as_str())
            .with_design_time(self.design_time)
            .with_navigation(Arc::new(FileNavigationData::load(assembly)))
    }

    /// Explores every assembly, reporting each test found to `sink`.
    ///
    /// Returns the explore documents in input order.
    pub fn explore(
        &self,
        assemblies: &[Utf8PathBuf],
        filter: &TestFilter,
        mut sink: Option<&mut dyn TestSink>,
    ) -> Result<Vec<XmlNode>, EngineError> {
        let mut documents = Vec::with_capacity(assemblies.len());
        for assembly in assemblies {
            let document = self.engine.explore(assembly, filter)?;
            if let Some(sink) = sink.as_deref_mut() {
                let found = ExploreListener::new(self.parser(assembly), sink).explore(&document)?;
                debug!("found {found} tests in {assembly}");
            }
            documents.push(document);
        }
        Ok(documents)
    }

    /// Runs every assembly in sequence.
    ///
    /// Each record goes to an execution listener writing to `sink`, then to
    /// every subscriber in `subscribers`, in that order.
    pub fn run(
        &self,
        assemblies: &[Utf8PathBuf],
        filter: &TestFilter,
        sink: &mut dyn TestSink,
        subscribers: &mut [&mut dyn TestEventSubscriber],
    ) -> Result<ResultSummary, EngineError> {
        let mut summary = ResultSummary::new();
        for assembly in assemblies {
            info!("running {assembly}");
            let mut events = EventBroadcaster::new();
            events.add(ExecutionListener::new(self.parser(assembly), &mut *sink));
            for subscriber in subscribers.iter_mut() {
                events.add(&mut **subscriber);
            }

            let document = self.engine.run(assembly, filter, &mut events)?;
            summary.add_result(document)?;
        }
        Ok(summary)
    }
}

/// Writes result files into a work directory.
#[derive(Clone, Debug)]
pub struct ResultSaver {
    work_dir: Utf8PathBuf,
    environment: EnvironmentInfo,
}

impl ResultSaver {
    /// Creates a saver writing into `work_dir`.
    pub fn new(work_dir: impl Into<Utf8PathBuf>, environment: EnvironmentInfo) -> Self {
        Self {
            work_dir: work_dir.into(),
            environment,
        }
    }

    /// The directory results are written to.
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }

    /// Saves `results`, a combined `test-run` tree, as described by `spec`.
    ///
    /// Returns the path written to.
    pub fn save(&self, spec: &OutputSpec, results: &XmlNode) -> Result<Utf8PathBuf, ResultWriteError> {
        let path = self.work_dir.join(&spec.output_path);
        if let Some(transform) = spec.transform.as_deref().filter(|t| !t.trim().is_empty()) {
            return Err(ResultWriteError::UnsupportedTransform {
                path,
                transform: transform.to_owned(),
            });
        }

        let legacy = match spec.format.as_str() {
            "nunit3" => false,
            "nunit2" => true,
            other => {
                return Err(ResultWriteError::UnsupportedFormat {
                    path,
                    format: other.to_owned(),
                });
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| ResultWriteError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }

        let result = File::create(&path)
            .map_err(XmlWriteError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                if legacy {
                    LegacyResultWriter::new(self.environment.clone()).write(results, &mut writer)?;
                } else {
                    results.write_document(&mut writer)?;
                }
                writer.flush()?;
                Ok(())
            });
        match result {
            Ok(()) => {
                debug!("wrote {} results to {path}", spec.format);
                Ok(path)
            }
            Err(error) => Err(ResultWriteError::Write { path, error }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::ReplayEngine, errors::WriteEventError, reporter::teamcity::TeamCityReporter,
        sink::StreamingSink,
    };
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use nunit_metadata::{NUnitExitCode, protocol::Message};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("TestResult.xml", "TestResult.xml", "nunit3", None; "path only")]
    #[test_case("out/r.xml;format=nunit2", "out/r.xml", "nunit2", None; "format")]
    #[test_case(
        "r.xml;format=nunit3;transform=html.xslt",
        "r.xml", "nunit3", Some("html.xslt");
        "transform"
    )]
    #[test_case(" r.xml ; format = nunit2 ;", "r.xml", "nunit2", None; "whitespace")]
    fn parse_output_spec(input: &str, path: &str, format: &str, transform: Option<&str>) {
        let spec: OutputSpec = input.parse().unwrap();
        assert_eq!(spec.output_path, path);
        assert_eq!(spec.format, format);
        assert_eq!(spec.transform.as_deref(), transform);
    }

    #[test_case("", OutputSpecParseErrorKind::EmptyPath; "empty")]
    #[test_case(";format=nunit2", OutputSpecParseErrorKind::EmptyPath; "no path")]
    #[test_case("r.xml;nunit2", OutputSpecParseErrorKind::MissingValue("nunit2".to_owned()); "missing value")]
    #[test_case("r.xml;fmt=nunit2", OutputSpecParseErrorKind::UnknownKey("fmt".to_owned()); "unknown key")]
    fn parse_output_spec_errors(input: &str, kind: OutputSpecParseErrorKind) {
        let error = input.parse::<OutputSpec>().unwrap_err();
        assert_eq!(error.kind(), &kind);
    }

    #[test]
    fn output_spec_display() {
        let spec: OutputSpec = "r.xml;transform=t.xslt;format=nunit2".parse().unwrap();
        assert_eq!(spec.to_string(), "r.xml;format=nunit2;transform=t.xslt");
    }

    #[test]
    fn filters() {
        let mut filter = TestFilter::new();
        assert!(filter.is_empty());
        assert_eq!(filter.to_where_clause(), None);

        filter.set_where("  cat == Slow ");
        assert_eq!(filter.to_where_clause().as_deref(), Some("cat == Slow"));

        filter.add_tests(["Ns.A", r#"Ns.B("x")"#]);
        assert_eq!(
            filter.to_where_clause().as_deref(),
            Some(r#"(test == "Ns.A" || test == "Ns.B(\"x\")") && (cat == Slow)"#)
        );

        let mut tests_only = TestFilter::new();
        tests_only.add_tests(vec!["Ns.A".to_owned()]).set_where("   ");
        assert_eq!(tests_only.where_clause(), None);
        assert_eq!(tests_only.to_where_clause().as_deref(), Some(r#"test == "Ns.A""#));
    }

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

    const LOG: &str = indoc! {r#"
        <start-run count="3" />
        <start-suite id="0-1005" parentId="" name="a.dll" fullname="/tmp/a.dll" type="Assembly" />
        <start-test id="0-1001" parentId="0-1005" name="Passes" fullname="Ns.Fixture.Passes" />
        <test-case id="0-1001" parentId="0-1005" name="Passes" fullname="Ns.Fixture.Passes" result="Passed" duration="0.000001" asserts="1" />
        <start-test id="0-1002" parentId="0-1005" name="Fails" fullname="Ns.Fixture.Fails" />
        <test-case id="0-1002" parentId="0-1005" name="Fails" fullname="Ns.Fixture.Fails" result="Failed" duration="0.01" asserts="1"><failure><message>Expected: 3&#xA;But was: 2</message></failure></test-case>
        <test-case id="0-1003" parentId="0-1005" name="Ignored" fullname="Ns.Fixture.Ignored" result="Skipped" label="Ignored"><reason><message><![CDATA[skip reason]]></message></reason></test-case>
        <test-suite id="0-1005" parentId="" name="a.dll" fullname="/tmp/a.dll" type="Assembly" result="Failed" />
        <test-run id="2" testcasecount="3" result="Failed" start-time="2016-06-06 19:57:35Z" end-time="2016-06-06 19:57:36Z" duration="0.5"><test-suite type="Assembly" id="0-1005" name="a.dll" fullname="/tmp/a.dll" result="Failed" site="Child"><test-case id="0-1001" name="Passes" fullname="Ns.Fixture.Passes" result="Passed" duration="0.000001" asserts="1" /><test-case id="0-1002" name="Fails" fullname="Ns.Fixture.Fails" result="Failed" duration="0.01" asserts="1"><failure><message><![CDATA[Expected: 3]]></message></failure></test-case><test-case id="0-1003" name="Ignored" fullname="Ns.Fixture.Ignored" result="Skipped" label="Ignored"><reason><message><![CDATA[skip reason]]></message></reason></test-case></test-suite></test-run>
    "#};

    fn write_log(dir: &Utf8TempDir) -> Utf8PathBuf {
        let log = dir.path().join("a.log");
        std::fs::write(&log, LOG).unwrap();
        log
    }

    #[test]
    fn run_three_tests() {
        let dir = Utf8TempDir::new().unwrap();
        let log = write_log(&dir);

        let engine = ReplayEngine;
        let mut runner = TestRunner::new(&engine);
        runner.set_design_time(true);

        let mut sink = StreamingSink::new(String::new());
        let mut teamcity = TeamCityReporter::new(String::new());
        let summary = runner
            .run(
                &[log],
                &TestFilter::new(),
                &mut sink,
                &mut [&mut teamcity],
            )
            .unwrap();

        let counts = summary.finalize();
        assert_eq!(counts.test_count, 3);
        assert_eq!(counts.pass_count, 1);
        assert_eq!(counts.failed_count(), 1);
        assert_eq!(counts.failure_count, 1);
        assert_eq!(counts.ignore_count, 1);
        assert_eq!(counts.total_skip_count(), 1);
        assert_eq!(summary.exit_code(), 1);
        assert_ne!(summary.exit_code(), NUnitExitCode::OK);

        let streamed = sink.into_inner();
        // Records are one per line, so multi-line messages arrive escaped.
        assert!(
            streamed.contains(r#""ErrorMessage":"Expected: 3\nBut was: 2""#),
            "{streamed}"
        );
        let messages: Vec<_> = streamed
            .lines()
            .map(|line| Message::from_json(line).unwrap().message_type)
            .collect();
        assert_eq!(
            messages,
            vec![
                "TestExecution.TestStarted",
                "TestExecution.TestResult",
                "TestExecution.TestStarted",
                "TestExecution.TestResult",
                "TestExecution.TestResult",
            ]
        );

        let teamcity = teamcity.into_inner();
        assert!(
            teamcity.contains("##teamcity[testSuiteStarted name='a.dll' flowId='0-1005']"),
            "{teamcity}"
        );
        assert!(
            teamcity.contains("##teamcity[testFailed name='Ns.Fixture.Fails' message='Expected: 3|nBut was: 2'"),
            "{teamcity}"
        );
    }

    #[test]
    fn explore_reports_tests() {
        let dir = Utf8TempDir::new().unwrap();
        let log = write_log(&dir);

        let engine = ReplayEngine;
        let runner = TestRunner::new(&engine);
        let mut sink = StreamingSink::new(String::new());
        let documents = runner
            .explore(std::slice::from_ref(&log), &TestFilter::new(), Some(&mut sink))
            .unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(sink.into_inner().lines().count(), 3);
    }

    struct Failing;

    impl TestEventSubscriber for Failing {
        fn on_event(&mut self, _event: &XmlNode) -> Result<(), WriteEventError> {
            Err(WriteEventError::Io(std::io::Error::other("closed")))
        }
    }

    #[test]
    fn subscriber_errors_abort() {
        let dir = Utf8TempDir::new().unwrap();
        let log = write_log(&dir);

        let engine = ReplayEngine;
        let mut sink = StreamingSink::new(String::new());
        let error = TestRunner::new(&engine)
            .run(&[log], &TestFilter::new(), &mut sink, &mut [&mut Failing])
            .unwrap_err();
        assert!(matches!(error, EngineError::Event(_)), "{error:?}");
    }

    #[test]
    fn save_results() {
        let dir = Utf8TempDir::new().unwrap();
        let log = write_log(&dir);
        let engine = ReplayEngine;
        let mut sink = StreamingSink::new(String::new());
        let summary = TestRunner::new(&engine)
            .run(&[log], &TestFilter::new(), &mut sink, &mut [])
            .unwrap();
        let results = summary.test_results();

        let saver = ResultSaver::new(dir.path().join("work"), environment());
        let path = saver.save(&OutputSpec::new("TestResult.xml"), &results).unwrap();
        assert_eq!(path, dir.path().join("work/TestResult.xml"));
        let contents = std::fs::read_to_string(&path).unwrap();
        let saved = XmlNode::parse(&contents).unwrap();
        assert_eq!(saved.name(), "test-run");
        assert_eq!(saved.attr("total"), Some("3"));
        assert_eq!(saved.attr("failed"), Some("1"));

        let legacy: OutputSpec = "nested/TestResult2.xml;format=nunit2".parse().unwrap();
        let path = saver.save(&legacy, &results).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let saved = XmlNode::parse(&contents).unwrap();
        assert_eq!(saved.name(), "test-results");
        assert_eq!(saved.attr("failures"), Some("1"));
        assert_eq!(saved.attr("not-run"), Some("1"));

        let error = saver
            .save(&"r.xml;format=junit".parse().unwrap(), &results)
            .unwrap_err();
        assert!(error.is_unsupported());
        assert!(matches!(error, ResultWriteError::UnsupportedFormat { .. }));

        let error = saver
            .save(&"r.xml;transform=t.xslt".parse().unwrap(), &results)
            .unwrap_err();
        assert!(error.is_unsupported());
        assert!(!saver.work_dir().join("r.xml").exists());
    }

    #[test]
    fn save_failure_is_reported() {
        let dir = Utf8TempDir::new().unwrap();
        // The work directory is a file, so nothing can be created inside it.
        let work = dir.path().join("work");
        std::fs::write(&work, "").unwrap();

        let saver = ResultSaver::new(&work, environment());
        let error = saver
            .save(&OutputSpec::new("TestResult.xml"), &XmlNode::new("test-run"))
            .unwrap_err();
        assert!(!error.is_unsupported());
    }
}
