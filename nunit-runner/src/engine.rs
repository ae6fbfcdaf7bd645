// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test engines: producers of NUnit event records.
//!
//! An engine explores or runs one assembly at a time. While running it emits
//! one XML record per line (`start-run`, `start-suite`, `start-test`,
//! `test-output`, `test-case`, `test-suite`); the last record is the complete
//! `test-run` document.
//!
//! [`CommandEngine`] spawns an external engine process. [`ReplayEngine`]
//! reads a log previously captured from one, which is handy for CI systems
//! that run tests elsewhere and for testing the runner itself.

use crate::{
    errors::EngineError, events::EventBroadcaster, runner::TestFilter, xml::XmlNode,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
};
use tracing::{debug, trace};

/// Explores and runs test assemblies.
pub trait TestEngine {
    /// Returns the `test-run` document describing the tests in `assembly`
    /// selected by `filter`, without running them.
    fn explore(&self, assembly: &Utf8Path, filter: &TestFilter) -> Result<XmlNode, EngineError>;

    /// Runs the tests in `assembly` selected by `filter`. Every record the
    /// engine emits is handed to `events` in order; the final `test-run`
    /// document is returned.
    fn run(
        &self,
        assembly: &Utf8Path,
        filter: &TestFilter,
        events: &mut EventBroadcaster<'_>,
    ) -> Result<XmlNode, EngineError>;
}

/// Spawns an engine process for each assembly.
///
/// The process is invoked as `<program> <args>... explore|run <assembly>
/// [--where <expression>]` and must write one record per line to standard
/// output.
#[derive(Clone, Debug)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    /// Creates an engine from a command line. Returns `None` if `command` is empty.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn expression(&self, action: &str, assembly: &Utf8Path, filter: &TestFilter) -> duct::Expression {
        let mut args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        args.push(action);
        args.push(assembly.as_str());
        let where_clause = filter.to_where_clause();
        if let Some(where_clause) = &where_clause {
            args.push("--where");
            args.push(where_clause);
        }
        let expression = duct::cmd(self.program.as_str(), args);
        trace!("executing engine: {:?}", expression);
        expression
    }

    fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn execute(
        &self,
        action: &str,
        assembly: &Utf8Path,
        filter: &TestFilter,
        events: Option<&mut EventBroadcaster<'_>>,
    ) -> Result<XmlNode, EngineError> {
        check_assembly(assembly)?;

        let reader = self
            .expression(action, assembly, filter)
            .unchecked()
            .reader()
            .map_err(|error| EngineError::Spawn {
                command: self.command_line(),
                error,
            })?;
        let mut reader = BufReader::new(reader);
        let document = read_records(assembly, &mut reader, events)?;

        let status = reader
            .get_ref()
            .try_wait()
            .map_err(|error| read_error(assembly, error))?
            .map(|output| output.status);

        match (document, status) {
            (Some(document), _) => Ok(document),
            (None, Some(status)) if !status.success() => Err(EngineError::Exited {
                assembly: assembly.to_owned(),
                status: status.to_string(),
            }),
            (None, _) => Err(EngineError::NoResult {
                assembly: assembly.to_owned(),
            }),
        }
    }
}

impl TestEngine for CommandEngine {
    fn explore(&self, assembly: &Utf8Path, filter: &TestFilter) -> Result<XmlNode, EngineError> {
        self.execute("explore", assembly, filter, None)
    }

    fn run(
        &self,
        assembly: &Utf8Path,
        filter: &TestFilter,
        events: &mut EventBroadcaster<'_>,
    ) -> Result<XmlNode, EngineError> {
        self.execute("run", assembly, filter, Some(events))
    }
}

/// Treats each input as a recorded engine log and replays it.
///
/// Filters can't be applied after the fact, so they are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplayEngine;

impl ReplayEngine {
    fn replay(
        &self,
        log: &Utf8Path,
        filter: &TestFilter,
        events: Option<&mut EventBroadcaster<'_>>,
    ) -> Result<XmlNode, EngineError> {
        check_assembly(log)?;
        if !filter.is_empty() {
            debug!("ignoring test filter while replaying {log}");
        }

        let file = File::open(log).map_err(|error| read_error(log, error))?;
        read_records(log, &mut BufReader::new(file), events)?.ok_or_else(|| {
            EngineError::NoResult {
                assembly: log.to_owned(),
            }
        })
    }
}

impl TestEngine for ReplayEngine {
    fn explore(&self, assembly: &Utf8Path, filter: &TestFilter) -> Result<XmlNode, EngineError> {
        self.replay(assembly, filter, None)
    }

    fn run(
        &self,
        assembly: &Utf8Path,
        filter: &TestFilter,
        events: &mut EventBroadcaster<'_>,
    ) -> Result<XmlNode, EngineError> {
        self.replay(assembly, filter, Some(events))
    }
}

fn check_assembly(assembly: &Utf8Path) -> Result<(), EngineError> {
    if let Some(dir) = assembly.parent()
        && !dir.as_str().is_empty()
        && !dir.is_dir()
    {
        return Err(EngineError::DirectoryNotFound {
            path: dir.to_owned(),
        });
    }
    if !assembly.is_file() {
        return Err(EngineError::AssemblyNotFound {
            path: assembly.to_owned(),
        });
    }
    Ok(())
}

/// Reads records line by line, broadcasting everything before the final
/// `test-run` document.
fn read_records(
    assembly: &Utf8Path,
    reader: &mut impl BufRead,
    mut events: Option<&mut EventBroadcaster<'_>>,
) -> Result<Option<XmlNode>, EngineError> {
    let mut document = None;
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|error| read_error(assembly, error))?;
        if read == 0 {
            break;
        }

        let record = line.trim();
        if record.is_empty() {
            continue;
        }
        if is_document(record) {
            let node = XmlNode::parse(record).map_err(|error| EngineError::Document {
                assembly: assembly.to_owned(),
                error,
            })?;
            document = Some(node);
            continue;
        }
        match &mut events {
            Some(events) => events.handle_record(record)?,
            None => trace!("ignoring record while exploring: {record}"),
        }
    }
    Ok(document)
}

fn is_document(record: &str) -> bool {
    record
        .strip_prefix("<test-run")
        .is_some_and(|rest| rest.starts_with([' ', '>', '/', '\t']))
}

fn read_error(assembly: &Utf8Path, error: io::Error) -> EngineError {
    EngineError::Read {
        assembly: Utf8PathBuf::from(assembly),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::WriteEventError, events::TestEventSubscriber};
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const LOG: &str = indoc! {r#"
        <start-run count="1" />
        <start-test id="0-1001" parentId="0-1000" name="Passes" fullname="Ns.Passes" />

        <test-case id="0-1001" parentId="0-1000" name="Passes" fullname="Ns.Passes" result="Passed" />
        <test-run id="2" testcasecount="1" result="Passed" total="1" passed="1"><test-suite type="Assembly" fullname="a.dll" result="Passed"><test-case id="0-1001" fullname="Ns.Passes" result="Passed" /></test-suite></test-run>
    "#};

    struct Names(Vec<String>);

    impl TestEventSubscriber for Names {
        fn on_event(&mut self, event: &XmlNode) -> Result<(), WriteEventError> {
            self.0.push(event.name().to_owned());
            Ok(())
        }
    }

    #[test]
    fn replay_log() {
        let dir = Utf8TempDir::new().unwrap();
        let log = dir.path().join("a.log");
        std::fs::write(&log, LOG).unwrap();

        let mut names = Names(Vec::new());
        let document = {
            let mut events = EventBroadcaster::new();
            events.add(&mut names);
            ReplayEngine
                .run(&log, &TestFilter::default(), &mut events)
                .unwrap()
        };
        assert_eq!(names.0, vec!["start-run", "start-test", "test-case"]);
        assert_eq!(document.name(), "test-run");
        assert_eq!(document.attr("passed"), Some("1"));

        let explored = ReplayEngine.explore(&log, &TestFilter::default()).unwrap();
        assert_eq!(explored, document);
    }

    #[test]
    fn missing_inputs() {
        let dir = Utf8TempDir::new().unwrap();

        let missing_file = dir.path().join("missing.dll");
        let error = ReplayEngine
            .explore(&missing_file, &TestFilter::default())
            .unwrap_err();
        assert!(
            matches!(&error, EngineError::AssemblyNotFound { path } if *path == missing_file),
            "{error:?}"
        );

        let missing_dir = dir.path().join("bin").join("a.dll");
        let error = ReplayEngine
            .explore(&missing_dir, &TestFilter::default())
            .unwrap_err();
        assert!(
            matches!(&error, EngineError::DirectoryNotFound { path } if *path == dir.path().join("bin")),
            "{error:?}"
        );
    }

    #[test]
    fn log_without_document() {
        let dir = Utf8TempDir::new().unwrap();
        let log = dir.path().join("a.log");
        std::fs::write(&log, "<start-run count=\"1\" />\n").unwrap();

        let error = ReplayEngine
            .run(&log, &TestFilter::default(), &mut EventBroadcaster::new())
            .unwrap_err();
        assert!(matches!(error, EngineError::NoResult { .. }), "{error:?}");
    }

    #[test]
    fn document_detection() {
        assert!(is_document(r#"<test-run id="2">"#));
        assert!(is_document("<test-run>"));
        assert!(!is_document(r#"<test-runner id="2" />"#));
        assert!(!is_document(r#"<start-run count="1" />"#));
    }

    #[test]
    fn command_line() {
        let engine = CommandEngine::new(&["dotnet".to_owned(), "engine.dll".to_owned()]).unwrap();
        assert_eq!(engine.command_line(), "dotnet engine.dll");
        assert!(CommandEngine::new(&[]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn command_engine_runs() {
        let dir = Utf8TempDir::new().unwrap();
        let log = dir.path().join("a.log");
        std::fs::write(&log, LOG).unwrap();

        // `sh -c 'cat "$2"' sh run <assembly>` prints the assembly, standing in
        // for an engine that emits the recorded log.
        let engine = CommandEngine::new(&[
            "sh".to_owned(),
            "-c".to_owned(),
            r#"cat "$2""#.to_owned(),
            "sh".to_owned(),
        ])
        .unwrap();
        let mut names = Names(Vec::new());
        let document = {
            let mut events = EventBroadcaster::new();
            events.add(&mut names);
            engine
                .run(&log, &TestFilter::default(), &mut events)
                .unwrap()
        };
        assert_eq!(names.0.len(), 3);
        assert_eq!(document.attr("result"), Some("Passed"));

        let failing = CommandEngine::new(&["sh".to_owned(), "-c".to_owned(), "exit 3".to_owned()])
            .unwrap();
        let error = failing.explore(&log, &TestFilter::default()).unwrap_err();
        assert!(matches!(error, EngineError::Exited { .. }), "{error:?}");
    }
}
