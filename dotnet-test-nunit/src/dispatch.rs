// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, OutputStream, OutputWriter, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use nunit_metadata::NUnitExitCode;
use nunit_runner::{
    config::NUnitConfig,
    engine::{CommandEngine, ReplayEngine, TestEngine},
    errors::WriteEventError,
    events::TestEventSubscriber,
    reporter::{
        displayer::{ResultReporter, RunDescription},
        labels::{LabelMode, LabelWriter},
        legacy::EnvironmentInfo,
        teamcity::TeamCityReporter,
    },
    runner::{OutputSpec, ResultSaver, TestFilter, TestRunner},
    sink::{RemoteSink, StreamingSink, TestSink},
    write_str::{SharedWriter, WriteStr},
    xml::XmlNode,
};
use owo_colors::{OwoColorize, Style};
use std::error::Error;
use supports_color::Stream;
use swrite::{SWrite, swriteln};
use tracing::{debug, error, info, warn};

type ConsoleWriter<'a> = SharedWriter<OutputStream<'a>>;

/// Runs NUnit tests and reports the results.
///
/// Each input is handed to the configured NUnit engine. If no engine is
/// configured, inputs are treated as engine logs recorded earlier, and are
/// replayed.
#[derive(Debug, Parser)]
#[command(
    version,
    name = "dotnet-test-nunit",
    styles = clap_styles::style(),
    max_term_width = 100
)]
pub struct DotnetTestNUnitApp {
    /// Test assemblies, or engine logs to replay
    #[arg(value_name = "INPUTS")]
    inputs: Vec<Utf8PathBuf>,

    #[command(flatten)]
    engine_opts: EngineOpts,

    #[command(flatten)]
    filter_opts: FilterOpts,

    #[command(flatten)]
    ide_opts: IdeOpts,

    #[command(flatten)]
    report_opts: ReportOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Engine options")]
struct EngineOpts {
    /// Engine command line [default: engine.command from the config]
    #[arg(long, value_name = "CMD")]
    engine: Option<String>,

    /// List the tests in the inputs instead of running them
    #[arg(long)]
    explore: bool,

    /// Same as --explore; used by IDEs
    #[arg(long)]
    list: bool,

    /// Note in the report that the run stops at the first failure
    #[arg(long = "stoponerror")]
    stop_on_error: bool,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Filter options")]
struct FilterOpts {
    /// Test selection expression, e.g. `cat == Slow`
    #[arg(long = "where", value_name = "EXPR")]
    where_clause: Option<String>,

    /// Fully-qualified name of a test to run (may be repeated)
    #[arg(long = "test", value_name = "NAME")]
    tests: Vec<String>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "IDE options")]
struct IdeOpts {
    /// The runner was launched by an IDE: send protocol messages
    #[arg(long = "designtime")]
    design_time: bool,

    /// Send protocol messages to the IDE listening on this local port
    #[arg(long, value_name = "N")]
    port: Option<u16>,

    /// Wait for the IDE to say which tests to run
    #[arg(long, requires = "port")]
    wait: bool,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Reporter options")]
struct ReportOpts {
    /// Write TeamCity service messages [default: on within TeamCity]
    #[arg(long)]
    teamcity: bool,

    /// Result file to write, `path[;format=nunit3|nunit2]` (may be repeated)
    #[arg(long = "result", value_name = "SPEC")]
    results: Vec<OutputSpec>,

    /// Don't write any result files
    #[arg(long, conflicts_with = "results")]
    noresult: bool,

    /// Directory to write result files to
    #[arg(long, value_name = "DIR")]
    work: Option<Utf8PathBuf>,

    /// When to print test names before output: off, on, all, before
    #[arg(long, value_name = "MODE")]
    labels: Option<LabelMode>,

    /// Don't print the program name and version
    #[arg(long)]
    noheader: bool,
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/nunit.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, cwd: &Utf8Path) -> Result<NUnitConfig> {
        Ok(NUnitConfig::from_sources(
            cwd,
            self.config_file.as_deref(),
        )?)
    }
}

impl DotnetTestNUnitApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let cwd = current_dir()?;
        let config = self.config_opts.make_config(&cwd)?;
        if output.verbose
            && let Some(config_file) = config.config_file()
        {
            info!("using config from {config_file}");
        }

        let design_time = self.ide_opts.design_time;
        let streaming = design_time && self.ide_opts.port.is_none();

        let (stdout, stderr) = output_writer.streams();
        let stdout = SharedWriter::new(stdout);
        // Protocol messages take over stdout, so everything else goes to stderr.
        let (mut console, colorize) = if streaming {
            (
                SharedWriter::new(stderr),
                output.color.should_colorize(Stream::Stderr),
            )
        } else {
            (stdout.clone(), output.color.should_colorize(Stream::Stdout))
        };

        if !self.report_opts.noheader {
            write_header(&mut console, colorize)?;
        }

        if self.inputs.is_empty() {
            error!("no inputs specified");
            return Ok(NUnitExitCode::OK);
        }

        let engine_command = match &self.engine_opts.engine {
            Some(command) => shell_words::split(command)
                .map_err(|err| ExpectedError::engine_command_parse_error(command, err))?,
            None => config.engine_command().to_vec(),
        };
        let command_engine = CommandEngine::new(&engine_command);
        let engine: &dyn TestEngine = match &command_engine {
            Some(engine) => {
                debug!("using engine: {}", engine_command.join(" "));
                engine
            }
            None => {
                debug!("no engine configured, replaying inputs as engine logs");
                &ReplayEngine
            }
        };

        let mut ide_tests = Vec::new();
        let mut sink: Box<dyn TestSink + '_> = match self.ide_opts.port {
            Some(port) => {
                let mut remote = RemoteSink::connect(port)?;
                if self.ide_opts.wait {
                    ide_tests = remote.wait_for_tests()?;
                    debug!("IDE requested {} tests", ide_tests.len());
                }
                Box::new(remote)
            }
            // Outside design time nothing is sent.
            None => Box::new(StreamingSink::new(stdout.clone())),
        };

        let mut filter = TestFilter::new();
        filter
            .add_tests(ide_tests)
            .add_tests(self.filter_opts.tests.iter().cloned());
        if let Some(where_clause) = &self.filter_opts.where_clause {
            filter.set_where(where_clause.as_str());
        }

        let environment = EnvironmentInfo::current();
        let mut description = RunDescription::new(&environment, &self.inputs, &filter);
        if colorize {
            description.colorize();
        }
        description.write(&mut console)?;

        let mut runner = TestRunner::new(engine);
        runner.set_design_time(design_time);

        if self.engine_opts.explore || self.engine_opts.list {
            let discovery_sink = if design_time {
                Some(&mut *sink as &mut dyn TestSink)
            } else {
                None
            };
            let documents = runner.explore(&self.inputs, &filter, discovery_sink)?;
            if design_time {
                sink.send_discovery_completed()?;
            } else {
                write_test_list(&documents, &mut console)?;
            }
            return Ok(NUnitExitCode::OK);
        }

        let mut labels = LabelWriter::new(
            self.report_opts.labels.unwrap_or_else(|| config.labels()),
            console.clone(),
        );
        if colorize {
            labels.colorize();
        }
        let mut teamcity = (self.report_opts.teamcity || config.teamcity_enabled())
            .then(|| TeamCityReporter::new(stdout.clone()));

        let summary = {
            let mut subscribers: Vec<&mut dyn TestEventSubscriber> = Vec::new();
            if let Some(teamcity) = &mut teamcity {
                subscribers.push(teamcity);
            }
            subscribers.push(&mut labels);
            runner.run(&self.inputs, &filter, &mut *sink, &mut subscribers)?
        };

        if design_time {
            sink.send_execution_completed()?;
            return Ok(NUnitExitCode::OK);
        }

        let mut reporter = ResultReporter::new(&summary);
        reporter.set_stop_on_error(self.engine_opts.stop_on_error);
        if colorize {
            reporter.colorize();
        }
        reporter.write_report(&mut console)?;

        if !self.report_opts.noresult {
            let specs = if self.report_opts.results.is_empty() {
                config.default_results()
            } else {
                &self.report_opts.results
            };
            let work_dir = match self.report_opts.work.as_deref().or(config.work_dir()) {
                Some(dir) => cwd.join(dir),
                None => cwd,
            };
            let saver = ResultSaver::new(work_dir, environment);
            save_results(&saver, specs, reporter.test_results(), &mut console)?;
        }

        Ok(summary.exit_code())
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirInvalid { err })?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| ExpectedError::CurrentDirInvalidUtf8 { path })
}

fn write_header(console: &mut ConsoleWriter<'_>, colorize: bool) -> Result<(), WriteEventError> {
    let style = if colorize {
        Style::new().bold()
    } else {
        Style::new()
    };
    let mut buf = String::new();
    swriteln!(
        buf,
        "{}\n",
        format!("dotnet-test-nunit {}", env!("CARGO_PKG_VERSION")).style(style)
    );
    write_console(console, &buf)
}

fn write_test_list(
    documents: &[XmlNode],
    console: &mut ConsoleWriter<'_>,
) -> Result<(), WriteEventError> {
    let mut buf = String::new();
    for document in documents {
        for test_case in document.descendants_named("test-case") {
            if let Some(name) = test_case.attr("fullname") {
                swriteln!(buf, "{name}");
            }
        }
    }
    write_console(console, &buf)
}

fn save_results(
    saver: &ResultSaver,
    specs: &[OutputSpec],
    results: &XmlNode,
    console: &mut ConsoleWriter<'_>,
) -> Result<(), WriteEventError> {
    let mut buf = String::new();
    for spec in specs {
        match saver.save(spec, results) {
            Ok(path) => swriteln!(buf, "Results saved as {path}"),
            Err(err) if err.is_unsupported() => warn!("{err}"),
            Err(err) => {
                // Keep going: one bad path shouldn't lose the other results.
                error!("failed to write result file {}", spec.output_path);
                let mut source = err.source();
                while let Some(cause) = source {
                    error!("  caused by: {cause}");
                    source = cause.source();
                }
            }
        }
    }
    write_console(console, &buf)
}

fn write_console(console: &mut ConsoleWriter<'_>, s: &str) -> Result<(), WriteEventError> {
    console.write_str(s).map_err(WriteEventError::Io)?;
    console.write_str_flush().map_err(WriteEventError::Io)
}
