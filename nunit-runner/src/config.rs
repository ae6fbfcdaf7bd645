// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for `dotnet-test-nunit`.
//!
//! Settings are read from an embedded default config, then from
//! `.config/nunit.toml` (or a file passed in explicitly). Command-line flags
//! are applied on top of this by the caller.

use crate::{errors::ConfigParseError, reporter::labels::LabelMode, runner::OutputSpec};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Deserializer, de::Error as _};
use tracing::debug;

/// The environment variable TeamCity sets for every build step.
pub const TEAMCITY_ENV: &str = "TEAMCITY_PROJECT_NAME";

/// Overall configuration for the runner.
#[derive(Clone, Debug)]
pub struct NUnitConfig {
    config_file: Option<Utf8PathBuf>,
    inner: NUnitConfigImpl,
}

impl NUnitConfig {
    /// The default location of the config within the working directory.
    pub const CONFIG_PATH: &'static str = ".config/nunit.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from `config_file`, or from [`Self::CONFIG_PATH`]
    /// within `cwd` if that exists.
    ///
    /// An explicitly passed config file must exist.
    pub fn from_sources(
        cwd: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = cwd.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|error| ConfigParseError::new(config_file.clone(), error))?;
        debug!("read config, checked {config_file}");

        Ok(Self {
            config_file: config_file.is_file().then_some(config_file),
            inner,
        })
    }

    /// The config file that was read, if one was found.
    pub fn config_file(&self) -> Option<&Utf8Path> {
        self.config_file.as_deref()
    }

    /// The engine command line. Empty if inputs should be replayed.
    pub fn engine_command(&self) -> &[String] {
        &self.inner.engine.command
    }

    /// When to print test labels.
    pub fn labels(&self) -> LabelMode {
        self.inner.output.labels
    }

    /// Result files to write when none are passed on the command line.
    pub fn default_results(&self) -> &[OutputSpec] {
        &self.inner.results.default
    }

    /// The directory result files are written to, if configured.
    pub fn work_dir(&self) -> Option<&Utf8Path> {
        self.inner.results.work_dir.as_deref()
    }

    /// Returns true if TeamCity service messages should be written, either
    /// because the config enables them or because the run is inside a
    /// TeamCity build.
    pub fn teamcity_enabled(&self) -> bool {
        self.inner.teamcity.enabled || std::env::var_os(TEAMCITY_ENV).is_some()
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<NUnitConfigImpl, config::ConfigError> {
        builder.build_cloned()?.try_deserialize()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NUnitConfigImpl {
    #[serde(default)]
    engine: EngineConfig,
    output: OutputConfig,
    results: ResultsConfig,
    teamcity: TeamCityConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct EngineConfig {
    #[serde(default)]
    command: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct OutputConfig {
    labels: LabelMode,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ResultsConfig {
    #[serde(deserialize_with = "deserialize_output_specs")]
    default: Vec<OutputSpec>,
    #[serde(default)]
    work_dir: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TeamCityConfig {
    enabled: bool,
}

fn deserialize_output_specs<'de, D>(deserializer: D) -> Result<Vec<OutputSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let specs = Vec::<String>::deserialize(deserializer)?;
    specs
        .iter()
        .map(|spec| spec.parse().map_err(D::Error::custom))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn write_config(dir: &Utf8TempDir, contents: &str) -> Utf8PathBuf {
        let path = dir.path().join(NUnitConfig::CONFIG_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        let config = NUnitConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.config_file(), None);
        assert!(config.engine_command().is_empty());
        assert_eq!(config.labels(), LabelMode::On);
        assert_eq!(config.default_results(), &[OutputSpec::new("TestResult.xml")]);
        assert_eq!(config.work_dir(), None);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(
            &dir,
            indoc! {r#"
                [engine]
                command = ["dotnet", "nunit-engine.dll"]

                [output]
                labels = "all"

                [results]
                default = ["out/results.xml;format=nunit2"]
                work-dir = "artifacts"

                [teamcity]
                enabled = true
            "#},
        );

        let config = NUnitConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.config_file(), Some(path.as_path()));
        assert_eq!(config.engine_command(), &["dotnet", "nunit-engine.dll"]);
        assert_eq!(config.labels(), LabelMode::All);
        assert_eq!(
            config.default_results(),
            &["out/results.xml;format=nunit2".parse::<OutputSpec>().unwrap()]
        );
        assert_eq!(config.work_dir(), Some(Utf8Path::new("artifacts")));
        assert!(config.teamcity_enabled());
    }

    #[test]
    fn explicit_config_file() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[output]\nlabels = \"off\"\n").unwrap();

        let config = NUnitConfig::from_sources(dir.path(), Some(path.as_path())).unwrap();
        assert_eq!(config.labels(), LabelMode::Off);
        assert_eq!(config.config_file(), Some(path.as_path()));

        let missing = dir.path().join("missing.toml");
        let error = NUnitConfig::from_sources(dir.path(), Some(missing.as_path())).unwrap_err();
        assert_eq!(error.config_file(), &missing);
    }

    #[test]
    fn invalid_values() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(&dir, "[output]\nlabels = \"sometimes\"\n");
        let error = NUnitConfig::from_sources(dir.path(), None).unwrap_err();
        assert_eq!(error.config_file(), &path);

        write_config(&dir, "[results]\ndefault = [\"r.xml;fmt=nunit2\"]\n");
        NUnitConfig::from_sources(dir.path(), None).unwrap_err();
    }
}
