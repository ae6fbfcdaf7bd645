// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source locations for tests.
//!
//! Resolving a test method to a file and line needs debug symbols, which are
//! read by an external tool. That tool can drop a `<assembly>.nav.json` file
//! next to the assembly:
//!
//! ```json
//! [{"class": "Ns.Fixture", "method": "Passes", "file": "Fixture.cs", "line": 12}]
//! ```
//!
//! Lookups never fail: anything missing or unreadable resolves to no location.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A source location for a test method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    /// The source file.
    pub file: String,

    /// The line number, if known.
    pub line: Option<u32>,
}

/// Resolves test methods to source locations.
pub trait NavigationData: Send + Sync {
    /// Returns the location of `method_name` in `class_name`, if known.
    fn location(&self, class_name: &str, method_name: &str) -> Option<SourceLocation>;
}

/// Navigation data that never resolves anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoNavigationData;

impl NavigationData for NoNavigationData {
    fn location(&self, _class_name: &str, _method_name: &str) -> Option<SourceLocation> {
        None
    }
}

#[derive(Deserialize)]
struct NavigationEntry {
    class: String,
    method: String,
    file: String,
    #[serde(default)]
    line: Option<u32>,
}

/// Navigation data read from a `.nav.json` file.
#[derive(Clone, Debug, Default)]
pub struct FileNavigationData {
    locations: HashMap<(String, String), SourceLocation>,
}

impl FileNavigationData {
    /// Returns the navigation file expected next to an assembly.
    pub fn path_for(assembly: &Utf8Path) -> Utf8PathBuf {
        let stem = assembly.file_stem().unwrap_or_default();
        assembly.with_file_name(format!("{stem}.nav.json"))
    }

    /// Loads navigation data for an assembly.
    ///
    /// A missing file yields empty data; an unreadable file is logged and
    /// yields empty data.
    pub fn load(assembly: &Utf8Path) -> Self {
        let path = Self::path_for(assembly);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) => {
                debug!("no navigation data at {path}: {error}");
                return Self::default();
            }
        };
        match Self::from_json(&contents) {
            Ok(data) => data,
            Err(error) => {
                warn!("ignoring navigation data at {path}: {error}");
                Self::default()
            }
        }
    }

    /// Parses navigation data from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<NavigationEntry> = serde_json::from_str(json)?;
        let locations = entries
            .into_iter()
            .map(|entry| {
                (
                    (entry.class, entry.method),
                    SourceLocation {
                        file: entry.file,
                        line: entry.line,
                    },
                )
            })
            .collect();
        Ok(Self { locations })
    }
}

impl NavigationData for FileNavigationData {
    fn location(&self, class_name: &str, method_name: &str) -> Option<SourceLocation> {
        self.locations
            .get(&(class_name.to_owned(), method_name.to_owned()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn load_from_assembly_directory() {
        let dir = Utf8TempDir::new().unwrap();
        let assembly = dir.path().join("Project.Tests.dll");
        assert_eq!(
            FileNavigationData::path_for(&assembly),
            dir.path().join("Project.Tests.nav.json")
        );

        let missing = FileNavigationData::load(&assembly);
        assert_eq!(missing.location("Ns.Fixture", "Passes"), None);

        std::fs::write(
            FileNavigationData::path_for(&assembly),
            r#"[{"class": "Ns.Fixture", "method": "Passes", "file": "Fixture.cs", "line": 12}]"#,
        )
        .unwrap();
        let data = FileNavigationData::load(&assembly);
        assert_eq!(
            data.location("Ns.Fixture", "Passes"),
            Some(SourceLocation {
                file: "Fixture.cs".to_owned(),
                line: Some(12),
            })
        );
        assert_eq!(data.location("Ns.Fixture", "Fails"), None);
    }

    #[test]
    fn malformed_file_degrades() {
        let dir = Utf8TempDir::new().unwrap();
        let assembly = dir.path().join("Project.Tests.dll");
        std::fs::write(FileNavigationData::path_for(&assembly), "not json").unwrap();
        let data = FileNavigationData::load(&assembly);
        assert_eq!(data.location("Ns.Fixture", "Passes"), None);
    }
}
