//! Pluggable package loading.
//!
//! Parsing and type-checking live outside the engine: a loader turns
//! package patterns (or a compile-protocol config) into a read-only
//! [`Session`] plus the sources needed for diagnostics. The engine only
//! decides *how much* must be loaded: when no active analysis declares
//! fact types, dependency packages never run analyses, so their syntax is
//! not needed.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::diagnostics::FileCache;
use crate::error::Result;
use crate::model::{PkgId, Session};

/// How much of the package graph the driver needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Sources for the initial packages only; dependencies as export data.
    Syntax,
    /// Sources for the whole dependency graph.
    AllSyntax,
}

/// The result of loading a pattern set.
#[derive(Debug)]
pub struct LoadedGraph {
    pub session: Session,
    pub files: FileCache,
    /// The packages the user asked about, in request order.
    pub initial: Vec<PkgId>,
}

/// Loads packages for the multi- and single-analysis drivers.
pub trait PackageLoader {
    fn load(&self, patterns: &[String], mode: LoadMode) -> Result<LoadedGraph>;
}

/// The compile-protocol configuration document: one package, fully
/// resolved by the build system.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    /// Compiler identifier, carried for loaders that dispatch on it.
    #[serde(default)]
    pub compiler: String,
    /// Working directory; relative paths in the maps resolve against it.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    pub import_path: String,
    /// The package's own source files.
    pub source_files: Vec<PathBuf>,
    /// Import path -> resolved package path (vendoring and the like).
    #[serde(default)]
    pub import_map: HashMap<String, String>,
    /// Resolved package path -> compiled export data file.
    #[serde(default)]
    pub package_file: HashMap<String, PathBuf>,
    /// Import path -> fact file produced when that package was analyzed.
    #[serde(default)]
    pub package_facts: HashMap<String, PathBuf>,
    /// Skip analyses that neither produce facts nor feed a fact producer.
    #[serde(default)]
    pub facts_only: bool,
    /// Exit successfully without output when the package fails to load or
    /// type-check.
    #[serde(default)]
    pub succeed_on_typecheck_failure: bool,
    /// Where to write the produced fact file.
    pub output: PathBuf,
}

impl UnitConfig {
    /// Resolve a path from the config against its working directory.
    #[must_use]
    pub fn resolve(&self, path: &std::path::Path) -> PathBuf {
        match (&self.dir, path.is_relative()) {
            (Some(dir), true) => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// The result of loading one compile-protocol unit.
pub struct LoadedUnit {
    pub session: Session,
    pub files: FileCache,
    /// The package named by the config.
    pub pkg: PkgId,
}

/// Loads a single package plus the export data of its imports for the
/// compile-protocol driver.
pub trait UnitLoader {
    fn load_unit(&self, cfg: &UnitConfig) -> Result<LoadedUnit>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_config_parses_the_documented_fields() {
        let raw = r#"{
            "compiler": "demo",
            "dir": "/build/work",
            "import_path": "demo/app",
            "source_files": ["app.json"],
            "import_map": {"util": "demo/util"},
            "package_file": {"demo/util": "util.json"},
            "package_facts": {"demo/util": "util.facts"},
            "facts_only": true,
            "succeed_on_typecheck_failure": false,
            "output": "app.facts"
        }"#;
        let cfg: UnitConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.import_path, "demo/app");
        assert_eq!(cfg.import_map.get("util").map(String::as_str), Some("demo/util"));
        assert!(cfg.facts_only);
        assert_eq!(
            cfg.resolve(std::path::Path::new("util.json")),
            PathBuf::from("/build/work/util.json")
        );
        assert_eq!(
            cfg.resolve(std::path::Path::new("/abs/util.json")),
            PathBuf::from("/abs/util.json")
        );
    }

    #[test]
    fn unit_config_rejects_unknown_fields() {
        let raw = r#"{"import_path": "p", "source_files": [], "output": "o", "bogus": 1}"#;
        assert!(serde_json::from_str::<UnitConfig>(raw).is_err());
    }
}
