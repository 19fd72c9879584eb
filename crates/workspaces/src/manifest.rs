//! The subset of `package.json` that workspace orchestration cares about.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// File name of a workspace manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// Range prefix marking a dependency as resolved inside the project.
pub const WORKSPACE_PROTOCOL: &str = "workspace:";

/// A parsed `package.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Package name.
    pub name: Option<String>,
    /// `private: true` packages are dropped by `--no-private`.
    #[serde(default)]
    pub private: bool,
    /// Nested workspace declarations.
    pub workspaces: Option<WorkspacesField>,
    /// Regular dependencies, name to range.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Development dependencies, name to range.
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    /// Scripts, name to shell command.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    /// Executables this package exposes to its dependents.
    pub bin: Option<BinField>,
}

/// The two accepted shapes of the `workspaces` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    /// `"workspaces": ["packages/*"]`
    Array(Vec<String>),
    /// `"workspaces": { "packages": ["packages/*"] }`
    Object {
        /// Glob patterns.
        #[serde(default)]
        packages: Vec<String>,
    },
}

/// The two accepted shapes of the `bin` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    /// A single executable named after the package.
    Single(String),
    /// Executable name to script path.
    Map(BTreeMap<String, String>),
}

impl Manifest {
    /// Reads and parses `<dir>/package.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestNotFound`] when the file is missing and
    /// [`Error::Json`] when it cannot be parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::ManifestNotFound { path });
        }
        read_json_file(&path)
    }

    /// Glob patterns of nested workspaces, empty when none are declared.
    #[must_use]
    pub fn workspace_patterns(&self) -> &[String] {
        match &self.workspaces {
            Some(
                WorkspacesField::Array(patterns) | WorkspacesField::Object { packages: patterns },
            ) => patterns.as_slice(),
            None => &[],
        }
    }

    /// Whether this manifest declares a `workspaces` field at all.
    #[must_use]
    pub fn declares_workspaces(&self) -> bool {
        self.workspaces.is_some()
    }

    /// Executables exposed through `bin`, as (command name, relative path).
    ///
    /// The single-string form is named after the package, without its scope.
    #[must_use]
    pub fn bin_entries(&self) -> Vec<(String, String)> {
        match &self.bin {
            Some(BinField::Single(path)) => self
                .name
                .as_deref()
                .map(|name| name.rsplit('/').next().unwrap_or(name))
                .map(|name| vec![(name.to_string(), path.clone())])
                .unwrap_or_default(),
            Some(BinField::Map(entries)) => entries
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Names of every declared dependency, regular ones first.
    pub fn dependency_names(&self, include_dev: bool) -> impl Iterator<Item = &str> {
        let dev = include_dev.then_some(&self.dev_dependencies);
        self.dependencies
            .keys()
            .chain(dev.into_iter().flat_map(BTreeMap::keys))
            .map(String::as_str)
    }
}

/// Whether a dependency range points at another workspace of the project.
#[must_use]
pub fn is_workspace_range(range: &str) -> bool {
    range.starts_with(WORKSPACE_PROTOCOL)
}

/// Reads and parses a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed as valid JSON.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::Io {
        source: e,
        path: Some(path.to_path_buf()),
        operation: "reading json file".to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| Error::Json {
        source: e,
        path: Some(path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(json: &str) -> Manifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_workspaces_array_and_object_forms() {
        let array = parse(r#"{"workspaces": ["packages/*"]}"#);
        assert_eq!(array.workspace_patterns(), ["packages/*"]);

        let object = parse(r#"{"workspaces": {"packages": ["apps/*", "libs/*"]}}"#);
        assert_eq!(object.workspace_patterns(), ["apps/*", "libs/*"]);

        let none = parse(r#"{"name": "leaf"}"#);
        assert!(none.workspace_patterns().is_empty());
        assert!(!none.declares_workspaces());
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let manifest = parse("{}");
        assert!(manifest.name.is_none());
        assert!(!manifest.private);
        assert!(manifest.scripts.is_empty());
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_bin_single_uses_unscoped_name() {
        let manifest = parse(r#"{"name": "@acme/tool", "bin": "./cli.js"}"#);
        assert_eq!(
            manifest.bin_entries(),
            vec![("tool".to_string(), "./cli.js".to_string())]
        );
    }

    #[test]
    fn test_bin_map() {
        let manifest = parse(r#"{"name": "x", "bin": {"a": "a.js", "b": "b.js"}}"#);
        let names: Vec<_> = manifest.bin_entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_dependency_names_dev_toggle() {
        let manifest = parse(
            r#"{"dependencies": {"a": "workspace:*"}, "devDependencies": {"b": "^1.0.0"}}"#,
        );
        assert_eq!(manifest.dependency_names(false).collect::<Vec<_>>(), ["a"]);
        assert_eq!(manifest.dependency_names(true).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_workspace_range() {
        assert!(is_workspace_range("workspace:*"));
        assert!(is_workspace_range("workspace:^1.0.0"));
        assert!(!is_workspace_range("^1.0.0"));
        assert!(!is_workspace_range("file:../a"));
    }

    #[test]
    fn test_load_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let err = Manifest::load(temp.path()).unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound { .. }));
    }

    #[test]
    fn test_load_malformed_manifest() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST_FILE), "{ not json").unwrap();
        let err = Manifest::load(temp.path()).unwrap_err();
        assert!(matches!(err, Error::Json { path: Some(_), .. }));
    }
}
