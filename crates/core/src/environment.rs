//! Per-job environment overlay and the invocation context it is built from.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use wsrun_workspaces::Workspace;

/// Directory the outermost invocation was started from.
pub const INIT_CWD: &str = "INIT_CWD";
/// Script currently being run by wsrun; drives the recursion guard.
pub const LIFECYCLE_EVENT: &str = "WSRUN_LIFECYCLE_EVENT";
/// Name of the workspace a job runs in.
pub const WORKSPACE: &str = "WSRUN_WORKSPACE";
/// Absolute project root.
pub const PROJECT_CWD: &str = "WSRUN_PROJECT_CWD";

/// Where and under which markers wsrun was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Current directory of this process.
    pub cwd: PathBuf,
    /// Inherited `INIT_CWD`, else `cwd`.
    pub init_cwd: PathBuf,
    /// Inherited [`LIFECYCLE_EVENT`].
    pub lifecycle_event: Option<String>,
    /// Inherited [`WORKSPACE`].
    pub invoking_workspace: Option<String>,
    /// Inherited `PATH`.
    pub path: Option<OsString>,
}

impl Invocation {
    /// Captures the current process's directory and markers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the current directory is unavailable.
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| Error::io(e, "reading current directory"))?;
        Ok(Self::new(
            cwd,
            env::var_os(INIT_CWD),
            env::var(LIFECYCLE_EVENT).ok(),
            env::var(WORKSPACE).ok(),
            env::var_os("PATH"),
        ))
    }

    /// Builds an invocation from explicit values; empty markers count as unset.
    #[must_use]
    pub fn new(
        cwd: PathBuf,
        init_cwd: Option<OsString>,
        lifecycle_event: Option<String>,
        invoking_workspace: Option<String>,
        path: Option<OsString>,
    ) -> Self {
        let init_cwd = init_cwd
            .filter(|value| !value.is_empty())
            .map_or_else(|| cwd.clone(), PathBuf::from);
        Self {
            cwd,
            init_cwd,
            lifecycle_event: lifecycle_event.filter(|value| !value.is_empty()),
            invoking_workspace: invoking_workspace.filter(|value| !value.is_empty()),
            path,
        }
    }

    /// An invocation with no inherited markers, rooted at `cwd`.
    #[must_use]
    pub fn at(cwd: impl Into<PathBuf>) -> Self {
        Self::new(cwd.into(), None, None, None, env::var_os("PATH"))
    }
}

/// Variables layered on top of the inherited environment of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Variable names to values.
    pub vars: BTreeMap<String, OsString>,
}

impl Environment {
    /// Overlay for a job running in `workspace`.
    ///
    /// `script` is recorded as [`LIFECYCLE_EVENT`] so nested invocations can
    /// detect re-entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a `node_modules/.bin` directory
    /// cannot be joined into `PATH`.
    pub fn for_job(
        invocation: &Invocation,
        project_root: &Path,
        workspace: &Workspace,
        script: Option<&str>,
    ) -> Result<Self> {
        let mut env = Self::default();
        env.set(INIT_CWD, invocation.init_cwd.as_os_str());
        env.set(WORKSPACE, workspace.name.as_str());
        env.set(PROJECT_CWD, project_root.as_os_str());
        if let Some(script) = script {
            env.set(LIFECYCLE_EVENT, script);
        }

        let mut dirs = vec![workspace.root.join("node_modules").join(".bin")];
        if workspace.root != project_root {
            dirs.push(project_root.join("node_modules").join(".bin"));
        }
        if let Some(path) = &invocation.path {
            dirs.extend(env::split_paths(path));
        }
        let path = env::join_paths(dirs)
            .map_err(|e| Error::configuration(format!("Cannot build PATH: {e}")))?;
        env.set("PATH", path);

        Ok(env)
    }

    /// Sets a variable.
    pub fn set(&mut self, key: &str, value: impl Into<OsString>) {
        self.vars.insert(key.to_string(), value.into());
    }

    /// Gets a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.vars.get(key)
    }

    /// Iterates over the overlay.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &OsString)> {
        self.vars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsrun_workspaces::Manifest;

    fn workspace(name: &str, root: &Path) -> Workspace {
        Workspace {
            name: name.to_string(),
            relative_path: "packages/a".to_string(),
            root: root.to_path_buf(),
            manifest: Manifest::default(),
            parent: None,
        }
    }

    #[test]
    fn test_init_cwd_prefers_inherited_value() {
        let invocation = Invocation::new(
            PathBuf::from("/repo/packages/a"),
            Some(OsString::from("/repo")),
            None,
            None,
            None,
        );
        assert_eq!(invocation.init_cwd, PathBuf::from("/repo"));

        let invocation = Invocation::new(
            PathBuf::from("/repo/packages/a"),
            Some(OsString::new()),
            Some(String::new()),
            None,
            None,
        );
        assert_eq!(invocation.init_cwd, PathBuf::from("/repo/packages/a"));
        assert_eq!(invocation.lifecycle_event, None);
    }

    #[test]
    fn test_overlay_for_job() {
        let invocation = Invocation::new(
            PathBuf::from("/repo"),
            None,
            None,
            None,
            Some(OsString::from("/usr/bin")),
        );
        let ws = workspace("a", Path::new("/repo/packages/a"));
        let env = Environment::for_job(&invocation, Path::new("/repo"), &ws, Some("build")).unwrap();

        assert_eq!(env.get(INIT_CWD), Some(&OsString::from("/repo")));
        assert_eq!(env.get(WORKSPACE), Some(&OsString::from("a")));
        assert_eq!(env.get(LIFECYCLE_EVENT), Some(&OsString::from("build")));

        let path: Vec<PathBuf> = env::split_paths(env.get("PATH").unwrap()).collect();
        assert_eq!(
            path,
            [
                PathBuf::from("/repo/packages/a/node_modules/.bin"),
                PathBuf::from("/repo/node_modules/.bin"),
                PathBuf::from("/usr/bin"),
            ]
        );
    }

    #[test]
    fn test_exec_jobs_have_no_lifecycle_event() {
        let invocation = Invocation::new(PathBuf::from("/repo"), None, None, None, None);
        let ws = workspace("root", Path::new("/repo"));
        let env = Environment::for_job(&invocation, Path::new("/repo"), &ws, None).unwrap();
        assert!(env.get(LIFECYCLE_EVENT).is_none());

        let path: Vec<PathBuf> = env::split_paths(env.get("PATH").unwrap()).collect();
        assert_eq!(path, [PathBuf::from("/repo/node_modules/.bin")]);
    }
}
