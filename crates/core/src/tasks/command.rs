//! What a job runs in each workspace.
//!
//! A [`CommandRequest`] comes from the command line. [`CommandResolver`]
//! turns it into one [`ResolvedCommand`] per workspace before anything is
//! scheduled, and [`ResolvedCommand::to_command`] builds the process.

use crate::environment::Environment;
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use wsrun_workspaces::{MANIFEST_FILE, Manifest, NodeIndex, WorkspaceGraph};

/// The command given after the foreach flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    /// `run <script> [args]`
    Run {
        /// Script name.
        script: String,
        /// Extra arguments appended to the script.
        args: Vec<String>,
    },
    /// `exec <command> [args]`
    Exec {
        /// Shell command.
        command: String,
        /// Extra arguments.
        args: Vec<String>,
    },
    /// `<binary> [args]`: a script if one exists, else a dependency binary,
    /// else the command itself.
    Binary {
        /// Script or executable name.
        name: String,
        /// Extra arguments.
        args: Vec<String>,
    },
}

impl CommandRequest {
    /// Parses the trailing command words.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no command is given.
    pub fn from_words(words: &[String]) -> Result<Self> {
        match words {
            [] => Err(Error::configuration("No command given")),
            [keyword, rest @ ..] if keyword == "run" || keyword == "exec" => {
                let [name, args @ ..] = rest else {
                    return Err(Error::configuration(format!(
                        "`{keyword}` requires a {}",
                        if keyword == "run" { "script name" } else { "command" }
                    )));
                };
                let args = args.to_vec();
                Ok(if keyword == "run" {
                    Self::Run {
                        script: name.clone(),
                        args,
                    }
                } else {
                    Self::Exec {
                        command: name.clone(),
                        args,
                    }
                })
            }
            [name, args @ ..] => Ok(Self::Binary {
                name: name.clone(),
                args: args.to_vec(),
            }),
        }
    }

    /// Script or command name, for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Run { script: name, .. }
            | Self::Exec { command: name, .. }
            | Self::Binary { name, .. } => name,
        }
    }

    fn args(&self) -> &[String] {
        match self {
            Self::Run { args, .. } | Self::Exec { args, .. } | Self::Binary { args, .. } => args,
        }
    }
}

/// Why a workspace has nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The workspace neither declares the script nor can reach a binary of
    /// that name.
    NotDeclared,
    /// The workspace is the one whose script started this invocation.
    Reentrant,
}

/// The concrete command of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCommand {
    /// A `package.json` script, run through the shell.
    Script {
        /// Script name.
        name: String,
        /// Script body.
        body: String,
        /// Extra arguments.
        args: Vec<String>,
    },
    /// An executable exposed by an installed dependency.
    Binary {
        /// Absolute path.
        path: PathBuf,
        /// Extra arguments.
        args: Vec<String>,
    },
    /// An arbitrary shell command.
    Exec {
        /// Command line head.
        command: String,
        /// Extra arguments.
        args: Vec<String>,
    },
    /// Nothing to run.
    Skip(SkipReason),
}

impl ResolvedCommand {
    /// Script name to record as the lifecycle event, for script jobs.
    #[must_use]
    pub fn lifecycle_event(&self) -> Option<&str> {
        match self {
            Self::Script { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Builds the process for this command, or `None` for [`Self::Skip`].
    ///
    /// Scripts and exec commands go through `sh -c` (`cmd /C` on Windows)
    /// with the extra arguments shell-quoted. JavaScript binaries are
    /// started with `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when an argument cannot be quoted.
    pub fn to_command(&self, cwd: &Path, env: &Environment) -> Result<Option<Command>> {
        let mut cmd = match self {
            Self::Script { body, args, .. } => shell(&join_command_line(body, args)?),
            Self::Exec { command, args } => shell(&join_command_line(command, args)?),
            Self::Binary { path, args } => {
                let mut cmd = if is_javascript(path) {
                    let mut cmd = Command::new("node");
                    cmd.arg(path);
                    cmd
                } else {
                    Command::new(path)
                };
                cmd.args(args);
                cmd
            }
            Self::Skip(_) => return Ok(None),
        };
        cmd.current_dir(cwd);
        cmd.envs(env.iter());
        Ok(Some(cmd))
    }
}

fn join_command_line(head: &str, args: &[String]) -> Result<String> {
    if args.is_empty() {
        return Ok(head.to_string());
    }
    let quoted = shlex::try_join(args.iter().map(String::as_str))
        .map_err(|e| Error::configuration(format!("Cannot quote arguments: {e}")))?;
    Ok(format!("{head} {quoted}"))
}

#[cfg(unix)]
fn shell(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(not(unix))]
fn shell(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

fn is_javascript(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "js" | "cjs" | "mjs"))
}

/// Resolves a request against every workspace of one project.
#[derive(Debug)]
pub struct CommandResolver<'a> {
    graph: &'a WorkspaceGraph,
    global_scripts: HashMap<&'a str, NodeIndex>,
    reentrant: Option<(&'a str, NodeIndex)>,
}

impl<'a> CommandResolver<'a> {
    /// Prepares resolution for `graph`.
    ///
    /// `reentrant` names the script and workspace that started this
    /// invocation, when it was started from a wsrun script.
    #[must_use]
    pub fn new(graph: &'a WorkspaceGraph, reentrant: Option<(&'a str, NodeIndex)>) -> Self {
        let mut declared: HashMap<&str, Vec<NodeIndex>> = HashMap::new();
        for (index, workspace) in graph.iter() {
            for name in workspace.manifest.scripts.keys() {
                if name.contains(':') {
                    declared.entry(name.as_str()).or_default().push(index);
                }
            }
        }
        let global_scripts = declared
            .into_iter()
            .filter_map(|(name, owners)| match owners.as_slice() {
                [only] => Some((name, *only)),
                _ => None,
            })
            .collect();

        Self {
            graph,
            global_scripts,
            reentrant,
        }
    }

    /// The command `workspace` runs for `request`.
    #[must_use]
    pub fn resolve(&self, workspace: NodeIndex, request: &CommandRequest) -> ResolvedCommand {
        let name = request.name();
        let args = request.args().to_vec();

        if let CommandRequest::Exec { command, .. } = request {
            return ResolvedCommand::Exec {
                command: command.clone(),
                args,
            };
        }

        if self.reentrant == Some((name, workspace)) {
            debug!(
                workspace = %self.graph.workspace(workspace).name,
                script = name,
                "Skipping the workspace whose script started this run"
            );
            return ResolvedCommand::Skip(SkipReason::Reentrant);
        }

        if let Some(body) = self.script_for(workspace, name) {
            return ResolvedCommand::Script {
                name: name.to_string(),
                body: body.to_string(),
                args,
            };
        }

        if let Some(path) = self.find_binary(workspace, name) {
            return ResolvedCommand::Binary { path, args };
        }

        match request {
            CommandRequest::Binary { name, .. } => ResolvedCommand::Exec {
                command: name.clone(),
                args,
            },
            _ => ResolvedCommand::Skip(SkipReason::NotDeclared),
        }
    }

    /// Own script first, then a global script declared by exactly one
    /// workspace.
    fn script_for(&self, workspace: NodeIndex, name: &str) -> Option<&'a str> {
        let graph = self.graph;
        graph.workspace(workspace).script(name).or_else(|| {
            self.global_scripts
                .get(name)
                .and_then(|&owner| graph.workspace(owner).script(name))
        })
    }

    /// A `bin` entry of one of the workspace's declared dependencies,
    /// looked up in `node_modules` from the workspace up to the project root.
    fn find_binary(&self, workspace: NodeIndex, name: &str) -> Option<PathBuf> {
        let ws = self.graph.workspace(workspace);
        let project_root = self.graph.project_root();

        for dependency in ws.manifest.dependency_names(true) {
            for dir in ws.root.ancestors() {
                if !dir.starts_with(project_root) {
                    break;
                }
                let package_dir = dir.join("node_modules").join(dependency);
                if !package_dir.join(MANIFEST_FILE).is_file() {
                    continue;
                }
                let Ok(manifest) = Manifest::load(&package_dir) else {
                    debug!(dependency, "Unreadable dependency manifest, ignoring");
                    break;
                };
                if let Some((_, relative)) = manifest
                    .bin_entries()
                    .into_iter()
                    .find(|(bin, _)| bin == name)
                {
                    return Some(package_dir.join(relative));
                }
                break;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content.to_string()).unwrap();
    }

    fn project() -> (TempDir, WorkspaceGraph) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(
            &root.join("package.json"),
            &serde_json::json!({
                "name": "root",
                "workspaces": ["packages/*"],
                "scripts": { "test:colon": "echo global", "g:echo": "echo root", "print": "wsrun workspaces foreach --all run print" }
            }),
        );
        write(
            &root.join("packages/a/package.json"),
            &serde_json::json!({
                "name": "a",
                "scripts": { "print": "echo A" },
                "devDependencies": { "tool": "^1.0.0" }
            }),
        );
        write(
            &root.join("packages/g/package.json"),
            &serde_json::json!({ "name": "g", "scripts": { "g:echo": "echo G" } }),
        );
        write(
            &root.join("node_modules/tool/package.json"),
            &serde_json::json!({ "name": "@acme/tool", "bin": "cli.js" }),
        );
        let graph = WorkspaceGraph::load(root).unwrap();
        (temp, graph)
    }

    fn run(script: &str) -> CommandRequest {
        CommandRequest::Run {
            script: script.to_string(),
            args: vec![],
        }
    }

    #[test]
    fn test_from_words() {
        let words = |w: &[&str]| w.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        assert_eq!(
            CommandRequest::from_words(&words(&["run", "build", "--watch"])).unwrap(),
            CommandRequest::Run {
                script: "build".to_string(),
                args: vec!["--watch".to_string()]
            }
        );
        assert_eq!(
            CommandRequest::from_words(&words(&["exec", "echo", "42"])).unwrap(),
            CommandRequest::Exec {
                command: "echo".to_string(),
                args: vec!["42".to_string()]
            }
        );
        assert!(matches!(
            CommandRequest::from_words(&words(&["tsc"])).unwrap(),
            CommandRequest::Binary { .. }
        ));
        assert!(CommandRequest::from_words(&words(&["run"])).is_err());
        assert!(CommandRequest::from_words(&[]).is_err());
    }

    #[test]
    fn test_own_script() {
        let (_temp, graph) = project();
        let resolver = CommandResolver::new(&graph, None);
        let a = graph.find("a").unwrap();
        assert!(matches!(
            resolver.resolve(a, &run("print")),
            ResolvedCommand::Script { body, .. } if body == "echo A"
        ));
    }

    #[test]
    fn test_missing_script_is_skipped() {
        let (_temp, graph) = project();
        let resolver = CommandResolver::new(&graph, None);
        let g = graph.find("g").unwrap();
        assert_eq!(
            resolver.resolve(g, &run("print")),
            ResolvedCommand::Skip(SkipReason::NotDeclared)
        );
    }

    #[test]
    fn test_global_script_runs_everywhere() {
        let (_temp, graph) = project();
        let resolver = CommandResolver::new(&graph, None);
        for name in ["a", "g"] {
            let index = graph.find(name).unwrap();
            assert!(matches!(
                resolver.resolve(index, &run("test:colon")),
                ResolvedCommand::Script { body, .. } if body == "echo global"
            ));
        }
    }

    #[test]
    fn test_global_script_declared_twice_is_ordinary() {
        let (_temp, graph) = project();
        let resolver = CommandResolver::new(&graph, None);
        let a = graph.find("a").unwrap();
        let g = graph.find("g").unwrap();
        assert_eq!(
            resolver.resolve(a, &run("g:echo")),
            ResolvedCommand::Skip(SkipReason::NotDeclared)
        );
        assert!(matches!(
            resolver.resolve(g, &run("g:echo")),
            ResolvedCommand::Script { body, .. } if body == "echo G"
        ));
    }

    #[test]
    fn test_dependency_binary() {
        let (_temp, graph) = project();
        let resolver = CommandResolver::new(&graph, None);
        let a = graph.find("a").unwrap();
        let g = graph.find("g").unwrap();

        let ResolvedCommand::Binary { path, .. } = resolver.resolve(a, &run("tool")) else {
            panic!("expected a binary");
        };
        assert!(path.ends_with("node_modules/tool/cli.js"));

        // g does not declare the dependency
        assert_eq!(
            resolver.resolve(g, &run("tool")),
            ResolvedCommand::Skip(SkipReason::NotDeclared)
        );
    }

    #[test]
    fn test_bare_binary_falls_back_to_exec() {
        let (_temp, graph) = project();
        let resolver = CommandResolver::new(&graph, None);
        let g = graph.find("g").unwrap();
        let request = CommandRequest::Binary {
            name: "node".to_string(),
            args: vec!["-v".to_string()],
        };
        assert_eq!(
            resolver.resolve(g, &request),
            ResolvedCommand::Exec {
                command: "node".to_string(),
                args: vec!["-v".to_string()]
            }
        );
    }

    #[test]
    fn test_reentrant_workspace_is_skipped() {
        let (_temp, graph) = project();
        let root = graph.root();
        let resolver = CommandResolver::new(&graph, Some(("print", root)));
        assert_eq!(
            resolver.resolve(root, &run("print")),
            ResolvedCommand::Skip(SkipReason::Reentrant)
        );
        let a = graph.find("a").unwrap();
        assert!(matches!(
            resolver.resolve(a, &run("print")),
            ResolvedCommand::Script { .. }
        ));
        assert!(matches!(
            resolver.resolve(root, &run("test:colon")),
            ResolvedCommand::Script { .. }
        ));
    }

    #[test]
    fn test_command_line_quoting() {
        assert_eq!(join_command_line("echo", &[]).unwrap(), "echo");
        assert_eq!(
            join_command_line("node -p", &["a b".to_string(), "c".to_string()]).unwrap(),
            "node -p 'a b' c"
        );
    }

    #[test]
    fn test_skip_has_no_process() {
        let command = ResolvedCommand::Skip(SkipReason::NotDeclared);
        assert!(
            command
                .to_command(Path::new("."), &Environment::default())
                .unwrap()
                .is_none()
        );
    }
}
