//! Monorepo fixtures shared by the core and CLI integration tests.
//!
//! ```text
//! root            workspaces: packages/*
//! ├─ workspace-a
//! ├─ workspace-b  -> a, c
//! └─ workspace-c  -> a, workspaces: packages/*
//!    ├─ workspace-d  -> b, workspaces: packages/*
//!    │  └─ workspace-e  -> d
//!    ├─ workspace-f  -> e
//!    └─ workspace-g
//! ```
//!
//! Every workspace has a `print` script echoing `Test Workspace <LETTER>`.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Writes `manifest` as `dir/package.json`.
pub fn write(dir: &Path, manifest: &serde_json::Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("package.json"), manifest.to_string()).unwrap();
}

/// Creates `dir/workspace-<letter>` depending on `deps` through `workspace:*`.
pub fn workspace(dir: &Path, letter: char, deps: &[char], nested: bool) {
    let name = format!("workspace-{}", letter.to_ascii_lowercase());
    let dependencies: serde_json::Map<String, serde_json::Value> = deps
        .iter()
        .map(|dep| {
            (
                format!("workspace-{}", dep.to_ascii_lowercase()),
                serde_json::Value::from("workspace:*"),
            )
        })
        .collect();
    let mut manifest = serde_json::json!({
        "name": name,
        "scripts": { "print": format!("echo Test Workspace {letter}") },
        "dependencies": dependencies,
    });
    if nested {
        manifest["workspaces"] = serde_json::json!(["packages/*"]);
    }
    write(&dir.join(&name), &manifest);
}

/// A private root declaring `packages/*`, with `root_scripts`.
pub fn root(root_scripts: serde_json::Value) -> TempDir {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        &serde_json::json!({
            "private": true,
            "workspaces": ["packages/*"],
            "scripts": root_scripts,
        }),
    );
    temp
}

/// The six-workspace fixture above.
pub fn project(root_scripts: serde_json::Value) -> TempDir {
    let temp = root(root_scripts);
    let packages = temp.path().join("packages");
    workspace(&packages, 'A', &[], false);
    workspace(&packages, 'B', &['A', 'C'], false);
    workspace(&packages, 'C', &['A'], true);
    let c = packages.join("workspace-c/packages");
    workspace(&c, 'D', &['B'], true);
    workspace(&c.join("workspace-d/packages"), 'E', &['D'], false);
    workspace(&c, 'F', &['E'], false);
    workspace(&c, 'G', &[], false);
    temp
}

/// Two workspaces depending on each other.
pub fn cyclic_project() -> TempDir {
    let temp = root(serde_json::json!({}));
    let packages = temp.path().join("packages");
    workspace(&packages, 'A', &['B'], false);
    workspace(&packages, 'B', &['A'], false);
    temp
}

/// Sets `scripts.<script>` in `dir/package.json`.
pub fn set_script(dir: &Path, script: &str, body: &str) {
    let path = dir.join("package.json");
    let mut manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    manifest["scripts"][script] = serde_json::Value::from(body);
    fs::write(path, manifest.to_string()).unwrap();
}
