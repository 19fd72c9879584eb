//! wsrun - run commands across the workspaces of a `package.json` monorepo
//!
//! The binary is a thin layer over [`wsrun_core`]: [`cli`] parses flags,
//! [`commands`] turns them into a plan and runs it, [`tracing`] sets up
//! diagnostics on stderr and [`shutdown`] maps signals onto cancellation.

// The CLI reports errors on stderr directly
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
pub mod shutdown;
pub mod tracing;
