//! Library crate for `scr`, the safe command runner.
//!
//! `src/main.rs` is a thin CLI wrapper around the modules exported here,
//! the same split the teacher's own crate would use if its `tests/`
//! integration tests were to exercise library code directly rather than
//! talking to the MCP server over stdio.

pub mod allowlist;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod env_filter;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod path_resolve;
pub mod process;
pub mod record;
pub mod template;
pub mod vars;
pub mod verify;
pub mod workspace;
