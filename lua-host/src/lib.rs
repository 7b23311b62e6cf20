//! Stand-alone Lua interpreter host.
//!
//! Drives an embedded Lua engine from a command line: runs init code,
//! inline statements, libraries and scripts, and offers an interactive
//! loop, with Ctrl-C turned into a catchable `interrupted!` error.

pub mod args;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod line;
pub mod loader;
pub mod protect;
pub mod repl;
pub mod report;
