//! Running files, strings, and libraries.
//!
//! Each entry point compiles (or looks up) something callable, runs it
//! through [`Engine::invoke`], reports any failure, and tells the caller
//! whether it went well.

use std::path::Path;

use mlua::Value;
use tracing::{debug, info};

use crate::args::script_arguments;
use crate::cli::ScriptSource;
use crate::engine::Engine;
use crate::error::HostError;
use crate::report::Reporter;

/// Compile a file (stdin when `path` is `None`) and run it without
/// arguments.
pub fn run_file(engine: &Engine, reporter: &mut Reporter, path: Option<&Path>) -> bool {
    let outcome = engine
        .compile_file(path)
        .and_then(|f| engine.invoke(f, ()));
    reporter.check(&outcome)
}

/// Run the main script with the live `arg` table's positional entries as
/// its arguments.
///
/// A compile or runtime failure is reported and yields `Ok(false)`.  An
/// `arg` global that is no longer a table is not the script's fault and is
/// returned as an error for the orchestrator to report.
pub fn run_script(
    engine: &Engine,
    reporter: &mut Reporter,
    source: &ScriptSource,
) -> Result<bool, HostError> {
    let path = match source {
        ScriptSource::Stdin => None,
        ScriptSource::File(p) => Some(p.as_path()),
    };
    let func = match engine.compile_file(path) {
        Ok(f) => f,
        Err(e) => {
            reporter.error(&e);
            return Ok(false);
        }
    };
    let args = script_arguments(engine.lua())?;
    info!(script = ?source, nargs = args.len(), "running script");
    let outcome = engine.invoke(func, args);
    Ok(reporter.check(&outcome))
}

/// Compile `source` under `chunkname` and run it.  Results are discarded.
pub fn run_string(engine: &Engine, reporter: &mut Reporter, source: &str, chunkname: &str) -> bool {
    debug!(chunkname, "running string");
    let outcome = engine
        .compile(source, chunkname)
        .and_then(|f| engine.invoke(f, ()));
    reporter.check(&outcome)
}

/// `name = require(name)`.
pub fn run_library(engine: &Engine, reporter: &mut Reporter, name: &str) -> Result<bool, HostError> {
    let require: Value = engine.lua().globals().get("require")?;
    debug!(name, "loading library");
    match engine.invoke(require, name) {
        Ok(values) => {
            let module = values.into_iter().next().unwrap_or(Value::Nil);
            engine.lua().globals().set(name, module)?;
            Ok(true)
        }
        Err(e) => {
            reporter.error(&e);
            Ok(false)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
