use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

/// Variable holding the log filter, e.g. `LUA_HOST_LOG=lua_host=debug`.
const LOG_ENV: &str = "LUA_HOST_LOG";

fn main() -> ExitCode {
    init_logging();
    lua_host::host::launch(
        std::env::args_os()
            .map(|a| a.to_string_lossy().into_owned())
            .collect(),
    )
}

/// Diagnostics for the host itself go to stderr, quiet unless asked for.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
