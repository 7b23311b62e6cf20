//! The orchestrator: turns a command line into a sequence of runs.
//!
//! Order of business, once options are scanned:
//!
//! 1. bad option → usage, fail;  `-v`/`-i` → banner
//! 2. standard libraries, then the global `arg`
//! 3. init variable, unless `-E`
//! 4. `-e` and `-l` requests, in command-line order
//! 5. the script, if any
//! 6. `-i` → REPL; or, with nothing else to do, REPL on a terminal and
//!    stdin as a script otherwise
//!
//! The whole sequence runs as a Rust function called from Lua in protected
//! mode, so a failure anywhere in it is reported like any script failure.

use std::process::ExitCode;

use mlua::Lua;
use tracing::{debug, info, warn};

use crate::args::ArgumentTable;
use crate::cli::{collect_options, usage, OptionMask, Options, Request};
use crate::config::{HostConfig, InitRequest, LUA_COPYRIGHT};
use crate::engine::Engine;
use crate::error::HostError;
use crate::line::{EditorReader, LineReader, PlainReader};
use crate::loader;
use crate::repl::Repl;
use crate::report::Reporter;

/// Chunk name for `-e` code.
const COMMAND_LINE_CHUNKNAME: &str = "=(command line)";

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

pub struct Host {
    config: HostConfig,
    reporter: Reporter,
    stdin_is_tty: bool,
    env: EnvLookup,
    /// Reader for the REPL.  Chosen from the terminal state when unset.
    reader: Option<Box<dyn LineReader>>,
}

/// Run the interpreter for `argv` and map the result to an exit status.
pub fn launch(argv: Vec<String>) -> ExitCode {
    let mut host = Host::new(HostConfig::default());
    if host.run(&argv) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        let reporter = Reporter::stderr(Some(config.progname.clone()));
        Self {
            config,
            reporter,
            stdin_is_tty: stdin_is_tty(),
            env: Box::new(|name| std::env::var(name).ok()),
            reader: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_reader(mut self, reader: Box<dyn LineReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_tty(mut self, is_tty: bool) -> Self {
        self.stdin_is_tty = is_tty;
        self
    }

    /// Replace the environment the init variable is read from.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env = Box::new(lookup);
        self
    }

    /// Run everything `argv` asks for.  Returns whether it all succeeded.
    pub fn run(&mut self, argv: &[String]) -> bool {
        if let Some(name) = argv.first().filter(|s| !s.is_empty()) {
            self.reporter.set_progname(Some(name.clone()));
        }

        let engine = match Engine::new(self.config.checkpoint_interval) {
            Ok(engine) => engine,
            Err(e) => {
                self.reporter.error(&e);
                return false;
            }
        };

        let lua: Lua = engine.lua().clone();
        let result = lua.scope(|scope| {
            let pmain = scope.create_function_mut(|_, ()| {
                self.pmain(&engine, argv).map_err(mlua::Error::external)
            })?;
            pmain.call::<bool>(())
        });

        match result {
            Ok(ok) => ok,
            Err(e) => {
                self.reporter.error(&HostError::from(e));
                false
            }
        }
    }

    fn pmain(&mut self, engine: &Engine, argv: &[String]) -> Result<bool, HostError> {
        let opts = match collect_options(argv) {
            Ok(opts) => opts,
            Err(e) => {
                self.reporter.error(&HostError::from(e));
                let progname = argv.first().map_or(self.config.progname.as_str(), String::as_str);
                self.reporter.plain(&usage(progname));
                return Ok(false);
            }
        };
        debug!(?opts, "options collected");

        if opts.mask.contains(OptionMask::VERSION) {
            print_version();
        }

        engine.open_libs(opts.ignore_env())?;
        ArgumentTable::new(argv, opts.script).publish(engine.lua())?;

        if !opts.ignore_env() && !self.run_init(engine) {
            return Ok(false);
        }
        if !self.run_requests(engine, &opts)? {
            return Ok(false);
        }
        if let Some(source) = opts.script_source(argv) {
            if !loader::run_script(engine, &mut self.reporter, &source)? {
                return Ok(false);
            }
        }

        if opts.mask.contains(OptionMask::INTERACTIVE) {
            self.repl(engine, &opts)?;
        } else if opts.script.is_none()
            && !opts.mask.intersects(OptionMask::EXECUTE | OptionMask::VERSION)
        {
            if self.stdin_is_tty {
                print_version();
                self.repl(engine, &opts)?;
            } else {
                return Ok(loader::run_file(engine, &mut self.reporter, None));
            }
        }
        Ok(true)
    }

    fn run_init(&mut self, engine: &Engine) -> bool {
        match self.config.init_request_from(&self.env) {
            None => true,
            Some(InitRequest::File(path)) => {
                info!(path = %path.display(), "running init file");
                loader::run_file(engine, &mut self.reporter, Some(&path))
            }
            Some(InitRequest::Code { source, chunkname }) => {
                info!(%chunkname, "running init code");
                loader::run_string(engine, &mut self.reporter, &source, &chunkname)
            }
        }
    }

    fn run_requests(&mut self, engine: &Engine, opts: &Options) -> Result<bool, HostError> {
        for request in &opts.requests {
            let ok = match request {
                Request::Execute(code) => {
                    loader::run_string(engine, &mut self.reporter, code, COMMAND_LINE_CHUNKNAME)
                }
                Request::Library(name) => loader::run_library(engine, &mut self.reporter, name)?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn repl(&mut self, engine: &Engine, opts: &Options) -> Result<(), HostError> {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => self.default_reader(opts),
        };
        Repl::new(engine, &mut self.reporter, reader.as_mut(), &self.config).run()
    }

    fn default_reader(&self, opts: &Options) -> Box<dyn LineReader> {
        if !self.stdin_is_tty {
            return Box::new(PlainReader::stdio());
        }
        let history = self.config.history_path(opts.ignore_env());
        match EditorReader::new(history, self.config.history_size) {
            Ok(editor) => Box::new(editor),
            Err(e) => {
                warn!(error = %e, "line editor unavailable, falling back to plain input");
                Box::new(PlainReader::stdio())
            }
        }
    }
}

fn print_version() {
    println!("{LUA_COPYRIGHT}");
}

fn stdin_is_tty() -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
