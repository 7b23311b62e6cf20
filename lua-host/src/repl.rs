//! The read-eval-print loop.
//!
//! Each iteration reads one logical statement, which may span several
//! lines:
//!
//! ```text
//!             ┌──────────────── Eof ────────────────► Done
//!             │
//!   AwaitFirstLine ── "return <line>;" compiles ──► Ready ── invoke, print ──┐
//!       ▲     │                                                              │
//!       │     └── otherwise ──► AwaitContinuation ── compiles ──► Ready      │
//!       │                         │  ▲                                       │
//!       │                         │  └── ends in <eof>, got another line     │
//!       │                         └── other error, or no more input          │
//!       │                                  ▼                                 │
//!       └──────────── report ───────── SyntaxError                           │
//!       └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bare expressions are tried first so that `2+2` prints `4`, while
//! `x = 2+2` falls through to the statement path and prints nothing.

use mlua::Function;
use tracing::{debug, trace};

use crate::config::HostConfig;
use crate::engine::{Engine, STDIN_CHUNKNAME};
use crate::error::HostError;
use crate::line::{Line, LineReader};
use crate::report::Reporter;

/// Legacy first-line prefix meaning `return`.
const RETURN_SIGIL: char = '=';

enum State {
    AwaitFirstLine,
    /// Holds every line of the statement read so far, newline-joined.
    AwaitContinuation(String),
    Ready(Function),
    SyntaxError(HostError),
    Done,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::AwaitFirstLine => "await-first-line",
            State::AwaitContinuation(_) => "await-continuation",
            State::Ready(_) => "ready",
            State::SyntaxError(_) => "syntax-error",
            State::Done => "done",
        }
    }
}

pub struct Repl<'a> {
    engine: &'a Engine,
    reporter: &'a mut Reporter,
    reader: &'a mut dyn LineReader,
    prompt: &'a str,
    prompt2: &'a str,
}

impl<'a> Repl<'a> {
    pub fn new(
        engine: &'a Engine,
        reporter: &'a mut Reporter,
        reader: &'a mut dyn LineReader,
        config: &'a HostConfig,
    ) -> Self {
        Self {
            engine,
            reporter,
            reader,
            prompt: &config.prompt,
            prompt2: &config.prompt2,
        }
    }

    /// Run until end of input.
    ///
    /// Diagnostics carry no program-name prefix while the loop runs.  An
    /// error comes back only when the loop cannot go on: the line editor
    /// failed or the engine ran out of memory.
    pub fn run(&mut self) -> Result<(), HostError> {
        let saved = self.reporter.set_progname(None);
        debug!("entering interactive mode");
        let result = self.run_loop();
        println!();
        self.reporter.set_progname(saved);
        debug!(ok = result.is_ok(), "leaving interactive mode");
        result
    }

    fn run_loop(&mut self) -> Result<(), HostError> {
        let mut state = State::AwaitFirstLine;
        loop {
            trace!(state = state.name(), "repl");
            state = match state {
                State::AwaitFirstLine => match self.read(true)? {
                    Line::Text(line) => self.try_expression(line),
                    Line::Interrupted => State::AwaitFirstLine,
                    Line::Eof => State::Done,
                },
                State::AwaitContinuation(buffer) => self.try_statement(buffer)?,
                State::Ready(func) => {
                    self.execute(func)?;
                    State::AwaitFirstLine
                }
                State::SyntaxError(err) => {
                    self.reporter.error(&err);
                    State::AwaitFirstLine
                }
                State::Done => return Ok(()),
            };
        }
    }

    fn read(&mut self, first: bool) -> Result<Line, HostError> {
        let (global, fallback) = if first {
            ("_PROMPT", self.prompt)
        } else {
            ("_PROMPT2", self.prompt2)
        };
        let prompt = self
            .engine
            .global_string(global)
            .unwrap_or_else(|| fallback.to_owned());
        self.reader.read_line(&prompt)
    }

    fn save(&mut self, line: &str) {
        if !line.is_empty() {
            self.reader.save_line(line);
        }
    }

    /// Compile the first line as `return <line>;`.
    fn try_expression(&mut self, line: String) -> State {
        let line = match line.strip_prefix(RETURN_SIGIL) {
            Some(rest) => format!("return {rest}"),
            None => line,
        };
        match self.engine.compile(format!("return {line};"), STDIN_CHUNKNAME) {
            Ok(func) => {
                self.save(&line);
                State::Ready(func)
            }
            Err(_) => State::AwaitContinuation(line),
        }
    }

    /// Compile the buffer as a statement, reading more lines while the only
    /// problem is that it ended too early.
    fn try_statement(&mut self, buffer: String) -> Result<State, HostError> {
        let err = match self.engine.compile(&buffer, STDIN_CHUNKNAME) {
            Ok(func) => {
                self.save(&buffer);
                return Ok(State::Ready(func));
            }
            Err(e) => e,
        };
        if !err.is_incomplete() {
            self.save(&buffer);
            return Ok(State::SyntaxError(err));
        }
        match self.read(false)? {
            Line::Text(more) => Ok(State::AwaitContinuation(format!("{buffer}\n{more}"))),
            Line::Eof => {
                self.save(&buffer);
                Ok(State::SyntaxError(err))
            }
            Line::Interrupted => {
                debug!("pending input discarded");
                Ok(State::AwaitFirstLine)
            }
        }
    }

    fn execute(&mut self, func: Function) -> Result<(), HostError> {
        match self.engine.invoke(func, ()) {
            Ok(values) => {
                if let Err(e) = self.engine.print_values(values) {
                    self.reporter.message(&format!("error calling 'print' ({e})"));
                }
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.reporter.error(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
