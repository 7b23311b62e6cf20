//! Host error taxonomy.
//!
//! Every failure the host can observe is funnelled into a [`HostError`]
//! before it reaches a reporting point.  Only the orchestrator and the REPL
//! decide whether an error ends the process; everything below them returns
//! `Result<_, HostError>` and propagates with `?`.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::cli::OptionError;

/// Suffix the compiler puts on a syntax error caused by truncated source.
pub const EOF_MARK: &str = "<eof>";

// ── HostError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// Malformed command line.
    #[error(transparent)]
    Option(#[from] OptionError),

    /// The chunk failed to compile.  `incomplete` is set when the message
    /// ends with [`EOF_MARK`], i.e. more input could still make it valid.
    #[error("{message}")]
    Compile { message: String, incomplete: bool },

    /// A source file could not be opened or read.
    #[error("cannot {action} {name}: {reason}")]
    File {
        action: &'static str,
        name: String,
        reason: String,
    },

    /// The chunk raised an error while running.
    #[error("{0}")]
    Runtime(String),

    /// The chunk was stopped by an interrupt request.
    #[error("{0}")]
    Interrupted(String),

    /// The engine ran out of memory mid-execution.
    #[error("{0}")]
    Memory(String),

    /// No execution context could be created at all.
    #[error("cannot create state: not enough memory")]
    Allocation,

    /// The line editor failed for a reason other than end of input.
    #[error("line editor: {0}")]
    Editor(String),

    #[error(transparent)]
    Io(Arc<io::Error>),
}

impl HostError {
    /// Build a compile error, classifying it by its trailing marker.
    pub fn compile(message: impl Into<String>) -> Self {
        let message = message.into();
        let incomplete = message.ends_with(EOF_MARK);
        HostError::Compile { message, incomplete }
    }

    /// Whether the REPL may report this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, HostError::Memory(_) | HostError::Allocation)
    }

    /// Whether this is a syntax error caused by input that ended too early.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, HostError::Compile { incomplete: true, .. })
    }
}

impl From<io::Error> for HostError {
    fn from(err: io::Error) -> Self {
        HostError::Io(Arc::new(err))
    }
}

impl From<rustyline::error::ReadlineError> for HostError {
    fn from(err: rustyline::error::ReadlineError) -> Self {
        match err {
            rustyline::error::ReadlineError::Io(e) => HostError::from(e),
            other => HostError::Editor(other.to_string()),
        }
    }
}

impl From<mlua::Error> for HostError {
    fn from(err: mlua::Error) -> Self {
        match err {
            // The marker test is ours, not mlua's, so both agree on what
            // "incomplete" means.
            mlua::Error::SyntaxError { message, .. } => HostError::compile(message),
            mlua::Error::MemoryError(msg) => HostError::Memory(msg),
            mlua::Error::CallbackError { cause, .. } => HostError::from((*cause).clone()),
            mlua::Error::RuntimeError(msg) => HostError::Runtime(msg),
            mlua::Error::ExternalError(inner) => match inner.downcast_ref::<HostError>() {
                Some(host) => host.clone(),
                None => HostError::Runtime(inner.to_string()),
            },
            other => HostError::Runtime(other.to_string()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
