//! User-visible diagnostics.
//!
//! One line (plus any traceback the message already carries) per error,
//! written to the diagnostic stream and prefixed with the program name.  The
//! prefix is suppressed while the REPL runs.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::error::HostError;

pub struct Reporter {
    progname: Option<String>,
    sink: Box<dyn Write>,
}

impl Reporter {
    /// Report to stderr.
    pub fn stderr(progname: Option<String>) -> Self {
        Self::with_sink(progname, Box::new(io::stderr()))
    }

    pub fn with_sink(progname: Option<String>, sink: Box<dyn Write>) -> Self {
        Self { progname, sink }
    }

    pub fn progname(&self) -> Option<&str> {
        self.progname.as_deref()
    }

    /// Replace the prefix, returning the old one.
    pub fn set_progname(&mut self, progname: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.progname, progname)
    }

    /// Write `msg` as one diagnostic.
    pub fn message(&mut self, msg: &str) {
        // Nothing sensible to do if stderr itself is gone.
        let _ = match &self.progname {
            Some(p) => writeln!(self.sink, "{p}: {msg}"),
            None => writeln!(self.sink, "{msg}"),
        };
        let _ = self.sink.flush();
    }

    /// Write `text` and a newline with no prefix.
    pub fn plain(&mut self, text: &str) {
        let _ = writeln!(self.sink, "{text}");
        let _ = self.sink.flush();
    }

    pub fn error(&mut self, err: &HostError) {
        self.message(&err.to_string());
    }

    /// Report the error half of `result`, if any.  Returns whether it was
    /// `Ok`.
    pub fn check<T>(&mut self, result: &Result<T, HostError>) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                self.error(e);
                false
            }
        }
    }
}

// ── SharedBuffer ──────────────────────────────────────────────────────────────

/// A cloneable in-memory sink, so callers can inspect what a [`Reporter`]
/// wrote.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
