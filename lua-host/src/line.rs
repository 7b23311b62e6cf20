//! Line input for the REPL.
//!
//! The REPL only needs two things from whatever reads its input: a line for
//! a prompt, and somewhere to put lines worth remembering.  [`LineReader`]
//! is that seam.  The interactive binary uses [`EditorReader`] (rustyline,
//! with persistent history); piped input and tests use the plain readers.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use crate::error::HostError;

/// What one read produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A line of input, without its terminator.
    Text(String),
    /// The user pressed Ctrl-C while editing.
    Interrupted,
    /// No more input.
    Eof,
}

pub trait LineReader {
    /// Show `prompt` and read one line.
    fn read_line(&mut self, prompt: &str) -> Result<Line, HostError>;

    /// Record `line` in the history, if the reader keeps one.
    fn save_line(&mut self, line: &str);
}

// ── PlainReader ───────────────────────────────────────────────────────────────

/// Prompt on a writer, read from a buffered reader.  No editing, no history.
pub struct PlainReader<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PlainReader<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PlainReader<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LineReader for PlainReader<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<Line, HostError> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            return Ok(Line::Eof);
        }
        if buf.ends_with('\n') {
            buf.pop();
        }
        Ok(Line::Text(buf))
    }

    fn save_line(&mut self, _line: &str) {}
}

// ── EditorReader ──────────────────────────────────────────────────────────────

/// rustyline-backed reader.  History is loaded on creation and written back
/// when the reader is dropped.
pub struct EditorReader {
    editor: DefaultEditor,
    history: Option<PathBuf>,
}

impl EditorReader {
    pub fn new(history: Option<PathBuf>, max_history: usize) -> Result<Self, HostError> {
        let config = Config::builder()
            .max_history_size(max_history)?
            .auto_add_history(false)
            .build();
        let mut editor = DefaultEditor::with_config(config)?;
        if let Some(path) = &history {
            // A missing file just means a fresh history.
            match editor.load_history(path) {
                Ok(()) => debug!(path = %path.display(), "history loaded"),
                Err(e) => debug!(path = %path.display(), error = %e, "no history loaded"),
            }
        }
        Ok(Self { editor, history })
    }
}

impl LineReader for EditorReader {
    fn read_line(&mut self, prompt: &str) -> Result<Line, HostError> {
        match self.editor.readline(prompt) {
            Ok(text) => Ok(Line::Text(text)),
            Err(ReadlineError::Interrupted) => Ok(Line::Interrupted),
            Err(ReadlineError::Eof) => Ok(Line::Eof),
            Err(e) => Err(e.into()),
        }
    }

    fn save_line(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            warn!(error = %e, "could not add history entry");
        }
    }
}

impl Drop for EditorReader {
    fn drop(&mut self) {
        let Some(path) = &self.history else { return };
        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "could not create history directory");
                return;
            }
        }
        if let Err(e) = self.editor.save_history(path) {
            warn!(path = %path.display(), error = %e, "could not save history");
        }
    }
}

// ── ScriptedReader ────────────────────────────────────────────────────────────

/// Replays a fixed sequence of reads and remembers what was saved.
///
/// Runs out with [`Line::Eof`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedReader {
    script: VecDeque<Line>,
    pub prompts: Vec<String>,
    pub saved: Vec<String>,
}

impl ScriptedReader {
    pub fn new(lines: impl IntoIterator<Item = Line>) -> Self {
        Self {
            script: lines.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Shorthand for a script made only of text lines.
    pub fn from_text<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self::new(lines.into_iter().map(|s| Line::Text(s.into())))
    }
}

impl LineReader for ScriptedReader {
    fn read_line(&mut self, prompt: &str) -> Result<Line, HostError> {
        self.prompts.push(prompt.to_owned());
        Ok(self.script.pop_front().unwrap_or(Line::Eof))
    }

    fn save_line(&mut self, line: &str) {
        self.saved.push(line.to_owned());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
