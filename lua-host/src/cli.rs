//! Command-line option scanning.
//!
//! Usage:
//!   lua [options] [script [args]]
//!
//! The scan is a single left-to-right pass.  It stops at the first token
//! that is not an option (the script name), at `--`, at `-`, or at the first
//! bad option.  No token is revisited once the scan has moved past it.

use std::path::PathBuf;

use thiserror::Error;

// ── Public types ──────────────────────────────────────────────────────────────

/// Startup flags collected by [`collect_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionMask(u8);

impl OptionMask {
    pub const EMPTY: OptionMask = OptionMask(0);
    /// `-e` appeared at least once.
    pub const EXECUTE: OptionMask = OptionMask(1 << 0);
    /// `-i`
    pub const INTERACTIVE: OptionMask = OptionMask(1 << 1);
    /// `-E`
    pub const IGNORE_ENV: OptionMask = OptionMask(1 << 2);
    /// `-v`, also implied by `-i`.
    pub const VERSION: OptionMask = OptionMask(1 << 3);

    pub fn contains(self, other: OptionMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: OptionMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: OptionMask) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for OptionMask {
    type Output = OptionMask;

    fn bitor(self, rhs: OptionMask) -> OptionMask {
        OptionMask(self.0 | rhs.0)
    }
}

/// An `-e` or `-l` request, kept in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `-e stat`
    Execute(String),
    /// `-l name`
    Library(String),
}

/// Where the main script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// The script name was `-` and no `--` preceded it.
    Stdin,
    File(PathBuf),
}

/// Result of a successful scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub mask: OptionMask,
    pub requests: Vec<Request>,
    /// Index into `argv` of the script name, if there is one.
    pub script: Option<usize>,
    /// Set when `--` ended the scan.
    pub end_of_options: bool,
}

impl Options {
    /// Resolve the script token to a source.
    pub fn script_source(&self, argv: &[String]) -> Option<ScriptSource> {
        let name = argv.get(self.script?)?;
        if name == "-" && !self.end_of_options {
            Some(ScriptSource::Stdin)
        } else {
            Some(ScriptSource::File(PathBuf::from(name)))
        }
    }

    pub fn ignore_env(&self) -> bool {
        self.mask.contains(OptionMask::IGNORE_ENV)
    }
}

/// A malformed command line.  Carries the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("'{0}' needs argument")]
    MissingArgument(String),
    #[error("unrecognized option '{0}'")]
    Unrecognized(String),
}

// ── Scanning ──────────────────────────────────────────────────────────────────

/// Scan `argv` (including the program name at index 0).
pub fn collect_options(argv: &[String]) -> Result<Options, OptionError> {
    let mut opts = Options::default();
    let mut i = 1;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // Non-option: this is the script name.
        let Some(rest) = arg.strip_prefix('-') else {
            opts.script = Some(i);
            return Ok(opts);
        };

        let mut chars = rest.chars();
        match chars.next() {
            // `-`: script "name" is `-`, i.e. stdin.
            None => {
                opts.script = Some(i);
                return Ok(opts);
            }

            // `--` ends option handling; everything after is the script.
            Some('-') => {
                if !chars.as_str().is_empty() {
                    return Err(OptionError::Unrecognized(arg.to_owned()));
                }
                opts.end_of_options = true;
                if i + 1 < argv.len() {
                    opts.script = Some(i + 1);
                }
                return Ok(opts);
            }

            Some(flag @ ('E' | 'i' | 'v')) => {
                if !chars.as_str().is_empty() {
                    return Err(OptionError::Unrecognized(arg.to_owned()));
                }
                opts.mask.insert(match flag {
                    'E' => OptionMask::IGNORE_ENV,
                    'i' => OptionMask::INTERACTIVE | OptionMask::VERSION,
                    _ => OptionMask::VERSION,
                });
            }

            // -e<stat> / -l<name>, concatenated or as the next token.
            Some(flag @ ('e' | 'l')) => {
                let inline = chars.as_str();
                let value = if !inline.is_empty() {
                    inline.to_owned()
                } else {
                    match argv.get(i + 1) {
                        Some(next) if !next.starts_with('-') => {
                            i += 1;
                            next.clone()
                        }
                        _ => return Err(OptionError::MissingArgument(arg.to_owned())),
                    }
                };
                if flag == 'e' {
                    opts.mask.insert(OptionMask::EXECUTE);
                    opts.requests.push(Request::Execute(value));
                } else {
                    opts.requests.push(Request::Library(value));
                }
            }

            Some(_) => return Err(OptionError::Unrecognized(arg.to_owned())),
        }
        i += 1;
    }

    Ok(opts)
}

/// Usage text printed after a bad option (no trailing newline).
pub fn usage(progname: &str) -> String {
    format!(
        "usage: {progname} [options] [script [args]]\n\
         Available options are:\n\
         \x20 -e stat  execute string 'stat'\n\
         \x20 -i       enter interactive mode after executing 'script'\n\
         \x20 -l name  require library 'name' into global 'name'\n\
         \x20 -v       show version information\n\
         \x20 -E       ignore environment variables\n\
         \x20 --       stop handling options\n\
         \x20 -        stop handling options and execute stdin"
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
