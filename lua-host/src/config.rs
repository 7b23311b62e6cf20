//! Host configuration: program identity, prompts, startup environment, and
//! recall-history location.
//!
//! | Setting                 | Default                          | Override            |
//! |-------------------------|----------------------------------|---------------------|
//! | program name            | `lua`                            | `argv[0]`           |
//! | first / continuation prompt | `"> "` / `">> "`             | `_PROMPT` / `_PROMPT2` globals |
//! | startup code            | none                             | `LUA_INIT_5_4`, then `LUA_INIT` |
//! | history file            | platform data dir + `history`    | `LUA_HISTORY`       |

use std::path::PathBuf;

use directories::ProjectDirs;

// ── Engine identity ───────────────────────────────────────────────────────────

#[cfg(all(feature = "lua54", feature = "lua53"))]
compile_error!(
    "features `lua54` and `lua53` are mutually exclusive; \
     build with `--no-default-features --features lua53`"
);

#[cfg(feature = "lua54")]
mod version {
    pub const LUA_VERSUFFIX: &str = "_5_4";
    pub const LUA_COPYRIGHT: &str = "Lua 5.4  Copyright (C) 1994-2024 Lua.org, PUC-Rio";
}

#[cfg(all(feature = "lua53", not(feature = "lua54")))]
mod version {
    pub const LUA_VERSUFFIX: &str = "_5_3";
    pub const LUA_COPYRIGHT: &str = "Lua 5.3  Copyright (C) 1994-2018 Lua.org, PUC-Rio";
}

pub use version::{LUA_COPYRIGHT, LUA_VERSUFFIX};

/// Sigil that turns the init variable into a file name.
pub const INIT_FILE_SIGIL: char = '@';

/// Environment variable overriding the history file location.
pub const HISTORY_VAR: &str = "LUA_HISTORY";

// ── InitRequest ───────────────────────────────────────────────────────────────

/// Startup code named by the init environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitRequest {
    /// `@path`: run the named file.
    File(PathBuf),
    /// Anything else: run the value as source.  `chunkname` tags diagnostics
    /// with the variable it came from.
    Code { source: String, chunkname: String },
}

// ── HostConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Prefix for diagnostics outside interactive mode.
    pub progname: String,
    pub prompt: String,
    pub prompt2: String,
    /// Version-agnostic init variable; the versioned name is tried first.
    pub init_var: String,
    /// Explicit history file.  `None` defers to [`HostConfig::history_path`]'s
    /// search.
    pub history_file: Option<PathBuf>,
    /// Whether interactive sessions load and save history at all.
    pub persist_history: bool,
    pub history_size: usize,
    /// Instructions between two cancellation checkpoints.
    pub checkpoint_interval: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            progname: "lua".to_owned(),
            prompt: "> ".to_owned(),
            prompt2: ">> ".to_owned(),
            init_var: "LUA_INIT".to_owned(),
            history_file: None,
            persist_history: true,
            history_size: 1000,
            checkpoint_interval: 1000,
        }
    }
}

impl HostConfig {
    /// `LUA_INIT_5_4` (or the suffix of the selected engine).
    pub fn versioned_init_var(&self) -> String {
        format!("{}{}", self.init_var, LUA_VERSUFFIX)
    }

    /// Resolve the init variable through `lookup`, usually the process
    /// environment.
    ///
    /// The versioned name wins; the plain name is only consulted when the
    /// versioned one is unset.
    pub fn init_request_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<InitRequest> {
        let versioned = self.versioned_init_var();
        let (name, value) = match lookup(&versioned) {
            Some(v) => (versioned, v),
            None => (self.init_var.clone(), lookup(&self.init_var)?),
        };
        match value.strip_prefix(INIT_FILE_SIGIL) {
            Some(path) => Some(InitRequest::File(PathBuf::from(path))),
            None => Some(InitRequest::Code {
                source: value,
                chunkname: format!("={name}"),
            }),
        }
    }

    /// Where interactive history lives, if anywhere.
    ///
    /// Priority: explicit `history_file` → `LUA_HISTORY` (skipped when the
    /// environment is ignored) → `<data dir>/history`.
    pub fn history_path(&self, ignore_env: bool) -> Option<PathBuf> {
        if !self.persist_history {
            return None;
        }
        if let Some(p) = &self.history_file {
            return Some(p.clone());
        }
        if !ignore_env {
            if let Ok(p) = std::env::var(HISTORY_VAR) {
                if !p.is_empty() {
                    return Some(PathBuf::from(p));
                }
            }
        }
        ProjectDirs::from("org", "lua", "lua-host").map(|d| d.data_dir().join("history"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
