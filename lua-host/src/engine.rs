//! The embedded interpreter and the few things the host asks of it:
//! compiling source into a callable unit, calling units in protected mode,
//! and printing values.

use std::io::Read;
use std::path::Path;

use mlua::{Function, IntoLuaMulti, Lua, LuaOptions, MultiValue, StdLib, Value};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::HostError;
use crate::protect::{self, Outcome};

/// Registry flag telling `package` to ignore `LUA_PATH` / `LUA_CPATH`.
const NOENV_KEY: &str = "LUA_NOENV";

/// Chunk name used for anything read from standard input.
pub const STDIN_CHUNKNAME: &str = "=stdin";

pub struct Engine {
    lua: Lua,
    cancel: Cancellation,
    checkpoint_interval: u32,
}

impl Engine {
    /// Create a state with only the base library open.  `package` and the
    /// rest wait for [`Engine::open_libs`], which must see `LUA_NOENV` first.
    ///
    /// Fails with [`HostError::Allocation`] if the state cannot be created.
    pub fn new(checkpoint_interval: u32) -> Result<Self, HostError> {
        // SAFETY: a stand-alone interpreter exposes the full standard
        // library, `debug` and C module loading included.
        let lua = std::panic::catch_unwind(|| unsafe {
            Lua::unsafe_new_with(StdLib::NONE, LuaOptions::new())
        })
        .map_err(|_| HostError::Allocation)?;
        Ok(Self {
            lua,
            cancel: Cancellation::new(),
            checkpoint_interval,
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Open the standard libraries and prepare protected calls.
    ///
    /// With `ignore_env` the registry flag `LUA_NOENV` is set first, so the
    /// package library skips the environment while initialising.
    pub fn open_libs(&self, ignore_env: bool) -> Result<(), HostError> {
        if ignore_env {
            self.lua.set_named_registry_value(NOENV_KEY, true)?;
        }
        self.lua.load_std_libs(StdLib::ALL)?;
        protect::install(&self.lua)?;
        debug!(ignore_env, "standard libraries open");
        Ok(())
    }

    // ── Compilation ───────────────────────────────────────────────────────────

    /// Compile `source` under `chunkname` (`=name` or `@file`).
    pub fn compile(&self, source: impl AsRef<[u8]>, chunkname: &str) -> Result<Function, HostError> {
        let func = self
            .lua
            .load(source.as_ref())
            .set_name(chunkname)
            .into_function()?;
        Ok(func)
    }

    /// Compile a file, or standard input when `path` is `None`.
    ///
    /// A leading byte-order mark and `#` line are skipped; the newline after
    /// a `#` line is kept so line numbers stay right.
    pub fn compile_file(&self, path: Option<&Path>) -> Result<Function, HostError> {
        let (shown, chunkname, bytes) = match path {
            Some(p) => {
                let shown = p.display().to_string();
                let bytes = std::fs::read(p).map_err(|e| file_error("open", &shown, &e))?;
                let chunkname = format!("@{shown}");
                (shown, chunkname, bytes)
            }
            None => {
                let mut bytes = Vec::new();
                std::io::stdin()
                    .lock()
                    .read_to_end(&mut bytes)
                    .map_err(|e| file_error("read", "stdin", &e))?;
                ("stdin".to_owned(), STDIN_CHUNKNAME.to_owned(), bytes)
            }
        };
        debug!(file = %shown, len = bytes.len(), "compiling file");
        self.compile(skip_prelude(&bytes), &chunkname)
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Call `callee` through the protected-call wrapper.
    pub fn invoke(&self, callee: impl Into<Callee>, args: impl IntoLuaMulti) -> Outcome {
        protect::invoke(
            &self.lua,
            &self.cancel,
            self.checkpoint_interval,
            callee.into().0,
            args,
        )
    }

    /// Pass `values` to the current global `print`, in protected mode like
    /// any other user code.  Nothing is printed for an empty list.
    pub fn print_values(&self, values: Vec<Value>) -> Result<(), HostError> {
        if values.is_empty() {
            return Ok(());
        }
        let print: Value = self.lua.globals().get("print")?;
        self.invoke(print, MultiValue::from_iter(values)).map(drop)
    }

    /// A global coerced to a string, if it is a string or number.
    pub fn global_string(&self, name: &str) -> Option<String> {
        let value = self.lua.globals().get::<Value>(name).ok()?;
        let s = self.lua.coerce_string(value).ok()??;
        Some(String::from(s.to_string_lossy()))
    }
}

/// Anything the protected-call wrapper can call.
pub struct Callee(Value);

impl From<Function> for Callee {
    fn from(f: Function) -> Self {
        Callee(Value::Function(f))
    }
}

impl From<Value> for Callee {
    fn from(v: Value) -> Self {
        Callee(v)
    }
}

fn file_error(action: &'static str, name: &str, err: &std::io::Error) -> HostError {
    HostError::File {
        action,
        name: name.to_owned(),
        reason: io_reason(err),
    }
}

/// The OS description of an I/O error without Rust's "(os error N)" suffix.
fn io_reason(err: &std::io::Error) -> String {
    let text = err.to_string();
    match text.find(" (os error") {
        Some(cut) => text[..cut].to_owned(),
        None => text,
    }
}

/// Skip a UTF-8 BOM and a first line starting with `#`.
fn skip_prelude(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if bytes.first() == Some(&b'#') {
        match bytes.iter().position(|&b| b == b'\n') {
            Some(nl) => &bytes[nl..],
            None => &[],
        }
    } else {
        bytes
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
