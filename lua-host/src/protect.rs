//! Protected calls.
//!
//! [`invoke`] is the only path by which user code reaches the engine.  It
//! runs the callee under `xpcall` with a message handler that turns any
//! error payload into a readable string with a traceback, and keeps the
//! interrupt machinery of [`crate::cancel`] armed for exactly the duration
//! of the call.  Whatever happens inside, the caller gets an [`Outcome`].

use mlua::{Function, IntoLuaMulti, Lua, MultiValue, Table, Value};
use tracing::{debug, trace};

use crate::cancel::Cancellation;
use crate::error::HostError;

/// Values returned by the callee, or why there are none.
pub type Outcome = Result<Vec<Value>, HostError>;

const XPCALL_KEY: &str = "lua_host.xpcall";
const HANDLER_KEY: &str = "lua_host.msghandler";
const TRACEBACK_KEY: &str = "lua_host.traceback";
const GETMETATABLE_KEY: &str = "lua_host.getmetatable";

// ── ErrorPayload ──────────────────────────────────────────────────────────────

/// An error object as raised by Lua code, normalised at the host boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorPayload {
    /// A string (or number) message, or a host error carried through Lua.
    Message(String),
    /// Any other value.  `description` is what its `__tostring` produced, if
    /// it has one that returns a string.
    Opaque {
        type_name: String,
        description: Option<String>,
    },
}

impl ErrorPayload {
    pub fn from_value(lua: &Lua, value: Value) -> mlua::Result<Self> {
        match value {
            Value::String(s) => Ok(ErrorPayload::Message(String::from(s.to_string_lossy()))),
            Value::Integer(_) | Value::Number(_) => {
                let text = lua
                    .coerce_string(value)?
                    .map(|s| String::from(s.to_string_lossy()))
                    .unwrap_or_default();
                Ok(ErrorPayload::Message(text))
            }
            Value::Error(err) => Ok(ErrorPayload::Message(root_message(&err))),
            other => {
                let type_name = other.type_name().to_owned();
                let description = tostring_metamethod(lua, other)?;
                Ok(ErrorPayload::Opaque { type_name, description })
            }
        }
    }

    /// Whether a traceback should be appended.  A `__tostring` description is
    /// taken to be the complete message.
    pub fn wants_traceback(&self) -> bool {
        !matches!(self, ErrorPayload::Opaque { description: Some(_), .. })
    }

    pub fn into_message(self) -> String {
        match self {
            ErrorPayload::Message(m) => m,
            ErrorPayload::Opaque { description: Some(d), .. } => d,
            ErrorPayload::Opaque { type_name, description: None } => {
                format!("(error object is a {type_name} value)")
            }
        }
    }
}

/// The innermost message of an error raised from Rust, without the
/// traceback mlua attaches to callback errors.
fn root_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_message(cause),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::ExternalError(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

/// Call the value's `__tostring` (looked up raw, like the C API does) and
/// keep the result only if it is a string.
fn tostring_metamethod(lua: &Lua, value: Value) -> mlua::Result<Option<String>> {
    let getmetatable: Function = lua.named_registry_value(GETMETATABLE_KEY)?;
    let Some(mt) = getmetatable.call::<Option<Table>>(value.clone())? else {
        return Ok(None);
    };
    let Some(tostring) = mt.raw_get::<Option<Function>>("__tostring")? else {
        return Ok(None);
    };
    match tostring.call::<Value>(value)? {
        Value::String(s) => Ok(Some(String::from(s.to_string_lossy()))),
        _ => Ok(None),
    }
}

// ── Message handler ───────────────────────────────────────────────────────────

/// The `xpcall` message handler.  Always returns a string.
fn message_handler(lua: &Lua, value: Value) -> mlua::Result<String> {
    let payload = ErrorPayload::from_value(lua, value)?;
    if !payload.wants_traceback() {
        return Ok(payload.into_message());
    }
    let traceback: Function = lua.named_registry_value(TRACEBACK_KEY)?;
    // Level 0 is `traceback` itself, 1 is this handler.
    traceback.call::<String>((payload.into_message(), 2))
}

/// Stash the pieces [`invoke`] needs.  Must run after the standard
/// libraries are open; later changes to the globals do not affect it.
pub fn install(lua: &Lua) -> Result<(), HostError> {
    let globals = lua.globals();
    let debug: Table = globals.get("debug")?;
    lua.set_named_registry_value(XPCALL_KEY, globals.get::<Function>("xpcall")?)?;
    lua.set_named_registry_value(TRACEBACK_KEY, debug.get::<Function>("traceback")?)?;
    lua.set_named_registry_value(GETMETATABLE_KEY, debug.get::<Function>("getmetatable")?)?;
    lua.set_named_registry_value(HANDLER_KEY, lua.create_function(message_handler)?)?;
    Ok(())
}

// ── invoke ────────────────────────────────────────────────────────────────────

/// Call `callee` with `args` in protected mode, collecting every result.
///
/// The callee need not be a function; calling a non-callable value is
/// reported like any other runtime error.
pub fn invoke(
    lua: &Lua,
    cancel: &Cancellation,
    interval: u32,
    callee: Value,
    args: impl IntoLuaMulti,
) -> Outcome {
    let xpcall: Function = lua.named_registry_value(XPCALL_KEY)?;
    let handler: Function = lua.named_registry_value(HANDLER_KEY)?;
    let call_args: MultiValue = [callee, Value::Function(handler)]
        .into_iter()
        .chain(args.into_lua_multi(lua)?)
        .collect();

    trace!(nargs = call_args.len() - 2, "protected call");
    let (result, interrupted) = {
        let guard = cancel.arm(lua, interval);
        let result = xpcall.call::<MultiValue>(call_args);
        (result, guard.fired())
    };

    let mut values = result?.into_iter();
    match values.next() {
        Some(Value::Boolean(true)) => Ok(values.collect()),
        _ => {
            let message = match values.next() {
                Some(Value::String(s)) => String::from(s.to_string_lossy()),
                Some(other) => format!("(error object is a {} value)", other.type_name()),
                None => String::new(),
            };
            debug!(interrupted, "protected call failed");
            if interrupted {
                Err(HostError::Interrupted(message))
            } else {
                Err(HostError::Runtime(message))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
