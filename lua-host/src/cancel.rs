//! Interrupt handling for running chunks.
//!
//! A SIGINT handler runs asynchronously with respect to the interpreter and
//! must not touch the Lua state.  Cancellation is therefore split in two:
//!
//! 1. The signal handler resets SIGINT to its default disposition (so a
//!    second Ctrl-C kills the process outright) and sets the pending flag of
//!    whichever [`Cancellation`] is currently armed.  Nothing else: no
//!    allocation, no I/O, no engine calls.
//! 2. A checkpoint hook, installed on the engine for the duration of a
//!    protected call, polls that flag every `interval` instructions.  The
//!    first checkpoint that sees it set clears it and raises
//!    `<chunk>:<line>: interrupted!` inside the running chunk.
//!
//! The hook only runs on the thread it was set on.  Code inside a coroutine
//! is interrupted once control is back on that thread.
//!
//! The armed context is published through a process-wide atomic pointer that
//! is written only by [`Cancellation::arm`] and cleared by the guard's drop.
//! Only one protected call runs at a time, so there is a single writer.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use mlua::{HookTriggers, Lua, VmState};
use tracing::{debug, trace};

/// Message raised inside the chunk when a checkpoint fires.
pub const INTERRUPTED: &str = "interrupted!";

/// Pending flag of the currently armed context, or null.
static ARMED: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Per-engine cancellation state.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    /// Set by the signal handler (or [`Cancellation::request`]), consumed by
    /// the checkpoint hook.
    pending: Arc<AtomicBool>,
    /// Set by the checkpoint hook when it raised the error.
    fired: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running chunk to stop at its next checkpoint.
    ///
    /// Does exactly what the signal handler does to the flag; usable from any
    /// thread.
    pub fn request(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Install the SIGINT handler and the checkpoint hook until the returned
    /// guard is dropped.
    ///
    /// Any request left over from before the call is discarded.
    pub fn arm<'lua>(&self, lua: &'lua Lua, interval: u32) -> CancelGuard<'lua> {
        self.pending.store(false, Ordering::SeqCst);
        self.fired.store(false, Ordering::SeqCst);

        let pending = Arc::clone(&self.pending);
        let fired = Arc::clone(&self.fired);
        let triggers = HookTriggers::new().every_nth_instruction(interval.max(1));
        lua.set_hook(triggers, move |_lua, ar| {
            if pending.swap(false, Ordering::SeqCst) {
                fired.store(true, Ordering::SeqCst);
                debug!("checkpoint observed interrupt request");
                let message = format!("{}{INTERRUPTED}", location(&ar));
                return Err(mlua::Error::RuntimeError(message));
            }
            Ok(VmState::Continue)
        });

        let flag = Arc::as_ptr(&self.pending) as *mut AtomicBool;
        let outer = ARMED.swap(flag, Ordering::SeqCst);
        let previous = install_handler();
        trace!("cancellation armed");

        CancelGuard {
            cancel: self.clone(),
            lua,
            flag,
            outer,
            previous,
        }
    }
}

/// `chunk:line: ` of the running function, or nothing outside Lua code.
fn location(ar: &mlua::Debug<'_>) -> String {
    let line = ar.curr_line();
    match ar.source().short_src {
        Some(src) if line > 0 => format!("{src}:{line}: "),
        _ => String::new(),
    }
}

// ── CancelGuard ───────────────────────────────────────────────────────────────

/// Keeps the handler and hook installed; restores everything on drop.
pub struct CancelGuard<'lua> {
    cancel: Cancellation,
    lua: &'lua Lua,
    flag: *mut AtomicBool,
    outer: *mut AtomicBool,
    previous: libc::sigaction,
}

impl CancelGuard<'_> {
    /// Whether a checkpoint raised the interrupt during this call.
    pub fn fired(&self) -> bool {
        self.cancel.fired.load(Ordering::SeqCst)
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        restore_handler(&self.previous);
        // Only hand the slot back if nobody re-armed over us.
        let _ = ARMED.compare_exchange(self.flag, self.outer, Ordering::SeqCst, Ordering::SeqCst);
        self.lua.remove_hook();
        // A request that arrived after the last checkpoint is dropped here.
        self.cancel.pending.store(false, Ordering::SeqCst);
        trace!("cancellation disarmed");
    }
}

// ── Signal plumbing ───────────────────────────────────────────────────────────

extern "C" fn on_interrupt(sig: libc::c_int) {
    // SAFETY: signal(2) is async-signal-safe.  Restoring SIG_DFL first means
    // a second interrupt terminates the process without reaching us.
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
    let flag = ARMED.load(Ordering::SeqCst);
    if !flag.is_null() {
        // SAFETY: the pointer targets an `AtomicBool` owned by an `Arc` that
        // the armed guard keeps alive; atomic stores are lock-free and
        // async-signal-safe.
        unsafe { (*flag).store(true, Ordering::SeqCst) };
    }
}

fn install_handler() -> libc::sigaction {
    // SAFETY: both structs are plain C data fully initialised before use;
    // `on_interrupt` has the signature sigaction expects for a non-SA_SIGINFO
    // handler.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        let mut previous: libc::sigaction = std::mem::zeroed();
        libc::sigaction(libc::SIGINT, &action, &mut previous);
        previous
    }
}

fn restore_handler(previous: &libc::sigaction) {
    // SAFETY: `previous` was filled in by the kernel in `install_handler`.
    unsafe {
        libc::sigaction(libc::SIGINT, previous, ptr::null_mut());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lua_with_trip(cancel: &Cancellation) -> Lua {
        let lua = Lua::new();
        let c = cancel.clone();
        let trip = lua
            .create_function(move |_, ()| {
                c.request();
                Ok(())
            })
            .unwrap();
        lua.globals().set("trip", trip).unwrap();
        lua
    }

    #[test]
    fn checkpoint_raises_interrupt() {
        let cancel = Cancellation::new();
        let lua = lua_with_trip(&cancel);
        let guard = cancel.arm(&lua, 100);
        let err = lua.load("trip() while true do end").exec().unwrap_err();
        assert!(err.to_string().contains(INTERRUPTED), "{err}");
        assert!(guard.fired());
    }

    #[test]
    fn call_free_loop_is_interrupted_at_its_line() {
        let cancel = Cancellation::new();
        let lua = Lua::new();
        let guard = cancel.arm(&lua, 1000);
        cancel.request();
        let err = lua
            .load("local n = 0\nwhile true do n = n + 1 end")
            .set_name("=loop")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("loop:2: interrupted!"), "{err}");
        assert!(guard.fired());
    }

    #[test]
    fn request_disarms_after_firing() {
        let cancel = Cancellation::new();
        let lua = lua_with_trip(&cancel);
        let _guard = cancel.arm(&lua, 100);
        // The first interrupt is caught by pcall; the loop afterwards must
        // run to completion without a second one.
        let n: i64 = lua
            .load(
                r#"
                local ok = pcall(function() trip() while true do end end)
                assert(not ok)
                local n = 0
                for i = 1, 100000 do n = n + 1 end
                return n
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(n, 100000);
        assert!(!cancel.is_pending());
    }

    #[test]
    fn no_carry_over_between_calls() {
        let cancel = Cancellation::new();
        let lua = Lua::new();
        cancel.request();
        {
            let guard = cancel.arm(&lua, 100);
            lua.load("local x = 0 for i = 1, 10000 do x = x + i end").exec().unwrap();
            assert!(!guard.fired());
        }
        cancel.request();
        drop(cancel.arm(&lua, 100));
        assert!(!cancel.is_pending());
    }

    #[test]
    fn hook_removed_after_disarm() {
        let cancel = Cancellation::new();
        let lua = Lua::new();
        drop(cancel.arm(&lua, 1));
        cancel.request();
        lua.load("for i = 1, 1000 do end").exec().unwrap();
        assert!(cancel.is_pending());
    }
}
