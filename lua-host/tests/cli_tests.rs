/// End-to-end tests: run the `lua` binary the way a shell would and check
/// what it writes and how it exits.
///
/// Every run scrubs the init variables and `LUA_PATH` from the environment
/// so the developer's own setup cannot leak in.
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::Duration;

use lua_host::config::{HostConfig, LUA_COPYRIGHT};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lua"))
}

fn command(args: &[&str]) -> Command {
    let config = HostConfig::default();
    let mut cmd = Command::new(binary());
    cmd.args(args)
        .env_remove(&config.init_var)
        .env_remove(config.versioned_init_var())
        .env_remove("LUA_PATH")
        .env_remove("LUA_HISTORY")
        .env_remove("LUA_HOST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Run with `stdin` piped in and collect everything.
fn run_with(mut cmd: Command, stdin: &str) -> Output {
    let mut child = cmd.spawn().expect("failed to spawn lua binary");
    {
        let mut pipe = child.stdin.take().expect("stdin not open");
        pipe.write_all(stdin.as_bytes()).expect("write to stdin");
    }
    child.wait_with_output().expect("wait for lua binary")
}

fn run(args: &[&str]) -> Output {
    run_with(command(args), "")
}

fn stdout(o: &Output) -> String {
    String::from_utf8_lossy(&o.stdout).into_owned()
}

fn stderr(o: &Output) -> String {
    String::from_utf8_lossy(&o.stderr).into_owned()
}

fn script(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".lua").tempfile().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

fn interrupt(child: &Child) {
    // SAFETY: plain kill(2) on a child we spawned.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
    assert_eq!(rc, 0, "kill failed");
}

// ── Options ───────────────────────────────────────────────────────────────────

#[test]
fn version_banner() {
    let o = run(&["-v"]);
    assert!(o.status.success());
    assert_eq!(stdout(&o), format!("{LUA_COPYRIGHT}\n"));
}

#[test]
fn inline_statement() {
    let o = run(&["-e", "print(1+1)"]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert_eq!(stdout(&o), "2\n");
}

#[test]
fn concatenated_inline_statement() {
    let o = run(&["-eprint('joined')"]);
    assert_eq!(stdout(&o), "joined\n");
}

#[test]
fn unrecognized_option_prints_usage() {
    let o = run(&["-x"]);
    assert_eq!(o.status.code(), Some(1));
    let err = stderr(&o);
    assert!(err.contains(": unrecognized option '-x'\n"), "{err}");
    assert!(err.contains("usage: "), "{err}");
    assert!(stdout(&o).is_empty());
}

#[test]
fn missing_argument_runs_nothing() {
    let o = run(&["-e", "print('no')", "-e"]);
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains("'-e' needs argument"));
    assert!(stdout(&o).is_empty());
}

#[test]
fn option_like_argument_is_not_consumed() {
    let o = run(&["-l", "-v"]);
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains("'-l' needs argument"), "{}", stderr(&o));
}

// ── Scripts ───────────────────────────────────────────────────────────────────

#[test]
fn script_arguments_and_arg_table() {
    let f = script("print(select('#', ...), arg[1], arg[2], arg[0] ~= nil, arg[-1])\n");
    let path = f.path().to_string_lossy().into_owned();
    let o = run(&["-E", &path, "a", "b"]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert_eq!(stdout(&o), "2\ta\tb\ttrue\t-E\n");
}

#[test]
fn shebang_line_is_skipped() {
    let f = script("#!/usr/bin/env lua\nprint(debug.getinfo(1, 'l').currentline)\n");
    let path = f.path().to_string_lossy().into_owned();
    let o = run(&[&path]);
    assert_eq!(stdout(&o), "2\n");
}

#[test]
fn syntax_error_in_script() {
    let f = script("x = = 1\n");
    let path = f.path().to_string_lossy().into_owned();
    let o = run(&[&path]);
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains(":1: unexpected symbol"), "{}", stderr(&o));
}

#[test]
fn missing_script() {
    let o = run(&["/no/such/script.lua"]);
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains("cannot open /no/such/script.lua"), "{}", stderr(&o));
}

#[test]
fn runtime_error_has_prefix_and_traceback() {
    let o = run(&["-e", "error('boom')"]);
    assert_eq!(o.status.code(), Some(1));
    let err = stderr(&o);
    assert!(err.contains(": (command line):1: boom"), "{err}");
    assert!(err.contains("stack traceback:"), "{err}");
}

#[test]
fn table_error_object() {
    let o = run(&["-e", "error({})"]);
    assert!(stderr(&o).contains("(error object is a table value)"), "{}", stderr(&o));
}

#[test]
fn replaced_arg_table() {
    let f = script("print('unreachable')\n");
    let path = f.path().to_string_lossy().into_owned();
    let o = run(&["-e", "arg = 1", &path]);
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains("'arg' is not a table"), "{}", stderr(&o));
    assert!(stdout(&o).is_empty());
}

// ── Standard input ────────────────────────────────────────────────────────────

#[test]
fn piped_stdin_runs_as_script() {
    let o = run_with(command(&[]), "print('from stdin')\n");
    assert!(o.status.success());
    assert_eq!(stdout(&o), "from stdin\n");
}

#[test]
fn piped_stdin_failure_sets_exit_code() {
    let o = run_with(command(&[]), "error('bad stdin')\n");
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains("stdin:1: bad stdin"), "{}", stderr(&o));
}

#[test]
fn dash_reads_stdin_with_arguments() {
    let o = run_with(command(&["-", "x"]), "print(...)\n");
    assert_eq!(stdout(&o), "x\n");
}

#[test]
fn double_dash_makes_dash_a_file_name() {
    let o = run_with(command(&["--", "-"]), "print('stdin')\n");
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains("cannot open -"), "{}", stderr(&o));
}

// ── Interactive mode ──────────────────────────────────────────────────────────

#[test]
fn interactive_with_piped_input() {
    let o = run_with(command(&["-i"]), "2+2\nx = 3\n=x\n");
    assert!(o.status.success());
    let out = stdout(&o);
    assert!(out.starts_with(LUA_COPYRIGHT), "{out}");
    assert!(out.contains("> 4\n"), "{out}");
    assert!(out.contains("> 3\n"), "{out}");
    assert!(out.ends_with("> \n"), "{out}");
}

#[test]
fn interactive_after_inline_statement() {
    let o = run_with(command(&["-e", "print(1+1)", "-i"]), "");
    assert!(o.status.success());
    let out = stdout(&o);
    assert!(out.contains("\n2\n> "), "{out}");
}

#[test]
fn interactive_continuation_and_errors() {
    let o = run_with(command(&["-i"]), "for i = 1, 2 do\nprint(i)\nend\nerror('x')\n");
    assert!(o.status.success());
    let out = stdout(&o);
    assert!(out.contains(">> >> 1\n2\n"), "{out}");
    // No program name inside the loop.
    assert!(stderr(&o).starts_with("stdin:1: x"), "{}", stderr(&o));
}

#[test]
fn custom_prompt() {
    let o = run_with(command(&["-e", "_PROMPT = 'lua% '", "-i"]), "1\n");
    assert!(stdout(&o).contains("lua% 1\n"), "{}", stdout(&o));
}

// ── Environment ───────────────────────────────────────────────────────────────

#[test]
fn init_variable_runs_first() {
    let mut cmd = command(&["-e", "print(seed)"]);
    cmd.env("LUA_INIT", "seed = 'plain'");
    assert_eq!(stdout(&run_with(cmd, "")), "plain\n");
}

#[test]
fn versioned_init_variable_wins() {
    let config = HostConfig::default();
    let mut cmd = command(&["-e", "print(seed)"]);
    cmd.env("LUA_INIT", "seed = 'plain'")
        .env(config.versioned_init_var(), "seed = 'versioned'");
    assert_eq!(stdout(&run_with(cmd, "")), "versioned\n");
}

#[test]
fn init_file() {
    let f = script("seed = 'file'\n");
    let mut cmd = command(&["-e", "print(seed)"]);
    cmd.env("LUA_INIT", format!("@{}", f.path().display()));
    assert_eq!(stdout(&run_with(cmd, "")), "file\n");
}

#[test]
fn init_error_stops_everything() {
    let mut cmd = command(&["-e", "print('after')"]);
    cmd.env("LUA_INIT", "error('in init')");
    let o = run_with(cmd, "");
    assert_eq!(o.status.code(), Some(1));
    assert!(stderr(&o).contains("LUA_INIT:1: in init"), "{}", stderr(&o));
    assert!(stdout(&o).is_empty());
}

#[test]
fn ignore_env_skips_init_and_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greet.lua"), "return { word = 'hi' }\n").unwrap();
    let lua_path = format!("{}/?.lua", dir.path().display());

    let mut cmd = command(&["-l", "greet", "-e", "print(greet.word)"]);
    cmd.env("LUA_PATH", &lua_path);
    let o = run_with(cmd, "");
    assert!(o.status.success(), "{}", stderr(&o));
    assert_eq!(stdout(&o), "hi\n");

    let mut cmd = command(&["-E", "-l", "greet"]);
    cmd.env("LUA_PATH", &lua_path).env("LUA_INIT", "error('ran')");
    let o = run_with(cmd, "");
    assert_eq!(o.status.code(), Some(1));
    let err = stderr(&o);
    assert!(err.contains("module 'greet' not found"), "{err}");
    assert!(!err.contains("ran"), "{err}");
}

// ── Interrupts ────────────────────────────────────────────────────────────────

#[test]
fn interrupt_stops_running_chunk() {
    let mut child = command(&["-e", "while true do end"]).spawn().unwrap();
    sleep(Duration::from_millis(500));
    interrupt(&child);
    let status = child.wait().unwrap();
    let mut err = String::new();
    std::io::Read::read_to_string(child.stderr.as_mut().unwrap(), &mut err).unwrap();
    assert_eq!(status.code(), Some(1), "{err}");
    assert!(err.contains(": (command line):1: interrupted!\n"), "{err}");
    assert_eq!(err.matches("stack traceback:").count(), 1, "{err}");
}

#[test]
fn second_interrupt_kills_process() {
    let code = "local ok, e = pcall(function() while true do end end) \
                io.stderr:write('caught: ', tostring(e), '\\n') \
                while true do end";
    let mut child = command(&["-e", code]).spawn().unwrap();
    sleep(Duration::from_millis(500));
    interrupt(&child);
    sleep(Duration::from_millis(500));
    interrupt(&child);
    let status = child.wait().unwrap();
    let mut err = String::new();
    std::io::Read::read_to_string(child.stderr.as_mut().unwrap(), &mut err).unwrap();
    assert_eq!(status.signal(), Some(libc::SIGINT), "{err}");
    assert!(err.contains("caught: "), "{err}");
    assert!(err.contains("interrupted!"), "{err}");
}
