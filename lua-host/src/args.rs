//! The `arg` table handed to scripts.
//!
//! Index 0 holds the script name, the script's own arguments follow at
//! 1, 2, …, and everything before the script (interpreter name and options)
//! sits at negative indices.  Without a script the interpreter name takes
//! index 0 and every other token is positive.
//!
//! ```text
//! lua -e "x=1" test.lua a b
//!   arg[-3] = "lua"   arg[-2] = "-e"   arg[-1] = "x=1"
//!   arg[0]  = "test.lua"   arg[1] = "a"   arg[2] = "b"
//! ```

use std::collections::BTreeMap;

use mlua::{Lua, MultiValue, Table, Value};

use crate::error::HostError;

/// Command-line tokens indexed relative to the script name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentTable {
    /// Tokens before the script, keyed by their (negative) index.
    leading: BTreeMap<i64, String>,
    /// Index 0 and up.
    tail: Vec<String>,
}

impl ArgumentTable {
    /// Build the table from the full `argv` and the script's index in it.
    pub fn new(argv: &[String], script: Option<usize>) -> Self {
        let base = script.unwrap_or(0).min(argv.len());
        let leading = argv[..base]
            .iter()
            .enumerate()
            .map(|(i, tok)| (i as i64 - base as i64, tok.clone()))
            .collect();
        Self {
            leading,
            tail: argv[base..].to_vec(),
        }
    }

    /// Look up any index, negative or not.
    pub fn get(&self, index: i64) -> Option<&str> {
        if index < 0 {
            self.leading.get(&index).map(String::as_str)
        } else {
            self.tail.get(index as usize).map(String::as_str)
        }
    }

    /// Arguments at 1, 2, … in order.
    pub fn positional(&self) -> &[String] {
        self.tail.get(1..).unwrap_or(&[])
    }

    /// All entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.leading
            .iter()
            .map(|(&i, s)| (i, s.as_str()))
            .chain(self.tail.iter().enumerate().map(|(i, s)| (i as i64, s.as_str())))
    }

    /// Publish the table as the global `arg`.
    pub fn publish(&self, lua: &Lua) -> Result<(), HostError> {
        let table = lua.create_table_with_capacity(self.positional().len(), self.leading.len() + 1)?;
        for (i, tok) in self.iter() {
            table.raw_set(i, tok)?;
        }
        lua.globals().set("arg", table)?;
        Ok(())
    }
}

/// Read the script arguments back out of the live global `arg`.
///
/// Scripts run after `-e` code, which may have replaced or edited `arg`, so
/// the global rather than the Rust-side table is authoritative here.  The
/// length honours `__len`.
pub fn script_arguments(lua: &Lua) -> Result<MultiValue, HostError> {
    let table: Table = match lua.globals().get::<Value>("arg")? {
        Value::Table(t) => t,
        _ => return Err(HostError::Runtime("'arg' is not a table".to_owned())),
    };
    let n = table.len()?;
    (1..=n)
        .map(|i| table.raw_get::<Value>(i).map_err(HostError::from))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
