//! Helper program: report command line arguments and environment as JSON
//!
//! Usage: print-env [args...]
//! Outputs one line:
//!   {"args": ["<arg0>", "<arg1>", ...], "env": {"<key>": "<value>", ...}}
//!
//! Installed by the test runner both as a fake compiler and as a fake ccache,
//! so the report shows exactly what the interposer handed to execve.

use std::env;
use std::process::ExitCode;

use serde_json::{json, Map, Value};

fn main() -> ExitCode {
    let args: Vec<String> = env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    let mut vars = Map::new();
    for (key, value) in env::vars_os() {
        vars.insert(
            key.to_string_lossy().into_owned(),
            Value::String(value.to_string_lossy().into_owned()),
        );
    }

    println!("{}", json!({ "args": args, "env": vars }));

    ExitCode::SUCCESS
}
