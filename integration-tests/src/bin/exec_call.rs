//! Helper program: call one exec function through libc
//!
//! Usage: exec-call <mode> <target> [args...]
//!   mode: execv, execve, execvp, execvpe, execl, execle, execlp
//!
//! argv[0] of the new program is <target> as given. The modes taking an
//! explicit environment (execve, execvpe, execle) pass the current one plus
//! `EXPLICIT_ENVP=1`. When the exec fails the program prints
//! `EXEC_FAILED:<errno>` and exits with 127.

use std::env;
use std::ffi::{c_char, CString};
use std::os::unix::ffi::OsStringExt;
use std::process::ExitCode;
use std::ptr;

/// Most arguments the list modes can forward, argv[0] included
const MAX_LIST_ARGS: usize = 6;

fn cstrings(items: impl Iterator<Item = Vec<u8>>) -> Vec<CString> {
    items
        .map(|s| CString::new(s).expect("argument contains a NUL byte"))
        .collect()
}

fn pointers(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

// Spells out a list-form call for the given argument count, NULL sentinel
// and optional environment appended.
macro_rules! list_call {
    ($func:path, $target:expr, $args:expr $(, $envp:expr)?) => {{
        let null: *const c_char = ptr::null();
        match $args {
            [a0] => $func($target, *a0, null $(, $envp)?),
            [a0, a1] => $func($target, *a0, *a1, null $(, $envp)?),
            [a0, a1, a2] => $func($target, *a0, *a1, *a2, null $(, $envp)?),
            [a0, a1, a2, a3] => $func($target, *a0, *a1, *a2, *a3, null $(, $envp)?),
            [a0, a1, a2, a3, a4] => $func($target, *a0, *a1, *a2, *a3, *a4, null $(, $envp)?),
            [a0, a1, a2, a3, a4, a5] => {
                $func($target, *a0, *a1, *a2, *a3, *a4, *a5, null $(, $envp)?)
            }
            _ => unreachable!("argument count checked by the caller"),
        }
    }};
}

fn main() -> ExitCode {
    let args: Vec<Vec<u8>> = env::args_os().skip(1).map(|a| a.into_vec()).collect();
    if args.len() < 2 {
        eprintln!("Usage: exec-call <mode> <target> [args...]");
        return ExitCode::from(2);
    }

    let mode = String::from_utf8_lossy(&args[0]).into_owned();
    let argv = cstrings(args[1..].iter().cloned());
    let envp = cstrings(
        env::vars_os()
            .map(|(k, v)| {
                let mut entry = k.into_vec();
                entry.push(b'=');
                entry.extend(v.into_vec());
                entry
            })
            .chain(std::iter::once(b"EXPLICIT_ENVP=1".to_vec())),
    );

    let argv_ptrs = pointers(&argv);
    let envp_ptrs = pointers(&envp);
    let target = argv[0].as_ptr();
    let list = &argv_ptrs[..argv.len()];

    if mode.starts_with("execl") && list.len() > MAX_LIST_ARGS {
        eprintln!("{} takes at most {} arguments", mode, MAX_LIST_ARGS);
        return ExitCode::from(2);
    }

    unsafe {
        match mode.as_str() {
            "execv" => libc::execv(target, argv_ptrs.as_ptr()),
            "execve" => libc::execve(target, argv_ptrs.as_ptr(), envp_ptrs.as_ptr()),
            "execvp" => libc::execvp(target, argv_ptrs.as_ptr()),
            "execvpe" => libc::execvpe(target, argv_ptrs.as_ptr(), envp_ptrs.as_ptr()),
            "execl" => list_call!(libc::execl, target, list),
            "execlp" => list_call!(libc::execlp, target, list),
            "execle" => list_call!(libc::execle, target, list, envp_ptrs.as_ptr()),
            other => {
                eprintln!("unknown exec mode: {}", other);
                return ExitCode::from(2);
            }
        };
    }

    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    println!("EXEC_FAILED:{}", errno);
    ExitCode::from(127)
}
