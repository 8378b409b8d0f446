//! Builds the argv/envp handed to the real `execve` when a call is
//! redirected. Nothing is ever truncated: running out of room is an error.

use std::ffi::CStr;

use crate::config::STRIPPED_ENV_PREFIXES;
use crate::error::Error;
use crate::vector::{ExecVec, RawVec};

/// Copies `envv` without the preload and ccache directory variables, so the
/// wrapped compiler neither loads us again nor uses another cache.
pub fn rewrite_env<'a>(envv: RawVec<'a>, limit: usize) -> Result<ExecVec<'a>, Error> {
    let mut out = ExecVec::new(limit);
    out.extend(envv.iter().filter(|e| !is_stripped(e.to_bytes())))?;
    Ok(out)
}

/// `[ccache, resolved, argv[1..]]`
pub fn rewrite_args<'a>(
    ccache: &'a CStr,
    resolved: &'a CStr,
    argv: RawVec<'a>,
    limit: usize,
) -> Result<ExecVec<'a>, Error> {
    let mut args = argv.iter();
    if args.next().is_none() {
        return Err(Error::EmptyArgv);
    }

    let mut out = ExecVec::new(limit);
    out.push(ccache)?;
    out.push(resolved)?;
    out.extend(args)?;
    Ok(out)
}

/// `[argv[0], script, argv[1..]]`, to run `script` through `/bin/sh` after
/// the kernel refused it with ENOEXEC.
pub fn shell_args<'a>(
    script: &'a CStr,
    argv: RawVec<'a>,
    limit: usize,
) -> Result<ExecVec<'a>, Error> {
    let mut args = argv.iter();
    let arg0 = args.next().ok_or(Error::EmptyArgv)?;

    let mut out = ExecVec::new(limit);
    out.push(arg0)?;
    out.push(script)?;
    out.extend(args)?;
    Ok(out)
}

fn is_stripped(entry: &[u8]) -> bool {
    STRIPPED_ENV_PREFIXES.iter().any(|p| entry.starts_with(p))
}
