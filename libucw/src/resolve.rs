//! `PATH` lookup, following what `execvp(3)` does.

use std::ffi::{CStr, CString};
use std::fs;
use std::os::unix::ffi::OsStrExt;

use log::trace;

use crate::config::{DEFAULT_SEARCH_PATH, PATH_MAX};

/// Resolves `filename` against `search_path` (colon separated). Falls back to
/// `.:/bin:/usr/bin` when no search path is given. A filename containing a
/// `/` is returned unchanged.
pub fn resolve(filename: &CStr, search_path: Option<&[u8]>) -> Option<CString> {
    let name = filename.to_bytes();

    if name.contains(&b'/') {
        return Some(filename.to_owned());
    }

    if name.is_empty() {
        return None;
    }

    let search_path = search_path.unwrap_or(DEFAULT_SEARCH_PATH);

    for dir in search_path.split(|&b| b == b':').filter(|d| !d.is_empty()) {
        let Some(candidate) = join(dir, name) else {
            trace!(
                "skipping oversized candidate in {}",
                String::from_utf8_lossy(dir)
            );
            continue;
        };

        if is_executable(&candidate) {
            trace!("resolved {:?} to {:?}", filename, candidate);
            return Some(candidate);
        }
    }

    None
}

// dir + '/' + name, None if the result would not fit in PATH_MAX
fn join(dir: &[u8], name: &[u8]) -> Option<CString> {
    if dir.len() + name.len() + 1 >= PATH_MAX {
        return None;
    }

    let mut path = Vec::with_capacity(dir.len() + name.len() + 2);
    path.extend_from_slice(dir);
    if !dir.ends_with(b"/") {
        path.push(b'/');
    }
    path.extend_from_slice(name);

    // neither part contains a NUL, both come from C strings
    CString::new(path).ok()
}

fn is_executable(path: &CStr) -> bool {
    if unsafe { libc::access(path.as_ptr(), libc::X_OK) } != 0 {
        return false;
    }

    let os_path = std::ffi::OsStr::from_bytes(path.to_bytes());
    fs::metadata(os_path).map(|m| !m.is_dir()).unwrap_or(false)
}
