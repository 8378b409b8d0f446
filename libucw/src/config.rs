use std::ffi::{CStr, CString, OsString};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;
use std::sync::OnceLock;

// Maximum number of entries (sentinel excluded) in any argv/envp we build
pub const MAX_ARGS: usize = 4096;

// Longest path the resolver will build, terminating NUL included
pub const PATH_MAX: usize = libc::PATH_MAX as usize;

// Search path used when PATH is unset
pub const DEFAULT_SEARCH_PATH: &[u8] = b".:/bin:/usr/bin";

// Interpreter for executables the kernel does not recognize (ENOEXEC)
pub const SHELL: &CStr = c"/bin/sh";

pub const DEFAULT_CCACHE: &CStr = c"/usr/bin/ccache";

// Set by ccache when it relaunches the real compiler
pub const RECURSION_MARKER: &CStr = c"UCC_RECURSE";

// Entries starting with one of these never reach the wrapped compiler.
// Matching is by prefix, so LD_PRELOAD_FOO is dropped as well.
pub const STRIPPED_ENV_PREFIXES: [&[u8]; 2] = [b"LD_PRELOAD", b"CCACHE_DIR"];

pub const COMPILER_SUFFIXES: [&[u8]; 3] = [b"gcc", b"g++", b"c++"];

pub const SEARCH_PATH_VAR: &CStr = c"PATH";
pub const CCACHE_VAR: &CStr = c"UCW_CCACHE";
pub const LOG_VAR: &CStr = c"UCW_LOG";
pub const LOG_FILE_VAR: &CStr = c"UCW_LOG_FILE";

pub const DEFAULT_LOG_FILE: &str = "/tmp/ucw.log";

/// Read access to environment variables.
pub trait Env {
    fn var(&self, name: &CStr) -> Option<CString>;

    fn is_set(&self, name: &CStr) -> bool {
        self.var(name).is_some()
    }
}

/// The environment of the running process, read with `getenv(3)`.
/// Must not go through `std::env`: its lock may be held across a `fork`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, name: &CStr) -> Option<CString> {
        let value = unsafe { libc::getenv(name.as_ptr()) };
        if value.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(value) }.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of the ccache binary compilers are redirected to
    pub ccache: CString,
    /// env_logger filter, diagnostics are off when unset
    pub log_filter: Option<String>,
    pub log_file: PathBuf,
}

impl Config {
    pub fn from_env<E: Env>(env: &E) -> Self {
        let ccache = env
            .var(CCACHE_VAR)
            .filter(|v| !v.as_bytes().is_empty())
            .unwrap_or_else(|| DEFAULT_CCACHE.to_owned());

        let log_filter = env
            .var(LOG_VAR)
            .map(|v| v.to_string_lossy().into_owned());

        let log_file = env
            .var(LOG_FILE_VAR)
            .filter(|v| !v.as_bytes().is_empty())
            .map(|v| PathBuf::from(OsString::from_vec(v.into_bytes())))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        Self {
            ccache,
            log_filter,
            log_file,
        }
    }

    /// Process-wide configuration, loaded on first use.
    pub fn get() -> &'static Config {
        static CONFIG: OnceLock<Config> = OnceLock::new();
        CONFIG.get_or_init(|| Config::from_env(&ProcessEnv))
    }
}
