use std::ffi::{c_char, c_int, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use log::trace;

use crate::error::Error;

/// Something able to replace the current process image.
pub trait Launcher {
    /// Runs `execve(2)`. Only returns on failure.
    ///
    /// # Safety
    ///
    /// `argv` and `envp` must be NULL-terminated vectors of valid C strings
    /// (`envp` may also be NULL).
    unsafe fn execve(
        &self,
        path: &CStr,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Error;
}

type ExecveFn =
    unsafe extern "C" fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int;

// Number of dlsym lookups performed, at most one per process
static LOOKUPS: AtomicUsize = AtomicUsize::new(0);

/// The libc `execve` we are shadowing.
#[derive(Debug, Clone, Copy)]
pub struct RealExecve {
    func: ExecveFn,
}

impl RealExecve {
    /// Returns the process-wide handle, resolving it on first use.
    /// Aborts the process if libc's `execve` cannot be found: falling back to
    /// our own symbol would recurse forever.
    pub fn get() -> &'static RealExecve {
        static REAL: OnceLock<RealExecve> = OnceLock::new();
        REAL.get_or_init(|| match Self::lookup() {
            Some(real) => real,
            None => die(b"ucw: unable to resolve execve()\n"),
        })
    }

    fn lookup() -> Option<Self> {
        LOOKUPS.fetch_add(1, Ordering::SeqCst);

        let sym = unsafe { libc::dlsym(libc::RTLD_NEXT, c"execve".as_ptr()) };
        if sym.is_null() {
            return None;
        }

        trace!("libc execve found at {:p}", sym);
        // SAFETY: the symbol named execve has the execve signature
        Some(Self {
            func: unsafe { std::mem::transmute::<*mut libc::c_void, ExecveFn>(sym) },
        })
    }

    #[cfg(test)]
    pub(crate) fn lookups() -> usize {
        LOOKUPS.load(Ordering::SeqCst)
    }
}

impl Launcher for RealExecve {
    unsafe fn execve(
        &self,
        path: &CStr,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Error {
        (self.func)(path.as_ptr(), argv, envp);
        Error::last_os_error()
    }
}

impl<L: Launcher + ?Sized> Launcher for &L {
    unsafe fn execve(
        &self,
        path: &CStr,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Error {
        (**self).execve(path, argv, envp)
    }
}

// Only async-signal-safe calls: we may be running in a vfork child.
fn die(msg: &[u8]) -> ! {
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::abort()
    }
}
