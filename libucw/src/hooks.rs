// Exported replacements for the libc exec family. Everything funnels into
// Interceptor::execve / Interceptor::execvpe; these functions only convert
// between the C calling conventions and the Rust types.

use std::arch::naked_asm;
use std::ffi::{c_char, c_int, c_void, CStr};

use crate::config::{Config, ProcessEnv, MAX_ARGS};
use crate::error::{set_errno, Error};
use crate::intercept::Interceptor;
use crate::launcher::RealExecve;
use crate::logging;
use crate::variadic;
use crate::vector::RawVec;

extern "C" {
    static environ: *const *const c_char;
}

fn interceptor() -> Interceptor<'static, &'static RealExecve, ProcessEnv> {
    logging::init();
    Interceptor::new(RealExecve::get(), ProcessEnv, Config::get())
}

#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    if path.is_null() {
        return set_errno(Error::Os(libc::EFAULT));
    }
    set_errno(interceptor().execve(
        CStr::from_ptr(path),
        RawVec::from_ptr(argv),
        RawVec::from_ptr(envp),
    ))
}

#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    execve(path, argv, environ)
}

#[no_mangle]
pub unsafe extern "C" fn execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    if file.is_null() {
        return set_errno(Error::Os(libc::EFAULT));
    }
    set_errno(interceptor().execvpe(
        CStr::from_ptr(file),
        RawVec::from_ptr(argv),
        RawVec::from_ptr(envp),
    ))
}

#[no_mangle]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    execvpe(file, argv, environ)
}

// The list forms are C variadic functions, which stable Rust cannot
// define. csrc/list.c walks the va_list and calls back into the
// ucw_*_list functions below. It is linked statically and its symbols stay
// local to the library, so the exported names are naked trampolines that
// jump into it with the original call frame untouched.

type NextArg = unsafe extern "C" fn(ap: *mut c_void) -> *const c_char;

extern "C" {
    fn ucw_execl(path: *const c_char, arg: *const c_char, ...) -> c_int;
    fn ucw_execle(path: *const c_char, arg: *const c_char, ...) -> c_int;
    fn ucw_execlp(file: *const c_char, arg: *const c_char, ...) -> c_int;
}

#[cfg(target_arch = "x86_64")]
macro_rules! tail_jump {
    ($target:ident) => {
        naked_asm!("jmp {}", sym $target)
    };
}

#[cfg(target_arch = "aarch64")]
macro_rules! tail_jump {
    ($target:ident) => {
        naked_asm!("b {}", sym $target)
    };
}

macro_rules! trampoline {
    ($name:ident => $target:ident) => {
        #[unsafe(naked)]
        #[no_mangle]
        pub unsafe extern "C" fn $name() {
            tail_jump!($target)
        }
    };
}

trampoline!(execl => ucw_execl);
trampoline!(execle => ucw_execle);
trampoline!(execlp => ucw_execlp);

#[no_mangle]
pub unsafe extern "C" fn ucw_execl_list(
    path: *const c_char,
    arg: *const c_char,
    next_arg: NextArg,
    ap: *mut c_void,
) -> c_int {
    let mut next = || unsafe { next_arg(ap) };
    match variadic::collect(arg, &mut next, MAX_ARGS) {
        Some(argv) => execve(path, argv.as_ptr(), environ),
        None => set_errno(Error::TooBig { limit: MAX_ARGS }),
    }
}

#[no_mangle]
pub unsafe extern "C" fn ucw_execle_list(
    path: *const c_char,
    arg: *const c_char,
    next_arg: NextArg,
    ap: *mut c_void,
) -> c_int {
    let mut next = || unsafe { next_arg(ap) };
    match variadic::collect_with_env(arg, &mut next, MAX_ARGS) {
        Some((argv, envp)) => execve(path, argv.as_ptr(), envp.as_ptr()),
        None => set_errno(Error::TooBig { limit: MAX_ARGS }),
    }
}

#[no_mangle]
pub unsafe extern "C" fn ucw_execlp_list(
    file: *const c_char,
    arg: *const c_char,
    next_arg: NextArg,
    ap: *mut c_void,
) -> c_int {
    let mut next = || unsafe { next_arg(ap) };
    match variadic::collect(arg, &mut next, MAX_ARGS) {
        Some(argv) => execvpe(file, argv.as_ptr(), environ),
        None => set_errno(Error::TooBig { limit: MAX_ARGS }),
    }
}
