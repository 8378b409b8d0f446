//! Turns the argument lists of `execl`, `execlp` and `execle` into vectors.
//!
//! The C entry points only know how to pull the next pointer out of their
//! `va_list`; everything else happens here, on a plain closure.

use std::ffi::{c_char, CStr};

use crate::vector::{ExecVec, RawVec};

/// Collects `first` and the pointers returned by `next` up to the NULL
/// sentinel. Returns None when more than `max` entries come before it.
///
/// # Safety
///
/// Every non-NULL pointer must be a valid C string living for `'a`, and the
/// list must really be NULL terminated (as required by `execl(3)`), otherwise
/// `next` reads past the caller's arguments.
pub unsafe fn collect<'a, F>(first: *const c_char, next: &mut F, max: usize) -> Option<ExecVec<'a>>
where
    F: FnMut() -> *const c_char,
{
    let mut argv = ExecVec::new(max);
    let mut cur = first;

    while !cur.is_null() {
        argv.push(CStr::from_ptr(cur)).ok()?;
        cur = next();
    }

    Some(argv)
}

/// Like [`collect`], then reads the environment pointer following the
/// sentinel (the `execle` calling convention).
///
/// # Safety
///
/// Same as [`collect`], plus the value after the sentinel must be a valid
/// environment vector.
pub unsafe fn collect_with_env<'a, F>(
    first: *const c_char,
    next: &mut F,
    max: usize,
) -> Option<(ExecVec<'a>, RawVec<'a>)>
where
    F: FnMut() -> *const c_char,
{
    let argv = collect(first, next, max)?;
    // envp travels as a plain pointer through the va_list
    let envp = RawVec::from_ptr(next() as *const *const c_char);
    Some((argv, envp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_ARGS;
    use crate::vector::tests::{strings, OwnedVec};
    use std::ffi::CString;
    use std::ptr;

    // Simulates a va_list: pointers in order, whatever follows included
    struct Args {
        _strings: Vec<CString>,
        ptrs: Vec<*const c_char>,
    }

    impl Args {
        fn new(items: &[&str]) -> Self {
            let strings: Vec<CString> = items.iter().map(|s| CString::new(*s).unwrap()).collect();
            let ptrs = strings.iter().map(|s| s.as_ptr()).collect();
            Self {
                _strings: strings,
                ptrs,
            }
        }

        fn terminated(mut self) -> Self {
            self.ptrs.push(ptr::null());
            self
        }

        fn then(mut self, p: *const c_char) -> Self {
            self.ptrs.push(p);
            self
        }

        fn split(&self) -> (*const c_char, impl FnMut() -> *const c_char + '_) {
            let mut rest = self.ptrs[1..].iter();
            let next = move || *rest.next().expect("read past the last argument");
            (self.ptrs[0], next)
        }
    }

    #[test]
    fn collects_until_sentinel() {
        let args = Args::new(&["ls", "-l", "/tmp"]).terminated();
        let (first, mut next) = args.split();
        let argv = unsafe { collect(first, &mut next, MAX_ARGS) }.unwrap();
        assert_eq!(strings(argv.iter()), vec!["ls", "-l", "/tmp"]);
    }

    #[test]
    fn null_first_argument() {
        let (first, mut next) = (ptr::null(), || -> *const c_char { panic!("no read expected") });
        let argv = unsafe { collect(first, &mut next, MAX_ARGS) }.unwrap();
        assert!(argv.is_empty());
    }

    #[test]
    fn capacity_boundary() {
        let items: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = items.iter().map(|s| s.as_str()).collect();

        let args = Args::new(&refs).terminated();
        let (first, mut next) = args.split();
        assert_eq!(unsafe { collect(first, &mut next, 8) }.unwrap().len(), 8);

        let args = Args::new(&refs).terminated();
        let (first, mut next) = args.split();
        assert!(unsafe { collect(first, &mut next, 7) }.is_none());
    }

    #[test]
    fn env_after_sentinel() {
        let env = OwnedVec::new(&["A=1", "B=2"]);
        let args = Args::new(&["env", "-0"])
            .terminated()
            .then(env.raw().as_ptr() as *const c_char);
        let (first, mut next) = args.split();

        let (argv, envp) = unsafe { collect_with_env(first, &mut next, MAX_ARGS) }.unwrap();
        assert_eq!(strings(argv.iter()), vec!["env", "-0"]);
        assert_eq!(strings(envp.iter()), vec!["A=1", "B=2"]);
    }

    #[test]
    fn env_not_read_on_overflow() {
        let args = Args::new(&["a", "b", "c"]).terminated();
        let (first, mut next) = args.split();
        assert!(unsafe { collect_with_env(first, &mut next, 2) }.is_none());
    }
}
