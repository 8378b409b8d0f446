//! Argument and environment vectors as seen by `execve(2)`: arrays of C
//! string pointers terminated by a NULL sentinel.

use std::ffi::{c_char, CStr};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use crate::error::Error;

/// A NULL-terminated `char *const []` owned by the caller of an exec
/// function. Borrowed for the duration of the intercepted call.
#[derive(Clone, Copy)]
pub struct RawVec<'a> {
    ptr: *const *const c_char,
    _marker: PhantomData<&'a CStr>,
}

impl<'a> RawVec<'a> {
    /// # Safety
    ///
    /// `ptr` must be NULL or point to an array of valid C strings terminated
    /// by a NULL pointer, alive and unmodified for `'a`.
    pub unsafe fn from_ptr(ptr: *const *const c_char) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// The pointer this vector was built from, NULL included.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptr
    }

    pub fn iter(&self) -> RawVecIter<'a> {
        RawVecIter {
            cur: self.ptr,
            _marker: PhantomData,
        }
    }

}

impl fmt::Debug for RawVec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct RawVecIter<'a> {
    cur: *const *const c_char,
    _marker: PhantomData<&'a CStr>,
}

impl<'a> Iterator for RawVecIter<'a> {
    type Item = &'a CStr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        // SAFETY: guaranteed by RawVec::from_ptr
        unsafe {
            let s = *self.cur;
            if s.is_null() {
                self.cur = ptr::null();
                return None;
            }
            self.cur = self.cur.add(1);
            Some(CStr::from_ptr(s))
        }
    }
}

/// A NULL-terminated pointer vector built by us, holding at most `limit`
/// entries besides the sentinel. The strings themselves stay borrowed.
pub struct ExecVec<'a> {
    ptrs: Vec<*const c_char>,
    limit: usize,
    _marker: PhantomData<&'a CStr>,
}

impl<'a> ExecVec<'a> {
    pub fn new(limit: usize) -> Self {
        Self {
            ptrs: vec![ptr::null()],
            limit,
            _marker: PhantomData,
        }
    }

    pub fn push(&mut self, s: &'a CStr) -> Result<(), Error> {
        if self.len() >= self.limit {
            return Err(Error::TooBig { limit: self.limit });
        }
        // overwrite the sentinel and put it back at the end
        if let Some(last) = self.ptrs.last_mut() {
            *last = s.as_ptr();
        }
        self.ptrs.push(ptr::null());
        Ok(())
    }

    pub fn extend<I>(&mut self, iter: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a CStr>,
    {
        for s in iter {
            self.push(s)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ptrs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer suitable for `execve(2)`, valid while `self` is alive.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    pub fn as_raw(&self) -> RawVec<'_> {
        // SAFETY: ptrs always ends with NULL and only holds &'a CStr pointers
        unsafe { RawVec::from_ptr(self.as_ptr()) }
    }

    pub fn iter(&self) -> RawVecIter<'_> {
        self.as_raw().iter()
    }
}

impl fmt::Debug for ExecVec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
