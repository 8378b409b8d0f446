use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("argument list too long (more than {limit} entries)")]
    TooBig { limit: usize },
    #[error("no such file or directory in search path")]
    NotFound,
    #[error("empty argument vector")]
    EmptyArgv,
    #[error("os error {0}")]
    Os(i32),
}

impl Error {
    /// Captures the current `errno`
    pub fn last_os_error() -> Self {
        Self::Os(
            std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EINVAL),
        )
    }

    pub fn errno(&self) -> i32 {
        match self {
            Self::TooBig { .. } => libc::E2BIG,
            Self::NotFound => libc::ENOENT,
            Self::EmptyArgv => libc::EFAULT,
            Self::Os(e) => *e,
        }
    }

    pub fn is_noexec(&self) -> bool {
        self.errno() == libc::ENOEXEC
    }
}

/// Stores `err` into `errno` and returns the C failure value.
pub fn set_errno(err: Error) -> libc::c_int {
    unsafe { *libc::__errno_location() = err.errno() };
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(Error::TooBig { limit: 1 }.errno(), libc::E2BIG);
        assert_eq!(Error::NotFound.errno(), libc::ENOENT);
        assert_eq!(Error::EmptyArgv.errno(), libc::EFAULT);
        assert_eq!(Error::Os(libc::EACCES).errno(), libc::EACCES);
        assert!(Error::Os(libc::ENOEXEC).is_noexec());
        assert!(!Error::NotFound.is_noexec());
    }

    #[test]
    fn set_errno_roundtrip() {
        assert_eq!(set_errno(Error::NotFound), -1);
        assert_eq!(Error::last_os_error(), Error::Os(libc::ENOENT));
    }
}
