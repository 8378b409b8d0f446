//! Universal CCache Wrapper.
//!
//! Loaded through `LD_PRELOAD`, this library replaces the exec family
//! (`execve`, `execv`, `execvp`, `execvpe`, `execl`, `execle`, `execlp`).
//! Every exec of a real compiler binary is rewritten into an exec of ccache:
//!
//! ```text
//! execve("/usr/bin/gcc", ["gcc", "-c", "x.c"], env)
//!   => execve("/usr/bin/ccache", ["/usr/bin/ccache", "/usr/bin/gcc", "-c", "x.c"],
//!             env - LD_PRELOAD - CCACHE_DIR)
//! ```
//!
//! Everything else goes straight to the libc implementation found with
//! `dlsym(RTLD_NEXT, "execve")`.

pub mod classify;
pub mod config;
pub mod error;
pub mod intercept;
pub mod launcher;
pub mod logging;
pub mod resolve;
pub mod rewrite;
pub mod variadic;
pub mod vector;

// kept out of test builds, the test harness must not interpose itself
#[cfg(not(test))]
mod hooks;

pub use error::Error;
