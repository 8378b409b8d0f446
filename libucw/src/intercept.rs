//! Decides what each intercepted exec actually runs.
//!
//! ```text
//! execvpe(file) --resolve--> execve(path) --+-- UCC_RECURSE set --> real execve
//!                                           +-- not a compiler ---> real execve
//!                                           +-- compiler ---------> real execve(ccache)
//! ENOEXEC after execvpe: one retry as execve("/bin/sh", [arg0, path, args...])
//! ```

use std::ffi::CStr;

use log::{debug, trace};

use crate::classify::classify;
use crate::config::{Config, Env, MAX_ARGS, RECURSION_MARKER, SEARCH_PATH_VAR, SHELL};
use crate::error::Error;
use crate::launcher::Launcher;
use crate::resolve::resolve;
use crate::rewrite::{rewrite_args, rewrite_env, shell_args};
use crate::vector::{ExecVec, RawVec};

pub struct Interceptor<'c, L, E> {
    launcher: L,
    env: E,
    config: &'c Config,
}

impl<'c, L: Launcher, E: Env> Interceptor<'c, L, E> {
    pub fn new(launcher: L, env: E, config: &'c Config) -> Self {
        Self {
            launcher,
            env,
            config,
        }
    }

    /// `execve(2)` with compiler redirection. Only returns on failure.
    ///
    /// # Safety
    ///
    /// The vectors must stay valid for the whole call.
    pub unsafe fn execve(&self, path: &CStr, argv: RawVec<'_>, envp: RawVec<'_>) -> Error {
        trace!("execve {:?} {:?}", path, argv);

        if self.env.is_set(RECURSION_MARKER) {
            trace!("recursion marker set, not wrapping {:?}", path);
            return self.launcher.execve(path, argv.as_ptr(), envp.as_ptr());
        }

        if !classify(path, argv, &self.config.ccache) {
            return self.launcher.execve(path, argv.as_ptr(), envp.as_ptr());
        }

        let (new_argv, new_envp) = match self.wrap(path, argv, envp) {
            Ok(v) => v,
            Err(e) => {
                debug!("cannot wrap {:?}: {}", path, e);
                return e;
            }
        };

        debug!("running {:?} through {:?}", path, self.config.ccache);
        let err = self
            .launcher
            .execve(&self.config.ccache, new_argv.as_ptr(), new_envp.as_ptr());
        debug!("execve {:?} failed: {}", self.config.ccache, err);
        err
    }

    /// `execvpe(3)`: looks `file` up in `PATH` then behaves like
    /// [`Self::execve`], falling back to `/bin/sh` once on ENOEXEC.
    ///
    /// # Safety
    ///
    /// The vectors must stay valid for the whole call.
    pub unsafe fn execvpe(&self, file: &CStr, argv: RawVec<'_>, envp: RawVec<'_>) -> Error {
        let search_path = self.env.var(SEARCH_PATH_VAR);

        let Some(path) = resolve(file, search_path.as_deref().map(CStr::to_bytes)) else {
            debug!("{:?} not found in search path", file);
            return Error::NotFound;
        };

        let err = self.execve(&path, argv, envp);
        if !err.is_noexec() {
            return err;
        }

        debug!("{:?} has an unknown format, retrying with {:?}", path, SHELL);
        let sh_argv = match shell_args(&path, argv, MAX_ARGS) {
            Ok(v) => v,
            Err(e) => return e,
        };

        self.execve(SHELL, sh_argv.as_raw(), envp)
    }

    fn wrap<'a>(
        &'a self,
        path: &'a CStr,
        argv: RawVec<'a>,
        envp: RawVec<'a>,
    ) -> Result<(ExecVec<'a>, ExecVec<'a>), Error> {
        let new_envp = rewrite_env(envp, MAX_ARGS)?;
        let new_argv = rewrite_args(&self.config.ccache, path, argv, MAX_ARGS)?;
        Ok((new_argv, new_envp))
    }
}
