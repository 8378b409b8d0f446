//! (U)niversal (C)Cache (W)rapper
//!
//! Sets `LD_PRELOAD` to `libucw.so` and executes the given command, so that
//! every compiler it runs goes through ccache:
//!
//! ```text
//! ucw make -j8
//! ucw --ccache /opt/ccache/bin/ccache ./configure
//! ```

use std::convert::Infallible;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use anyhow::{anyhow, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;

const PRELOAD_LIB: &str = "libucw.so";

#[derive(Parser, Debug)]
#[command(
    name = "ucw",
    version,
    about = "(U)niversal (C)Cache (W)rapper",
    long_about = "Set LD_PRELOAD to libucw.so and execute COMMAND."
)]
struct Cli {
    /// Library to preload [default: libucw.so next to this executable]
    #[arg(long, value_name = "PATH")]
    preload: Option<PathBuf>,

    /// ccache binary compilers are redirected to [default: /usr/bin/ccache]
    #[arg(long, value_name = "PATH")]
    ccache: Option<PathBuf>,

    /// Command to run, looked up in PATH
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<OsString>,
}

fn default_preload() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to read /proc/self/exe")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", exe.display()))?;
    Ok(dir.join(PRELOAD_LIB))
}

fn command(cli: &Cli, preload: &Path) -> Command {
    let mut cmd = Command::new(&cli.command[0]);
    cmd.args(&cli.command[1..]);
    cmd.env("LD_PRELOAD", preload);
    if let Some(ccache) = &cli.ccache {
        cmd.env("UCW_CCACHE", ccache);
    }
    cmd
}

fn run(cli: Cli) -> Result<Infallible> {
    let preload = match &cli.preload {
        Some(p) => p.clone(),
        None => default_preload()?,
    };

    // only returns on failure
    let err = command(&cli, &preload).exec();

    Err(err).with_context(|| {
        format!(
            "Error executing command {}",
            Path::new(&cli.command[0]).display()
        )
    })
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    let Err(e) = run(cli);
    eprintln!("ucw: {:#}", e);
    process::exit(1);
}
