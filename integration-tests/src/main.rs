//! Test runner for libucw
//!
//! This test runner validates the interposer end to end by:
//! 1. Building a scratch toolchain: a fake compiler and a fake ccache (both
//!    copies of the print-env helper), shell scripts and symlinks
//! 2. Launching exec-call through the ucw launcher, so that its exec calls
//!    go through libucw.so
//! 3. Checking the JSON report printed by whatever program finally ran
//!
//! Usage: test-runner --preload <libucw.so> --launcher <ucw> --test-binaries <dir>

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{anyhow, bail, ensure, Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use tempfile::TempDir;

/// Test configuration
#[derive(Parser, Debug)]
#[command(name = "test-runner", about = "End-to-end tests for libucw")]
struct TestConfig {
    /// Path to libucw.so
    #[arg(long)]
    preload: PathBuf,
    /// Path to the ucw launcher
    #[arg(long)]
    launcher: PathBuf,
    /// Directory containing print-env and exec-call
    #[arg(long)]
    test_binaries: PathBuf,
    /// Working directory for test artifacts (default: temp dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

impl TestConfig {
    fn validate(&self) -> Result<()> {
        for (what, path) in [
            ("Preload library", &self.preload),
            ("Launcher", &self.launcher),
            ("Test binaries dir", &self.test_binaries),
        ] {
            ensure!(path.exists(), "{} not found: {}", what, path.display());
        }
        for bin in ["print-env", "exec-call"] {
            let path = self.binary(bin);
            ensure!(path.exists(), "{} not found: {}", bin, path.display());
        }
        Ok(())
    }

    fn binary(&self, name: &str) -> PathBuf {
        self.test_binaries.join(name)
    }
}

/// Scratch toolchain for a test
struct Toolchain {
    /// Directory put first in PATH
    bin: PathBuf,
    /// Fake ccache reporting how it was invoked
    ccache: PathBuf,
    /// Value given to CCACHE_DIR, must never reach ccache
    cache_dir: PathBuf,
}

impl Toolchain {
    fn new(config: &TestConfig, base_dir: &Path, name: &str) -> Result<Self> {
        let root = base_dir.join(name);
        let bin = root.join("bin");
        fs::create_dir_all(&bin).with_context(|| format!("Failed to create {}", bin.display()))?;

        let ccache = root.join("ccache");
        install(&config.binary("print-env"), &ccache)?;

        Ok(Self {
            bin,
            ccache,
            cache_dir: root.join("cache"),
        })
    }

    /// Copy an executable into bin/
    fn add_binary(&self, name: &str, source: &Path) -> Result<PathBuf> {
        let dest = self.bin.join(name);
        install(source, &dest)?;
        Ok(dest)
    }

    /// Write an executable script into bin/
    fn add_script(&self, name: &str, content: &str) -> Result<PathBuf> {
        let dest = self.bin.join(name);
        fs::write(&dest, content).with_context(|| format!("Failed to write {}", dest.display()))?;
        make_executable(&dest)?;
        Ok(dest)
    }

    fn add_symlink(&self, name: &str, target: &Path) -> Result<PathBuf> {
        let dest = self.bin.join(name);
        symlink(target, &dest).with_context(|| format!("Failed to link {}", dest.display()))?;
        Ok(dest)
    }

    fn search_path(&self) -> OsString {
        let mut path = self.bin.clone().into_os_string();
        path.push(":/usr/bin:/bin");
        path
    }
}

fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to get metadata of {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions of {}", path.display()))
}

fn install(source: &Path, dest: &Path) -> Result<()> {
    fs::copy(source, dest)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
    make_executable(dest)
}

struct CallOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl CallOutput {
    /// The JSON line printed by print-env
    fn report(&self) -> Result<(Vec<String>, Map<String, Value>)> {
        let line = self
            .stdout
            .lines()
            .rev()
            .find(|l| l.starts_with('{'))
            .ok_or_else(|| anyhow!("no report in output: {}{}", self.stdout, self.stderr))?;

        let value: Value = serde_json::from_str(line).context("Failed to parse report")?;
        let args = value["args"]
            .as_array()
            .ok_or_else(|| anyhow!("report without args: {}", line))?
            .iter()
            .map(|a| a.as_str().unwrap_or_default().to_string())
            .collect();
        let env = value["env"]
            .as_object()
            .cloned()
            .ok_or_else(|| anyhow!("report without env: {}", line))?;
        Ok((args, env))
    }

    fn expect_success(&self) -> Result<()> {
        if self.exit_code != 0 {
            bail!(
                "exec-call failed with exit code {}: {}{}",
                self.exit_code,
                self.stdout,
                self.stderr
            );
        }
        Ok(())
    }
}

/// Run `exec-call <mode> <target> [args...]` under the launcher
fn run_exec_call(
    config: &TestConfig,
    toolchain: &Toolchain,
    mode: &str,
    target: &str,
    args: &[&str],
    extra_env: &[(&str, &str)],
) -> Result<CallOutput> {
    let mut cmd = Command::new(&config.launcher);
    cmd.arg("--preload").arg(&config.preload);
    cmd.arg("--ccache").arg(&toolchain.ccache);
    cmd.arg("--");
    cmd.arg(config.binary("exec-call"));
    cmd.arg(mode).arg(target).args(args);

    cmd.env("PATH", toolchain.search_path());
    cmd.env("CCACHE_DIR", &toolchain.cache_dir);
    cmd.env_remove("UCC_RECURSE");
    for (key, value) in extra_env {
        cmd.env(key, value);
    }

    let output = cmd.output().context("Failed to run launcher")?;

    Ok(CallOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// Test: a real compiler found in PATH runs through ccache
fn test_compiler_wrapped(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: compiler_wrapped");

    let tc = Toolchain::new(config, work_dir, "compiler_wrapped")?;
    let gcc = tc.add_binary("gcc", &config.binary("print-env"))?;

    let out = run_exec_call(config, &tc, "execvp", "gcc", &["-c", "x.c"], &[])?;
    out.expect_success()?;
    let (args, env) = out.report()?;

    let expected = vec![path_str(&tc.ccache), path_str(&gcc), "-c".into(), "x.c".into()];
    ensure!(args == expected, "unexpected args {:?}, expected {:?}", args, expected);
    ensure!(!env.contains_key("LD_PRELOAD"), "LD_PRELOAD reached ccache");
    ensure!(!env.contains_key("CCACHE_DIR"), "CCACHE_DIR reached ccache");
    ensure!(env.contains_key("PATH"), "PATH was dropped");

    println!("    PASS");
    Ok(())
}

/// Exec functions taking an explicit environment
const EXPLICIT_ENV_MODES: [&str; 3] = ["execve", "execvpe", "execle"];

/// Test: every exec function wraps a compiler given by path
fn test_exec_variants(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: exec_variants");

    let tc = Toolchain::new(config, work_dir, "exec_variants")?;
    let gxx = tc.add_binary("x86_64-linux-gnu-g++", &config.binary("print-env"))?;
    let target = path_str(&gxx);

    for mode in ["execv", "execve", "execvp", "execvpe", "execl", "execle", "execlp"] {
        let out = run_exec_call(config, &tc, mode, &target, &["-O2", "y.cc"], &[])?;
        out.expect_success()?;
        let (args, env) = out.report()?;
        let expected = vec![path_str(&tc.ccache), target.clone(), "-O2".into(), "y.cc".into()];
        ensure!(args == expected, "{}: unexpected args {:?}", mode, args);

        // the environment handed to exec is the one that gets filtered
        let explicit = EXPLICIT_ENV_MODES.contains(&mode);
        ensure!(
            env.contains_key("EXPLICIT_ENVP") == explicit,
            "{}: wrong environment used",
            mode
        );
        ensure!(!env.contains_key("LD_PRELOAD"), "{}: LD_PRELOAD reached ccache", mode);
        ensure!(!env.contains_key("CCACHE_DIR"), "{}: CCACHE_DIR reached ccache", mode);
        println!("    PASS ({})", mode);
    }

    Ok(())
}

/// Test: list forms searching PATH resolve the compiler first
fn test_list_search_path(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: list_search_path");

    let tc = Toolchain::new(config, work_dir, "list_search_path")?;
    let gcc = tc.add_binary("gcc", &config.binary("print-env"))?;

    let out = run_exec_call(config, &tc, "execlp", "gcc", &["-c", "x.c"], &[])?;
    out.expect_success()?;
    let (args, _) = out.report()?;
    let expected = vec![path_str(&tc.ccache), path_str(&gcc), "-c".into(), "x.c".into()];
    ensure!(args == expected, "unexpected args {:?}", args);

    let out = run_exec_call(config, &tc, "execlp", "ucw-no-such-gcc", &[], &[])?;
    ensure!(
        out.stdout.trim() == format!("EXEC_FAILED:{}", libc::ENOENT),
        "unexpected output: {}",
        out.stdout
    );

    println!("    PASS");
    Ok(())
}

/// Test: other programs run untouched, environment included
fn test_passthrough(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: passthrough");

    let tc = Toolchain::new(config, work_dir, "passthrough")?;
    let tool = tc.add_binary("print-env", &config.binary("print-env"))?;

    for mode in ["execv", "execle"] {
        let out = run_exec_call(config, &tc, mode, &path_str(&tool), &["a", "b"], &[])?;
        out.expect_success()?;
        let (args, env) = out.report()?;

        ensure!(
            args == vec![path_str(&tool), "a".into(), "b".into()],
            "{}: unexpected args {:?}",
            mode,
            args
        );
        ensure!(env.contains_key("LD_PRELOAD"), "{}: LD_PRELOAD should be kept", mode);
        ensure!(
            env.get("CCACHE_DIR").and_then(Value::as_str) == Some(&path_str(&tc.cache_dir)),
            "{}: CCACHE_DIR should be kept",
            mode
        );
        ensure!(
            env.contains_key("EXPLICIT_ENVP") == (mode == "execle"),
            "{}: wrong environment used",
            mode
        );
        println!("    PASS ({})", mode);
    }

    Ok(())
}

/// Test: -save-temps disables wrapping
fn test_save_temps(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: save_temps");

    let tc = Toolchain::new(config, work_dir, "save_temps")?;
    tc.add_binary("gcc", &config.binary("print-env"))?;

    let out = run_exec_call(config, &tc, "execvp", "gcc", &["-c", "x.c", "-save-temps"], &[])?;
    out.expect_success()?;
    let (args, _) = out.report()?;
    ensure!(args == vec!["gcc", "-c", "x.c", "-save-temps"], "unexpected args {:?}", args);

    println!("    PASS");
    Ok(())
}

/// Test: compiler wrapper scripts are never wrapped
fn test_shebang(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: shebang");

    let tc = Toolchain::new(config, work_dir, "shebang")?;
    tc.add_script("cross-gcc", "#!/bin/sh\necho \"SCRIPT $*\"\n")?;

    let out = run_exec_call(config, &tc, "execvp", "cross-gcc", &["-c", "x.c"], &[])?;
    out.expect_success()?;
    ensure!(out.stdout.trim() == "SCRIPT -c x.c", "unexpected output: {}", out.stdout);

    println!("    PASS");
    Ok(())
}

/// Test: ccache relaunching the compiler is not wrapped again
fn test_recursion_marker(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: recursion_marker");

    let tc = Toolchain::new(config, work_dir, "recursion_marker")?;
    tc.add_binary("gcc", &config.binary("print-env"))?;

    let out = run_exec_call(config, &tc, "execvp", "gcc", &["-c", "x.c"], &[("UCC_RECURSE", "1")])?;
    out.expect_success()?;
    let (args, env) = out.report()?;
    ensure!(args == vec!["gcc", "-c", "x.c"], "unexpected args {:?}", args);
    ensure!(env.contains_key("LD_PRELOAD"), "environment should be untouched");

    println!("    PASS");
    Ok(())
}

/// Test: a compiler name linking to ccache (like /usr/lib/ccache/gcc) runs once
fn test_link_to_wrapper(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: link_to_wrapper");

    let tc = Toolchain::new(config, work_dir, "link_to_wrapper")?;
    tc.add_symlink("gcc", &tc.ccache)?;

    let out = run_exec_call(config, &tc, "execvp", "gcc", &["-c", "x.c"], &[])?;
    out.expect_success()?;
    let (args, _) = out.report()?;
    ensure!(args == vec!["gcc", "-c", "x.c"], "unexpected args {:?}", args);

    println!("    PASS");
    Ok(())
}

/// Test: files without a known format are run through /bin/sh
fn test_enoexec_fallback(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: enoexec_fallback");

    let tc = Toolchain::new(config, work_dir, "enoexec_fallback")?;
    let tool = tc.add_script("tool", "echo \"FALLBACK $0 $*\"\n")?;

    let out = run_exec_call(config, &tc, "execvp", "tool", &["a", "b"], &[])?;
    out.expect_success()?;
    let expected = format!("FALLBACK {} a b", tool.display());
    ensure!(out.stdout.trim() == expected, "unexpected output: {}", out.stdout);

    // plain execve has no fallback
    let out = run_exec_call(config, &tc, "execve", &path_str(&tool), &[], &[])?;
    ensure!(
        out.stdout.trim() == format!("EXEC_FAILED:{}", libc::ENOEXEC),
        "unexpected output: {}",
        out.stdout
    );

    println!("    PASS");
    Ok(())
}

/// Test: unknown commands fail with ENOENT
fn test_not_found(config: &TestConfig, work_dir: &Path) -> Result<()> {
    println!("  Running test: not_found");

    let tc = Toolchain::new(config, work_dir, "not_found")?;

    let out = run_exec_call(config, &tc, "execvp", "ucw-no-such-gcc", &[], &[])?;
    ensure!(out.exit_code == 127, "unexpected exit code {}", out.exit_code);
    ensure!(
        out.stdout.trim() == format!("EXEC_FAILED:{}", libc::ENOENT),
        "unexpected output: {}",
        out.stdout
    );

    println!("    PASS");
    Ok(())
}

type TestFn = fn(&TestConfig, &Path) -> Result<()>;

fn main() -> ExitCode {
    println!("=== libucw Test Suite ===");
    println!();

    let config = TestConfig::parse();
    if let Err(e) = config.validate() {
        eprintln!("Error: {:#}", e);
        eprintln!("Use --help for usage information");
        return ExitCode::from(1);
    }

    // Keep the TempDir alive until the end of the run
    let (_tmp, work_dir): (Option<TempDir>, PathBuf) = match &config.work_dir {
        Some(dir) => {
            if dir.exists() {
                if let Err(e) = fs::remove_dir_all(dir) {
                    eprintln!("Warning: Failed to clean work dir: {}", e);
                }
            }
            if let Err(e) = fs::create_dir_all(dir) {
                eprintln!("Error: Failed to create work dir: {}", e);
                return ExitCode::from(1);
            }
            (None, dir.clone())
        }
        None => match tempfile::Builder::new().prefix("ucw-tests").tempdir() {
            Ok(tmp) => {
                let path = tmp.path().to_path_buf();
                (Some(tmp), path)
            }
            Err(e) => {
                eprintln!("Error: Failed to create work dir: {}", e);
                return ExitCode::from(1);
            }
        },
    };

    println!("Configuration:");
    println!("  Preload:       {}", config.preload.display());
    println!("  Launcher:      {}", config.launcher.display());
    println!("  Test binaries: {}", config.test_binaries.display());
    println!("  Work dir:      {}", work_dir.display());
    println!();

    let tests: Vec<(&str, TestFn)> = vec![
        ("compiler_wrapped", test_compiler_wrapped),
        ("exec_variants", test_exec_variants),
        ("list_search_path", test_list_search_path),
        ("passthrough", test_passthrough),
        ("save_temps", test_save_temps),
        ("shebang", test_shebang),
        ("recursion_marker", test_recursion_marker),
        ("link_to_wrapper", test_link_to_wrapper),
        ("enoexec_fallback", test_enoexec_fallback),
        ("not_found", test_not_found),
    ];

    let mut passed = 0;
    let mut failed = 0;

    println!("Running {} tests...", tests.len());
    println!();

    for (name, test_fn) in &tests {
        match test_fn(&config, &work_dir) {
            Ok(()) => passed += 1,
            Err(e) => {
                println!("  FAILED ({}): {:#}", name, e);
                failed += 1;
            }
        }
    }

    println!();
    println!("=== Results ===");
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!();

    if failed > 0 {
        ExitCode::from(1)
    } else {
        println!("All tests passed!");
        ExitCode::SUCCESS
    }
}
