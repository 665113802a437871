//! Single-instance daemon guard via a PID file (component C8).
//!
//! Ported from the original's `pid/pid.go`: one fixed path under the
//! system temp directory, written on `serve` and checked before starting
//! a second instance; `stop` reads it back and signals the process.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

fn pid_file_path() -> PathBuf {
    std::env::temp_dir().join(".statebackend-git.pid")
}

fn read_pid() -> Result<Option<i32>> {
    match std::fs::read_to_string(pid_file_path()) {
        Ok(contents) => Ok(Some(contents.trim().parse().context("pid file is not a valid pid")?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn process_running(pid: i32) -> bool {
    // Signal 0 performs no action but still validates the pid exists and
    // is reachable from this process.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn process_running(_pid: i32) -> bool {
    false
}

fn pid_running() -> Result<Option<i32>> {
    match read_pid()? {
        Some(pid) if process_running(pid) => Ok(Some(pid)),
        _ => Ok(None),
    }
}

/// Writes the current process's pid, failing if another instance is
/// already running.
pub fn lock_pid_file() -> Result<()> {
    if let Some(pid) = pid_running()? {
        bail!("another instance is already running (pid {pid})");
    }

    std::fs::write(pid_file_path(), std::process::id().to_string())
        .context("failed to write pid file")?;
    Ok(())
}

/// Removes the pid file; called on clean shutdown.
pub fn release_pid_file() -> Result<()> {
    match std::fs::remove_file(pid_file_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Signals a running instance to terminate and removes its pid file.
#[cfg(unix)]
pub fn stop() -> Result<()> {
    let Some(pid) = pid_running()? else {
        println!("no running instance found");
        return Ok(());
    };

    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        bail!("failed to signal pid {pid}");
    }

    std::fs::remove_file(pid_file_path()).context("failed to remove pid file")?;
    println!("stopped pid {pid}");
    Ok(())
}

#[cfg(not(unix))]
pub fn stop() -> Result<()> {
    bail!("stop is only supported on unix targets");
}
