//! Detaching the process from its controlling terminal

use crate::{PacketLogError, Result};
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;

/// Fork into the background.
///
/// The parent exits with status 0. The child becomes a session leader and
/// has stdin, stdout and stderr redirected to `/dev/null`. Must be called
/// before any runtime threads are started.
pub fn daemonize() -> Result<()> {
    // SAFETY: called while the process is still single-threaded.
    match unsafe { libc::fork() } {
        -1 => return Err(os_error("Failed to fork for daemon")),
        0 => {}
        _ => std::process::exit(0),
    }

    // SAFETY: plain syscall, no pointers involved.
    if unsafe { libc::setsid() } < 0 {
        return Err(os_error("Failed to setsid"));
    }

    redirect_stdio()
}

fn redirect_stdio() -> Result<()> {
    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| PacketLogError::Daemon(format!("Failed to open /dev/null: {}", e)))?;

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are open; dup2 closes `target` first.
        if unsafe { libc::dup2(null.as_raw_fd(), target) } < 0 {
            return Err(os_error("Failed to redirect standard streams"));
        }
    }
    Ok(())
}

fn os_error(context: &str) -> PacketLogError {
    PacketLogError::Daemon(format!("{}: {}", context, io::Error::last_os_error()))
}
