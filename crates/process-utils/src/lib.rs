//! Small process-related helpers shared across the workspace.
//!
//! Download engines drive external executables from blocking worker threads.
//! These helpers keep the spawned children from outliving the work that
//! owns them.

use std::ffi::OsStr;
use std::io;
use std::process::{Child, ExitStatus};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Put the child in a process group of its own, so it can be killed
/// together with everything it spawns (e.g. ffmpeg for merges).
///
/// Only has an effect on Unix.
pub trait ProcessGroupExt {
    fn own_process_group(&mut self) -> &mut Self;
}

impl ProcessGroupExt for std::process::Command {
    fn own_process_group(&mut self) -> &mut Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            self.process_group(0);
        }
        self
    }
}

/// Send `SIGKILL` to the process group led by `pid`.
///
/// A group that is already gone is not an error.
#[cfg(unix)]
fn kill_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) takes plain integers and has no memory preconditions.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Kill the process group led by an unreaped child, then reap the leader.
///
/// The leader must have been spawned with
/// [`ProcessGroupExt::own_process_group`]. Elsewhere than Unix this is
/// [`terminate`].
pub fn terminate_group(child: &mut Child) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        // The unreaped leader keeps its pid, so the group id cannot have
        // been reused yet.
        kill_group(child.id())?;
        child.wait()
    }
    #[cfg(not(unix))]
    {
        terminate(child)
    }
}

/// Kill a child and reap it.
///
/// A child that already exited is only reaped.
pub fn terminate(child: &mut Child) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    match child.kill() {
        Ok(()) => {}
        // Raced with a natural exit.
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
        Err(e) => return Err(e),
    }
    child.wait()
}

/// Owns a running child and kills it when dropped.
///
/// Call [`KillOnDrop::wait`] to reap a child that is expected to finish on
/// its own; every other exit path (early return, `?`, panic) tears it down.
pub struct KillOnDrop {
    child: Child,
    reaped: bool,
    group: bool,
}

impl KillOnDrop {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
            group: false,
        }
    }

    /// Guard a child spawned with [`ProcessGroupExt::own_process_group`];
    /// killing it takes down its whole group.
    pub fn process_group(child: Child) -> Self {
        Self {
            child,
            reaped: false,
            group: true,
        }
    }

    fn terminate(&mut self) -> io::Result<ExitStatus> {
        if self.group {
            terminate_group(&mut self.child)
        } else {
            terminate(&mut self.child)
        }
    }

    /// Borrow the child, e.g. to take its stdio handles.
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the child to exit on its own.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    /// Kill the child now and reap it.
    pub fn kill(&mut self) -> io::Result<ExitStatus> {
        let status = self.terminate()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.terminate();
        }
    }
}
