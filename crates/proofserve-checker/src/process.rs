//! Scoped ownership of checker child processes
//!
//! A [`ChildGuard`] owns a spawned checker for its whole lifetime. Explicit
//! exit paths call [`ChildGuard::terminate`], which kills and reaps the child.
//! If the guard is dropped without that (panic, cancelled future), `Drop`
//! still sends the kill signal and tokio reaps the zombie in the background.
//!
//! `lake exe repl` forks the actual REPL, so killing the direct child is not
//! enough. On unix the checker is started as the leader of its own process
//! group ([`isolate_process_group`]) and the whole group is signalled.

use std::io;
use std::process::ExitStatus;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Make the command start a new process group led by the child
pub fn isolate_process_group(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

pub struct ChildGuard {
    child: Child,
    pid: Option<u32>,
    group: bool,
    reaped: bool,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            group: false,
            reaped: false,
        }
    }

    /// Guard a child spawned after [`isolate_process_group`]
    pub fn with_process_group(child: Child) -> Self {
        let mut guard = Self::new(child);
        guard.group = cfg!(unix);
        guard
    }

    /// SIGKILL every process in the child's group; missing groups are fine
    fn kill_group(&self) {
        #[cfg(unix)]
        if let (true, Some(pid)) = (self.group, self.pid) {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            #[allow(clippy::cast_possible_wrap)]
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid, error = %e, "Failed to kill checker process group"),
            }
        }
    }

    /// OS process id captured at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Mutable access for taking pipes and awaiting exit
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Await normal exit and mark the child as reaped
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status)
    }

    /// Kill the child (and its group) if still running and wait until it is gone
    pub async fn terminate(&mut self) {
        // Descendants can outlive a leader that already exited
        self.kill_group();
        if self.reaped {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {
                self.reaped = true;
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(pid = ?self.pid, error = %e, "Failed to poll checker process"),
        }
        // `kill` sends SIGKILL and then waits for the exit status
        match self.child.kill().await {
            Ok(()) => {
                debug!(pid = ?self.pid, "Checker process killed");
                self.reaped = true;
            }
            Err(e) => warn!(pid = ?self.pid, error = %e, "Failed to kill checker process"),
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill_group();
            if let Err(e) = self.child.start_kill() {
                // Already exited processes report InvalidInput; nothing to do
                if e.kind() != io::ErrorKind::InvalidInput {
                    warn!(pid = ?self.pid, error = %e, "Failed to kill checker process on drop");
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    /// Whether `pid` is still executing; a zombie awaiting reaping counts as dead
    fn process_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            // Field 3 is the state; the command name in field 2 may contain spaces
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .map_or(false, |state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    fn spawn_sleeper() -> ChildGuard {
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .expect("spawn sleep");
        ChildGuard::new(child)
    }

    #[tokio::test]
    async fn test_terminate_kills_and_reaps() {
        let mut guard = spawn_sleeper();
        let pid = guard.pid().expect("pid");
        assert!(process_alive(pid));

        guard.terminate().await;
        assert!(!process_alive(pid), "process {pid} should be gone");

        // Idempotent
        guard.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_noop() {
        let child = Command::new("true").spawn().expect("spawn true");
        let mut guard = ChildGuard::new(child);
        let status = guard.wait().await.expect("wait");
        assert!(status.success());
        guard.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_kills_grandchildren() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pid_file = dir.path().join("grandchild.pid");
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(format!("sleep 30 & echo $! > {}; wait", pid_file.display()))
            .stdout(Stdio::null());
        isolate_process_group(&mut cmd);
        let mut guard = ChildGuard::with_process_group(cmd.spawn().expect("spawn sh"));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let grandchild = loop {
            if let Some(pid) = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
            {
                break pid;
            }
            assert!(std::time::Instant::now() < deadline, "grandchild never started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert!(process_alive(grandchild));

        guard.terminate().await;

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while process_alive(grandchild) && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!process_alive(grandchild), "grandchild {grandchild} survived");
    }

    #[tokio::test]
    async fn test_drop_kills_running_child() {
        let guard = spawn_sleeper();
        let pid = guard.pid().expect("pid");
        drop(guard);

        // The kill signal is delivered asynchronously
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while process_alive(pid) && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!process_alive(pid), "dropped guard should kill {pid}");
    }
}
