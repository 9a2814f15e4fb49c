//! Supervision of a single launched child process
//!
//! On unix the child is reaped with `wait4`, which hands back the kernel's
//! accounting for the process at the moment it is collected. Elsewhere tokio
//! owns the child and no accounting is available at reap time.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// What is known about a child once it has been reaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub status: ExitStatus,
    /// Peak resident set size accounted by the kernel, including reaped descendants
    pub max_rss_bytes: Option<u64>,
}

/// `executable input output` with all standard streams inherited
pub fn launch_command(executable: &Path, input: &Path, output: &Path) -> Command {
    let mut command = Command::new(executable);
    command
        .arg(input)
        .arg(output)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
}

pub use imp::SupervisedChild;

#[cfg(unix)]
mod imp {
    use super::ChildExit;
    use std::io;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Command, ExitStatus};
    use std::sync::{Arc, Mutex};
    use tokio::task::JoinHandle;
    use tracing::warn;

    /// A running child reaped on a blocking thread.
    ///
    /// The pid stays valid for signalling until the reaper collects it; the
    /// shared flag is only flipped under the lock that `kill` also takes.
    /// Dropping an unreaped child kills it.
    pub struct SupervisedChild {
        pid: libc::pid_t,
        reaped: Arc<Mutex<bool>>,
        reaper: Option<JoinHandle<io::Result<ChildExit>>>,
        exit: Option<ChildExit>,
    }

    impl SupervisedChild {
        pub fn spawn(mut command: Command) -> io::Result<Self> {
            let child = command.spawn()?;
            let pid = libc::pid_t::try_from(child.id()).map_err(io::Error::other)?;
            // std::process::Child neither waits nor kills on drop
            drop(child);

            let reaped = Arc::new(Mutex::new(false));
            let flag = Arc::clone(&reaped);
            let reaper = tokio::task::spawn_blocking(move || reap(pid, &flag));

            Ok(Self {
                pid,
                reaped,
                reaper: Some(reaper),
                exit: None,
            })
        }

        pub fn id(&self) -> Option<u32> {
            u32::try_from(self.pid).ok()
        }

        /// Wait until the child has been reaped. Cancel safe.
        pub async fn wait(&mut self) -> io::Result<ChildExit> {
            if let Some(exit) = self.exit {
                return Ok(exit);
            }
            let reaper = self
                .reaper
                .as_mut()
                .ok_or_else(|| io::Error::other("child exit status already lost"))?;
            let result = reaper.await;
            self.reaper = None;

            let exit = result.map_err(io::Error::other)??;
            self.exit = Some(exit);
            Ok(exit)
        }

        /// Send SIGKILL unless the child is already reaped, then wait for it
        pub async fn kill(&mut self) -> io::Result<()> {
            self.signal_kill()?;
            self.wait().await.map(|_| ())
        }

        fn signal_kill(&self) -> io::Result<()> {
            let reaped = self
                .reaped
                .lock()
                .map_err(|_| io::Error::other("reaper state poisoned"))?;
            if *reaped {
                return Ok(());
            }
            // SAFETY: the pid is not reaped while the lock is held, so it is still our child
            if unsafe { libc::kill(self.pid, libc::SIGKILL) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    impl Drop for SupervisedChild {
        fn drop(&mut self) {
            if self.exit.is_none() {
                if let Err(e) = self.signal_kill() {
                    warn!("Failed to kill abandoned child {}: {}", self.pid, e);
                }
            }
        }
    }

    fn reap(pid: libc::pid_t, reaped: &Mutex<bool>) -> io::Result<ChildExit> {
        // block until exit while leaving the zombie in place
        loop {
            // SAFETY: siginfo_t is plain data, all-zero is valid
            let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
            // SAFETY: info outlives the call
            let rc = unsafe {
                libc::waitid(
                    libc::P_PID,
                    pid as libc::id_t,
                    &mut info,
                    libc::WEXITED | libc::WNOWAIT,
                )
            };
            if rc == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        let mut guard = reaped
            .lock()
            .map_err(|_| io::Error::other("reaper state poisoned"))?;
        let mut status: libc::c_int = 0;
        // SAFETY: rusage is plain data, all-zero is valid
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: status and usage outlive the call; the child is already a zombie
        let rc = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        *guard = true;

        Ok(ChildExit {
            status: ExitStatus::from_raw(status),
            max_rss_bytes: max_rss_bytes(usage.ru_maxrss),
        })
    }

    /// `ru_maxrss` is in bytes on macOS and in KiB on Linux
    pub(super) fn max_rss_bytes(ru_maxrss: libc::c_long) -> Option<u64> {
        let max_rss = u64::try_from(ru_maxrss).ok().filter(|&rss| rss > 0)?;
        if cfg!(target_os = "macos") {
            Some(max_rss)
        } else if cfg!(target_os = "linux") {
            Some(max_rss * 1024)
        } else {
            None
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::ChildExit;
    use std::io;
    use std::process::Command;

    /// A running child owned by tokio; killed if dropped unreaped
    pub struct SupervisedChild {
        child: tokio::process::Child,
    }

    impl SupervisedChild {
        pub fn spawn(command: Command) -> io::Result<Self> {
            let mut command = tokio::process::Command::from(command);
            command.kill_on_drop(true);
            Ok(Self {
                child: command.spawn()?,
            })
        }

        pub fn id(&self) -> Option<u32> {
            self.child.id()
        }

        pub async fn wait(&mut self) -> io::Result<ChildExit> {
            let status = self.child.wait().await?;
            Ok(ChildExit {
                status,
                max_rss_bytes: None,
            })
        }

        pub async fn kill(&mut self) -> io::Result<()> {
            self.child.kill().await
        }
    }
}
