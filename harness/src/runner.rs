use crate::child::{launch_command, SupervisedChild};
use crate::monitor::ResourceMonitor;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, error, warn};

/// How a run of the executable under test ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The process exited on its own before the deadline
    Finished,
    /// The deadline passed and the process was killed
    Timeout,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Finished => f.write_str("Finished"),
            RunStatus::Timeout => f.write_str("Timeout"),
        }
    }
}

/// Result of a single supervised run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Exit code, absent when the process was killed by a signal or never started
    pub exit_code: Option<i32>,
    /// Wall clock time from launch until the process was reaped
    pub elapsed: Duration,
    /// Peak memory, present only when the platform monitor could sample it
    pub peak_memory_bytes: Option<u64>,
}

impl RunOutcome {
    /// Peak memory in MiB, for display
    pub fn peak_memory_mib(&self) -> Option<f64> {
        self.peak_memory_bytes
            .map(|bytes| bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Launches the executable under test with a deadline and memory sampling
pub struct ProcessRunner {
    timeout: Duration,
    monitor: Box<dyn ResourceMonitor>,
}

impl ProcessRunner {
    pub fn new(timeout: Duration, monitor: Box<dyn ResourceMonitor>) -> Self {
        Self { timeout, monitor }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `executable input output` to completion or until the deadline.
    ///
    /// Standard streams are inherited so the child reports progress directly
    /// to the console. This never fails: a process that cannot be launched is
    /// reported as finished without an exit code.
    pub async fn run(&self, executable: &Path, input: &Path, output: &Path) -> RunOutcome {
        let start = Instant::now();

        let mut child = match SupervisedChild::spawn(launch_command(executable, input, output)) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch {}: {}", executable.display(), e);
                return RunOutcome {
                    status: RunStatus::Finished,
                    exit_code: None,
                    elapsed: start.elapsed(),
                    peak_memory_bytes: None,
                };
            }
        };

        let mut monitor = child.id().and_then(|pid| {
            debug!("Attaching {} monitor to pid {}", self.monitor.name(), pid);
            self.monitor.attach(pid)
        });

        let deadline = time::Instant::from_std(start + self.timeout);
        let (status, exit) = tokio::select! {
            result = child.wait() => (RunStatus::Finished, result),
            _ = time::sleep_until(deadline) => {
                warn!(
                    "{} exceeded {}s deadline, killing",
                    executable.display(),
                    self.timeout.as_secs_f64()
                );
                if let Err(e) = child.kill().await {
                    error!("Failed to kill {}: {}", executable.display(), e);
                }
                (RunStatus::Timeout, child.wait().await)
            }
        };
        let elapsed = start.elapsed();

        // sample before the monitor handle is released
        let peak_memory_bytes = monitor.as_mut().and_then(|handle| {
            if let Ok(exit) = &exit {
                handle.record_exit(exit);
            }
            handle.peak_memory_bytes()
        });
        drop(monitor);

        let exit_code = match exit {
            Ok(exit) => exit.status.code(),
            Err(e) => {
                error!("Failed to collect exit status of {}: {}", executable.display(), e);
                None
            }
        };

        RunOutcome {
            status,
            exit_code,
            elapsed,
            peak_memory_bytes,
        }
    }
}
