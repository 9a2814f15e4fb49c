//! Peak memory sampling for the executable under test
//!
//! A single [`ResourceMonitor`] is chosen per process by [`platform_monitor`]:
//!
//! - Windows: peak working set through the process accounting API
//! - Linux and macOS: `ru_maxrss` reported by the kernel when the child is reaped
//! - anything else: [`NoopMonitor`], memory is reported as unavailable
//!
//! Sampling never fails a test run; any platform error degrades to `None`.

use crate::child::ChildExit;

/// Source of peak memory figures for child processes
pub trait ResourceMonitor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Start observing a freshly spawned process.
    ///
    /// Returns `None` when the platform cannot sample this process. Any OS
    /// resource held by the returned handle is released when it is dropped.
    fn attach(&self, pid: u32) -> Option<Box<dyn MonitorHandle>>;
}

/// Per-process sampling session returned by [`ResourceMonitor::attach`]
pub trait MonitorHandle: Send {
    /// Called once the process has been reaped, before the peak is read
    fn record_exit(&mut self, _exit: &ChildExit) {}

    /// Peak memory in bytes, `None` if the platform call failed
    fn peak_memory_bytes(&mut self) -> Option<u64>;
}

/// Monitor for platforms without a usable accounting facility
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ResourceMonitor for NoopMonitor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn attach(&self, _pid: u32) -> Option<Box<dyn MonitorHandle>> {
        None
    }
}

#[cfg(windows)]
pub use win32::WindowsMonitor;

/// Select the monitor for the current platform
#[cfg(windows)]
pub fn platform_monitor() -> Box<dyn ResourceMonitor> {
    Box::new(WindowsMonitor)
}

/// Select the monitor for the current platform
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn platform_monitor() -> Box<dyn ResourceMonitor> {
    Box::new(RusageMonitor)
}

/// Select the monitor for the current platform
#[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
pub fn platform_monitor() -> Box<dyn ResourceMonitor> {
    Box::new(NoopMonitor)
}

/// Reports the peak resident set size the kernel accounted for the child.
///
/// The figure is taken from the resource usage returned when the child is
/// reaped, so allocations made right before exit are included.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusageMonitor;

impl ResourceMonitor for RusageMonitor {
    fn name(&self) -> &'static str {
        "rusage"
    }

    fn attach(&self, _pid: u32) -> Option<Box<dyn MonitorHandle>> {
        Some(Box::new(RusageHandle { peak: None }))
    }
}

struct RusageHandle {
    peak: Option<u64>,
}

impl MonitorHandle for RusageHandle {
    fn record_exit(&mut self, exit: &ChildExit) {
        self.peak = exit.max_rss_bytes;
    }

    fn peak_memory_bytes(&mut self) -> Option<u64> {
        self.peak
    }
}

#[cfg(windows)]
mod win32 {
    use super::{MonitorHandle, ResourceMonitor};
    use tracing::warn;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::System::ProcessStatus::{
        GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS,
    };
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    /// Queries `PeakWorkingSetSize` through `GetProcessMemoryInfo`
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsMonitor;

    impl ResourceMonitor for WindowsMonitor {
        fn name(&self) -> &'static str {
            "psapi"
        }

        fn attach(&self, pid: u32) -> Option<Box<dyn MonitorHandle>> {
            // SAFETY: no pointers are passed; a null handle signals failure
            let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
            if handle.is_null() {
                warn!(
                    "OpenProcess failed for pid {}: {}",
                    pid,
                    std::io::Error::last_os_error()
                );
                return None;
            }
            Some(Box::new(ProcessHandle(handle)))
        }
    }

    struct ProcessHandle(HANDLE);

    // SAFETY: a process handle may be used and closed from any thread
    unsafe impl Send for ProcessHandle {}

    impl MonitorHandle for ProcessHandle {
        fn peak_memory_bytes(&mut self) -> Option<u64> {
            let size = std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
            // SAFETY: PROCESS_MEMORY_COUNTERS is plain data, all-zero is valid
            let mut counters: PROCESS_MEMORY_COUNTERS = unsafe { std::mem::zeroed() };
            counters.cb = size;

            // SAFETY: handle is open until drop, counters outlives the call
            let ok = unsafe { GetProcessMemoryInfo(self.0, &mut counters, size) };
            if ok == 0 {
                warn!(
                    "GetProcessMemoryInfo failed: {}",
                    std::io::Error::last_os_error()
                );
                return None;
            }
            Some(counters.PeakWorkingSetSize as u64)
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            // SAFETY: the handle came from OpenProcess and is closed exactly once
            unsafe {
                CloseHandle(self.0);
            }
        }
    }
}
