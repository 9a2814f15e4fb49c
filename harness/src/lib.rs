pub mod child;
pub mod config;
pub mod monitor;
pub mod registry;
pub mod runner;
pub mod suite;
pub mod visualize;

pub use child::{ChildExit, SupervisedChild};
pub use config::{HarnessConfig, DEFAULT_TIMEOUT};
pub use monitor::{platform_monitor, MonitorHandle, NoopMonitor, ResourceMonitor, RusageMonitor};
pub use registry::{RegistryError, TestCase, TestRegistry};
pub use runner::{ProcessRunner, RunOutcome, RunStatus};
pub use suite::{
    classify, find_executable, run_suite, run_suite_with_monitor, suite_exit_code, HarnessError,
    TestReport, Verdict,
};
pub use visualize::{
    ExportError, ExportOutcome, VisualizationArtifact, VisualizationExporter,
    MAX_EMBEDDED_FILE_SIZE,
};
