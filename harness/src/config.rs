use cmake_builder::{BuildProfile, DEFAULT_TARGET};
use std::path::PathBuf;
use std::time::Duration;

/// Wall-clock deadline applied to every run of the executable under test
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Process-wide harness configuration, built once at startup
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Project directory holding `tests/` and `PointVisualizer/`
    pub project_root: PathBuf,
    /// CMake binary directory; outputs are written below it
    pub build_dir: PathBuf,
    /// Deadline for a single test run
    pub timeout: Duration,
    /// Build type, selects the per-config executable directory
    pub profile: BuildProfile,
    /// Name of the executable under test
    pub target: String,
}

impl HarnessConfig {
    /// Create a configuration with the build directory at `<project_root>/build`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            build_dir: project_root.join("build"),
            project_root,
            timeout: DEFAULT_TIMEOUT,
            profile: BuildProfile::default(),
            target: DEFAULT_TARGET.to_string(),
        }
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn input_dir(&self) -> PathBuf {
        self.project_root.join("tests").join("input")
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.project_root.join("tests").join("reference")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.build_dir.join("tests_output")
    }

    pub fn html_output_dir(&self) -> PathBuf {
        self.build_dir.join("tests_html_output")
    }

    /// Directory holding the viewer template and its support scripts
    pub fn assets_dir(&self) -> PathBuf {
        self.project_root.join("PointVisualizer")
    }
}
