//! CMake build invocation for the cutSphereMove project
//!
//! This crate drives the external CMake toolchain to configure and build the
//! executable under test, and knows where each CMake generator places the
//! resulting binary so the test harness can find it.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, info};

/// CMake target producing the executable under test
pub const DEFAULT_TARGET: &str = "cutSphereMove";

/// Default install location of CMake on Windows, used when `cmake` is not on PATH
#[cfg(windows)]
const WINDOWS_CMAKE_FALLBACK: &str = r"C:\Program Files\CMake\bin\cmake.exe";

/// Errors related to invoking CMake
#[derive(Error, Debug)]
pub enum BuilderError {
    /// No cmake candidate could be launched
    #[error("Could not start cmake, tried: {}", .tried.join(", "))]
    CmakeNotFound { tried: Vec<String> },

    /// CMake ran but reported failure
    #[error("CMake finished with returncode={code}: {command}")]
    CmakeFailed { command: String, code: i32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type BuilderResult<T> = Result<T, BuilderError>;

/// CMake build configuration (`CMAKE_BUILD_TYPE` / `--config`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildProfile {
    Debug,
    #[default]
    Release,
}

impl BuildProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildProfile::Debug => "Debug",
            BuildProfile::Release => "Release",
        }
    }
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a CMake build
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory holding the top-level CMakeLists.txt
    pub project_root: PathBuf,
    /// CMake binary directory
    pub build_dir: PathBuf,
    /// Build type
    pub profile: BuildProfile,
    /// Target to build
    pub target: String,
}

impl BuildConfig {
    /// Create a configuration building into `<project_root>/build`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            build_dir: project_root.join("build"),
            project_root,
            profile: BuildProfile::default(),
            target: DEFAULT_TARGET.to_string(),
        }
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    pub fn with_profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// CMake executables to try, in order
pub fn default_cmake_candidates() -> Vec<PathBuf> {
    #[allow(unused_mut)]
    let mut candidates = vec![PathBuf::from("cmake")];
    #[cfg(windows)]
    candidates.push(PathBuf::from(WINDOWS_CMAKE_FALLBACK));
    candidates
}

/// Paths where the build may have placed `target`, in lookup order.
///
/// Multi-config generators (Visual Studio) put binaries under a per-profile
/// subdirectory; single-config generators put them in the build directory.
pub fn executable_candidates(build_dir: &Path, profile: BuildProfile, target: &str) -> Vec<PathBuf> {
    if cfg!(windows) {
        let file_name = format!("{}.exe", target);
        vec![
            build_dir.join(profile.as_str()).join(&file_name),
            build_dir.join(&file_name),
        ]
    } else {
        vec![build_dir.join(target)]
    }
}

/// First candidate that exists as a regular file
pub fn locate_executable(candidates: &[PathBuf]) -> Option<&Path> {
    candidates
        .iter()
        .map(PathBuf::as_path)
        .find(|candidate| candidate.is_file())
}

/// Runs CMake configure and build steps for a [`BuildConfig`]
pub struct CmakeBuilder {
    config: BuildConfig,
    cmake_candidates: Vec<PathBuf>,
}

impl CmakeBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            cmake_candidates: default_cmake_candidates(),
        }
    }

    /// Override the list of cmake executables tried
    pub fn with_cmake_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.cmake_candidates = candidates;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Arguments of the configure step for a given source directory
    pub fn configure_args(&self, source_dir: &Path) -> Vec<OsString> {
        vec![
            source_dir.as_os_str().to_os_string(),
            OsString::from(format!("-DCMAKE_BUILD_TYPE={}", self.config.profile)),
        ]
    }

    /// Arguments of the build step
    pub fn build_args(&self) -> Vec<OsString> {
        ["--build", ".", "--target", self.config.target.as_str(), "--config"]
            .into_iter()
            .map(OsString::from)
            .chain(std::iter::once(OsString::from(self.config.profile.as_str())))
            .collect()
    }

    /// Generate the build system in the build directory
    pub fn configure(&self) -> BuilderResult<()> {
        let source_dir = std::path::absolute(&self.config.project_root)?;
        self.invoke(&self.configure_args(&source_dir))
    }

    /// Build the configured target
    pub fn build(&self) -> BuilderResult<()> {
        self.invoke(&self.build_args())
    }

    fn invoke(&self, args: &[OsString]) -> BuilderResult<()> {
        fs::create_dir_all(&self.config.build_dir)?;

        let mut tried = Vec::new();
        for cmake in &self.cmake_candidates {
            let command = render_command(cmake, args);
            info!("{}", command);

            match Command::new(cmake)
                .args(args)
                .current_dir(&self.config.build_dir)
                .status()
            {
                Ok(status) => return check_status(command, status),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} could not be launched: {}", cmake.display(), e);
                    tried.push(cmake.display().to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BuilderError::CmakeNotFound { tried })
    }
}

fn check_status(command: String, status: ExitStatus) -> BuilderResult<()> {
    if status.success() {
        Ok(())
    } else {
        Err(BuilderError::CmakeFailed {
            command,
            code: status.code().unwrap_or(-1),
        })
    }
}

fn render_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
