//! Sequential test driver
//!
//! Locates the executable under test, then for each registered test case runs
//! it under the [`ProcessRunner`], reports the result on the console and
//! generates a viewer document. Individual test failures never stop the
//! suite; only missing infrastructure does.

use crate::config::HarnessConfig;
use crate::monitor::{platform_monitor, ResourceMonitor};
use crate::registry::{RegistryError, TestCase, TestRegistry};
use crate::runner::{ProcessRunner, RunOutcome, RunStatus};
use crate::visualize::{ExportError, ExportOutcome, VisualizationExporter};
use cmake_builder::{executable_candidates, locate_executable};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

const SEPARATOR_WIDTH: usize = 80;

/// Conditions that stop the whole run
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Cannot find {target} anywhere, tried: {}", display_paths(.candidates))]
    ExecutableNotFound {
        target: String,
        candidates: Vec<PathBuf>,
    },

    #[error(transparent)]
    Assets(ExportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pass/fail classification of a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// Exit code was not zero, or there was none (killed, never launched)
    BadExitCode(Option<i32>),
    /// Exit code zero but the expected output file does not exist
    MissingOutput,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

/// Everything observed for one test case
#[derive(Debug, Clone)]
pub struct TestReport {
    pub case: TestCase,
    pub outcome: RunOutcome,
    pub verdict: Verdict,
    /// `None` when viewer generation failed
    pub export: Option<ExportOutcome>,
}

/// Apply the executable's success contract: exit code 0 and an output file
pub fn classify(outcome: &RunOutcome, expected_output: &Path) -> Verdict {
    if outcome.exit_code != Some(0) {
        Verdict::BadExitCode(outcome.exit_code)
    } else if !expected_output.is_file() {
        Verdict::MissingOutput
    } else {
        Verdict::Passed
    }
}

/// First existing build location of the executable under test
pub fn find_executable(config: &HarnessConfig) -> Result<PathBuf, HarnessError> {
    let candidates = executable_candidates(&config.build_dir, config.profile, &config.target);
    match locate_executable(&candidates) {
        Some(found) => Ok(found.to_path_buf()),
        None => Err(HarnessError::ExecutableNotFound {
            target: config.target.clone(),
            candidates,
        }),
    }
}

/// Process exit code for a finished suite.
///
/// Only infrastructure errors fail the process. Individual test failures are
/// reported on the console and still exit 0.
pub fn suite_exit_code(result: &Result<Vec<TestReport>, HarnessError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// Run every test with the memory monitor of the current platform
pub async fn run_suite(config: &HarnessConfig) -> Result<Vec<TestReport>, HarnessError> {
    run_suite_with_monitor(config, platform_monitor()).await
}

/// Run every test in registry order.
///
/// Returns the per-test reports; no suite-level verdict is derived from them.
pub async fn run_suite_with_monitor(
    config: &HarnessConfig,
    monitor: Box<dyn ResourceMonitor>,
) -> Result<Vec<TestReport>, HarnessError> {
    fs::create_dir_all(&config.build_dir)?;

    println!("Finding {} executable...", config.target);
    let executable = find_executable(config)?;
    info!("Using executable {}", executable.display());

    fs::create_dir_all(config.output_dir())?;
    fs::create_dir_all(config.html_output_dir())?;
    let exporter = VisualizationExporter::from_config(config).map_err(HarnessError::Assets)?;
    let cases = TestRegistry::from_config(config).enumerate()?;
    let runner = ProcessRunner::new(config.timeout, monitor);

    println!("Running tests...");
    let mut reports = Vec::with_capacity(cases.len());
    for case in cases {
        print_separator();
        reports.push(run_case(&runner, &exporter, &executable, case).await);
    }
    print_separator();

    Ok(reports)
}

async fn run_case(
    runner: &ProcessRunner,
    exporter: &VisualizationExporter,
    executable: &Path,
    case: TestCase,
) -> TestReport {
    println!("Running test: {}", case.input_path.display());
    let outcome = runner
        .run(executable, &case.input_path, &case.expected_output_path)
        .await;

    if outcome.status == RunStatus::Timeout {
        println!("ERROR: Failing with timeout");
    }
    println!("Time: {:.3}s", outcome.elapsed.as_secs_f64());
    if let Some(mib) = outcome.peak_memory_mib() {
        println!("Peak memory: {:.2}Mb", mib);
    }

    let verdict = classify(&outcome, &case.expected_output_path);
    match &verdict {
        Verdict::Passed => println!("Status: {}", outcome.status),
        Verdict::BadExitCode(code) => {
            match code {
                Some(code) => println!("ERROR: Child process ended with returncode={}", code),
                None => println!("ERROR: Child process ended without a returncode"),
            }
            print_failing_command(executable, &case);
        }
        Verdict::MissingOutput => {
            println!("ERROR: no output file found");
            print_failing_command(executable, &case);
        }
    }

    let export = match exporter.export(
        &case.expected_output_path,
        case.reference_output_path.as_deref(),
    ) {
        Ok(export) => {
            match &export {
                ExportOutcome::Written(artifact) => {
                    println!("PointVisualizer: {}", artifact.path.display())
                }
                ExportOutcome::Oversized { path, .. } => println!(
                    "WARNING: {} is bigger than 100Mb, skipping generation of visualizer file",
                    path.display()
                ),
                ExportOutcome::NoContent => {}
            }
            Some(export)
        }
        Err(e) => {
            error!("Visualization failed for {}: {}", case.name, e);
            println!("ERROR: {}", e);
            None
        }
    };

    TestReport {
        case,
        outcome,
        verdict,
        export,
    }
}

fn print_failing_command(executable: &Path, case: &TestCase) {
    println!(
        "ERROR: Failing command: \"{}\" \"{}\" \"{}\"",
        executable.display(),
        case.input_path.display(),
        case.expected_output_path.display()
    );
}

fn print_separator() {
    println!("{}", "-".repeat(SEPARATOR_WIDTH));
}
