use crate::config::HarnessConfig;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cannot read test input directory '{path}': {source}")]
    InputDirUnreadable {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A single input file paired with where its output goes and what it is compared to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestCase {
    /// File name of the input, shared by output and reference
    pub name: String,
    pub input_path: PathBuf,
    pub expected_output_path: PathBuf,
    /// Known-good output, only set when the file exists
    pub reference_output_path: Option<PathBuf>,
}

/// Discovers test cases from the input directory
#[derive(Debug, Clone)]
pub struct TestRegistry {
    input_dir: PathBuf,
    reference_dir: PathBuf,
    output_dir: PathBuf,
}

impl TestRegistry {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        reference_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            reference_dir: reference_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            config.input_dir(),
            config.reference_dir(),
            config.output_dir(),
        )
    }

    /// One test case per entry of the input directory, in directory listing order.
    ///
    /// The listing order is platform dependent and callers must not rely on it.
    pub fn enumerate(&self) -> Result<Vec<TestCase>, RegistryError> {
        let entries =
            std::fs::read_dir(&self.input_dir).map_err(|source| RegistryError::InputDirUnreadable {
                path: self.input_dir.display().to_string(),
                source,
            })?;

        let mut cases = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.input_dir.display(), e);
                    continue;
                }
            };

            let file_name = entry.file_name();
            let reference = self.reference_dir.join(&file_name);
            let case = TestCase {
                name: file_name.to_string_lossy().into_owned(),
                input_path: entry.path(),
                expected_output_path: self.output_dir.join(&file_name),
                reference_output_path: reference.is_file().then_some(reference),
            };
            debug!(
                "Registered test {} (reference: {})",
                case.name,
                case.reference_output_path.is_some()
            );
            cases.push(case);
        }

        Ok(cases)
    }
}
