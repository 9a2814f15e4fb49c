//! Point set viewer generation
//!
//! For every test the produced output and, when available, the reference
//! output are spliced into a copy of the `PointVisualizer.html` template so the
//! two point sets can be compared side by side in a browser. The template
//! loads `three.js` and `OrbitControls.js` from its own directory, so those are
//! copied next to the generated documents once per output directory.
//!
//! Dataset contents are inserted verbatim: they are trusted files produced by
//! the project itself and the template parses them from a script block.
//! Substitution is a single pass over the template, so placeholder tokens that
//! happen to appear inside inserted content are left untouched.

use crate::config::HarnessConfig;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Viewer template file inside the assets directory
pub const TEMPLATE_FILE: &str = "PointVisualizer.html";

/// Static scripts the template loads relative to itself
pub const SUPPORT_ASSETS: [&str; 2] = ["OrbitControls.js", "three.js"];

/// Files larger than this are never loaded into a viewer document
pub const MAX_EMBEDDED_FILE_SIZE: u64 = 100 * 1024 * 1024;

const NEW_FILENAME: &str = "%NEW_FILENAME%";
const NEW_TEST_OUTPUT: &str = "%NEW_TEST_OUTPUT%";
const OLD_FILENAME: &str = "%OLD_FILENAME%";
const OLD_TEST_OUTPUT: &str = "%OLD_TEST_OUTPUT%";

#[derive(Error, Debug)]
pub enum ExportError {
    /// The assets directory is absent; fatal for the whole run
    #[error("Cannot find PointVisualizer directory at '{path}'")]
    AssetsMissing { path: String },

    #[error("Cannot read viewer template '{path}': {source}")]
    TemplateUnreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot copy '{asset}' into '{dir}': {source}")]
    AssetCopyFailed {
        asset: String,
        dir: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read dataset '{path}': {source}")]
    DatasetUnreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write viewer document '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A generated viewer document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationArtifact {
    pub path: PathBuf,
    /// Display name of the embedded new output, if any
    pub new_filename: Option<String>,
    /// Display name of the embedded reference output, if any
    pub old_filename: Option<String>,
}

/// What [`VisualizationExporter::export`] did for one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written(VisualizationArtifact),
    /// An input exceeded [`MAX_EMBEDDED_FILE_SIZE`]; nothing was written
    Oversized { path: PathBuf, size: u64 },
    /// Neither the output nor the reference had content; nothing was written
    NoContent,
}

enum Dataset {
    Absent,
    Oversized(u64),
    Loaded(String),
}

/// Writes viewer documents into an HTML output directory
#[derive(Debug, Clone)]
pub struct VisualizationExporter {
    assets_dir: PathBuf,
    html_output_dir: PathBuf,
}

impl VisualizationExporter {
    /// Fails only when the assets directory does not exist
    pub fn new(
        assets_dir: impl Into<PathBuf>,
        html_output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ExportError> {
        let assets_dir = assets_dir.into();
        if !assets_dir.is_dir() {
            return Err(ExportError::AssetsMissing {
                path: assets_dir.display().to_string(),
            });
        }

        Ok(Self {
            assets_dir,
            html_output_dir: html_output_dir.into(),
        })
    }

    pub fn from_config(config: &HarnessConfig) -> Result<Self, ExportError> {
        Self::new(config.assets_dir(), config.html_output_dir())
    }

    pub fn html_output_dir(&self) -> &Path {
        &self.html_output_dir
    }

    /// Generate `<html_output_dir>/<basename(output)>.html` for a test.
    ///
    /// Existing documents are overwritten. Oversized or entirely absent
    /// inputs are reported through [`ExportOutcome`] rather than as errors.
    pub fn export(
        &self,
        output: &Path,
        reference: Option<&Path>,
    ) -> Result<ExportOutcome, ExportError> {
        self.install_support_assets()?;

        let template_path = self.assets_dir.join(TEMPLATE_FILE);
        let template =
            fs::read_to_string(&template_path).map_err(|source| ExportError::TemplateUnreadable {
                path: template_path.display().to_string(),
                source,
            })?;

        let new_dataset = match load_dataset(output)? {
            Dataset::Oversized(size) => return Ok(oversized(output, size)),
            Dataset::Absent => String::new(),
            Dataset::Loaded(content) => content,
        };

        let mut old_dataset = String::new();
        let mut common = None;
        if let Some(reference) = reference {
            match load_dataset(reference)? {
                Dataset::Oversized(size) => return Ok(oversized(reference, size)),
                Dataset::Absent => {}
                Dataset::Loaded(content) => {
                    old_dataset = content;
                    common = common_path(output, reference);
                }
            }
        }

        if new_dataset.is_empty() && old_dataset.is_empty() {
            debug!("No content to visualize for {}", output.display());
            return Ok(ExportOutcome::NoContent);
        }

        let new_filename = (!new_dataset.is_empty()).then(|| display_name(output, common.as_deref()));
        let old_filename = match reference {
            Some(reference) if !old_dataset.is_empty() => {
                Some(display_name(reference, common.as_deref()))
            }
            _ => None,
        };

        let mut substitutions: Vec<(&str, &str)> = Vec::with_capacity(4);
        if let Some(name) = &new_filename {
            substitutions.push((NEW_FILENAME, name.as_str()));
            substitutions.push((NEW_TEST_OUTPUT, new_dataset.as_str()));
        }
        if let Some(name) = &old_filename {
            substitutions.push((OLD_FILENAME, name.as_str()));
            substitutions.push((OLD_TEST_OUTPUT, old_dataset.as_str()));
        }
        let document = substitute(&template, &substitutions);

        let mut file_name = output
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        file_name.push(".html");
        let path = self.html_output_dir.join(file_name);

        fs::write(&path, document).map_err(|source| ExportError::WriteFailed {
            path: path.display().to_string(),
            source,
        })?;

        Ok(ExportOutcome::Written(VisualizationArtifact {
            path,
            new_filename,
            old_filename,
        }))
    }

    /// Copy the template's support scripts unless already present
    fn install_support_assets(&self) -> Result<(), ExportError> {
        let copy_failed = |asset: &str, source: io::Error| ExportError::AssetCopyFailed {
            asset: asset.to_string(),
            dir: self.html_output_dir.display().to_string(),
            source,
        };

        fs::create_dir_all(&self.html_output_dir).map_err(|source| ExportError::WriteFailed {
            path: self.html_output_dir.display().to_string(),
            source,
        })?;
        for asset in SUPPORT_ASSETS {
            let destination = self.html_output_dir.join(asset);
            if destination.is_file() {
                continue;
            }
            debug!("Installing {} into {}", asset, self.html_output_dir.display());
            fs::copy(self.assets_dir.join(asset), &destination)
                .map_err(|e| copy_failed(asset, e))?;
        }
        Ok(())
    }
}

fn oversized(path: &Path, size: u64) -> ExportOutcome {
    debug!(
        "{} is bigger than 100Mb ({} bytes), skipping generation of visualizer file",
        path.display(),
        size
    );
    ExportOutcome::Oversized {
        path: path.to_path_buf(),
        size,
    }
}

fn load_dataset(path: &Path) -> Result<Dataset, ExportError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Ok(Dataset::Absent),
    };
    if metadata.len() > MAX_EMBEDDED_FILE_SIZE {
        return Ok(Dataset::Oversized(metadata.len()));
    }

    let bytes = fs::read(path).map_err(|source| ExportError::DatasetUnreadable {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Dataset::Loaded(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Longest shared leading path of `a` and `b`.
///
/// `None` when the paths share nothing, or one is absolute and the other is not.
pub fn common_path(a: &Path, b: &Path) -> Option<PathBuf> {
    if a.is_absolute() != b.is_absolute() {
        return None;
    }

    let common: PathBuf = a
        .components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect();

    let meaningful = common
        .components()
        .any(|c| !matches!(c, Component::CurDir));
    meaningful.then_some(common)
}

/// Path as shown in the viewer: relative to `common` when given, with `/` separators
pub fn display_name(path: &Path, common: Option<&Path>) -> String {
    let relative = common
        .and_then(|base| path.strip_prefix(base).ok())
        .unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// Replace every occurrence of each token in one left-to-right pass.
///
/// Inserted values are never rescanned, which makes the result independent of
/// the order of `substitutions`.
pub fn substitute(template: &str, substitutions: &[(&str, &str)]) -> String {
    let extra: usize = substitutions.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    'scan: while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        for (token, value) in substitutions {
            if let Some(after) = candidate.strip_prefix(token) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        out.push('%');
        rest = &candidate[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "<html><script>\n\
        const newName = \"%NEW_FILENAME%\";\n\
        const newData = `%NEW_TEST_OUTPUT%`;\n\
        const oldName = \"%OLD_FILENAME%\";\n\
        const oldData = `%OLD_TEST_OUTPUT%`;\n\
        </script></html>\n";

    struct Fixture {
        dir: tempfile::TempDir,
        exporter: VisualizationExporter,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let assets = dir.path().join("PointVisualizer");
            fs::create_dir_all(&assets).unwrap();
            fs::write(assets.join(TEMPLATE_FILE), TEMPLATE).unwrap();
            fs::write(assets.join("three.js"), "// three").unwrap();
            fs::write(assets.join("OrbitControls.js"), "// controls").unwrap();

            let exporter = VisualizationExporter::new(assets, dir.path().join("html")).unwrap();
            Self { dir, exporter }
        }

        fn file(&self, relative: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn sparse_file(&self, relative: &str, len: u64) -> PathBuf {
            let path = self.dir.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::File::create(&path).unwrap().set_len(len).unwrap();
            path
        }
    }

    fn written(outcome: ExportOutcome) -> VisualizationArtifact {
        match outcome {
            ExportOutcome::Written(artifact) => artifact,
            other => panic!("expected a written artifact, got {:?}", other),
        }
    }

    #[test]
    fn test_common_path_and_display_names() {
        let output = Path::new("/a/b/out/x.txt");
        let reference = Path::new("/a/b/ref/x.txt");

        let common = common_path(output, reference);
        assert_eq!(common, Some(PathBuf::from("/a/b")));
        assert_eq!(display_name(output, common.as_deref()), "out/x.txt");
        assert_eq!(display_name(reference, common.as_deref()), "ref/x.txt");
    }

    #[test]
    fn test_common_path_edge_cases() {
        assert_eq!(common_path(Path::new("/a/x"), Path::new("b/x")), None);
        assert_eq!(common_path(Path::new("a/x"), Path::new("b/x")), None);
        assert_eq!(
            common_path(Path::new("/x/1"), Path::new("/y/1")),
            Some(PathBuf::from("/"))
        );
    }

    #[test]
    fn test_display_name_normalizes_backslashes() {
        assert_eq!(display_name(Path::new(r"out\x.txt"), None), "out/x.txt");
        assert_eq!(display_name(Path::new("/abs/x.txt"), None), "/abs/x.txt");
    }

    #[test]
    fn test_substitute_is_single_pass() {
        let result = substitute(
            "[%A%|%B%|%A%|100%]",
            &[("%A%", "contains %B%"), ("%B%", "b")],
        );
        assert_eq!(result, "[contains %B%|b|contains %B%|100%]");

        let reversed = substitute(
            "[%A%|%B%|%A%|100%]",
            &[("%B%", "b"), ("%A%", "contains %B%")],
        );
        assert_eq!(result, reversed);
    }

    #[test]
    fn test_substitute_without_tokens() {
        assert_eq!(substitute("50% done", &[]), "50% done");
        assert_eq!(substitute("%", &[("%X%", "y")]), "%");
    }

    #[test]
    fn test_missing_assets_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = VisualizationExporter::new(dir.path().join("nope"), dir.path().join("html"))
            .unwrap_err();
        assert!(matches!(err, ExportError::AssetsMissing { .. }));
        assert!(err.to_string().contains("PointVisualizer"));
    }

    #[test]
    fn test_export_with_reference() {
        let fx = Fixture::new();
        let output = fx.file("build/out/x.txt", "1 2 3");
        let reference = fx.file("build/ref/x.txt", "4 5 6");

        let artifact = written(fx.exporter.export(&output, Some(reference.as_path())).unwrap());
        assert_eq!(artifact.path, fx.dir.path().join("html/x.txt.html"));
        assert_eq!(artifact.new_filename.as_deref(), Some("out/x.txt"));
        assert_eq!(artifact.old_filename.as_deref(), Some("ref/x.txt"));

        let html = fs::read_to_string(&artifact.path).unwrap();
        assert!(html.contains("const newName = \"out/x.txt\";"));
        assert!(html.contains("const newData = `1 2 3`;"));
        assert!(html.contains("const oldName = \"ref/x.txt\";"));
        assert!(html.contains("const oldData = `4 5 6`;"));
    }

    #[test]
    fn test_export_without_reference_keeps_old_placeholders() {
        let fx = Fixture::new();
        let output = fx.file("out/y.txt", "7 8 9");

        let artifact = written(fx.exporter.export(&output, None).unwrap());
        assert_eq!(artifact.old_filename, None);
        assert_eq!(artifact.new_filename, Some(display_name(&output, None)));

        let html = fs::read_to_string(&artifact.path).unwrap();
        assert!(html.contains("7 8 9"));
        assert!(html.contains("%OLD_FILENAME%"));
        assert!(html.contains("%OLD_TEST_OUTPUT%"));
        assert!(!html.contains("%NEW_TEST_OUTPUT%"));
    }

    #[test]
    fn test_export_reference_only() {
        let fx = Fixture::new();
        let output = fx.dir.path().join("out/missing.txt");
        let reference = fx.file("ref/missing.txt", "ref data");

        let artifact = written(fx.exporter.export(&output, Some(reference.as_path())).unwrap());
        assert_eq!(artifact.new_filename, None);
        assert_eq!(artifact.old_filename.as_deref(), Some("ref/missing.txt"));
        assert_eq!(artifact.path, fx.dir.path().join("html/missing.txt.html"));

        let html = fs::read_to_string(&artifact.path).unwrap();
        assert!(html.contains("%NEW_TEST_OUTPUT%"));
        assert!(html.contains("ref data"));
    }

    #[test]
    fn test_export_nothing_to_show() {
        let fx = Fixture::new();
        let output = fx.dir.path().join("out/none.txt");
        let empty = fx.file("out/empty.txt", "");

        assert_eq!(
            fx.exporter.export(&output, None).unwrap(),
            ExportOutcome::NoContent
        );
        assert_eq!(
            fx.exporter.export(&empty, Some(output.as_path())).unwrap(),
            ExportOutcome::NoContent
        );
        assert!(!fx.dir.path().join("html/none.txt.html").exists());
        assert!(!fx.dir.path().join("html/empty.txt.html").exists());
    }

    #[test]
    fn test_export_is_deterministic() {
        let fx = Fixture::new();
        let output = fx.file("out/d.txt", "0 0 0\n1 1 1\n");
        let reference = fx.file("ref/d.txt", "0 0 0\n");

        let first = written(fx.exporter.export(&output, Some(reference.as_path())).unwrap());
        let first_bytes = fs::read(&first.path).unwrap();
        let second = written(fx.exporter.export(&output, Some(reference.as_path())).unwrap());
        let second_bytes = fs::read(&second.path).unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_export_overwrites_previous_document() {
        let fx = Fixture::new();
        let output = fx.file("out/w.txt", "first");
        let first = written(fx.exporter.export(&output, None).unwrap());

        fs::write(&output, "second").unwrap();
        let second = written(fx.exporter.export(&output, None).unwrap());

        let html = fs::read_to_string(&second.path).unwrap();
        assert_eq!(first.path, second.path);
        assert!(html.contains("second"));
        assert!(!html.contains("first"));
    }

    #[test]
    fn test_placeholders_inside_content_are_not_expanded() {
        let fx = Fixture::new();
        let output = fx.file("out/t.txt", "literal %OLD_TEST_OUTPUT% marker");
        let reference = fx.file("ref/t.txt", "reference");

        let artifact = written(fx.exporter.export(&output, Some(reference.as_path())).unwrap());
        let html = fs::read_to_string(&artifact.path).unwrap();
        assert!(html.contains("const newData = `literal %OLD_TEST_OUTPUT% marker`;"));
        assert!(html.contains("const oldData = `reference`;"));
    }

    #[test]
    fn test_oversized_output_is_skipped() {
        let fx = Fixture::new();
        let output = fx.sparse_file("out/big.txt", MAX_EMBEDDED_FILE_SIZE + 1);
        let reference = fx.file("ref/big.txt", "small");

        let outcome = fx.exporter.export(&output, Some(reference.as_path())).unwrap();
        assert_eq!(
            outcome,
            ExportOutcome::Oversized {
                path: output.clone(),
                size: MAX_EMBEDDED_FILE_SIZE + 1,
            }
        );
        assert!(!fx.dir.path().join("html/big.txt.html").exists());
    }

    #[test]
    fn test_oversized_reference_is_skipped() {
        let fx = Fixture::new();
        let output = fx.file("out/r.txt", "small");
        let reference = fx.sparse_file("ref/r.txt", MAX_EMBEDDED_FILE_SIZE + 1);

        let outcome = fx.exporter.export(&output, Some(reference.as_path())).unwrap();
        assert!(matches!(outcome, ExportOutcome::Oversized { ref path, .. } if *path == reference));
        assert!(!fx.dir.path().join("html/r.txt.html").exists());
    }

    #[test]
    fn test_support_assets_copied_once() {
        let fx = Fixture::new();
        let output = fx.file("out/a.txt", "1");

        written(fx.exporter.export(&output, None).unwrap());
        let installed = fx.dir.path().join("html/three.js");
        assert_eq!(fs::read_to_string(&installed).unwrap(), "// three");
        assert_eq!(
            fs::read_to_string(fx.dir.path().join("html/OrbitControls.js")).unwrap(),
            "// controls"
        );

        fs::write(&installed, "// locally modified").unwrap();
        written(fx.exporter.export(&output, None).unwrap());
        assert_eq!(fs::read_to_string(&installed).unwrap(), "// locally modified");
    }

    #[test]
    fn test_missing_template_is_a_per_test_error() {
        let fx = Fixture::new();
        fs::remove_file(fx.dir.path().join("PointVisualizer").join(TEMPLATE_FILE)).unwrap();
        let output = fx.file("out/a.txt", "1");

        let err = fx.exporter.export(&output, None).unwrap_err();
        assert!(matches!(err, ExportError::TemplateUnreadable { .. }));
    }
}
