use crate::error::PtxError;
use glob::glob;
use rayon::prelude::*;
use std::io::BufRead;
use std::path::PathBuf;

/// Keys the engine knows how to bind lines from. The remote shells
/// (kubernetes, aws, gcp, azure) are external collaborators: anything
/// producing an ordered sequence of labeled raw lines satisfies the
/// contract.
pub const SOURCE_KEYS: [&str; 6] = ["file", "stdin", "kubernetes", "aws", "gcp", "azure"];

/// A source collaborator: produces the full ordered line sequence for
/// one labeled origin. Collection may block on I/O; lines land in
/// memory before any parser runs.
pub trait LineSource: Send + Sync {
    fn label(&self) -> &str;
    fn collect(&self) -> Result<Vec<String>, PtxError>;
}

/// Local file source; the label is the path as given.
pub struct FileSource {
    path: PathBuf,
    label: String,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        let label = path.to_string_lossy().to_string();
        Self { path, label }
    }
}

impl LineSource for FileSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn collect(&self) -> Result<Vec<String>, PtxError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| PtxError::SourceFetch {
            source: self.label.clone(),
            message: e.to_string(),
        })?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

/// Stdin source for pipelines with no file arguments.
pub struct StdinSource;

impl LineSource for StdinSource {
    fn label(&self) -> &str {
        "stdin"
    }

    fn collect(&self) -> Result<Vec<String>, PtxError> {
        let stdin = std::io::stdin();
        let mut lines = Vec::new();
        for line in stdin.lock().lines() {
            let line = line.map_err(|e| PtxError::SourceFetch {
                source: "stdin".to_string(),
                message: e.to_string(),
            })?;
            lines.push(line);
        }
        Ok(lines)
    }
}

/// Expand shell-style glob arguments into concrete paths; plain paths
/// pass through untouched.
pub fn expand_globs(patterns: &[PathBuf]) -> Result<Vec<PathBuf>, PtxError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let text = pattern.to_string_lossy();
        if text.contains('*') || text.contains('?') || text.contains('[') {
            let entries = glob(&text).map_err(|e| PtxError::MissingArgument {
                argument: text.to_string(),
                message: format!("bad glob pattern: {}", e),
            })?;
            for entry in entries {
                let path = entry.map_err(|e| PtxError::SourceFetch {
                    source: text.to_string(),
                    message: e.to_string(),
                })?;
                files.push(path);
            }
        } else {
            files.push(pattern.clone());
        }
    }
    Ok(files)
}

/// Read every file into `(label, lines)` pairs. Files are read in
/// parallel but the result keeps argument order, so per-file event
/// order and file concatenation order both hold downstream.
pub fn gather_files(paths: &[PathBuf]) -> Result<Vec<(String, Vec<String>)>, PtxError> {
    paths
        .par_iter()
        .map(|path| {
            let source = FileSource::new(path.clone());
            let lines = source.collect()?;
            Ok((source.label().to_string(), lines))
        })
        .collect()
}

/// Read stdin into the same `(label, lines)` shape.
pub fn gather_stdin() -> Result<Vec<(String, Vec<String>)>, PtxError> {
    let source = StdinSource;
    Ok(vec![(source.label().to_string(), source.collect()?)])
}
