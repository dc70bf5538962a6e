use std::path::PathBuf;

use swc_v8_coverage::CoverageError;
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Coverage(#[from] CoverageError),

    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: std::io::Error },

    #[error("{} is not a coverage dump: {source}", .path.display())]
    Dump { path: PathBuf, source: serde_json::Error },

    #[error("invalid config {}: {source}", .path.display())]
    Config { path: PathBuf, source: serde_json::Error },

    #[error("invalid glob `{pattern}`: {message}")]
    Glob { pattern: String, message: String },

    #[error("{failed} of {total} scripts could not be converted")]
    Conversion { failed: usize, total: usize },
}

impl CliError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
