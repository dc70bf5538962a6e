//! Error type shared by every stage of a conversion.

use thiserror::Error;

/// Result type for coverage conversion.
pub type Result<T, E = CoverageError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CoverageError {
    /// Two raw ranges overlap without one containing the other.
    #[error(
        "coverage ranges [{}, {}) and [{}, {}) overlap without nesting",
        .first.0, .first.1, .second.0, .second.1
    )]
    RangeOverlap { first: (u32, u32), second: (u32, u32) },

    /// A raw range ends before it starts.
    #[error("coverage range [{start}, {end}) is malformed")]
    InvalidRange { start: u32, end: u32 },

    /// An ignore comment that suppresses nothing.
    #[error("ignore directive `{directive}` at {line}:{column} does not match any code")]
    UnresolvedIgnoreDirective {
        directive: String,
        line: u32,
        column: u32,
    },

    /// Two coverage fragments for the same file disagree on their shape.
    #[error("cannot merge coverage for {path}: {reason}")]
    MergeConflict { path: String, reason: String },

    /// The parser rejected the script.
    #[error("failed to parse {path} at byte {offset}: {message}")]
    Parse {
        path: String,
        offset: u32,
        message: String,
    },

    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid source map: {0}")]
    SourceMap(#[from] sourcemap::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoverageError {
    pub fn merge_conflict(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MergeConflict {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
