//! V8 precise coverage as reported by `Profiler.takePreciseCoverage` or written
//! to `NODE_V8_COVERAGE`.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One `[startOffset, endOffset)` range with its execution count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRange {
    pub start_offset: u32,
    pub end_offset: u32,
    pub count: u32,
    /// Copied from the owning function when ranges are flattened.
    #[serde(default)]
    pub is_block_coverage: bool,
}

impl RawRange {
    pub fn new(start_offset: u32, end_offset: u32, count: u32) -> Self {
        Self {
            start_offset,
            end_offset,
            count,
            is_block_coverage: true,
        }
    }
}

/// Coverage data for a single function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCoverage {
    /// Empty for anonymous functions and for the script itself.
    #[serde(default)]
    pub function_name: String,
    pub ranges: Vec<RawRange>,
    #[serde(default)]
    pub is_block_coverage: bool,
}

/// Coverage data for a single script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCoverage {
    #[serde(default)]
    pub script_id: String,
    pub url: String,
    pub functions: Vec<FunctionCoverage>,
}

impl ScriptCoverage {
    /// Every range of every function, in report order.
    pub fn raw_ranges(&self) -> impl Iterator<Item = RawRange> + '_ {
        self.functions.iter().flat_map(|function| {
            function.ranges.iter().map(move |range| RawRange {
                is_block_coverage: function.is_block_coverage,
                ..*range
            })
        })
    }

    /// Local path for `file://` URLs and absolute paths; `None` for
    /// `node:` internals, `data:` URLs and the like.
    pub fn file_path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.url.strip_prefix("file://") {
            return Some(PathBuf::from(percent_decode(rest)));
        }
        let path = PathBuf::from(&self.url);
        path.is_absolute().then_some(path)
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// A source map Node cached for a script (`--enable-source-maps`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapCacheEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub line_lengths: Vec<u32>,
    pub data: Option<serde_json::Value>,
}

/// Contents of one `coverage-*.json` file written by Node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessCoverage {
    pub result: Vec<ScriptCoverage>,
    #[serde(rename = "source-map-cache", default, skip_serializing_if = "IndexMap::is_empty")]
    pub source_map_cache: IndexMap<String, SourceMapCacheEntry>,
}
