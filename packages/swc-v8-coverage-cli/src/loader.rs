//! Reading `NODE_V8_COVERAGE` output and the files it points at.

use std::fs;
use std::path::{Path, PathBuf};

use sourcemap::{DecodedMap, SourceMap};
use swc_v8_coverage::{CoverageError, ProcessCoverage, ScriptCoverage, SourceMapCacheEntry};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// One script to convert.
#[derive(Debug, Clone)]
pub struct Job {
    pub path: PathBuf,
    pub script: ScriptCoverage,
    pub cached_map: Option<SourceMapCacheEntry>,
}

/// Expands directories into their `*.json` files, sorted by name.
pub fn dump_files(inputs: &[PathBuf]) -> CliResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut entries = fs::read_dir(input)
            .and_then(|dir| dir.map(|entry| entry.map(|entry| entry.path())).collect::<Result<Vec<_>, _>>())
            .map_err(|err| CliError::read(input, err))?;
        entries.retain(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"));
        entries.sort();
        files.extend(entries);
    }
    Ok(files)
}

pub fn read_dump(path: &Path) -> CliResult<ProcessCoverage> {
    let text = fs::read_to_string(path).map_err(|err| CliError::read(path, err))?;
    serde_json::from_str(&text).map_err(|source| CliError::Dump {
        path: path.to_path_buf(),
        source,
    })
}

/// Scripts of `dump` that live on disk, paired with Node's cached source map.
pub fn jobs(dump: ProcessCoverage) -> Vec<Job> {
    let ProcessCoverage {
        result,
        source_map_cache,
    } = dump;
    result
        .into_iter()
        .filter_map(|script| {
            let Some(path) = script.file_path() else {
                debug!(url = %script.url, "skipping script without a file path");
                return None;
            };
            let cached_map = source_map_cache.get(&script.url).cloned();
            Some(Job {
                path,
                script,
                cached_map,
            })
        })
        .collect()
}

/// Node's cached map when it has one, otherwise whatever `sourceMappingURL`
/// points at.
pub fn source_map(job: &Job, source: &str) -> CliResult<Option<SourceMap>> {
    if let Some(data) = job.cached_map.as_ref().and_then(|entry| entry.data.as_ref()) {
        let bytes = serde_json::to_vec(data).map_err(CoverageError::from)?;
        return regular(sourcemap::decode_slice(&bytes).map_err(CoverageError::from)?);
    }

    let Some(reference) = sourcemap::locate_sourcemap_reference_slice(source.as_bytes()).map_err(CoverageError::from)?
    else {
        return Ok(None);
    };
    let url = reference.get_url();
    if url.starts_with("data:") {
        return regular(sourcemap::decode_data_url(url).map_err(CoverageError::from)?);
    }
    if url.contains("://") && !url.starts_with("file://") {
        debug!(path = %job.path.display(), url, "ignoring remote source map");
        return Ok(None);
    }

    let map_path = match url.strip_prefix("file://") {
        Some(absolute) => PathBuf::from(absolute),
        None => job.path.parent().unwrap_or_else(|| Path::new("")).join(url),
    };
    let bytes = match fs::read(&map_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(path = %map_path.display(), %err, "source map not readable, using generated positions");
            return Ok(None);
        }
    };
    regular(sourcemap::decode_slice(&bytes).map_err(CoverageError::from)?)
}

fn regular(decoded: DecodedMap) -> CliResult<Option<SourceMap>> {
    match decoded {
        DecodedMap::Regular(map) => Ok(Some(map)),
        DecodedMap::Index(index) => Ok(Some(index.flatten().map_err(CoverageError::from)?)),
        _ => {
            debug!("unsupported source map flavour, using generated positions");
            Ok(None)
        }
    }
}
