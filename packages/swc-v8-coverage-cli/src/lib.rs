//! `v8-to-istanbul`: turns `NODE_V8_COVERAGE` dumps into one istanbul
//! coverage map.
//!
//! ```bash
//! NODE_V8_COVERAGE=coverage/tmp node app.js
//! v8-to-istanbul coverage/tmp -o coverage/coverage-final.json
//! ```

mod error;
mod loader;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use swc_v8_coverage::{
    ConvertInput, ConvertOptions, Converter, CoverageError, CoverageMap, DirectivePolicy, ReportLogic, SwcParser,
};
use tracing::{debug, error, info, warn};
use wax::{Glob, Pattern};

pub use error::{CliError, CliResult};
pub use loader::Job;

#[derive(Parser, Debug)]
#[command(name = "v8-to-istanbul")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Coverage dumps, or directories holding them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// JSON file with conversion options
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Where to write the coverage map (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only convert scripts whose path matches one of these globs
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip scripts whose path matches one of these globs
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Ignore class methods whose name matches this pattern
    #[arg(long = "ignore-class-method")]
    pub ignore_class_methods: Vec<String>,

    /// Keep files under node_modules
    #[arg(long)]
    pub include_node_modules: bool,

    /// Log unresolved ignore directives instead of failing the script
    #[arg(long)]
    pub warn_unresolved: bool,

    /// Length of the CommonJS wrapper V8 compiled around each module
    #[arg(long)]
    pub wrapper_length: Option<u32>,

    /// How logical expressions count towards the branch summary
    #[arg(long, value_enum)]
    pub report_logic: Option<LogicArg>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogicArg {
    Off,
    Or,
    And,
}

impl From<LogicArg> for ReportLogic {
    fn from(logic: LogicArg) -> Self {
        match logic {
            LogicArg::Off => ReportLogic::Off,
            LogicArg::Or => ReportLogic::Or,
            LogicArg::And => ReportLogic::And,
        }
    }
}

impl Args {
    /// Options from `--config`, with the command line flags applied on top.
    pub fn options(&self) -> CliResult<ConvertOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|err| CliError::read(path, err))?;
                serde_json::from_str(&text).map_err(|source| CliError::Config {
                    path: path.clone(),
                    source,
                })?
            }
            None => ConvertOptions::default(),
        };
        options
            .ignore_class_methods
            .extend(self.ignore_class_methods.iter().cloned());
        if self.include_node_modules {
            options.ignore_node_modules = false;
        }
        if self.warn_unresolved {
            options.unresolved_directives = DirectivePolicy::Warn;
        }
        if let Some(length) = self.wrapper_length {
            options.wrapper_length = length;
        }
        if let Some(logic) = self.report_logic {
            options.report_logic = logic.into();
        }
        Ok(options)
    }
}

struct ScriptFilter {
    include: Vec<Glob<'static>>,
    exclude: Vec<Glob<'static>>,
}

impl ScriptFilter {
    fn new(include: &[String], exclude: &[String]) -> CliResult<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    fn accepts(&self, path: &Path) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|glob| glob.is_match(path));
        included && !self.exclude.iter().any(|glob| glob.is_match(path))
    }
}

fn compile(patterns: &[String]) -> CliResult<Vec<Glob<'static>>> {
    patterns
        .iter()
        .map(|pattern| {
            Glob::new(pattern)
                .map(Glob::into_owned)
                .map_err(|err| CliError::Glob {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })
        })
        .collect()
}

/// Result of converting every selected script.
#[derive(Debug)]
pub struct Outcome {
    pub map: CoverageMap,
    pub report_logic: ReportLogic,
    pub scripts: usize,
    pub failed: usize,
}

/// Converts every script of every dump in parallel and merges the results in
/// input order. Scripts that fail are logged and counted, not merged.
pub fn convert(args: &Args) -> CliResult<Outcome> {
    let options = args.options()?;
    let report_logic = options.report_logic;
    let converter = Converter::new(options)?;
    let filter = ScriptFilter::new(&args.include, &args.exclude)?;

    let mut jobs = Vec::new();
    for file in loader::dump_files(&args.inputs)? {
        let dump = loader::read_dump(&file)?;
        let before = jobs.len();
        jobs.extend(loader::jobs(dump).into_iter().filter(|job| filter.accepts(&job.path)));
        debug!(dump = %file.display(), scripts = jobs.len() - before, "read coverage dump");
    }
    info!(scripts = jobs.len(), "converting coverage");

    let parser = SwcParser::new();
    let results: Vec<_> = jobs
        .par_iter()
        .map(|job| convert_job(&converter, &parser, job))
        .collect();

    let mut map = CoverageMap::new();
    let mut failed = 0;
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(converted) => map.merge(converted),
            Err(err) => {
                failed += 1;
                error!(path = %job.path.display(), "{err}");
            }
        }
    }
    for (path, reason) in map.indeterminate() {
        warn!(path, reason, "coverage is indeterminate");
    }

    Ok(Outcome {
        map,
        report_logic,
        scripts: jobs.len(),
        failed,
    })
}

fn convert_job(converter: &Converter, parser: &SwcParser, job: &Job) -> CliResult<CoverageMap> {
    let source = fs::read_to_string(&job.path).map_err(|err| CliError::read(&job.path, err))?;
    let source_map = loader::source_map(job, &source)?;
    let path = job.path.to_string_lossy();
    let map = converter.convert(ConvertInput {
        path: &path,
        source: &source,
        coverage: &job.script,
        parser,
        source_map: source_map.as_ref(),
    })?;
    Ok(map)
}

/// Converts, writes the coverage map and logs the summary. The map is written
/// even when some scripts failed; the run still reports the failure.
pub fn run(args: &Args) -> CliResult<()> {
    let outcome = convert(args)?;
    let json = serde_json::to_string(&outcome.map).map_err(CoverageError::from)?;
    match &args.output {
        Some(path) => fs::write(path, json).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").map_err(|source| CliError::Write {
                path: PathBuf::from("<stdout>"),
                source,
            })?;
        }
    }

    let summary = outcome.map.summary(outcome.report_logic);
    info!(
        files = outcome.map.len(),
        lines = summary.lines.pct,
        statements = summary.statements.pct,
        functions = summary.functions.pct,
        branches = summary.branches.pct,
        "coverage summary"
    );

    if outcome.failed > 0 {
        return Err(CliError::Conversion {
            failed: outcome.failed,
            total: outcome.scripts,
        });
    }
    Ok(())
}
