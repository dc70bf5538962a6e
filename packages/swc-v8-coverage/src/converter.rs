use sourcemap::SourceMap;
use tracing::debug;
use wax::Glob;

use crate::coverage_builder::CoverageMapBuilder;
use crate::error::{CoverageError, Result};
use crate::ignore::IgnoreResolver;
use crate::options::ConvertOptions;
use crate::parser::SourceParser;
use crate::position::PositionTranslator;
use crate::range_index::RangeIndex;
use crate::raw_coverage::ScriptCoverage;
use crate::source_coverage::CoverageMap;
use crate::source_text::SourceText;
use crate::syntax_index::SyntaxIndex;
use crate::syntax_tree::ParsedSource;

const NODE_MODULES: &str = "**/node_modules/**";

/// Everything needed to convert one script.
pub struct ConvertInput<'a> {
    /// Path of the generated file V8 executed.
    pub path: &'a str,
    pub source: &'a str,
    pub coverage: &'a ScriptCoverage,
    pub parser: &'a dyn SourceParser,
    pub source_map: Option<&'a SourceMap>,
}

/// Converts V8 script coverage into istanbul file coverage.
///
/// Holds the compiled ignore patterns, so build one and reuse it for every
/// script of a run.
pub struct Converter {
    options: ConvertOptions,
    ignore: IgnoreResolver,
    node_modules: Option<Glob<'static>>,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Result<Self> {
        let ignore = IgnoreResolver::new(&options.ignore_class_methods, options.unresolved_directives)?;
        let node_modules = if options.ignore_node_modules {
            let glob = Glob::new(NODE_MODULES).map_err(|err| CoverageError::InvalidPattern {
                pattern: NODE_MODULES.to_string(),
                message: err.to_string(),
            })?;
            Some(glob.into_owned())
        } else {
            None
        };
        Ok(Self {
            options,
            ignore,
            node_modules,
        })
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn convert(&self, input: ConvertInput<'_>) -> Result<CoverageMap> {
        let parsed = input.parser.parse(input.path, input.source)?;
        self.convert_parsed(&input, &parsed)
    }

    /// Like [`Converter::convert`] with an already parsed tree; `input.parser`
    /// is not consulted.
    pub fn convert_parsed(&self, input: &ConvertInput<'_>, parsed: &ParsedSource) -> Result<CoverageMap> {
        let text = SourceText::new(input.source);
        let index = SyntaxIndex::new(parsed, &text);
        let hints = self.ignore.resolve(&index, &text)?;
        let counts = RangeIndex::from_script(input.coverage, self.options.wrapper_length)?;
        let translator = match input.source_map {
            Some(map) => PositionTranslator::with_source_map(&text, input.path, map),
            None => PositionTranslator::identity(&text, input.path),
        };
        debug!(
            path = input.path,
            functions = index.functions().len(),
            statements = index.statements().len(),
            branches = index.branches().len(),
            hints = hints.hints().len(),
            "converting script"
        );

        let builder = CoverageMapBuilder::new(&text, &index, &counts, &hints, &translator);
        let map = match &self.node_modules {
            Some(glob) => builder.exclude_paths(glob).build(),
            None => builder.build(),
        };
        Ok(map)
    }
}
