mod converter;
mod coverage_builder;
mod error;
mod ignore;
mod merge;
mod options;
mod parser;
mod position;
mod range_index;
mod raw_coverage;
mod source_coverage;
mod source_text;
mod summary;
mod syntax_index;
mod syntax_tree;
mod visitors;

pub use converter::{ConvertInput, Converter};
pub use coverage_builder::CoverageMapBuilder;
pub use error::{CoverageError, Result};
pub use ignore::{Directive, HintScope, IgnoreHint, IgnoreHints, IgnoreResolver, UnresolvedDirective};
pub use merge::merge_file_coverage;
pub use options::{ConvertOptions, DirectivePolicy, ReportLogic};
pub use parser::{SourceParser, SwcParser};
pub use position::{OriginalPosition, PositionTranslator, SourceId};
pub use range_index::{RangeIndex, Segment};
pub use raw_coverage::{FunctionCoverage, ProcessCoverage, RawRange, ScriptCoverage, SourceMapCacheEntry};
pub use source_coverage::{
    BranchEntry, BranchType, CoverageMap, FileCoverage, FunctionEntry, Location, Range, UNBOUNDED_COLUMN,
};
pub use source_text::SourceText;
pub use summary::{percent, CoverageSummary, Totals};
pub use syntax_index::{
    BranchNode, BranchPath, Candidate, CandidateKind, FunctionNode, IfShape, PathCounter, StatementNode, SyntaxIndex,
};
pub use syntax_tree::{
    ByteRange, FunctionKind, FunctionShape, LogicalOperator, NodeKind, OperandRole, ParsedSource, SourceComment,
    SourceNode, StatementKind,
};
pub use visitors::tree_builder::TreeBuilder;
