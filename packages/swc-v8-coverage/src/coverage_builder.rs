//! Istanbul coverage tables from the syntax index, V8 counts and ignore hints.

use tracing::debug;
use wax::{Glob, Pattern};

use crate::ignore::IgnoreHints;
use crate::position::{PositionTranslator, SourceId};
use crate::range_index::RangeIndex;
use crate::source_coverage::{CoverageMap, Range};
use crate::source_text::SourceText;
use crate::syntax_index::{PathCounter, SyntaxIndex};
use crate::syntax_tree::ByteRange;

/// Combines a syntax index, the script's counts, ignore hints and a position
/// translator into one [`CoverageMap`].
pub struct CoverageMapBuilder<'a> {
    source: &'a SourceText<'a>,
    index: &'a SyntaxIndex<'a>,
    counts: &'a RangeIndex,
    hints: &'a IgnoreHints,
    translator: &'a PositionTranslator<'a>,
    exclude: Option<&'a Glob<'static>>,
}

impl<'a> CoverageMapBuilder<'a> {
    pub fn new(
        source: &'a SourceText<'a>,
        index: &'a SyntaxIndex<'a>,
        counts: &'a RangeIndex,
        hints: &'a IgnoreHints,
        translator: &'a PositionTranslator<'a>,
    ) -> Self {
        Self {
            source,
            index,
            counts,
            hints,
            translator,
            exclude: None,
        }
    }

    /// Output paths matching `glob` are left out entirely.
    pub fn exclude_paths(mut self, glob: &'a Glob<'static>) -> Self {
        self.exclude = Some(glob);
        self
    }

    fn count(&self, offset: u32) -> u32 {
        self.counts.count_at(self.source.engine_offset(offset))
    }

    fn path_count(&self, counter: PathCounter) -> u32 {
        match counter {
            PathCounter::At(offset) => self.count(offset),
            PathCounter::Difference { total, taken } => self.count(total).saturating_sub(self.count(taken)),
        }
    }

    fn included(&self, path: &str) -> bool {
        self.exclude.map_or(true, |glob| !glob.is_match(path))
    }

    /// Original file and range of `range`, `None` when it cannot be placed.
    fn place(&self, range: ByteRange) -> Option<(SourceId, Range)> {
        let placed = self.translator.translate_range(range);
        if placed.is_none() {
            debug!(start = range.start, end = range.end, "range spans several sources, dropped");
        }
        placed
    }

    pub fn build(&self) -> CoverageMap {
        let mut map = CoverageMap::new();
        for path in self.translator.paths() {
            if self.included(path) {
                map.file_mut(path);
            }
        }

        for function in self.index.functions() {
            if self.hints.excludes(function.range) {
                continue;
            }
            let (Some((source, loc)), Some((decl_source, decl))) = (self.place(function.range), self.place(function.decl))
            else {
                continue;
            };
            if source != decl_source {
                continue;
            }
            let path = self.translator.path(source);
            if !self.included(path) {
                continue;
            }
            let count = self.count(function.count_offset);
            map.file_mut(path)
                .new_function(function.name.as_deref(), decl, loc, count);
        }

        for statement in self.index.statements() {
            if self.hints.excludes(statement.range) {
                continue;
            }
            let Some((source, loc)) = self.place(statement.range) else {
                continue;
            };
            let path = self.translator.path(source);
            if !self.included(path) {
                continue;
            }
            let count = self.count(statement.range.start);
            map.file_mut(path).new_statement(loc, count);
        }

        'branches: for branch in self.index.branches() {
            if self.hints.excludes(branch.range) {
                continue;
            }
            let Some((source, loc)) = self.place(branch.range) else {
                continue;
            };
            let mut locations = Vec::with_capacity(branch.paths.len());
            let mut hits = Vec::with_capacity(branch.paths.len());
            for path in &branch.paths {
                if self.hints.excludes_path(branch.range, path.range) {
                    continue;
                }
                match self.place(path.range) {
                    Some((path_source, location)) if path_source == source => {
                        locations.push(location);
                        hits.push(self.path_count(path.counter));
                    }
                    _ => continue 'branches,
                }
            }
            if locations.is_empty() {
                continue;
            }
            let path = self.translator.path(source);
            if !self.included(path) {
                continue;
            }
            map.file_mut(path).new_branch(branch.kind, loc, locations, hits);
        }

        map
    }
}
