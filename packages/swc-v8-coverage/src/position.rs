//! Generated → original position translation.

use std::path::{Component, Path, PathBuf};

use sourcemap::SourceMap;

use crate::source_coverage::{Location, Range};
use crate::source_text::SourceText;
use crate::syntax_tree::ByteRange;

/// Index into [`PositionTranslator::paths`].
pub type SourceId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: SourceId,
    pub location: Location,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Mapping {
    /// Zero-based generated line and UTF-16 column.
    generated: (u32, u32),
    /// Zero-based original line and column.
    original: (u32, u32),
    source: SourceId,
}

#[derive(Debug, Clone)]
struct MappingTable {
    /// Sorted by generated position, then original position.
    by_generated: Vec<Mapping>,
    /// Indices into `by_generated`, sorted by source and original position.
    by_original: Vec<usize>,
}

impl MappingTable {
    fn new(map: &SourceMap) -> Self {
        let mut by_generated: Vec<Mapping> = map
            .tokens()
            .filter(|token| token.get_source().is_some())
            .map(|token| Mapping {
                generated: (token.get_dst_line(), token.get_dst_col()),
                original: (token.get_src_line(), token.get_src_col()),
                source: token.get_src_id(),
            })
            .collect();
        by_generated.sort();
        by_generated.dedup();

        let mut by_original: Vec<usize> = (0..by_generated.len()).collect();
        by_original.sort_by_key(|&i| {
            let m = &by_generated[i];
            (m.source, m.original, m.generated)
        });

        Self {
            by_generated,
            by_original,
        }
    }

    /// Greatest mapping at or before `generated`, the earliest original one
    /// among equals; the first mapping when the query precedes all of them.
    fn lookup(&self, generated: (u32, u32)) -> Option<&Mapping> {
        let upper = self.by_generated.partition_point(|m| m.generated <= generated);
        if upper == 0 {
            return self.by_generated.first();
        }
        let found = self.by_generated[upper - 1].generated;
        let first = self.by_generated.partition_point(|m| m.generated < found);
        self.by_generated.get(first)
    }

    /// First mapping of `source` whose original position is at or after `original`.
    fn next_in_original(&self, source: SourceId, original: (u32, u32)) -> Option<&Mapping> {
        let idx = self.by_original.partition_point(|&i| {
            let m = &self.by_generated[i];
            (m.source, m.original) < (source, original)
        });
        self.by_original
            .get(idx)
            .map(|&i| &self.by_generated[i])
            .filter(|m| m.source == source)
    }
}

/// Translates generated byte offsets into original file positions.
///
/// Without a source map this is the identity and every position belongs to the
/// generated file.
#[derive(Debug, Clone)]
pub struct PositionTranslator<'a> {
    source: &'a SourceText<'a>,
    paths: Vec<String>,
    mappings: Option<MappingTable>,
}

impl<'a> PositionTranslator<'a> {
    pub fn identity(source: &'a SourceText<'a>, generated_path: impl Into<String>) -> Self {
        Self {
            source,
            paths: vec![generated_path.into()],
            mappings: None,
        }
    }

    /// Sources of `map` are resolved against the directory of `generated_path`.
    pub fn with_source_map(source: &'a SourceText<'a>, generated_path: &str, map: &SourceMap) -> Self {
        let base = Path::new(generated_path).parent().unwrap_or_else(|| Path::new(""));
        let paths = (0..map.get_source_count())
            .map(|id| resolve_source(base, map.get_source(id).unwrap_or_default()))
            .collect();
        Self {
            source,
            paths,
            mappings: Some(MappingTable::new(map)),
        }
    }

    pub fn has_source_map(&self) -> bool {
        self.mappings.is_some()
    }

    /// Output paths in source-map order (just the generated path without a map).
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn path(&self, source: SourceId) -> &str {
        self.paths.get(source as usize).map(String::as_str).unwrap_or_default()
    }

    /// Original position of the byte `offset`.
    pub fn translate(&self, offset: u32) -> OriginalPosition {
        let (line, column) = self.source.line_column(offset);
        self.translate_line_column(line, column)
    }

    /// Original position of a zero-based generated line and UTF-16 column.
    pub fn translate_line_column(&self, line: u32, column: u32) -> OriginalPosition {
        match &self.mappings {
            None => OriginalPosition {
                source: 0,
                location: Location::new(line + 1, column),
            },
            Some(table) => match table.lookup((line, column)) {
                Some(m) => OriginalPosition {
                    source: m.source,
                    location: Location::new(m.original.0 + 1, m.original.1),
                },
                None => OriginalPosition {
                    source: 0,
                    location: Location::new(line + 1, column),
                },
            },
        }
    }

    /// Original position of an exclusive range end.
    ///
    /// The segment is the one holding the last covered character. A mapping
    /// only marks where an original segment starts, so the end is the start of
    /// the next segment on the same original line, or the end of that line when
    /// there is none.
    fn translate_end(&self, offset: u32) -> OriginalPosition {
        let Some(table) = &self.mappings else {
            let (line, column) = self.source.line_column(offset);
            return self.translate_line_column(line, column);
        };
        let last = self
            .source
            .slice(0, offset)
            .char_indices()
            .next_back()
            .map_or(offset, |(index, _)| index as u32);
        let (line, column) = self.source.line_column(last);
        let Some(before) = table.lookup((line, column)) else {
            return self.translate_line_column(line, column);
        };
        let unbounded = OriginalPosition {
            source: before.source,
            location: Location::end_of_line(before.original.0 + 1),
        };
        let Some(next) = table.next_in_original(before.source, (before.original.0, before.original.1 + 1)) else {
            return unbounded;
        };
        match table.lookup(next.generated) {
            Some(after) if after.source == before.source && after.original.0 == before.original.0 => OriginalPosition {
                source: after.source,
                location: Location::new(after.original.0 + 1, after.original.1),
            },
            _ => unbounded,
        }
    }

    /// Original range of a byte range, `None` when its ends land in different
    /// files.
    pub fn translate_range(&self, range: ByteRange) -> Option<(SourceId, Range)> {
        let start = self.translate(range.start);
        let end = if range.is_empty() {
            start
        } else {
            self.translate_end(range.end)
        };
        if start.source != end.source {
            return None;
        }
        let end_location = if end.location < start.location && !end.location.is_unbounded() {
            start.location
        } else {
            end.location
        };
        Some((start.source, Range::from_locations(start.location, end_location)))
    }
}

fn resolve_source(base: &Path, source: &str) -> String {
    let source = source.strip_prefix("file://").unwrap_or(source);
    let path = Path::new(source);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    normalize(&joined).to_string_lossy().into_owned()
}

/// Lexically removes `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use sourcemap::SourceMapBuilder;

    use super::*;

    fn map(tokens: &[(u32, u32, u32, u32, &str)]) -> SourceMap {
        let mut builder = SourceMapBuilder::new(None);
        for &(dst_line, dst_col, src_line, src_col, source) in tokens {
            builder.add(dst_line, dst_col, src_line, src_col, Some(source), None, false);
        }
        builder.into_sourcemap()
    }

    #[test]
    fn identity_without_map() {
        let text = SourceText::new("a;\nbb;\n");
        let translator = PositionTranslator::identity(&text, "/src/a.js");
        let (source, range) = translator.translate_range(ByteRange::new(3, 6)).unwrap();
        assert_eq!(translator.path(source), "/src/a.js");
        assert_eq!(range, Range::new(2, 0, 2, 3));
    }

    #[test]
    fn greatest_lower_bound_lookup() {
        let text = SourceText::new("var a = 1; var b = 2;");
        let sm = map(&[(0, 0, 4, 2, "a.ts"), (0, 11, 5, 2, "a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        assert_eq!(translator.translate(5).location, Location::new(5, 2));
        assert_eq!(translator.translate(11).location, Location::new(6, 2));
        assert_eq!(translator.translate(20).location, Location::new(6, 2));
        assert_eq!(translator.path(0), "/out/a.ts");
    }

    #[test]
    fn query_before_first_mapping_fails_closed() {
        let text = SourceText::new("import x from 'y';\nfoo();");
        let sm = map(&[(1, 0, 2, 0, "src/a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        assert_eq!(translator.translate(0).location, Location::new(3, 0));
    }

    #[test]
    fn ties_prefer_earliest_original() {
        let text = SourceText::new("x();");
        let sm = map(&[(0, 0, 7, 4, "a.ts"), (0, 0, 3, 1, "a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        assert_eq!(translator.translate(0).location, Location::new(4, 1));
    }

    #[test]
    fn end_uses_next_segment_on_the_same_line() {
        let text = SourceText::new("foo(); bar();");
        let sm = map(&[(0, 0, 0, 2, "a.ts"), (0, 7, 0, 9, "a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        let (_, range) = translator.translate_range(ByteRange::new(0, 6)).unwrap();
        assert_eq!(range, Range::new(1, 2, 1, 9));
    }

    #[test]
    fn end_on_a_mapping_boundary_stays_in_its_own_segment() {
        let text = SourceText::new("foo();bar();");
        let sm = map(&[(0, 0, 0, 0, "a.ts"), (0, 6, 2, 0, "a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        let (_, range) = translator.translate_range(ByteRange::new(0, 6)).unwrap();
        assert_eq!(range.start, Location::new(1, 0));
        assert_eq!(range.end.line, 1);
        assert!(range.end.is_unbounded());

        let sm = map(&[(0, 0, 0, 0, "a.ts"), (0, 6, 0, 7, "a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        let (_, range) = translator.translate_range(ByteRange::new(0, 6)).unwrap();
        assert_eq!(range, Range::new(1, 0, 1, 7));
    }

    #[test]
    fn end_at_line_start_belongs_to_the_previous_line() {
        let text = SourceText::new("foo();\nbar();");
        let sm = map(&[(0, 0, 0, 0, "a.ts"), (1, 0, 4, 0, "a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        let (_, range) = translator.translate_range(ByteRange::new(0, 7)).unwrap();
        assert_eq!(range.end.line, 1);
    }

    #[test]
    fn end_without_next_segment_on_the_line_is_unbounded() {
        let text = SourceText::new("foo();\nbar();");
        let sm = map(&[(0, 0, 0, 0, "a.ts"), (1, 0, 3, 0, "a.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/a.js", &sm);
        let (_, range) = translator.translate_range(ByteRange::new(0, 6)).unwrap();
        assert_eq!(range.start, Location::new(1, 0));
        assert!(range.end.is_unbounded());
        assert_eq!(range.end.line, 1);
    }

    #[test]
    fn ranges_spanning_two_sources_are_dropped() {
        let text = SourceText::new("a(); b();");
        let sm = map(&[(0, 0, 0, 0, "a.ts"), (0, 5, 0, 0, "b.ts")]);
        let translator = PositionTranslator::with_source_map(&text, "/out/bundle.js", &sm);
        assert!(translator.translate_range(ByteRange::new(0, 9)).is_none());
        assert!(translator.translate_range(ByteRange::new(0, 4)).is_some());
    }

    #[test]
    fn sources_resolve_relative_to_generated_file() {
        assert_eq!(resolve_source(Path::new("/out/dist"), "../src/a.ts"), "/out/src/a.ts");
        assert_eq!(resolve_source(Path::new("/out"), "file:///abs/b.ts"), "/abs/b.ts");
        assert_eq!(resolve_source(Path::new("/out"), "./c.ts"), "/out/c.ts");
    }
}
