//! Istanbul coverage data structures: the static maps and their hit counts.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Column value used for an end position that runs to the end of its line.
pub const UNBOUNDED_COLUMN: u32 = u32::MAX;

/// Position { line, column }: 1-based line, 0-based UTF-16 column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    #[serde(with = "column")]
    pub column: u32,
}

impl Location {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// End of `line`, whatever its length.
    pub const fn end_of_line(line: u32) -> Self {
        Self {
            line,
            column: UNBOUNDED_COLUMN,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.column == UNBOUNDED_COLUMN
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "{}:∞", self.line)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Istanbul serialises an unbounded column as `Infinity`, which JSON turns into `null`.
mod column {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::UNBOUNDED_COLUMN;

    pub fn serialize<S: Serializer>(column: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        if *column == UNBOUNDED_COLUMN {
            serializer.serialize_none()
        } else {
            serializer.serialize_u32(*column)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(UNBOUNDED_COLUMN))
    }
}

/// Range { start, end }
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub start: Location,
    pub end: Location,
}

impl Range {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start: Location::new(start_line, start_column),
            end: Location::new(end_line, end_column),
        }
    }

    pub const fn from_locations(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One `fnMap` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    /// Header span: name and parameters through the opening of the body.
    pub decl: Range,
    /// The whole function.
    pub loc: Range,
    pub line: u32,
}

impl FunctionEntry {
    /// The decl range with its end replaced by the end of its start line.
    ///
    /// Reporters that compare function entries across tools only look at where a
    /// declaration starts, because the decl end of an expression-bodied arrow is
    /// parser dependent.
    pub fn end_agnostic_decl(&self) -> Range {
        Range::from_locations(self.decl.start, Location::end_of_line(self.decl.start.line))
    }

    pub fn matches_ignoring_decl_end(&self, other: &FunctionEntry) -> bool {
        self.name == other.name && self.loc == other.loc && self.decl.start == other.decl.start
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchType {
    BinaryExpr,
    CondExpr,
    Switch,
    If,
    DefaultArg,
    OptionalChain,
}

impl BranchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchType::BinaryExpr => "binary-expr",
            BranchType::CondExpr => "cond-expr",
            BranchType::Switch => "switch",
            BranchType::If => "if",
            BranchType::DefaultArg => "default-arg",
            BranchType::OptionalChain => "optional-chain",
        }
    }
}

/// One `branchMap` entry; `locations` is parallel to the counts in `b`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEntry {
    pub loc: Range,
    #[serde(rename = "type")]
    pub kind: BranchType,
    pub locations: Vec<Range>,
    pub line: u32,
}

/// Coverage of one original file, keyed the way istanbul keys it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub path: String,
    pub statement_map: IndexMap<u32, Range>,
    pub fn_map: IndexMap<u32, FunctionEntry>,
    pub branch_map: IndexMap<u32, BranchEntry>,
    pub s: IndexMap<u32, u32>,
    pub f: IndexMap<u32, u32>,
    pub b: IndexMap<u32, Vec<u32>>,
}

impl FileCoverage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Adds a statement, returns its id.
    pub fn new_statement(&mut self, loc: Range, count: u32) -> u32 {
        let id = self.statement_map.len() as u32;
        self.statement_map.insert(id, loc);
        self.s.insert(id, count);
        id
    }

    /// Adds a function, returns its id. Unnamed functions get istanbul's
    /// `(anonymous_N)` placeholder.
    pub fn new_function(&mut self, name: Option<&str>, decl: Range, loc: Range, count: u32) -> u32 {
        let id = self.fn_map.len() as u32;
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("(anonymous_{id})"),
        };
        self.fn_map.insert(
            id,
            FunctionEntry {
                name,
                decl,
                loc,
                line: loc.start.line,
            },
        );
        self.f.insert(id, count);
        id
    }

    /// Adds a branch with one hit count per location, returns its id.
    pub fn new_branch(&mut self, kind: BranchType, loc: Range, locations: Vec<Range>, hits: Vec<u32>) -> u32 {
        debug_assert_eq!(locations.len(), hits.len());
        let id = self.branch_map.len() as u32;
        self.branch_map.insert(
            id,
            BranchEntry {
                loc,
                kind,
                locations,
                line: loc.start.line,
            },
        );
        self.b.insert(id, hits);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.statement_map.is_empty() && self.fn_map.is_empty() && self.branch_map.is_empty()
    }
}

/// Coverage for every original file touched by a conversion, keyed by path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageMap {
    #[serde(flatten)]
    pub(crate) files: IndexMap<String, FileCoverage>,
    /// Files whose coverage could not be merged, with the reason.
    #[serde(skip)]
    pub(crate) indeterminate: IndexMap<String, String>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    /// The coverage for `path`, created empty on first use.
    pub fn file_mut(&mut self, path: &str) -> &mut FileCoverage {
        if !self.files.contains_key(path) {
            self.files.insert(path.to_string(), FileCoverage::new(path));
        }
        &mut self.files[path]
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FileCoverage)> {
        self.files.iter().map(|(path, cov)| (path.as_str(), cov))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn indeterminate(&self) -> impl Iterator<Item = (&str, &str)> {
        self.indeterminate
            .iter()
            .map(|(path, reason)| (path.as_str(), reason.as_str()))
    }

    pub fn into_files(self) -> IndexMap<String, FileCoverage> {
        self.files
    }
}

impl FromIterator<FileCoverage> for CoverageMap {
    fn from_iter<T: IntoIterator<Item = FileCoverage>>(iter: T) -> Self {
        let mut map = CoverageMap::new();
        for cov in iter {
            map.merge_file(cov);
        }
        map
    }
}
