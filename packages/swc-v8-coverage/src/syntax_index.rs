//! Flat, ordered views over a [`SourceNode`] tree.
//!
//! The builder walks functions, statements and branches as lists; the ignore
//! resolver searches sorted candidates by offset.

use std::cmp::Reverse;

use crate::source_coverage::{BranchType, Range};
use crate::source_text::SourceText;
use crate::syntax_tree::{
    ByteRange, FunctionKind, LogicalOperator, NodeKind, OperandRole, ParsedSource, SourceComment, SourceNode,
    StatementKind,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionNode {
    pub name: Option<String>,
    pub kind: FunctionKind,
    pub range: ByteRange,
    pub decl: ByteRange,
    pub body: ByteRange,
    pub count_offset: u32,
    /// Generated line/column range.
    pub loc: Range,
}

impl FunctionNode {
    /// Methods, accessors and constructors; the functions name patterns apply to.
    pub fn is_method(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::Method | FunctionKind::Getter | FunctionKind::Setter | FunctionKind::Constructor
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatementNode {
    pub kind: StatementKind,
    pub range: ByteRange,
    pub loc: Range,
}

/// How the hit count of one branch path is derived from the range index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathCounter {
    /// Count at this byte offset.
    At(u32),
    /// `count(total) - count(taken)`, saturating.
    Difference { total: u32, taken: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchPath {
    pub range: ByteRange,
    pub counter: PathCounter,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchNode {
    pub kind: BranchType,
    pub range: ByteRange,
    pub paths: Vec<BranchPath>,
    pub loc: Range,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateKind {
    Statement(StatementKind),
    Declaration,
    Function,
    Class,
    Case { is_default: bool },
    Branch(BranchType),
    Path(OperandRole),
}

/// Something an ignore comment can attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub range: ByteRange,
    pub kind: CandidateKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IfShape {
    pub range: ByteRange,
    pub consequent: ByteRange,
    /// Zero-width at the end of the `if` when there is no `else`.
    pub alternate: ByteRange,
}

pub struct SyntaxIndex<'t> {
    root: &'t SourceNode,
    comments: &'t [SourceComment],
    functions: Vec<FunctionNode>,
    statements: Vec<StatementNode>,
    branches: Vec<BranchNode>,
    candidates: Vec<Candidate>,
    ifs: Vec<IfShape>,
}

impl<'t> SyntaxIndex<'t> {
    pub fn new(parsed: &'t ParsedSource, source: &SourceText<'_>) -> Self {
        let mut index = Self {
            root: &parsed.root,
            comments: &parsed.comments,
            functions: Vec::new(),
            statements: Vec::new(),
            branches: Vec::new(),
            candidates: Vec::new(),
            ifs: Vec::new(),
        };
        index.visit(&parsed.root, None, source);

        index.functions.sort_by_key(|f| (f.range.start, Reverse(f.range.end)));
        index.statements.sort_by_key(|s| (s.range.start, Reverse(s.range.end)));
        index.branches.sort_by_key(|b| (b.range.start, Reverse(b.range.end)));
        index.candidates.sort_by_key(|c| (c.range.start, Reverse(c.range.end)));
        index.ifs.sort_by_key(|i| i.range.start);
        index
    }

    pub fn functions(&self) -> &[FunctionNode] {
        &self.functions
    }

    pub fn statements(&self) -> &[StatementNode] {
        &self.statements
    }

    pub fn branches(&self) -> &[BranchNode] {
        &self.branches
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn comments(&self) -> &[SourceComment] {
        self.comments
    }

    pub fn root(&self) -> &SourceNode {
        self.root
    }

    /// Range of the innermost node containing `range`.
    pub fn scope_of(&self, range: ByteRange) -> ByteRange {
        self.root.innermost_enclosing(range).range
    }

    /// First candidate starting at or after `offset` and lying inside `scope`,
    /// the outermost one when several start together.
    pub fn next_candidate(&self, offset: u32, scope: ByteRange) -> Option<&Candidate> {
        let idx = self.candidates.partition_point(|c| c.range.start < offset);
        self.candidates
            .get(idx)
            .filter(|candidate| scope.encloses(&candidate.range))
    }

    /// Up to `n` consecutive candidates, each starting after the previous one ends.
    pub fn next_candidates(&self, offset: u32, scope: ByteRange, n: u32) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut cursor = offset;
        while out.len() < n as usize {
            let Some(candidate) = self.next_candidate(cursor, scope) else {
                break;
            };
            cursor = candidate.range.end.max(candidate.range.start + 1);
            out.push(*candidate);
        }
        out
    }

    /// Whether any candidate lies inside `range`.
    pub fn has_candidate_within(&self, range: ByteRange) -> bool {
        let idx = self.candidates.partition_point(|c| c.range.start < range.start);
        self.candidates[idx..]
            .iter()
            .take_while(|c| c.range.start < range.end)
            .any(|c| range.encloses(&c.range))
    }

    pub fn if_at(&self, range: ByteRange) -> Option<&IfShape> {
        let idx = self.ifs.partition_point(|shape| shape.range.start < range.start);
        self.ifs[idx..]
            .iter()
            .take_while(|shape| shape.range.start == range.start)
            .find(|shape| shape.range == range)
    }

    /// Innermost `if` whose range strictly contains `range`.
    pub fn innermost_if_enclosing(&self, range: ByteRange) -> Option<&IfShape> {
        self.ifs
            .iter()
            .filter(|shape| shape.range.start <= range.start && range.end <= shape.range.end)
            .max_by_key(|shape| (shape.range.start, Reverse(shape.range.end)))
    }

    fn candidate(&mut self, range: ByteRange, kind: CandidateKind) {
        self.candidates.push(Candidate { range, kind });
    }

    fn branch(&mut self, kind: BranchType, range: ByteRange, paths: Vec<BranchPath>, source: &SourceText<'_>) {
        self.candidate(range, CandidateKind::Branch(kind));
        if paths.is_empty() {
            return;
        }
        self.branches.push(BranchNode {
            kind,
            range,
            paths,
            loc: generated_range(source, range),
        });
    }

    /// `absorbed_by` is set when `node` is a logical operand that flattens into
    /// its parent chain.
    fn visit(&mut self, node: &'t SourceNode, absorbed_by: Option<LogicalOperator>, source: &SourceText<'_>) {
        match &node.kind {
            NodeKind::Program | NodeKind::Block => {}
            NodeKind::Statement { kind } => {
                self.candidate(node.range, CandidateKind::Statement(*kind));
                self.statements.push(StatementNode {
                    kind: *kind,
                    range: node.range,
                    loc: generated_range(source, node.range),
                });
                match kind {
                    StatementKind::If => self.if_branch(node, source),
                    StatementKind::Switch => self.switch_branch(node, source),
                    _ => {}
                }
            }
            NodeKind::Declaration => self.candidate(node.range, CandidateKind::Declaration),
            NodeKind::Function(shape) => {
                if shape.kind == FunctionKind::Class {
                    self.candidate(node.range, CandidateKind::Class);
                } else {
                    self.candidate(node.range, CandidateKind::Function);
                    self.functions.push(FunctionNode {
                        name: node.name.clone(),
                        kind: shape.kind,
                        range: node.range,
                        decl: shape.decl,
                        body: shape.body,
                        count_offset: shape.count_offset,
                        loc: generated_range(source, node.range),
                    });
                }
            }
            NodeKind::Logical { operator } => {
                if absorbed_by != Some(*operator) {
                    let mut operands = Vec::new();
                    logical_operands(node, *operator, &mut operands);
                    let paths = operands
                        .into_iter()
                        .map(|range| BranchPath {
                            range,
                            counter: PathCounter::At(range.start),
                        })
                        .collect();
                    self.branch(BranchType::BinaryExpr, node.range, paths, source);
                }
                for operand in &node.children {
                    if let Some(role) = operand.operand_role() {
                        self.candidate(operand.range, CandidateKind::Path(role));
                    }
                    for child in &operand.children {
                        let absorbed = child.range == operand.range
                            && matches!(child.kind, NodeKind::Logical { operator: inner } if inner == *operator);
                        self.visit(child, absorbed.then_some(*operator), source);
                    }
                }
                return;
            }
            NodeKind::Conditional => {
                let paths = [OperandRole::Consequent, OperandRole::Alternate]
                    .into_iter()
                    .filter_map(|role| node.operand(role))
                    .map(|operand| BranchPath {
                        range: operand.range,
                        counter: PathCounter::At(operand.range.start),
                    })
                    .collect();
                self.branch(BranchType::CondExpr, node.range, paths, source);
            }
            NodeKind::DefaultValue => {
                if let (Some(binding), Some(default)) =
                    (node.operand(OperandRole::Binding), node.operand(OperandRole::Default))
                {
                    let paths = vec![
                        BranchPath {
                            range: default.range,
                            counter: PathCounter::At(default.range.start),
                        },
                        BranchPath {
                            range: binding.range,
                            counter: PathCounter::Difference {
                                total: binding.range.start,
                                taken: default.range.start,
                            },
                        },
                    ];
                    self.branch(BranchType::DefaultArg, node.range, paths, source);
                }
            }
            NodeKind::OptionalChain => {
                if let (Some(base), Some(access)) =
                    (node.operand(OperandRole::Base), node.operand(OperandRole::Access))
                {
                    let paths = vec![
                        BranchPath {
                            range: base.range,
                            counter: PathCounter::Difference {
                                total: base.range.start,
                                taken: access.range.start,
                            },
                        },
                        BranchPath {
                            range: access.range,
                            counter: PathCounter::At(access.range.start),
                        },
                    ];
                    self.branch(BranchType::OptionalChain, node.range, paths, source);
                }
            }
            NodeKind::SwitchCase { is_default } => self.candidate(
                node.range,
                CandidateKind::Case {
                    is_default: *is_default,
                },
            ),
            NodeKind::Operand { role } => {
                if role.is_path() {
                    self.candidate(node.range, CandidateKind::Path(*role));
                }
            }
        }
        for child in &node.children {
            self.visit(child, None, source);
        }
    }

    fn if_branch(&mut self, node: &SourceNode, source: &SourceText<'_>) {
        let Some(consequent) = node.operand(OperandRole::Consequent) else {
            return;
        };
        let alternate = match node.operand(OperandRole::Alternate) {
            Some(alternate) => BranchPath {
                range: alternate.range,
                counter: PathCounter::At(alternate.range.start),
            },
            None => BranchPath {
                range: ByteRange::empty_at(node.range.end),
                counter: PathCounter::Difference {
                    total: node.range.start,
                    taken: consequent.range.start,
                },
            },
        };
        self.ifs.push(IfShape {
            range: node.range,
            consequent: consequent.range,
            alternate: alternate.range,
        });
        let paths = vec![
            BranchPath {
                range: consequent.range,
                counter: PathCounter::At(consequent.range.start),
            },
            alternate,
        ];
        self.branch(BranchType::If, node.range, paths, source);
    }

    fn switch_branch(&mut self, node: &SourceNode, source: &SourceText<'_>) {
        let paths = node
            .children
            .iter()
            .filter(|child| matches!(child.kind, NodeKind::SwitchCase { .. }))
            .map(|case| {
                let first = case
                    .children
                    .iter()
                    .find(|child| child.operand_role() != Some(OperandRole::Test))
                    .map_or(case.range.start, |child| child.range.start);
                BranchPath {
                    range: case.range,
                    counter: PathCounter::At(first),
                }
            })
            .collect();
        self.branch(BranchType::Switch, node.range, paths, source);
    }
}

/// Operand ranges of a logical chain, same-operator operands flattened.
fn logical_operands(node: &SourceNode, operator: LogicalOperator, out: &mut Vec<ByteRange>) {
    for operand in &node.children {
        if operand.operand_role() != Some(OperandRole::Operand) {
            continue;
        }
        match operand.children.as_slice() {
            [inner]
                if inner.range == operand.range
                    && matches!(inner.kind, NodeKind::Logical { operator: op } if op == operator) =>
            {
                logical_operands(inner, operator, out)
            }
            _ => out.push(operand.range),
        }
    }
}

fn generated_range(source: &SourceText<'_>, range: ByteRange) -> Range {
    Range::from_locations(source.location(range.start), source.location(range.end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SourceParser, SwcParser};

    fn index_of(src: &str, check: impl FnOnce(&SyntaxIndex<'_>)) {
        let parsed = SwcParser.parse("test.js", src).unwrap();
        let text = SourceText::new(src);
        check(&SyntaxIndex::new(&parsed, &text));
    }

    #[test]
    fn chained_logical_flattens_to_one_branch() {
        index_of("x = a || b || (c || d) || e && f;", |index| {
            let logical: Vec<_> = index
                .branches()
                .iter()
                .filter(|b| b.kind == BranchType::BinaryExpr)
                .collect();
            assert_eq!(logical.len(), 2);
            assert_eq!(logical[0].paths.len(), 5);
            assert_eq!(logical[1].paths.len(), 2);
        });
    }

    #[test]
    fn if_without_else_gets_zero_width_alternate() {
        let src = "if (a) { b(); }";
        index_of(src, |index| {
            let branch = &index.branches()[0];
            assert_eq!(branch.kind, BranchType::If);
            assert_eq!(branch.paths[1].range, ByteRange::empty_at(src.len() as u32));
            assert_eq!(
                branch.paths[1].counter,
                PathCounter::Difference { total: 0, taken: 7 }
            );
        });
    }

    #[test]
    fn switch_paths_count_at_first_statement() {
        let src = "switch (x) { case 1: a(); break; case 2: default: b(); }";
        index_of(src, |index| {
            let branch = index.branches().iter().find(|b| b.kind == BranchType::Switch).unwrap();
            assert_eq!(branch.paths.len(), 3);
            assert_eq!(branch.paths[0].counter, PathCounter::At(src.find("a()").unwrap() as u32));
            assert_eq!(branch.paths[1].counter, PathCounter::At(src.find("case 2").unwrap() as u32));
        });
    }

    #[test]
    fn default_values_and_optional_chains() {
        index_of("function f(a = 1) { return a?.b; }", |index| {
            let kinds: Vec<_> = index.branches().iter().map(|b| b.kind).collect();
            assert_eq!(kinds, vec![BranchType::DefaultArg, BranchType::OptionalChain]);
            assert!(index.branches().iter().all(|b| b.paths.len() == 2));
        });
    }

    #[test]
    fn classes_are_candidates_but_not_functions() {
        index_of("class A { m() {} }", |index| {
            assert_eq!(index.functions().len(), 1);
            assert_eq!(index.functions()[0].name.as_deref(), Some("m"));
            assert!(index.functions()[0].is_method());
            assert!(index.candidates().iter().any(|c| c.kind == CandidateKind::Class));
        });
    }

    #[test]
    fn next_candidate_prefers_outermost_and_stays_in_scope() {
        let src = "function f() { a(); /* c */ }\nb();";
        index_of(src, |index| {
            let comment = index.comments()[0].range;
            let scope = index.scope_of(comment);
            assert!(index.next_candidate(comment.end, scope).is_none());

            let root = index.root().range;
            let next = index.next_candidate(0, root).unwrap();
            assert_eq!(next.kind, CandidateKind::Function);
        });
    }

    #[test]
    fn next_candidates_skips_nested_nodes() {
        index_of("a(); b(x ? 1 : 2); c();", |index| {
            let taken = index.next_candidates(0, index.root().range, 2);
            assert_eq!(taken.len(), 2);
            assert_eq!(taken[1].range.start, 5);
        });
    }
}
