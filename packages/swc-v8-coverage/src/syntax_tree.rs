//! Parser-independent view of a script.
//!
//! A backend turns its own AST into a tree of [`SourceNode`]s that only keeps the
//! constructs coverage cares about. Everything else is transparent: its
//! interesting descendants are attached to the nearest interesting ancestor.
//! The tree is serialisable so parsers living outside this crate can supply it.

use serde::{Deserialize, Serialize};

/// Half-open byte span `[start, end)` into the generated source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u32,
    pub end: u32,
}

impl ByteRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Zero-width range at `offset`.
    pub const fn empty_at(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains_offset(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether `other` lies inside `self`.
    ///
    /// A zero-width range only counts as inside when it is strictly within
    /// `self` or equal to it: an implicit `else` sitting exactly at the end of a
    /// consequent is not part of that consequent.
    pub fn encloses(&self, other: &ByteRange) -> bool {
        if other.is_empty() {
            self == other || (self.start < other.start && other.end < self.end)
        } else {
            self.start <= other.start && other.end <= self.end
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatementKind {
    Expression,
    If,
    Switch,
    For,
    ForIn,
    ForOf,
    While,
    DoWhile,
    Try,
    Return,
    Throw,
    Break,
    Continue,
    Debugger,
    With,
    Labeled,
    /// Variable initializer, class field value or `export default` expression.
    Initializer,
    /// Expression body of an arrow function.
    ArrowBody,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunctionKind {
    Declaration,
    Expression,
    Arrow,
    Method,
    Getter,
    Setter,
    Constructor,
    /// Class declaration or expression: a region for ignore purposes, never a
    /// function entry.
    Class,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalOperator {
    And,
    Or,
    Nullish,
}

/// Position of an operand inside its parent construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperandRole {
    /// Condition / discriminant / case test. Never a branch path.
    Test,
    Consequent,
    Alternate,
    /// Operand of a logical expression.
    Operand,
    /// Binding side of a default value.
    Binding,
    /// Default value expression.
    Default,
    /// Object or callee before `?.`.
    Base,
    /// Everything after `?.`.
    Access,
    /// Body of a `catch` clause.
    Handler,
}

impl OperandRole {
    /// Roles whose operand is one evaluation path of its parent.
    pub fn is_path(&self) -> bool {
        !matches!(self, OperandRole::Test | OperandRole::Binding | OperandRole::Base)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionShape {
    pub kind: FunctionKind,
    /// `[start, body start + 1)`.
    pub decl: ByteRange,
    pub body: ByteRange,
    /// First offset that only executes when the function itself is called.
    pub count_offset: u32,
    pub expression_body: bool,
}

/// Node kinds and the layout of their children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    Program,
    Block,
    /// `If` children: `[Test, Consequent, Alternate?]`; `Switch` children:
    /// `[Test, SwitchCase...]`.
    Statement { kind: StatementKind },
    /// `var`/`let`/`const` or an `export` declaration.
    Declaration,
    Function(FunctionShape),
    /// Children: `[Operand, Operand]`.
    Logical { operator: LogicalOperator },
    /// Children: `[Test, Consequent, Alternate]`.
    Conditional,
    /// Children: `[Binding, Default]`.
    DefaultValue,
    /// Children: `[Base, Access]`.
    OptionalChain,
    /// Children: `[Test?, statements...]`.
    SwitchCase { is_default: bool },
    Operand { role: OperandRole },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    pub kind: NodeKind,
    pub range: ByteRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SourceNode>,
}

impl SourceNode {
    pub fn new(kind: NodeKind, range: ByteRange) -> Self {
        Self {
            kind,
            range,
            name: None,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_children(mut self, children: Vec<SourceNode>) -> Self {
        self.children = children;
        self
    }

    pub fn operand_role(&self) -> Option<OperandRole> {
        match self.kind {
            NodeKind::Operand { role } => Some(role),
            _ => None,
        }
    }

    /// First child operand with `role`.
    pub fn operand(&self, role: OperandRole) -> Option<&SourceNode> {
        self.children
            .iter()
            .find(|child| child.operand_role() == Some(role))
    }

    /// Innermost node (including `self`) whose range contains `range`.
    pub fn innermost_enclosing(&self, range: ByteRange) -> &SourceNode {
        let mut node = self;
        'descend: loop {
            for child in &node.children {
                if child.range.start <= range.start && range.end <= child.range.end {
                    node = child;
                    continue 'descend;
                }
            }
            return node;
        }
    }
}

/// A comment and its byte span, delimiters included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceComment {
    pub range: ByteRange,
    /// Text without `//`, `/*` or `*/`.
    pub text: String,
    pub block: bool,
}

/// What a parser backend hands to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedSource {
    pub root: SourceNode,
    pub comments: Vec<SourceComment>,
}
