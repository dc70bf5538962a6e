//! Ignore comments and method name patterns.
//!
//! Every recognised comment is resolved against the syntax index to the byte
//! ranges it suppresses. Any coverage entry whose range lies inside one of
//! those targets is left out of the output.

use regex::Regex;
use tracing::{debug, warn};
use wax::{Glob, Pattern};

use crate::error::{CoverageError, Result};
use crate::options::DirectivePolicy;
use crate::source_coverage::BranchType;
use crate::source_text::SourceText;
use crate::syntax_index::{CandidateKind, SyntaxIndex};
use crate::syntax_tree::{ByteRange, SourceComment, StatementKind};

const DIRECTIVE_PATTERN: &str = r"^[\s*]*(?:v8|c8|istanbul|node:coverage)\s+(?:ignore\s+(next|if|else|start|stop)(?:\s*:\s*(\d+)|\s+(\d+))?|(disable|enable))(?:$|\s|--)";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Ignore the next `n` candidates.
    Next(u32),
    If,
    Else,
    Start,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HintScope {
    Next,
    If,
    Else,
    Case,
    Default,
    Region,
    Method,
}

/// One suppressed range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IgnoreHint {
    pub scope: HintScope,
    /// Start of the comment, or of the function for [`HintScope::Method`].
    pub anchor_offset: u32,
    pub target: ByteRange,
    /// The `if` whose path an `if`/`else` hint suppresses.
    pub branch: Option<ByteRange>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedDirective {
    pub directive: String,
    pub line: u32,
    pub column: u32,
}

impl UnresolvedDirective {
    pub fn into_error(self) -> CoverageError {
        CoverageError::UnresolvedIgnoreDirective {
            directive: self.directive,
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IgnoreHints {
    hints: Vec<IgnoreHint>,
    unresolved: Vec<UnresolvedDirective>,
}

impl IgnoreHints {
    pub fn hints(&self) -> &[IgnoreHint] {
        &self.hints
    }

    /// Directives that matched nothing; only populated under [`DirectivePolicy::Warn`].
    pub fn unresolved(&self) -> &[UnresolvedDirective] {
        &self.unresolved
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    /// Whether some hint covers `range`.
    pub fn excludes(&self, range: ByteRange) -> bool {
        self.hints.iter().any(|hint| hint.target.encloses(&range))
    }

    /// Whether some hint covers the path at `path` of the branch at `branch`.
    ///
    /// Nested `if`s without `else` share the zero-width alternate at their
    /// common end, so such a path only goes with a hint naming its own `if`.
    pub fn excludes_path(&self, branch: ByteRange, path: ByteRange) -> bool {
        self.hints.iter().any(|hint| match hint.branch {
            Some(owner) if path.is_empty() && hint.target == path => owner == branch,
            _ => hint.target.encloses(&path),
        })
    }
}

struct MethodPattern {
    raw: String,
    glob: Glob<'static>,
}

impl MethodPattern {
    fn matches(&self, name: &str) -> bool {
        self.raw == name || self.glob.is_match(name)
    }
}

pub struct IgnoreResolver {
    directive: Regex,
    methods: Vec<MethodPattern>,
    policy: DirectivePolicy,
}

impl IgnoreResolver {
    pub fn new(method_patterns: &[String], policy: DirectivePolicy) -> Result<Self> {
        let directive = Regex::new(DIRECTIVE_PATTERN).map_err(|err| CoverageError::InvalidPattern {
            pattern: DIRECTIVE_PATTERN.to_string(),
            message: err.to_string(),
        })?;
        let methods = method_patterns
            .iter()
            .map(|pattern| {
                let glob = Glob::new(pattern)
                    .map_err(|err| CoverageError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: err.to_string(),
                    })?
                    .into_owned();
                Ok(MethodPattern {
                    raw: pattern.clone(),
                    glob,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            directive,
            methods,
            policy,
        })
    }

    /// Recognises a directive in comment text (delimiters already stripped).
    pub fn parse_directive(&self, text: &str) -> Option<(Directive, String)> {
        let caps = self.directive.captures(text)?;
        let directive = match (
            caps.get(1).map(|m| m.as_str()),
            caps.get(4).map(|m| m.as_str()),
        ) {
            (Some("next"), _) => {
                let count = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(1);
                Directive::Next(count.max(1))
            }
            (Some("if"), _) => Directive::If,
            (Some("else"), _) => Directive::Else,
            (Some("start"), _) | (_, Some("disable")) => Directive::Start,
            (Some("stop"), _) | (_, Some("enable")) => Directive::Stop,
            _ => return None,
        };
        let label = caps
            .get(0)?
            .as_str()
            .trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '-')
            .to_string();
        Some((directive, label))
    }

    pub fn resolve(&self, index: &SyntaxIndex<'_>, source: &SourceText<'_>) -> Result<IgnoreHints> {
        let mut hints = Vec::new();
        let mut unresolved = Vec::new();
        let mut open_region: Option<(u32, UnresolvedDirective)> = None;

        for comment in index.comments() {
            let Some((directive, label)) = self.parse_directive(&comment.text) else {
                continue;
            };
            let location = source.location(comment.range.start);
            let pending = UnresolvedDirective {
                directive: label,
                line: location.line,
                column: location.column,
            };
            let resolved = match directive {
                Directive::Next(count) => resolve_next(index, comment, count, &mut hints),
                Directive::If | Directive::Else => resolve_if(index, comment, directive, &mut hints),
                Directive::Start if open_region.is_none() => {
                    open_region = Some((comment.range.end, pending));
                    continue;
                }
                Directive::Start => false,
                Directive::Stop => match open_region.take() {
                    Some((start, start_directive)) => {
                        let region = ByteRange::new(start, comment.range.start);
                        if !resolve_region(index, region, comment.range.start, &mut hints) {
                            unresolved.push(start_directive);
                        }
                        true
                    }
                    None => false,
                },
            };
            if !resolved {
                unresolved.push(pending);
            }
        }
        if let Some((start, start_directive)) = open_region {
            let region = ByteRange::new(start, source.len());
            if !resolve_region(index, region, start, &mut hints) {
                unresolved.push(start_directive);
            }
        }

        for function in index.functions().iter().filter(|function| function.is_method()) {
            let Some(name) = function.name.as_deref() else {
                continue;
            };
            if self.methods.iter().any(|pattern| pattern.matches(name)) {
                debug!(name, "ignoring method body");
                hints.push(IgnoreHint {
                    scope: HintScope::Method,
                    anchor_offset: function.range.start,
                    target: function.body,
                    branch: None,
                });
            }
        }

        unresolved.sort_by_key(|directive| (directive.line, directive.column));
        match self.policy {
            DirectivePolicy::Error => {
                if let Some(first) = unresolved.into_iter().next() {
                    return Err(first.into_error());
                }
                Ok(IgnoreHints {
                    hints,
                    unresolved: Vec::new(),
                })
            }
            DirectivePolicy::Warn => {
                for directive in &unresolved {
                    warn!(
                        directive = %directive.directive,
                        line = directive.line,
                        column = directive.column,
                        "ignore directive does not match any code"
                    );
                }
                Ok(IgnoreHints { hints, unresolved })
            }
        }
    }
}

fn resolve_next(index: &SyntaxIndex<'_>, comment: &SourceComment, count: u32, hints: &mut Vec<IgnoreHint>) -> bool {
    let scope = index.scope_of(comment.range);
    let taken = index.next_candidates(comment.range.end, scope, count);
    for candidate in &taken {
        let scope = match candidate.kind {
            CandidateKind::Case { is_default: true } => HintScope::Default,
            CandidateKind::Case { is_default: false } => HintScope::Case,
            _ => HintScope::Next,
        };
        hints.push(IgnoreHint {
            scope,
            anchor_offset: comment.range.start,
            target: candidate.range,
            branch: None,
        });
    }
    !taken.is_empty()
}

fn resolve_if(index: &SyntaxIndex<'_>, comment: &SourceComment, directive: Directive, hints: &mut Vec<IgnoreHint>) -> bool {
    let scope = index.scope_of(comment.range);
    let shape = index
        .next_candidate(comment.range.end, scope)
        .filter(|candidate| {
            matches!(
                candidate.kind,
                CandidateKind::Statement(StatementKind::If) | CandidateKind::Branch(BranchType::If)
            )
        })
        .and_then(|candidate| index.if_at(candidate.range))
        .or_else(|| index.innermost_if_enclosing(comment.range));
    let Some(shape) = shape else {
        return false;
    };
    let (scope, target) = match directive {
        Directive::If => (HintScope::If, shape.consequent),
        _ => (HintScope::Else, shape.alternate),
    };
    hints.push(IgnoreHint {
        scope,
        anchor_offset: comment.range.start,
        target,
        branch: Some(shape.range),
    });
    true
}

fn resolve_region(index: &SyntaxIndex<'_>, region: ByteRange, anchor: u32, hints: &mut Vec<IgnoreHint>) -> bool {
    if !index.has_candidate_within(region) {
        return false;
    }
    hints.push(IgnoreHint {
        scope: HintScope::Region,
        anchor_offset: anchor,
        target: region,
        branch: None,
    });
    true
}
