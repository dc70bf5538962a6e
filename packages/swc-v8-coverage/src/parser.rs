//! Parser backends.

use std::path::Path;

use swc_core::{
    common::{
        comments::{CommentKind, SingleThreadedComments},
        BytePos, Spanned,
    },
    ecma::{
        ast::EsVersion,
        parser::{error::Error as SyntaxError, lexer::Lexer, Parser, StringInput, Syntax},
    },
};

use crate::error::{CoverageError, Result};
use crate::syntax_tree::{ByteRange, ParsedSource, SourceComment};
use crate::visitors::tree_builder::{TreeBuilder, SPAN_BASE};

/// Turns source text into the normalized tree.
///
/// Implementations must be deterministic: the same input yields the same tree.
pub trait SourceParser: Send + Sync {
    fn parse(&self, path: &str, source: &str) -> Result<ParsedSource>;
}

/// [`SourceParser`] backed by `swc_ecma_parser`. The dialect is picked from the
/// file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwcParser;

impl SwcParser {
    pub fn new() -> Self {
        Self
    }

    fn syntax_for(path: &str) -> Syntax {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        match extension {
            "ts" | "mts" | "cts" | "tsx" => {
                let mut syntax = Syntax::Typescript(Default::default());
                if let Syntax::Typescript(config) = &mut syntax {
                    config.tsx = extension == "tsx";
                    config.decorators = true;
                }
                syntax
            }
            _ => {
                let mut syntax = Syntax::Es(Default::default());
                if let Syntax::Es(config) = &mut syntax {
                    config.jsx = matches!(extension, "js" | "jsx");
                    config.decorators = true;
                }
                syntax
            }
        }
    }
}

impl SourceParser for SwcParser {
    fn parse(&self, path: &str, source: &str) -> Result<ParsedSource> {
        let comments = SingleThreadedComments::default();
        let input = StringInput::new(
            source,
            BytePos(SPAN_BASE),
            BytePos(SPAN_BASE + source.len() as u32),
        );
        let lexer = Lexer::new(Self::syntax_for(path), EsVersion::EsNext, input, Some(&comments));
        let mut parser = Parser::new_from(lexer);

        let program = parser
            .parse_program()
            .map_err(|error| parse_error(path, error))?;
        // Recovered errors still mean the tree may not match what V8 ran.
        if let Some(error) = parser.take_errors().into_iter().next() {
            return Err(parse_error(path, error));
        }

        let root = TreeBuilder::new(source).build(&program);
        Ok(ParsedSource {
            root,
            comments: collect_comments(comments),
        })
    }
}

fn parse_error(path: &str, error: SyntaxError) -> CoverageError {
    CoverageError::Parse {
        path: path.to_string(),
        offset: error.span().lo.0.saturating_sub(SPAN_BASE),
        message: error.kind().msg().into_owned(),
    }
}

fn collect_comments(comments: SingleThreadedComments) -> Vec<SourceComment> {
    let (leading, trailing) = comments.take_all();
    let leading = leading.borrow();
    let trailing = trailing.borrow();
    let mut out: Vec<SourceComment> = leading
        .values()
        .chain(trailing.values())
        .flatten()
        .map(|comment| SourceComment {
            range: ByteRange::new(
                comment.span.lo.0.saturating_sub(SPAN_BASE),
                comment.span.hi.0.saturating_sub(SPAN_BASE),
            ),
            text: comment.text.to_string(),
            block: comment.kind == CommentKind::Block,
        })
        .collect();
    out.sort_by_key(|comment| comment.range);
    out.dedup_by_key(|comment| comment.range);
    out
}
