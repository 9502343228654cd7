//! Lossless SystemVerilog syntax trees
//!
//! The lexer keeps every byte of input, the parser arranges the significant
//! tokens into an arena tree, and rendering walks the tree back to text with
//! optional per-node substitutions. Rewrites never mutate a tree in place;
//! they render new text and parse it into a fresh tree.

use std::fmt;

pub mod edit;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod tree;

pub use edit::{TextEdit, apply_edits};
pub use lexer::TokenKind;
pub use render::{Overrides, Piece, Substitution};
pub use tree::{Element, NodeId, SyntaxKind, SyntaxTree, TokenId, TreeId};

/// Parse error with location information
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line_number: usize,
    pub column: Option<usize>,
    pub message: String,
    pub line_content: String,
}

impl ParseError {
    pub fn new(
        line_number: usize,
        message: impl Into<String>,
        line_content: impl Into<String>,
    ) -> Self {
        Self {
            line_number,
            column: None,
            message: message.into(),
            line_content: line_content.into(),
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// Build an error pointing at a byte offset of `source`.
    pub fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line_number, column) = line_and_column(source, offset);
        let line_content = source.lines().nth(line_number - 1).unwrap_or("");
        Self::new(line_number, message, line_content).with_column(column)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.column {
            write!(
                f,
                "line {}, column {}: {}\n  | {}\n  | {}^",
                self.line_number,
                col,
                self.message,
                self.line_content,
                " ".repeat(col.saturating_sub(1))
            )
        } else {
            write!(
                f,
                "line {}: {}\n  | {}",
                self.line_number, self.message, self.line_content
            )
        }
    }
}

impl std::error::Error for ParseError {}

/// 1-based line and column of a byte offset.
pub fn line_and_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(pos) => offset - pos,
        None => offset + 1,
    };
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_column() {
        let source = "module m;\n  wire a;\nendmodule\n";
        assert_eq!(line_and_column(source, 0), (1, 1));
        assert_eq!(line_and_column(source, 12), (2, 3));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::at("module m\nendmodule", 9, "expected ';'");
        let text = err.to_string();
        assert!(text.starts_with("line 2, column 1: expected ';'"));
        assert!(text.contains("| endmodule"));
    }
}
