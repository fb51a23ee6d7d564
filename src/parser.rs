//! Syntax-aware snippet extraction.
//!
//! [`GoParser`] uses tree-sitter to emit one [`Snippet`] per top-level
//! function or method declaration. Content is sliced by byte offset from the
//! original source, so formatting and comments inside bodies are preserved.
//! Methods are named `Receiver.Method`, with pointer receivers unwrapped.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::error::ParseError;
use crate::models::Snippet;

/// Extracts structured snippets from source files of one language.
pub trait CodeParser: Send + Sync {
    /// Whether this parser handles `path` (by extension).
    fn supports(&self, path: &Path) -> bool;

    /// Split `source` into declaration snippets. `file_path` is recorded on
    /// each snippet as-is.
    fn parse(&self, file_path: &str, source: &str) -> Result<Vec<Snippet>, ParseError>;
}

/// Top-level function and method extraction for Go.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoParser;

impl GoParser {
    pub fn new() -> Self {
        Self
    }
}

impl CodeParser for GoParser {
    fn supports(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "go")
    }

    fn parse(&self, file_path: &str, source: &str) -> Result<Vec<Snippet>, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| ParseError::Language(e.to_string()))?;

        let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(ParseError::Syntax);
        }

        let bytes = source.as_bytes();
        let mut snippets = Vec::new();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            let symbol = match child.kind() {
                "function_declaration" => node_name(child, bytes),
                "method_declaration" => {
                    let name = node_name(child, bytes);
                    match child
                        .child_by_field_name("receiver")
                        .and_then(|r| receiver_type(r, bytes))
                    {
                        Some(receiver) => name.map(|n| format!("{}.{}", receiver, n)),
                        None => name,
                    }
                }
                _ => continue,
            };

            let content = &source[child.start_byte()..child.end_byte()];
            let snippet = Snippet::new(
                content,
                file_path,
                child.start_position().row + 1,
                child.end_position().row + 1,
            )
            .with_symbols(symbol.into_iter().collect());
            snippets.push(snippet);
        }

        Ok(snippets)
    }
}

fn node_name(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .map(str::to_string)
}

/// First type identifier under a receiver list: `(s *Server)` and
/// `(s Server)` both give `Server`; `(l *List[T])` gives `List`.
fn receiver_type(node: Node, source: &[u8]) -> Option<String> {
    if node.kind() == "type_identifier" {
        return node.utf8_text(source).ok().map(str::to_string);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| receiver_type(child, source))
}
