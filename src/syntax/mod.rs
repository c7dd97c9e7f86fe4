//! Raw syntax trees handed over by the external parser.
//!
//! The parser is not part of this crate. It delivers one immutable tree per
//! file, either as JSON (with byte spans) or in the s-expression form the
//! parser prints for debugging (no spans). Both land in [`SyntaxNode`].

mod sexp;
mod shape;

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use sexp::{parse_sexp, SexpError};
pub use shape::{Arity, Shape};

/// Source location span with byte offsets and line positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// End line (1-indexed).
    #[serde(default)]
    pub end_line: usize,
}

impl Span {
    /// Build a span from a byte range and the source it points into.
    pub fn from_source(source: &str, start_byte: usize, end_byte: usize) -> Self {
        let line_at = |offset: usize| {
            source.as_bytes()[..offset.min(source.len())]
                .iter()
                .filter(|&&b| b == b'\n')
                .count()
                + 1
        };
        Self {
            start_byte,
            end_byte,
            start_line: line_at(start_byte),
            end_line: line_at(end_byte),
        }
    }

    pub fn len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.start_line, self.start_byte, self.end_byte)
    }
}

/// An atomic child value: a symbol name, a literal, or an absent child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Atom {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Atom {
    pub fn is_nil(&self) -> bool {
        matches!(self, Atom::Nil)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Atom::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Nil => write!(f, "nil"),
            Atom::Bool(b) => write!(f, "{}", b),
            Atom::Int(i) => write!(f, "{}", i),
            Atom::Float(x) => write!(f, "{}", x),
            Atom::Text(s) => write!(f, ":{}", s),
        }
    }
}

/// A child slot of a syntax node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    Node(SyntaxNode),
    Atom(Atom),
}

impl Child {
    pub fn as_node(&self) -> Option<&SyntaxNode> {
        match self {
            Child::Node(n) => Some(n),
            Child::Atom(_) => None,
        }
    }
}

/// One grammar production as produced by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxNode {
    /// Grammar shape tag, e.g. `send`, `case`, `lvasgn`.
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub children: Vec<Child>,
    /// Absent for synthetic nodes.
    #[serde(default)]
    pub location: Option<Span>,
}

impl SyntaxNode {
    pub fn new(tag: impl Into<String>, children: Vec<Child>) -> Self {
        Self {
            tag: tag.into(),
            children,
            location: None,
        }
    }

    pub fn with_location(mut self, span: Span) -> Self {
        self.location = Some(span);
        self
    }

    /// Parse a tree from the JSON interchange format.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a tree from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Number of nodes in this subtree.
    pub fn size(&self) -> usize {
        1 + self
            .children
            .iter()
            .filter_map(Child::as_node)
            .map(SyntaxNode::size)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_keeps_atoms() {
        let json = r#"{
            "type": "lvasgn",
            "children": ["x", {"type": "int", "children": [1],
                               "location": {"start_byte": 4, "end_byte": 5, "start_line": 1}}],
            "location": {"start_byte": 0, "end_byte": 5, "start_line": 1, "end_line": 1}
        }"#;
        let node = SyntaxNode::from_json(json).unwrap();

        assert_eq!(node.tag, "lvasgn");
        assert_eq!(node.children[0], Child::Atom(Atom::Text("x".to_string())));
        let value = node.children[1].as_node().unwrap();
        assert_eq!(value.children[0], Child::Atom(Atom::Int(1)));
        assert_eq!(value.location.unwrap().start_byte, 4);
        assert_eq!(node.size(), 2);
    }

    #[test]
    fn test_null_child_is_nil_atom() {
        let node = SyntaxNode::from_json(r#"{"type": "send", "children": [null, "puts"]}"#).unwrap();
        assert_eq!(node.children[0], Child::Atom(Atom::Nil));
        assert!(node.location.is_none());
    }

    #[test]
    fn test_span_from_source_counts_lines() {
        let source = "a = 1\nb = 2\n";
        let span = Span::from_source(source, 6, 11);
        assert_eq!(span.start_line, 2);
        assert_eq!(span.end_line, 2);
        assert_eq!(span.len(), 5);
        assert_eq!(span.to_string(), "2:6..11");
    }
}
