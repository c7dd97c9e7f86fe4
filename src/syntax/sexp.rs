//! Reader for the parser's s-expression dump format.
//!
//! ```text
//! (case (int 1)
//!   (when (int 0) (str "a"))
//!   nil)
//! ```
//!
//! Nodes are `(tag child...)`. Bare `nil`, `true`, `false`, numbers,
//! `:symbols` and `"strings"` are atoms. Trees read this way carry no spans.

use std::iter::Peekable;
use std::str::CharIndices;

use super::{Atom, Child, SyntaxNode};

/// Error reading an s-expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SexpError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected `{found}` at byte {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("expected a node tag at byte {offset}")]
    MissingTag { offset: usize },
    #[error("trailing input at byte {offset}")]
    TrailingInput { offset: usize },
    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },
}

/// Parse one s-expression tree.
pub fn parse_sexp(input: &str) -> Result<SyntaxNode, SexpError> {
    let mut reader = Reader {
        chars: input.char_indices().peekable(),
    };
    reader.skip_whitespace();
    let node = reader.node()?;
    reader.skip_whitespace();
    if let Some(&(offset, _)) = reader.chars.peek() {
        return Err(SexpError::TrailingInput { offset });
    }
    Ok(node)
}

struct Reader<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl Reader<'_> {
    fn skip_whitespace(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.chars.next();
        }
    }

    fn node(&mut self) -> Result<SyntaxNode, SexpError> {
        match self.chars.next() {
            Some((_, '(')) => {}
            Some((offset, found)) => return Err(SexpError::Unexpected { found, offset }),
            None => return Err(SexpError::UnexpectedEof),
        }
        let offset = self.chars.peek().map(|&(o, _)| o).unwrap_or(0);
        let tag = self.word();
        if tag.is_empty() {
            return Err(SexpError::MissingTag { offset });
        }

        let mut children = Vec::new();
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                None => return Err(SexpError::UnexpectedEof),
                Some(&(_, ')')) => {
                    self.chars.next();
                    return Ok(SyntaxNode::new(tag, children));
                }
                Some(&(_, '(')) => children.push(Child::Node(self.node()?)),
                Some(&(_, '"')) => children.push(Child::Atom(self.string()?)),
                Some(&(_, ':')) => {
                    self.chars.next();
                    children.push(Child::Atom(Atom::Text(self.word())));
                }
                Some(&(offset, c)) => {
                    let word = self.word();
                    if word.is_empty() {
                        return Err(SexpError::Unexpected { found: c, offset });
                    }
                    children.push(Child::Atom(atom_from_word(&word)));
                }
            }
        }
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        word
    }

    fn string(&mut self) -> Result<Atom, SexpError> {
        let start = match self.chars.next() {
            Some((offset, _)) => offset,
            None => return Err(SexpError::UnexpectedEof),
        };
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(SexpError::UnterminatedString { offset: start }),
                Some((_, '"')) => return Ok(Atom::Text(text)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, c)) => text.push(c),
                    None => return Err(SexpError::UnterminatedString { offset: start }),
                },
                Some((_, c)) => text.push(c),
            }
        }
    }
}

fn atom_from_word(word: &str) -> Atom {
    match word {
        "nil" => Atom::Nil,
        "true" => Atom::Bool(true),
        "false" => Atom::Bool(false),
        _ => {
            if let Ok(i) = word.parse::<i64>() {
                Atom::Int(i)
            } else if let Ok(x) = word.parse::<f64>() {
                Atom::Float(x)
            } else {
                Atom::Text(word.to_string())
            }
        }
    }
}
