//! The closed set of grammar shapes this crate knows how to cover.

use std::fmt;

use phf::phf_map;

/// A grammar shape, resolved from the parser's node tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    // Literals and reads
    Int,
    Float,
    Str,
    Sym,
    Nil,
    True,
    False,
    SelfRef,
    Lvar,
    Ivar,
    Gvar,
    Cvar,
    Const,
    Cbase,
    // Containers
    Array,
    Hash,
    Pair,
    Dstr,
    Irange,
    Erange,
    Splat,
    Begin,
    Kwbegin,
    // Calls
    Send,
    Yield,
    Super,
    Zsuper,
    Block,
    // Control flow
    And,
    Or,
    Return,
    If,
    Case,
    When,
    Rescue,
    Resbody,
    // Definitions
    Def,
    Args,
    Arg,
    Optarg,
    Restarg,
    Kwarg,
    Kwoptarg,
    Blockarg,
    Class,
    Module,
    // Assignments
    Lvasgn,
    Ivasgn,
    Gvasgn,
    Cvasgn,
    Casgn,
    Masgn,
    Mlhs,
    OpAsgn,
    OrAsgn,
    AndAsgn,
}

static SHAPES: phf::Map<&'static str, Shape> = phf_map! {
    "int" => Shape::Int,
    "float" => Shape::Float,
    "str" => Shape::Str,
    "sym" => Shape::Sym,
    "nil" => Shape::Nil,
    "true" => Shape::True,
    "false" => Shape::False,
    "self" => Shape::SelfRef,
    "lvar" => Shape::Lvar,
    "ivar" => Shape::Ivar,
    "gvar" => Shape::Gvar,
    "cvar" => Shape::Cvar,
    "const" => Shape::Const,
    "cbase" => Shape::Cbase,
    "array" => Shape::Array,
    "hash" => Shape::Hash,
    "pair" => Shape::Pair,
    "dstr" => Shape::Dstr,
    "irange" => Shape::Irange,
    "erange" => Shape::Erange,
    "splat" => Shape::Splat,
    "begin" => Shape::Begin,
    "kwbegin" => Shape::Kwbegin,
    "send" => Shape::Send,
    "yield" => Shape::Yield,
    "super" => Shape::Super,
    "zsuper" => Shape::Zsuper,
    "block" => Shape::Block,
    "and" => Shape::And,
    "or" => Shape::Or,
    "return" => Shape::Return,
    "if" => Shape::If,
    "case" => Shape::Case,
    "when" => Shape::When,
    "rescue" => Shape::Rescue,
    "resbody" => Shape::Resbody,
    "def" => Shape::Def,
    "args" => Shape::Args,
    "arg" => Shape::Arg,
    "optarg" => Shape::Optarg,
    "restarg" => Shape::Restarg,
    "kwarg" => Shape::Kwarg,
    "kwoptarg" => Shape::Kwoptarg,
    "blockarg" => Shape::Blockarg,
    "class" => Shape::Class,
    "module" => Shape::Module,
    "lvasgn" => Shape::Lvasgn,
    "ivasgn" => Shape::Ivasgn,
    "gvasgn" => Shape::Gvasgn,
    "cvasgn" => Shape::Cvasgn,
    "casgn" => Shape::Casgn,
    "masgn" => Shape::Masgn,
    "mlhs" => Shape::Mlhs,
    "op_asgn" => Shape::OpAsgn,
    "or_asgn" => Shape::OrAsgn,
    "and_asgn" => Shape::AndAsgn,
};

/// Allowed number of children (atoms included) for a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    const fn between(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", max),
            Some(max) => write!(f, "{}..={}", self.min, max),
            None => write!(f, "{} or more", self.min),
        }
    }
}

impl Shape {
    /// Resolve a parser tag. Returns `None` for shapes without a coverage strategy.
    pub fn from_tag(tag: &str) -> Option<Self> {
        SHAPES.get(tag).copied()
    }

    /// The parser tag for this shape.
    pub fn tag(&self) -> &'static str {
        match self {
            Shape::Int => "int",
            Shape::Float => "float",
            Shape::Str => "str",
            Shape::Sym => "sym",
            Shape::Nil => "nil",
            Shape::True => "true",
            Shape::False => "false",
            Shape::SelfRef => "self",
            Shape::Lvar => "lvar",
            Shape::Ivar => "ivar",
            Shape::Gvar => "gvar",
            Shape::Cvar => "cvar",
            Shape::Const => "const",
            Shape::Cbase => "cbase",
            Shape::Array => "array",
            Shape::Hash => "hash",
            Shape::Pair => "pair",
            Shape::Dstr => "dstr",
            Shape::Irange => "irange",
            Shape::Erange => "erange",
            Shape::Splat => "splat",
            Shape::Begin => "begin",
            Shape::Kwbegin => "kwbegin",
            Shape::Send => "send",
            Shape::Yield => "yield",
            Shape::Super => "super",
            Shape::Zsuper => "zsuper",
            Shape::Block => "block",
            Shape::And => "and",
            Shape::Or => "or",
            Shape::Return => "return",
            Shape::If => "if",
            Shape::Case => "case",
            Shape::When => "when",
            Shape::Rescue => "rescue",
            Shape::Resbody => "resbody",
            Shape::Def => "def",
            Shape::Args => "args",
            Shape::Arg => "arg",
            Shape::Optarg => "optarg",
            Shape::Restarg => "restarg",
            Shape::Kwarg => "kwarg",
            Shape::Kwoptarg => "kwoptarg",
            Shape::Blockarg => "blockarg",
            Shape::Class => "class",
            Shape::Module => "module",
            Shape::Lvasgn => "lvasgn",
            Shape::Ivasgn => "ivasgn",
            Shape::Gvasgn => "gvasgn",
            Shape::Cvasgn => "cvasgn",
            Shape::Casgn => "casgn",
            Shape::Masgn => "masgn",
            Shape::Mlhs => "mlhs",
            Shape::OpAsgn => "op_asgn",
            Shape::OrAsgn => "or_asgn",
            Shape::AndAsgn => "and_asgn",
        }
    }

    /// Number of children the parser produces for this shape.
    pub fn arity(&self) -> Arity {
        match self {
            Shape::Nil | Shape::True | Shape::False | Shape::SelfRef | Shape::Cbase => {
                Arity::exactly(0)
            }
            Shape::Zsuper => Arity::exactly(0),
            Shape::Int
            | Shape::Float
            | Shape::Str
            | Shape::Sym
            | Shape::Lvar
            | Shape::Ivar
            | Shape::Gvar
            | Shape::Cvar => Arity::exactly(1),
            Shape::Const => Arity::exactly(2),
            Shape::Array | Shape::Hash | Shape::Dstr | Shape::Begin | Shape::Kwbegin => {
                Arity::at_least(0)
            }
            Shape::Yield | Shape::Super | Shape::Args | Shape::Mlhs => Arity::at_least(0),
            Shape::Pair | Shape::Irange | Shape::Erange => Arity::exactly(2),
            Shape::Splat => Arity::between(0, 1),
            Shape::Send => Arity::at_least(2),
            Shape::Block => Arity::exactly(3),
            Shape::And | Shape::Or => Arity::exactly(2),
            Shape::Return => Arity::between(0, 1),
            Shape::If => Arity::exactly(3),
            Shape::Case => Arity::at_least(2),
            Shape::When => Arity::at_least(2),
            Shape::Rescue => Arity::at_least(2),
            Shape::Resbody => Arity::exactly(3),
            Shape::Def => Arity::exactly(3),
            Shape::Arg | Shape::Kwarg | Shape::Blockarg => Arity::exactly(1),
            Shape::Restarg => Arity::between(0, 1),
            Shape::Optarg | Shape::Kwoptarg => Arity::exactly(2),
            Shape::Class => Arity::exactly(3),
            Shape::Module => Arity::exactly(2),
            Shape::Lvasgn | Shape::Ivasgn | Shape::Gvasgn | Shape::Cvasgn => Arity::between(1, 2),
            Shape::Casgn => Arity::between(2, 3),
            Shape::Masgn => Arity::exactly(2),
            Shape::OpAsgn => Arity::exactly(3),
            Shape::OrAsgn | Shape::AndAsgn => Arity::exactly(2),
        }
    }

    /// Variable assignment shapes (`x = …`, `@x = …`, `$x = …`, `@@x = …`).
    pub fn is_variable_assignment(&self) -> bool {
        matches!(
            self,
            Shape::Lvasgn | Shape::Ivasgn | Shape::Gvasgn | Shape::Cvasgn
        )
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup_matches_tag_names() {
        for (tag, shape) in SHAPES.entries() {
            assert_eq!(shape.tag(), *tag);
            assert_eq!(Shape::from_tag(tag), Some(*shape));
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(Shape::from_tag("while"), None);
        assert_eq!(Shape::from_tag("csend"), None);
    }

    #[test]
    fn test_arity() {
        assert!(Shape::If.arity().accepts(3));
        assert!(!Shape::If.arity().accepts(2));
        assert!(Shape::Send.arity().accepts(5));
        assert!(Shape::Lvasgn.arity().accepts(1));
        assert_eq!(Shape::Casgn.arity().to_string(), "2..=3");
        assert_eq!(Shape::Case.arity().to_string(), "2 or more");
    }
}
