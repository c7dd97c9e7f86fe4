//! Node behaviors and how a child's behavior is chosen.
//!
//! Every covered node has exactly one [`NodeKind`]. A kind is the product of
//! one propagation direction, a completion rule, an execution rule and zero
//! or more declared trackers. Kinds are picked from the child's grammar
//! shape, but the parent always gets the last word (see [`classify`]).

use std::fmt;

use crate::syntax::Shape;

use super::BuildError;

/// Named tracker slots a node kind may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerName {
    /// Counts program entries; owned by the synthetic root.
    Root,
    /// Hit after the node's value was produced.
    Completion,
    /// Hit when the tracked branch of an `if` is taken.
    Branch,
    /// Hit when the right operand of `&&`/`||` is evaluated.
    RightOperand,
    /// Hit when a `when` matcher accepts the case subject.
    Matched,
    /// Hit when a `when` matcher rejects the case subject.
    Missed,
    /// Hit when a rescue handler body is entered.
    HandlerEntry,
    /// Hit when a method body is entered.
    Call,
    /// Hit when a block body is entered.
    BodyEntry,
    /// Hit when an optional parameter falls back to its default.
    Default,
    /// Hit once the receiver of a destructuring setter is evaluated.
    Entry,
    /// Hit after the current value of a compound assignment was read.
    Reader,
    /// Hit when `||=` / `&&=` takes the assigning branch.
    LongBranch,
}

impl TrackerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerName::Root => "root",
            TrackerName::Completion => "completion",
            TrackerName::Branch => "branch",
            TrackerName::RightOperand => "right_operand",
            TrackerName::Matched => "matched",
            TrackerName::Missed => "missed",
            TrackerName::HandlerEntry => "handler_entry",
            TrackerName::Call => "call",
            TrackerName::BodyEntry => "body_entry",
            TrackerName::Default => "default",
            TrackerName::Entry => "entry",
            TrackerName::Reader => "reader",
            TrackerName::LongBranch => "long_branch",
        }
    }

    /// Placeholder name used in rewrite templates, e.g. `completion_tracker`.
    pub fn placeholder(&self) -> String {
        format!("{}_tracker", self.as_str())
    }
}

impl fmt::Display for TrackerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction in which counts flow between siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Entry comes from the previous sibling's completion.
    Forward,
    /// Completion comes from the next sibling's entry (destructuring targets).
    Alternate,
}

/// How a node's clean-completion count is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Last child's completion, or the node's entry when childless.
    Chain,
    /// Read straight from one of the node's trackers.
    Tracker(TrackerName),
    /// The node always transfers control away.
    Never,
    /// Next sibling's entry, or the parent's completion for the last target.
    Alternate,
    /// Computed by a control-structure specialization.
    Specialized,
}

/// How a node's own (direct) execution count is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    OnEntry,
    AfterChildren,
    OnCompletion,
    Specialized,
}

/// Wraps the node so a hit is recorded only once its value was produced.
/// The trailing self-assignment keeps Ruby quiet about a value in void context.
pub(crate) const CHECK_COMPLETION: &str =
    "(%{local}=(%{node});%{completion_tracker};%{local}=%{local})";

const ROOT_CHILD: &str = "%{root_tracker};%{node}";
const BRANCH: &str = "(%{branch_tracker};%{node})";
const RIGHT_OPERAND: &str = "(%{right_operand_tracker};%{node})";
const WHEN_MATCHER: &str = "->(%{local}){(%{node})===%{local} ? (%{matched_tracker};true) : (%{missed_tracker};false)}";
const WHEN_MATCHER_NO_SUBJECT: &str =
    "((%{node}) ? (%{matched_tracker};true) : (%{missed_tracker};false))";
const WHEN_SPLAT: &str = "->(%{local}){[%{node}].any?{|e| e===%{local}} ? (%{matched_tracker};true) : (%{missed_tracker};false)}";
const WHEN_SPLAT_NO_SUBJECT: &str =
    "([%{node}].any? ? (%{matched_tracker};true) : (%{missed_tracker};false))";
const HANDLER_BODY: &str = "(%{handler_entry_tracker};%{node})";
/// An empty handler is anchored right after the exception list, so it needs
/// its own statement separator.
const EMPTY_HANDLER_BODY: &str = ";(%{handler_entry_tracker};%{node})";
const METHOD_BODY: &str = ";%{call_tracker};%{node}";
const BLOCK_BODY: &str = ";%{body_entry_tracker};%{node}";
const DEFAULT_VALUE: &str = "(%{default_tracker};%{node})";
const SETTER_RECEIVER: &str = "(%{node}).tap{%{entry_tracker}}";
const READER: &str = "(%{reader_tracker};%{node})";
const LONG_BRANCH: &str = "(%{long_branch_tracker};%{node})";

/// Behavior of a covered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Synthetic wrapper around the whole program.
    Root,
    /// Synthetic stand-in for an absent body.
    EmptyBody,
    Literal,
    /// Constant used as a class or module name; never wrapped.
    Name,
    Const,
    /// `begin` without keywords: statement sequences and parentheses.
    Grouping,
    Kwbegin,
    Container,
    Call,
    /// The call a block is attached to.
    BlockCall,
    Block,
    ShortCircuit,
    Return,
    If,
    Case,
    When,
    /// Synthetic wrapper around one `when` matcher. It owns the match
    /// trackers so the matcher itself keeps its own behavior.
    WhenCondition,
    /// Same as [`NodeKind::WhenCondition`] for a splatted matcher list.
    WhenSplatCondition,
    Rescue,
    Resbody,
    Def,
    Parameters,
    Parameter,
    OptionalParameter,
    ClassDef,
    VariableAssignment,
    ConstantAssignment,
    Masgn,
    MasgnLeftSide,
    MasgnSplat,
    MasgnSetter,
    MasgnVariableAssignment,
    OpAsgn,
    BooleanAssignment,
    VariableOperatorAssign,
    SendOperatorAssign,
}

impl NodeKind {
    /// Default behavior for a shape when the parent expresses no preference.
    pub fn default_for(shape: Shape) -> NodeKind {
        match shape {
            Shape::Int
            | Shape::Float
            | Shape::Str
            | Shape::Sym
            | Shape::Nil
            | Shape::True
            | Shape::False
            | Shape::SelfRef
            | Shape::Lvar
            | Shape::Ivar
            | Shape::Gvar
            | Shape::Cvar
            | Shape::Cbase => NodeKind::Literal,
            Shape::Const => NodeKind::Const,
            Shape::Array
            | Shape::Hash
            | Shape::Pair
            | Shape::Dstr
            | Shape::Irange
            | Shape::Erange
            | Shape::Splat => NodeKind::Container,
            Shape::Begin => NodeKind::Grouping,
            Shape::Kwbegin => NodeKind::Kwbegin,
            Shape::Send | Shape::Yield | Shape::Super | Shape::Zsuper => NodeKind::Call,
            Shape::Block => NodeKind::Block,
            Shape::And | Shape::Or => NodeKind::ShortCircuit,
            Shape::Return => NodeKind::Return,
            Shape::If => NodeKind::If,
            Shape::Case => NodeKind::Case,
            Shape::When => NodeKind::When,
            Shape::Rescue => NodeKind::Rescue,
            Shape::Resbody => NodeKind::Resbody,
            Shape::Def => NodeKind::Def,
            Shape::Args => NodeKind::Parameters,
            Shape::Arg | Shape::Restarg | Shape::Kwarg | Shape::Blockarg => NodeKind::Parameter,
            Shape::Optarg | Shape::Kwoptarg => NodeKind::OptionalParameter,
            Shape::Class | Shape::Module => NodeKind::ClassDef,
            Shape::Lvasgn | Shape::Ivasgn | Shape::Gvasgn | Shape::Cvasgn => {
                NodeKind::VariableAssignment
            }
            Shape::Casgn => NodeKind::ConstantAssignment,
            Shape::Masgn => NodeKind::Masgn,
            Shape::Mlhs => NodeKind::MasgnLeftSide,
            Shape::OpAsgn => NodeKind::OpAsgn,
            Shape::OrAsgn | Shape::AndAsgn => NodeKind::BooleanAssignment,
        }
    }

    pub fn trackers(&self) -> &'static [TrackerName] {
        match self {
            NodeKind::Root => &[TrackerName::Root],
            NodeKind::Const | NodeKind::Call | NodeKind::Masgn => &[TrackerName::Completion],
            NodeKind::Block => &[TrackerName::Completion, TrackerName::BodyEntry],
            NodeKind::ShortCircuit => &[TrackerName::RightOperand],
            NodeKind::If => &[TrackerName::Branch],
            NodeKind::WhenCondition | NodeKind::WhenSplatCondition => {
                &[TrackerName::Matched, TrackerName::Missed]
            }
            NodeKind::Resbody => &[TrackerName::HandlerEntry],
            NodeKind::Def => &[TrackerName::Call],
            NodeKind::OptionalParameter => &[TrackerName::Default],
            NodeKind::MasgnSetter => &[TrackerName::Entry],
            NodeKind::OpAsgn => &[TrackerName::Completion, TrackerName::Reader],
            NodeKind::BooleanAssignment => &[TrackerName::Completion, TrackerName::LongBranch],
            _ => &[],
        }
    }

    pub fn tracker_index(&self, name: TrackerName) -> Option<usize> {
        self.trackers().iter().position(|&t| t == name)
    }

    pub fn propagation(&self) -> Propagation {
        match self {
            NodeKind::MasgnLeftSide
            | NodeKind::MasgnSplat
            | NodeKind::MasgnSetter
            | NodeKind::MasgnVariableAssignment => Propagation::Alternate,
            _ => Propagation::Forward,
        }
    }

    pub fn completion(&self) -> Completion {
        match self {
            NodeKind::Const
            | NodeKind::Call
            | NodeKind::Block
            | NodeKind::Masgn
            | NodeKind::OpAsgn
            | NodeKind::BooleanAssignment => Completion::Tracker(TrackerName::Completion),
            NodeKind::Return => Completion::Never,
            NodeKind::MasgnLeftSide
            | NodeKind::MasgnSplat
            | NodeKind::MasgnSetter
            | NodeKind::MasgnVariableAssignment => Completion::Alternate,
            NodeKind::BlockCall
            | NodeKind::ShortCircuit
            | NodeKind::If
            | NodeKind::Case
            | NodeKind::When
            | NodeKind::WhenCondition
            | NodeKind::WhenSplatCondition
            | NodeKind::Rescue
            | NodeKind::Resbody
            | NodeKind::Def
            | NodeKind::Parameter
            | NodeKind::OptionalParameter => Completion::Specialized,
            _ => Completion::Chain,
        }
    }

    pub fn execution(&self) -> Execution {
        match self {
            NodeKind::Root
            | NodeKind::EmptyBody
            | NodeKind::Literal
            | NodeKind::Name
            | NodeKind::Grouping
            | NodeKind::Kwbegin
            | NodeKind::ClassDef
            | NodeKind::Def
            | NodeKind::Parameters
            | NodeKind::Parameter
            | NodeKind::OptionalParameter
            | NodeKind::VariableOperatorAssign => Execution::OnEntry,
            NodeKind::Const
            | NodeKind::Container
            | NodeKind::Call
            | NodeKind::BlockCall
            | NodeKind::Return
            | NodeKind::SendOperatorAssign
            | NodeKind::VariableAssignment
            | NodeKind::ConstantAssignment => Execution::AfterChildren,
            NodeKind::Block
            | NodeKind::OpAsgn
            | NodeKind::BooleanAssignment
            | NodeKind::WhenCondition
            | NodeKind::WhenSplatCondition
            | NodeKind::MasgnSplat
            | NodeKind::MasgnSetter
            | NodeKind::MasgnVariableAssignment
            | NodeKind::MasgnLeftSide => Execution::OnCompletion,
            NodeKind::ShortCircuit
            | NodeKind::If
            | NodeKind::Case
            | NodeKind::When
            | NodeKind::Rescue
            | NodeKind::Resbody
            | NodeKind::Masgn => Execution::Specialized,
        }
    }

    /// Purely syntactic nodes never count as executed or unexecuted.
    pub fn is_executable(&self) -> bool {
        !matches!(
            self,
            NodeKind::Root
                | NodeKind::EmptyBody
                | NodeKind::Grouping
                | NodeKind::Parameters
                | NodeKind::Parameter
                | NodeKind::OptionalParameter
                | NodeKind::MasgnLeftSide
                | NodeKind::WhenCondition
                | NodeKind::WhenSplatCondition
        )
    }

    pub fn is_matcher(&self) -> bool {
        matches!(self, NodeKind::WhenCondition | NodeKind::WhenSplatCondition)
    }

    /// Template replacing the node's own span, if any.
    ///
    /// `has_subject` only matters for `when` matchers: it tells whether the
    /// enclosing `case` dispatches on a value.
    pub fn own_template(&self, has_subject: bool) -> Option<&'static str> {
        match self {
            NodeKind::Const
            | NodeKind::Call
            | NodeKind::Block
            | NodeKind::Masgn
            | NodeKind::OpAsgn
            | NodeKind::BooleanAssignment => Some(CHECK_COMPLETION),
            NodeKind::WhenCondition if has_subject => Some(WHEN_MATCHER),
            NodeKind::WhenCondition => Some(WHEN_MATCHER_NO_SUBJECT),
            NodeKind::WhenSplatCondition if has_subject => Some(WHEN_SPLAT),
            NodeKind::WhenSplatCondition => Some(WHEN_SPLAT_NO_SUBJECT),
            _ => None,
        }
    }

    /// Template this node imposes on its child at `index`, using this node's trackers.
    ///
    /// `tracked_branch` is the `if` branch index carrying the branch tracker.
    /// `empty` tells whether the child is a synthetic empty body.
    pub fn child_template(
        &self,
        index: usize,
        child_count: usize,
        tracked_branch: Option<usize>,
        empty: bool,
    ) -> Option<&'static str> {
        let last = child_count.checked_sub(1)?;
        match self {
            NodeKind::Root if index == 0 => Some(ROOT_CHILD),
            NodeKind::If if tracked_branch == Some(index) => Some(BRANCH),
            NodeKind::ShortCircuit if index == 1 => Some(RIGHT_OPERAND),
            NodeKind::Resbody if index == 2 && empty => Some(EMPTY_HANDLER_BODY),
            NodeKind::Resbody if index == 2 => Some(HANDLER_BODY),
            NodeKind::Def if index == 2 => Some(METHOD_BODY),
            NodeKind::Block if index == 2 => Some(BLOCK_BODY),
            NodeKind::OptionalParameter if index == 1 => Some(DEFAULT_VALUE),
            NodeKind::MasgnSetter if index == 0 => Some(SETTER_RECEIVER),
            NodeKind::OpAsgn if index == last => Some(READER),
            NodeKind::BooleanAssignment if index == last => Some(LONG_BRANCH),
            _ => None,
        }
    }

    /// Whether an absent (`nil`) child at `index` stands for an empty body.
    pub fn can_be_empty(&self, index: usize, child_count: usize) -> bool {
        let last = child_count.saturating_sub(1);
        match self {
            NodeKind::Root => index == 0,
            NodeKind::If => index == 1 || index == 2,
            NodeKind::Case | NodeKind::When => index == last && index > 0,
            NodeKind::Rescue => index == 0 || index == last,
            NodeKind::Resbody | NodeKind::Def | NodeKind::Block => index == 2,
            NodeKind::ClassDef => index == last,
            _ => false,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Pick the behavior of a child node.
///
/// The parent is consulted first; the child shape's default only applies
/// when the parent has no opinion. Some parents accept a closed set of
/// child shapes and reject anything else.
pub fn classify(
    parent: NodeKind,
    parent_shape: Option<Shape>,
    index: usize,
    child_count: usize,
    shape: Shape,
) -> Result<NodeKind, BuildError> {
    let last = child_count.saturating_sub(1);
    let unexpected = || BuildError::UnexpectedChild {
        parent: parent_shape.map_or("root", |s| s.tag()).to_string(),
        index,
        shape: shape.tag().to_string(),
    };

    let kind = match parent {
        NodeKind::Case if index > 0 && index < last => match shape {
            Shape::When => NodeKind::When,
            _ => return Err(unexpected()),
        },
        // The builder wraps the matcher; the matcher keeps its own default.
        NodeKind::When if index < last => match shape {
            Shape::Splat => NodeKind::WhenSplatCondition,
            _ => NodeKind::WhenCondition,
        },
        NodeKind::Rescue if index > 0 && index < last => match shape {
            Shape::Resbody => NodeKind::Resbody,
            _ => return Err(unexpected()),
        },
        NodeKind::Block if index == 0 => match shape {
            Shape::Send | Shape::Super | Shape::Zsuper | Shape::Yield => NodeKind::BlockCall,
            _ => return Err(unexpected()),
        },
        NodeKind::ClassDef if index == 0 => match shape {
            Shape::Const => NodeKind::Name,
            _ => return Err(unexpected()),
        },
        NodeKind::Masgn if index == 0 => match shape {
            Shape::Mlhs => NodeKind::MasgnLeftSide,
            _ => return Err(unexpected()),
        },
        NodeKind::MasgnLeftSide => match shape {
            Shape::Splat => NodeKind::MasgnSplat,
            Shape::Mlhs => NodeKind::MasgnLeftSide,
            _ => destructuring_target(shape).ok_or_else(unexpected)?,
        },
        NodeKind::MasgnSplat => destructuring_target(shape).ok_or_else(unexpected)?,
        NodeKind::OpAsgn | NodeKind::BooleanAssignment if index == 0 => match shape {
            s if s.is_variable_assignment() => NodeKind::VariableOperatorAssign,
            Shape::Send => NodeKind::SendOperatorAssign,
            Shape::Casgn => NodeKind::ConstantAssignment,
            _ => return Err(unexpected()),
        },
        _ => NodeKind::default_for(shape),
    };
    Ok(kind)
}

fn destructuring_target(shape: Shape) -> Option<NodeKind> {
    match shape {
        s if s.is_variable_assignment() => Some(NodeKind::MasgnVariableAssignment),
        Shape::Casgn => Some(NodeKind::MasgnVariableAssignment),
        Shape::Send => Some(NodeKind::MasgnSetter),
        _ => None,
    }
}
