//! Covered node trees.
//!
//! A [`CoverTree`] wraps one parsed [`SyntaxNode`] tree. Nodes live in an
//! arena and are addressed by [`NodeId`]; each node records its parent and
//! its index among the parent's children, and sibling lookups are computed
//! over the parent's child list. The tree is built in one top-down pass
//! that also numbers nodes and reserves tracker slots, and is never
//! mutated afterwards.
//!
//! ```text
//! SyntaxNode ──build──▶ CoverTree ──rewrite──▶ instrumented source
//!                           │
//!                           └──flow(&hits)──▶ FlowView (runs / full_runs / interrupts)
//! ```

mod assignment;
mod branch;
mod error;
mod exception;
mod flow;
pub mod kind;
mod rewrite;
mod template;

use std::fmt;
use std::ops::Range;

use tracing::debug;

use crate::syntax::{Atom, Child, Shape, Span, SyntaxNode};
use crate::tracker::{HitSource, TrackerAllocator};

pub use error::{BuildError, FlowError, RewriteError, TemplateError};
pub use flow::{FlowCounts, FlowView};
pub use kind::{Completion, Execution, NodeKind, Propagation, TrackerName};
pub use rewrite::{RewritePlan, Rewriter, DEFAULT_LOCAL_PREFIX};
pub use template::{Bindings, Template};

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A child slot of a covered node.
#[derive(Debug, Clone, PartialEq)]
pub enum CoveredChild {
    Node(NodeId),
    Atom(Atom),
}

impl CoveredChild {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            CoveredChild::Node(id) => Some(*id),
            CoveredChild::Atom(_) => None,
        }
    }
}

/// Where text for a node without a span is spliced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// At this byte offset.
    At(usize),
    /// Right after the first `{` or `do` at or after this offset.
    AfterBlockOpener(usize),
    /// Right after the method name of the `def` starting at this offset.
    AfterDefName(usize),
}

/// One node of a cover tree.
#[derive(Debug, Clone)]
pub struct CoveredNode {
    pub kind: NodeKind,
    /// `None` for synthetic nodes.
    pub shape: Option<Shape>,
    pub parent: Option<NodeId>,
    /// Index among the parent's children, atoms included.
    pub index: usize,
    /// Tree-wide sequence number.
    pub nb: usize,
    pub children: Vec<CoveredChild>,
    pub span: Option<Span>,
    pub anchor: Option<Anchor>,
    /// Child index carrying this node's branch tracker (`if` only).
    pub tracked_child: Option<usize>,
    trackers: Range<usize>,
}

impl CoveredNode {
    pub fn tag(&self) -> &'static str {
        match (self.shape, self.kind) {
            (Some(shape), _) => shape.tag(),
            (None, NodeKind::Root) => "root",
            (None, kind) if kind.is_matcher() => "when_matcher",
            (None, _) => "empty_body",
        }
    }

    /// Text of the atom at `index`, e.g. a method or variable name.
    pub fn atom_text(&self, index: usize) -> Option<&str> {
        match self.children.get(index)? {
            CoveredChild::Atom(atom) => atom.as_text(),
            CoveredChild::Node(_) => None,
        }
    }

    pub fn tracker_slots(&self) -> Range<usize> {
        self.trackers.clone()
    }
}

/// A covered tree plus the allocation context its trackers came from.
#[derive(Debug, Clone)]
pub struct CoverTree {
    nodes: Vec<CoveredNode>,
    allocator: TrackerAllocator,
}

impl CoverTree {
    /// Build a tree for a whole program. The program is wrapped in a
    /// synthetic root whose tracker supplies the entry count.
    pub fn build(program: &SyntaxNode, allocator: TrackerAllocator) -> Result<Self, BuildError> {
        let mut builder = Builder {
            nodes: Vec::new(),
            allocator,
        };
        let root = builder.push(NodeKind::Root, None, None, 0, None);
        let shape = resolve_shape(program)?;
        let kind = kind::classify(NodeKind::Root, None, 0, 1, shape)?;
        let program_id = builder.augment(program, kind, shape, Some(root), 0)?;
        builder.nodes[root.0].children = vec![CoveredChild::Node(program_id)];
        Ok(builder.finish())
    }

    /// Build a tree for an empty program.
    pub fn build_empty(allocator: TrackerAllocator) -> Self {
        let mut builder = Builder {
            nodes: Vec::new(),
            allocator,
        };
        let root = builder.push(NodeKind::Root, None, None, 0, None);
        let body = builder.push(
            NodeKind::EmptyBody,
            None,
            Some(root),
            0,
            Some(Anchor::At(0)),
        );
        builder.nodes[root.0].children = vec![CoveredChild::Node(body)];
        builder.finish()
    }

    /// Build a tree for a detached fragment. Its entry count must be
    /// supplied when reading flow counts (see [`FlowView::with_entry_count`]).
    pub fn build_fragment(
        fragment: &SyntaxNode,
        allocator: TrackerAllocator,
    ) -> Result<Self, BuildError> {
        let mut builder = Builder {
            nodes: Vec::new(),
            allocator,
        };
        let shape = resolve_shape(fragment)?;
        builder.augment(fragment, NodeKind::default_for(shape), shape, None, 0)?;
        Ok(builder.finish())
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The program node: the root's only child, or the root of a fragment.
    pub fn program(&self) -> NodeId {
        match self.nodes[0].kind {
            NodeKind::Root => self.child_at(self.root(), 0).unwrap_or(self.root()),
            _ => self.root(),
        }
    }

    pub fn node(&self, id: NodeId) -> &CoveredNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in pre-order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn allocator(&self) -> &TrackerAllocator {
        &self.allocator
    }

    /// Read flow counts against hit counts collected after execution.
    pub fn flow<H: HitSource>(&self, hits: H) -> FlowView<'_, H> {
        FlowView::new(self, hits)
    }

    /// Plan the source rewrite for this tree.
    pub fn rewriter(&self) -> Rewriter<'_> {
        Rewriter::new(self)
    }

    /// Node children (atoms skipped), in source order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .filter_map(CoveredChild::as_node)
    }

    /// The node at child slot `index`, if that slot holds a node.
    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.nodes[id.0].children.get(index)?.as_node()
    }

    /// Follow child indices from the program node.
    pub fn at(&self, path: &[usize]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.program(), |id, &index| self.child_at(id, index))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        let parent = &self.nodes[node.parent?.0];
        parent.children[node.index + 1..]
            .iter()
            .find_map(CoveredChild::as_node)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        let parent = &self.nodes[node.parent?.0];
        parent.children[..node.index]
            .iter()
            .rev()
            .find_map(CoveredChild::as_node)
    }

    /// Node children in the order control reaches them.
    pub fn flow_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self.children(id).collect();
        if self.nodes[id.0].kind == NodeKind::Masgn {
            // The value is evaluated before any target is assigned.
            children.reverse();
        }
        children
    }

    pub fn previous_in_flow(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let order = self.flow_children(parent);
        let pos = order.iter().position(|&c| c == id)?;
        pos.checked_sub(1).map(|p| order[p])
    }

    pub fn next_in_flow(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let order = self.flow_children(parent);
        let pos = order.iter().position(|&c| c == id)?;
        order.get(pos + 1).copied()
    }

    pub fn last_in_flow(&self, id: NodeId) -> Option<NodeId> {
        self.flow_children(id).last().copied()
    }

    /// Slot reserved for `name` on node `id`.
    pub fn tracker_slot(&self, id: NodeId, name: TrackerName) -> Option<usize> {
        let node = &self.nodes[id.0];
        node.kind
            .tracker_index(name)
            .map(|offset| node.trackers.start + offset)
    }

    /// Byte ranges of the node's span not covered by any child span.
    pub fn proper_range(&self, id: NodeId) -> Vec<Range<usize>> {
        let node = &self.nodes[id.0];
        let Some(span) = node.span else {
            return Vec::new();
        };
        let mut child_spans: Vec<Span> = self
            .children(id)
            .filter_map(|c| self.nodes[c.0].span)
            .collect();
        child_spans.sort_by_key(|s| s.start_byte);

        let mut ranges = Vec::new();
        let mut cursor = span.start_byte;
        for child in child_spans {
            if child.start_byte > cursor {
                ranges.push(cursor..child.start_byte.min(span.end_byte));
            }
            cursor = cursor.max(child.end_byte);
        }
        if cursor < span.end_byte {
            ranges.push(cursor..span.end_byte);
        }
        ranges
    }

    /// Whether the `case` enclosing a `when` matcher dispatches on a value.
    pub(crate) fn case_has_subject(&self, matcher: NodeId) -> bool {
        self.parent(matcher)
            .and_then(|when| self.parent(when))
            .map_or(false, |case| self.child_at(case, 0).is_some())
    }
}

struct Builder {
    nodes: Vec<CoveredNode>,
    allocator: TrackerAllocator,
}

impl Builder {
    fn push(
        &mut self,
        kind: NodeKind,
        shape: Option<Shape>,
        parent: Option<NodeId>,
        index: usize,
        anchor: Option<Anchor>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let nb = self.allocator.create_node_nb();
        let trackers = self.allocator.allocate(kind.trackers().len());
        self.nodes.push(CoveredNode {
            kind,
            shape,
            parent,
            index,
            nb,
            children: Vec::new(),
            span: None,
            anchor,
            tracked_child: None,
            trackers,
        });
        id
    }

    fn augment(
        &mut self,
        syntax: &SyntaxNode,
        kind: NodeKind,
        shape: Shape,
        parent: Option<NodeId>,
        index: usize,
    ) -> Result<NodeId, BuildError> {
        let count = syntax.children.len();
        let arity = shape.arity();
        if !arity.accepts(count) {
            return Err(BuildError::Arity {
                shape: shape.tag().to_string(),
                expected: arity.to_string(),
                found: count,
            });
        }
        validate_templates(kind, count)?;

        let id = self.push(kind, Some(shape), parent, index, None);
        self.nodes[id.0].span = syntax.location;

        let mut children = Vec::with_capacity(count);
        for (i, child) in syntax.children.iter().enumerate() {
            let covered = match child {
                Child::Node(node) => {
                    let child_shape = resolve_shape(node)?;
                    let child_kind = kind::classify(kind, Some(shape), i, count, child_shape)?;
                    let child = if child_kind.is_matcher() {
                        self.wrap_matcher(node, child_kind, child_shape, id, i)?
                    } else {
                        self.augment(node, child_kind, child_shape, Some(id), i)?
                    };
                    CoveredChild::Node(child)
                }
                Child::Atom(Atom::Nil) if kind.can_be_empty(i, count) => {
                    let anchor = empty_anchor(kind, syntax, i);
                    CoveredChild::Node(self.push(NodeKind::EmptyBody, None, Some(id), i, anchor))
                }
                Child::Atom(atom) => CoveredChild::Atom(atom.clone()),
            };
            children.push(covered);
        }

        if kind == NodeKind::If {
            let is_empty = |c: &CoveredChild| {
                c.as_node()
                    .map_or(true, |n| self.nodes[n.0].kind == NodeKind::EmptyBody)
            };
            self.nodes[id.0].tracked_child = [1, 2]
                .into_iter()
                .find(|&i| children.get(i).map_or(false, |c| !is_empty(c)));
        }
        self.nodes[id.0].children = children;
        Ok(id)
    }

    /// Put a synthetic matcher node between a `when` and one of its tests.
    /// The wrapper shares the test's span and the test keeps its default kind.
    fn wrap_matcher(
        &mut self,
        syntax: &SyntaxNode,
        kind: NodeKind,
        shape: Shape,
        parent: NodeId,
        index: usize,
    ) -> Result<NodeId, BuildError> {
        validate_templates(kind, 1)?;
        let id = self.push(kind, None, Some(parent), index, None);
        self.nodes[id.0].span = syntax.location;
        let matcher = self.augment(syntax, NodeKind::default_for(shape), shape, Some(id), 0)?;
        self.nodes[id.0].children = vec![CoveredChild::Node(matcher)];
        Ok(id)
    }

    fn finish(self) -> CoverTree {
        debug!(
            nodes = self.nodes.len(),
            trackers = self.allocator.slot_count(),
            file = self.allocator.file_index(),
            "built cover tree"
        );
        CoverTree {
            nodes: self.nodes,
            allocator: self.allocator,
        }
    }
}

fn resolve_shape(node: &SyntaxNode) -> Result<Shape, BuildError> {
    Shape::from_tag(&node.tag).ok_or_else(|| BuildError::UnknownShape {
        tag: node.tag.clone(),
    })
}

/// Reject templates naming trackers the owning kind never declared.
fn validate_templates(kind: NodeKind, child_count: usize) -> Result<(), BuildError> {
    for has_subject in [true, false] {
        if let Some(source) = kind.own_template(has_subject) {
            Template::parse(source, kind.trackers())?;
        }
    }
    for index in 0..child_count {
        for tracked in [Some(index), None] {
            for empty in [false, true] {
                if let Some(source) = kind.child_template(index, child_count, tracked, empty) {
                    Template::parse(source, kind.trackers())?;
                }
            }
        }
    }
    Ok(())
}

/// Where an empty body at child `index` of `parent` would sit in the source.
fn empty_anchor(kind: NodeKind, parent: &SyntaxNode, index: usize) -> Option<Anchor> {
    let located = |i: usize| parent.children.get(i)?.as_node()?.location;
    let preceding = (0..index).rev().find_map(located);

    match kind {
        NodeKind::Block => match located(1) {
            Some(args) => Some(Anchor::At(args.end_byte)),
            None => located(0).map(|call| Anchor::AfterBlockOpener(call.end_byte)),
        },
        NodeKind::Def => match located(1) {
            Some(args) => Some(Anchor::At(args.end_byte)),
            None => parent.location.map(|def| Anchor::AfterDefName(def.start_byte)),
        },
        NodeKind::Resbody => match preceding {
            Some(span) => Some(Anchor::At(span.end_byte)),
            None => parent
                .location
                .map(|span| Anchor::At(span.start_byte + "rescue".len())),
        },
        _ => match preceding {
            Some(span) => Some(Anchor::At(span.end_byte)),
            None => parent.location.map(|span| Anchor::At(span.start_byte)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_sexp;

    fn tree(sexp: &str) -> CoverTree {
        CoverTree::build(&parse_sexp(sexp).unwrap(), TrackerAllocator::new(0)).unwrap()
    }

    #[test]
    fn test_build_numbers_nodes_in_preorder() {
        let t = tree("(begin (lvasgn :x (int 1)) (send nil :puts (lvar :x)))");
        let nbs: Vec<usize> = t.ids().map(|id| t.node(id).nb).collect();
        assert_eq!(nbs, (0..t.len()).collect::<Vec<_>>());
        assert_eq!(t.node(t.root()).kind, NodeKind::Root);
        assert_eq!(t.node(t.program()).kind, NodeKind::Grouping);
        assert_eq!(t.len(), 6);
    }

    #[test]
    fn test_trackers_are_contiguous_per_node() {
        let t = tree("(op_asgn (lvasgn :x) :+ (send nil :y))");
        let op = t.program();
        let completion = t.tracker_slot(op, TrackerName::Completion).unwrap();
        let reader = t.tracker_slot(op, TrackerName::Reader).unwrap();
        assert_eq!(reader, completion + 1);
        assert_eq!(t.tracker_slot(op, TrackerName::Matched), None);
        // root + op_asgn (2) + send (1)
        assert_eq!(t.allocator().slot_count(), 4);
    }

    #[test]
    fn test_sibling_lookup_skips_atoms() {
        let t = tree("(send (lvar :a) :foo (int 1) (int 2))");
        let receiver = t.at(&[0]).unwrap();
        let first = t.at(&[2]).unwrap();
        let second = t.at(&[3]).unwrap();
        assert_eq!(t.next_sibling(receiver), Some(first));
        assert_eq!(t.previous_sibling(first), Some(receiver));
        assert_eq!(t.next_sibling(second), None);
        assert_eq!(t.at(&[1]), None);
    }

    #[test]
    fn test_masgn_flows_value_first() {
        let t = tree("(masgn (mlhs (lvasgn :a) (lvasgn :b)) (array (int 1) (int 2)))");
        let masgn = t.program();
        let left = t.at(&[0]).unwrap();
        let value = t.at(&[1]).unwrap();
        assert_eq!(t.flow_children(masgn), vec![value, left]);
        assert_eq!(t.previous_in_flow(left), Some(value));
        assert_eq!(t.last_in_flow(masgn), Some(left));
        assert_eq!(t.node(left).kind, NodeKind::MasgnLeftSide);
    }

    #[test]
    fn test_absent_bodies_become_empty_bodies() {
        let t = tree("(if (lvar :c) nil (int 1))");
        let then = t.at(&[1]).unwrap();
        assert_eq!(t.node(then).kind, NodeKind::EmptyBody);
        assert_eq!(t.node(then).tag(), "empty_body");
        assert_eq!(t.node(t.program()).tracked_child, Some(2));
    }

    #[test]
    fn test_when_matchers_are_wrapped() {
        let t = tree("(case (lvar :x) (when (and (lvar :a) (send nil :b)) (int 1)) nil)");
        let wrapper = t.at(&[1, 0]).unwrap();
        let matcher = t.at(&[1, 0, 0]).unwrap();
        assert_eq!(t.node(wrapper).kind, NodeKind::WhenCondition);
        assert_eq!(t.node(wrapper).tag(), "when_matcher");
        assert!(!t.node(wrapper).kind.is_executable());
        assert_eq!(t.node(matcher).kind, NodeKind::ShortCircuit);
        assert_eq!(t.children(wrapper).collect::<Vec<_>>(), vec![matcher]);
        assert!(t.tracker_slot(wrapper, TrackerName::Matched).is_some());
        assert!(t.tracker_slot(matcher, TrackerName::RightOperand).is_some());
        assert!(t.case_has_subject(wrapper));
    }

    #[test]
    fn test_unknown_shape_is_fatal() {
        let err = CoverTree::build(
            &parse_sexp("(while (true) (int 1))").unwrap(),
            TrackerAllocator::new(0),
        )
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownShape {
                tag: "while".to_string()
            }
        );
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        let err = CoverTree::build(&parse_sexp("(if (true))").unwrap(), TrackerAllocator::new(0))
            .unwrap_err();
        assert!(matches!(err, BuildError::Arity { found: 1, .. }));
    }

    #[test]
    fn test_proper_range_excludes_children() {
        let source = "foo(1, 22)";
        let arg1 = SyntaxNode::new("int", vec![Child::Atom(Atom::Int(1))])
            .with_location(Span::from_source(source, 4, 5));
        let arg2 = SyntaxNode::new("int", vec![Child::Atom(Atom::Int(22))])
            .with_location(Span::from_source(source, 7, 9));
        let send = SyntaxNode::new(
            "send",
            vec![
                Child::Atom(Atom::Nil),
                Child::Atom(Atom::Text("foo".to_string())),
                Child::Node(arg1),
                Child::Node(arg2),
            ],
        )
        .with_location(Span::from_source(source, 0, 10));
        let t = CoverTree::build(&send, TrackerAllocator::new(0)).unwrap();

        assert_eq!(t.proper_range(t.program()), vec![0..4, 5..7, 9..10]);
        assert_eq!(t.proper_range(t.at(&[2]).unwrap()), vec![4..5]);
        assert!(t.proper_range(t.root()).is_empty());
    }

    #[test]
    fn test_empty_program() {
        let t = CoverTree::build_empty(TrackerAllocator::new(0));
        assert_eq!(t.node(t.program()).kind, NodeKind::EmptyBody);
        assert_eq!(t.node(t.program()).anchor, Some(Anchor::At(0)));
    }
}
