//! Flow-count derivation.
//!
//! Counts are never stored on the tree. A [`FlowView`] pairs a built tree
//! with the hit counts read back after execution and derives, for any node,
//! how often control entered it, how often it completed normally and how
//! often it ran its own code. Generic rules live here; the control
//! structures that break the linear sibling chain are in `branch`,
//! `exception` and `assignment`.

use std::cell::RefCell;

use serde::Serialize;

use crate::tracker::HitSource;

use super::{Completion, CoverTree, Execution, FlowError, NodeId, NodeKind, Propagation, TrackerName};

/// Entry, completion and interruption counts of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowCounts {
    pub runs: u64,
    pub full_runs: u64,
    pub interrupts: u64,
}

/// Read-only view of a tree's flow counts under fixed hit counts.
pub struct FlowView<'t, H> {
    pub(super) tree: &'t CoverTree,
    hits: H,
    entry_override: Option<u64>,
    entries: RefCell<Vec<Option<u64>>>,
    completions: RefCell<Vec<Option<u64>>>,
}

impl<'t, H: HitSource> FlowView<'t, H> {
    pub fn new(tree: &'t CoverTree, hits: H) -> Self {
        Self {
            tree,
            hits,
            entry_override: None,
            entries: RefCell::new(vec![None; tree.len()]),
            completions: RefCell::new(vec![None; tree.len()]),
        }
    }

    /// Supply the number of times the tree's root was entered.
    pub fn with_entry_count(mut self, runs: u64) -> Self {
        self.entry_override = Some(runs);
        self.entries.borrow_mut().iter_mut().for_each(|e| *e = None);
        self.completions.borrow_mut().iter_mut().for_each(|c| *c = None);
        self
    }

    pub fn tree(&self) -> &'t CoverTree {
        self.tree
    }

    /// How many times control reached `id` (`runs`).
    pub fn entry_count(&self, id: NodeId) -> Result<u64, FlowError> {
        if let Some(cached) = self.entries.borrow()[id.index()] {
            return Ok(cached);
        }
        let count = self.derive_entry(id)?;
        self.entries.borrow_mut()[id.index()] = Some(count);
        Ok(count)
    }

    /// How many times `id` finished normally (`full_runs`).
    pub fn completion_count(&self, id: NodeId) -> Result<u64, FlowError> {
        if let Some(cached) = self.completions.borrow()[id.index()] {
            return Ok(cached);
        }
        let count = self.derive_completion(id)?;
        self.completions.borrow_mut()[id.index()] = Some(count);
        Ok(count)
    }

    /// How many times `id` was left by a non-local transfer.
    pub fn interrupt_count(&self, id: NodeId) -> Result<u64, FlowError> {
        let entry = self.entry_count(id)?;
        let completion = self.completion_count(id)?;
        entry
            .checked_sub(completion)
            .ok_or(FlowError::CompletionExceedsEntry {
                node: id,
                entry,
                completion,
            })
    }

    /// How many times the node's own code ran, children excluded.
    pub fn execution_count(&self, id: NodeId) -> Result<u64, FlowError> {
        let kind = self.tree.node(id).kind;
        match kind.execution() {
            Execution::OnEntry => self.entry_count(id),
            Execution::OnCompletion => self.completion_count(id),
            Execution::AfterChildren => match self.tree.last_in_flow(id) {
                Some(last) => self.completion_count(last),
                None => self.entry_count(id),
            },
            Execution::Specialized => match kind {
                NodeKind::ShortCircuit => self.short_circuit_execution(id),
                NodeKind::If => self.if_execution(id),
                NodeKind::Case => self.case_execution(id),
                NodeKind::When => self.when_test_completion(id),
                NodeKind::Rescue => self.rescue_execution(id),
                NodeKind::Resbody => self.tracker_hits(id, TrackerName::HandlerEntry),
                NodeKind::Masgn => self.masgn_execution(id),
                _ => self.entry_count(id),
            },
        }
    }

    /// `None` for nodes that are never considered executable.
    pub fn was_executed(&self, id: NodeId) -> Result<Option<bool>, FlowError> {
        if !self.tree.node(id).kind.is_executable() {
            return Ok(None);
        }
        Ok(Some(self.execution_count(id)? > 0))
    }

    pub fn counts(&self, id: NodeId) -> Result<FlowCounts, FlowError> {
        Ok(FlowCounts {
            runs: self.entry_count(id)?,
            full_runs: self.completion_count(id)?,
            interrupts: self.interrupt_count(id)?,
        })
    }

    fn derive_entry(&self, id: NodeId) -> Result<u64, FlowError> {
        let node = self.tree.node(id);
        let Some(parent) = node.parent else {
            return match (self.entry_override, node.kind) {
                (Some(runs), _) => Ok(runs),
                (None, NodeKind::Root) => self.tracker_hits(id, TrackerName::Root),
                (None, _) => Err(FlowError::MissingEntryCount { node: id }),
            };
        };
        if node.kind == NodeKind::MasgnSetter {
            return self.setter_entry(id);
        }
        if node.kind.propagation() == Propagation::Alternate
            && self.tree.node(parent).kind != NodeKind::Masgn
        {
            return self.alternate_entry(id);
        }
        self.child_entry_count(parent, id)
    }

    /// Count of control reaching `child`, as decided by `parent`.
    pub fn child_entry_count(&self, parent: NodeId, child: NodeId) -> Result<u64, FlowError> {
        let index = self.tree.node(child).index;
        match self.tree.node(parent).kind {
            NodeKind::Root => match self.entry_override {
                Some(runs) => Ok(runs),
                None => self.tracker_hits(parent, TrackerName::Root),
            },
            NodeKind::If => self.if_child_entry(parent, index),
            NodeKind::ShortCircuit => self.short_circuit_child_entry(parent, index),
            NodeKind::Case => self.case_child_entry(parent, child),
            NodeKind::When => self.when_child_entry(parent, child),
            NodeKind::Rescue => self.rescue_child_entry(parent, child),
            NodeKind::Resbody => self.resbody_child_entry(parent, index),
            NodeKind::Def if index > 0 => self.tracker_hits(parent, TrackerName::Call),
            NodeKind::Block if index > 0 => self.tracker_hits(parent, TrackerName::BodyEntry),
            NodeKind::OptionalParameter if index > 0 => {
                self.tracker_hits(parent, TrackerName::Default)
            }
            NodeKind::MasgnSetter if index == 0 => self.tracker_hits(parent, TrackerName::Entry),
            NodeKind::OpAsgn | NodeKind::BooleanAssignment => {
                self.compound_child_entry(parent, child)
            }
            _ => self.forward_entry(parent, child),
        }
    }

    /// Previous sibling's completion, else the parent's entry.
    pub(super) fn forward_entry(&self, parent: NodeId, child: NodeId) -> Result<u64, FlowError> {
        match self.tree.previous_in_flow(child) {
            Some(previous) => self.completion_count(previous),
            None => self.entry_count(parent),
        }
    }

    fn derive_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        let kind = self.tree.node(id).kind;
        match kind.completion() {
            Completion::Chain => match self.tree.last_in_flow(id) {
                Some(last) => self.completion_count(last),
                None => self.entry_count(id),
            },
            Completion::Tracker(name) => self.tracker_hits(id, name),
            Completion::Never => Ok(0),
            Completion::Alternate => self.alternate_completion(id),
            Completion::Specialized => match kind {
                NodeKind::BlockCall => match self.tree.parent(id) {
                    Some(block) => self.completion_count(block),
                    None => self.entry_count(id),
                },
                NodeKind::ShortCircuit => self.short_circuit_completion(id),
                NodeKind::If => self.if_completion(id),
                NodeKind::Case => self.case_completion(id),
                NodeKind::When => self.when_completion(id),
                NodeKind::WhenCondition | NodeKind::WhenSplatCondition => {
                    self.matcher_completion(id)
                }
                NodeKind::Rescue => self.rescue_completion(id),
                NodeKind::Resbody => self.resbody_completion(id),
                _ => self.entry_count(id),
            },
        }
    }

    pub(super) fn tracker_hits(&self, id: NodeId, name: TrackerName) -> Result<u64, FlowError> {
        self.tree
            .tracker_slot(id, name)
            .map(|slot| self.hits.hits(slot))
            .ok_or(FlowError::MissingTracker {
                node: id,
                tracker: name.as_str(),
            })
    }

    pub(super) fn require_child(
        &self,
        id: NodeId,
        index: usize,
        role: &'static str,
    ) -> Result<NodeId, FlowError> {
        self.tree
            .child_at(id, index)
            .ok_or(FlowError::MissingChild { node: id, role })
    }

    /// Completion of the child at `index`, or `None` if the slot holds no node.
    pub(super) fn child_completion(&self, id: NodeId, index: usize) -> Result<Option<u64>, FlowError> {
        self.tree
            .child_at(id, index)
            .map(|child| self.completion_count(child))
            .transpose()
    }
}

/// `minuend - subtrahend`, failing loudly instead of wrapping.
pub(super) fn sub(
    node: NodeId,
    what: &'static str,
    minuend: u64,
    subtrahend: u64,
) -> Result<u64, FlowError> {
    minuend
        .checked_sub(subtrahend)
        .ok_or(FlowError::NegativeCount {
            node,
            what,
            minuend,
            subtrahend,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_sexp;
    use crate::tracker::{HitCounts, TrackerAllocator};

    fn tree(sexp: &str) -> CoverTree {
        CoverTree::build(&parse_sexp(sexp).unwrap(), TrackerAllocator::new(0)).unwrap()
    }

    fn hit(tree: &CoverTree, hits: &mut HitCounts, path: &[usize], name: TrackerName, n: u64) {
        let id = tree.at(path).unwrap();
        hits.set(tree.tracker_slot(id, name).unwrap(), n);
    }

    #[test]
    fn test_statement_chain() {
        // foo; bar(1); 2   where bar raised once out of three runs
        let t = tree("(begin (send nil :foo) (send nil :bar (int 1)) (int 2))");
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 3);
        hit(&t, &mut hits, &[0], TrackerName::Completion, 3);
        hit(&t, &mut hits, &[1], TrackerName::Completion, 2);
        let flow = t.flow(&hits);

        let bar = t.at(&[1]).unwrap();
        assert_eq!(
            flow.counts(bar).unwrap(),
            FlowCounts {
                runs: 3,
                full_runs: 2,
                interrupts: 1
            }
        );
        assert_eq!(flow.entry_count(t.at(&[1, 2]).unwrap()).unwrap(), 3);
        assert_eq!(flow.entry_count(t.at(&[2]).unwrap()).unwrap(), 2);
        assert_eq!(flow.completion_count(t.program()).unwrap(), 2);
        assert_eq!(flow.was_executed(t.at(&[2]).unwrap()).unwrap(), Some(true));
        assert_eq!(flow.was_executed(t.program()).unwrap(), None);
    }

    #[test]
    fn test_unreached_slots_read_as_zero() {
        let t = tree("(send nil :foo)");
        let flow = t.flow(HitCounts::new());
        assert_eq!(flow.entry_count(t.program()).unwrap(), 0);
        assert_eq!(flow.was_executed(t.program()).unwrap(), Some(false));
    }

    #[test]
    fn test_return_never_completes() {
        let t = tree("(begin (return (int 1)) (int 2))");
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 1);
        let flow = t.flow(&hits);
        let ret = t.at(&[0]).unwrap();
        assert_eq!(flow.interrupt_count(ret).unwrap(), 1);
        assert_eq!(flow.entry_count(t.at(&[1]).unwrap()).unwrap(), 0);
    }

    #[test]
    fn test_fragment_needs_entry_count() {
        let t = CoverTree::build_fragment(
            &parse_sexp("(lvar :x)").unwrap(),
            TrackerAllocator::new(0),
        )
        .unwrap();
        let hits = HitCounts::new();
        assert_eq!(
            t.flow(&hits).entry_count(t.root()),
            Err(FlowError::MissingEntryCount { node: t.root() })
        );
        let flow = t.flow(&hits).with_entry_count(4);
        assert_eq!(flow.completion_count(t.root()).unwrap(), 4);
    }

    #[test]
    fn test_completion_above_entry_is_fatal() {
        let t = tree("(send nil :foo)");
        let mut hits = HitCounts::new();
        hit(&t, &mut hits, &[], TrackerName::Completion, 2);
        let flow = t.flow(&hits).with_entry_count(1);
        assert_eq!(
            flow.interrupt_count(t.program()),
            Err(FlowError::CompletionExceedsEntry {
                node: t.program(),
                entry: 1,
                completion: 2
            })
        );
    }

    #[test]
    fn test_def_body_runs_per_call() {
        let t = tree("(def :foo (args (optarg :a (int 1))) (send nil :bar))");
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 1);
        hit(&t, &mut hits, &[], TrackerName::Call, 5);
        hit(&t, &mut hits, &[1, 0], TrackerName::Default, 2);
        hit(&t, &mut hits, &[2], TrackerName::Completion, 5);
        let flow = t.flow(&hits);

        assert_eq!(flow.counts(t.program()).unwrap().full_runs, 1);
        assert_eq!(flow.entry_count(t.at(&[2]).unwrap()).unwrap(), 5);
        assert_eq!(flow.entry_count(t.at(&[1, 0, 1]).unwrap()).unwrap(), 2);
        assert_eq!(flow.was_executed(t.at(&[1, 0, 1]).unwrap()).unwrap(), Some(true));
    }

    #[test]
    fn test_block_call_shares_block_completion() {
        let t = tree("(block (send (lvar :xs) :each) (args (arg :x)) (send nil :p (lvar :x)))");
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 1);
        hit(&t, &mut hits, &[], TrackerName::Completion, 1);
        hit(&t, &mut hits, &[], TrackerName::BodyEntry, 3);
        hit(&t, &mut hits, &[2], TrackerName::Completion, 3);
        let flow = t.flow(&hits);

        let call = t.at(&[0]).unwrap();
        assert_eq!(flow.counts(call).unwrap().full_runs, 1);
        assert_eq!(flow.entry_count(t.at(&[2, 2]).unwrap()).unwrap(), 3);
        assert_eq!(flow.execution_count(call).unwrap(), 1);
    }
}
