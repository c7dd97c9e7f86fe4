//! Assignment flow: destructuring targets and compound assignment.
//!
//! Destructuring targets run the other way round. Their completion is
//! whatever reached the next target (or the whole assignment's completion
//! for the last one) and their entry equals that completion, since a target
//! that was reached has nothing left that could fail on its own. Setters
//! (`d.e`, `a[i]`) are the exception: the setter call can raise, so their
//! entry is read from the tracker hit once the receiver was evaluated.

use crate::tracker::HitSource;

use super::flow::FlowView;
use super::{FlowError, NodeId, NodeKind, TrackerName};

impl<'t, H: HitSource> FlowView<'t, H> {
    pub(super) fn alternate_entry(&self, id: NodeId) -> Result<u64, FlowError> {
        self.completion_count(id)
    }

    pub(super) fn setter_entry(&self, id: NodeId) -> Result<u64, FlowError> {
        self.tracker_hits(id, TrackerName::Entry)
    }

    pub(super) fn alternate_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        if let Some(next) = self.tree.next_in_flow(id) {
            return self.entry_count(next);
        }
        match self.tree.parent(id) {
            Some(parent) => self.completion_count(parent),
            None => self.entry_count(id),
        }
    }

    pub(super) fn masgn_execution(&self, id: NodeId) -> Result<u64, FlowError> {
        let value = self.require_child(id, 1, "value")?;
        self.completion_count(value)
    }

    /// `op_asgn`, `or_asgn`, `and_asgn`: the target read runs on entry, the
    /// value only when its tracker says so.
    pub(super) fn compound_child_entry(&self, id: NodeId, child: NodeId) -> Result<u64, FlowError> {
        let node = self.tree.node(id);
        if self.tree.node(child).index == 0 {
            return self.entry_count(id);
        }
        let tracker = match node.kind {
            NodeKind::BooleanAssignment => TrackerName::LongBranch,
            _ => TrackerName::Reader,
        };
        self.tracker_hits(id, tracker)
    }
}

#[cfg(test)]
mod tests {
    use crate::node::{CoverTree, FlowCounts, NodeKind, TrackerName};
    use crate::syntax::parse_sexp;
    use crate::tracker::{HitCounts, TrackerAllocator};

    fn tree(sexp: &str) -> CoverTree {
        CoverTree::build(&parse_sexp(sexp).unwrap(), TrackerAllocator::new(0)).unwrap()
    }

    fn set(t: &CoverTree, hits: &mut HitCounts, path: &[usize], name: TrackerName, n: u64) {
        hits.set(t.tracker_slot(t.at(path).unwrap(), name).unwrap(), n);
    }

    fn run_once(t: &CoverTree) -> HitCounts {
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 1);
        hits
    }

    #[test]
    fn test_or_assign_truthy_skips_value() {
        let t = tree("(or_asgn (lvasgn :x) (send nil :y))");
        let mut hits = run_once(&t);
        set(&t, &mut hits, &[], TrackerName::Completion, 1);
        let flow = t.flow(&hits);

        let read = t.at(&[0]).unwrap();
        assert_eq!(t.node(read).kind, NodeKind::VariableOperatorAssign);
        assert_eq!(flow.entry_count(read).unwrap(), 1);
        assert_eq!(flow.entry_count(t.at(&[1]).unwrap()).unwrap(), 0);
        assert_eq!(flow.interrupt_count(t.program()).unwrap(), 0);
    }

    #[test]
    fn test_or_assign_falsy_runs_value() {
        let t = tree("(or_asgn (lvasgn :x) (send nil :y))");
        let mut hits = run_once(&t);
        set(&t, &mut hits, &[], TrackerName::LongBranch, 1);
        set(&t, &mut hits, &[1], TrackerName::Completion, 1);
        set(&t, &mut hits, &[], TrackerName::Completion, 1);
        let flow = t.flow(&hits);

        assert_eq!(flow.entry_count(t.at(&[0]).unwrap()).unwrap(), 1);
        assert_eq!(flow.entry_count(t.at(&[1]).unwrap()).unwrap(), 1);
        assert_eq!(flow.was_executed(t.at(&[1]).unwrap()).unwrap(), Some(true));
    }

    #[test]
    fn test_op_assign_value_raises() {
        // x += y where y raised
        let t = tree("(op_asgn (lvasgn :x) :+ (send nil :y))");
        let mut hits = run_once(&t);
        set(&t, &mut hits, &[], TrackerName::Reader, 1);
        let flow = t.flow(&hits);

        let value = t.at(&[2]).unwrap();
        assert_eq!(flow.entry_count(value).unwrap(), 1);
        assert_eq!(flow.completion_count(value).unwrap(), 0);
        assert_eq!(flow.interrupt_count(t.program()).unwrap(), 1);
        assert_eq!(flow.was_executed(t.program()).unwrap(), Some(false));
    }

    #[test]
    fn test_destructuring_targets_follow_the_assignment() {
        // a, (b, *c), d.e = list
        let t = tree(
            "(masgn (mlhs (lvasgn :a) (mlhs (lvasgn :b) (splat (lvasgn :c))) \
             (send (lvar :d) :e=)) (lvar :list))",
        );
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 2);
        set(&t, &mut hits, &[0, 2], TrackerName::Entry, 2);
        set(&t, &mut hits, &[], TrackerName::Completion, 1);
        let flow = t.flow(&hits);

        let left = t.at(&[0]).unwrap();
        let a = t.at(&[0, 0]).unwrap();
        let c = t.at(&[0, 1, 1, 0]).unwrap();
        let setter = t.at(&[0, 2]).unwrap();
        assert_eq!(t.node(setter).kind, NodeKind::MasgnSetter);

        assert_eq!(flow.entry_count(left).unwrap(), 2);
        assert_eq!(flow.completion_count(left).unwrap(), 1);
        // Both runs got as far as the setter, so `a` was assigned twice.
        assert_eq!(flow.entry_count(a).unwrap(), 2);
        assert_eq!(flow.counts(c).unwrap().interrupts, 0);
        assert_eq!(flow.entry_count(t.at(&[0, 2, 0]).unwrap()).unwrap(), 2);
        assert_eq!(flow.execution_count(t.program()).unwrap(), 2);
        assert_eq!(flow.interrupt_count(t.program()).unwrap(), 1);
    }

    #[test]
    fn test_raising_setter_is_interrupted() {
        // a, d.e = list   run twice, `e=` raised once
        let t = tree("(masgn (mlhs (lvasgn :a) (send (lvar :d) :e=)) (lvar :list))");
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 2);
        set(&t, &mut hits, &[0, 1], TrackerName::Entry, 2);
        set(&t, &mut hits, &[], TrackerName::Completion, 1);
        let flow = t.flow(&hits);

        let setter = t.at(&[0, 1]).unwrap();
        assert_eq!(
            flow.counts(setter).unwrap(),
            FlowCounts {
                runs: 2,
                full_runs: 1,
                interrupts: 1
            }
        );
        let receiver = t.at(&[0, 1, 0]).unwrap();
        assert!(flow.entry_count(receiver).unwrap() <= flow.entry_count(setter).unwrap());
        assert_eq!(flow.was_executed(setter).unwrap(), Some(true));
    }

    #[test]
    fn test_element_setter_index_raises() {
        // a[i.fetch], b = list   where i.fetch raised
        let t = tree(
            "(masgn (mlhs (send (lvar :a) :[]= (send (lvar :i) :fetch)) (lvasgn :b)) \
             (lvar :list))",
        );
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 1);
        set(&t, &mut hits, &[0, 0], TrackerName::Entry, 1);
        let flow = t.flow(&hits);

        let setter = t.at(&[0, 0]).unwrap();
        let index = t.at(&[0, 0, 2]).unwrap();
        let b = t.at(&[0, 1]).unwrap();
        assert_eq!(flow.entry_count(t.at(&[0, 0, 0]).unwrap()).unwrap(), 1);
        assert_eq!(flow.entry_count(index).unwrap(), 1);
        assert_eq!(flow.interrupt_count(index).unwrap(), 1);
        assert_eq!(flow.counts(setter).unwrap().interrupts, 1);
        assert_eq!(flow.entry_count(b).unwrap(), 0);
        assert_eq!(flow.was_executed(b).unwrap(), Some(false));
    }
}
