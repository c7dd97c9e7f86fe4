//! Exception handling: `rescue` with its handlers and `else` body.
//!
//! The guarded body comes first. Every interruption of it reaches the
//! first handler's exception list; a list that completes without matching
//! hands over to the next handler. The `else` body only runs when the
//! guarded body completed.

use crate::tracker::HitSource;

use super::flow::{sub, FlowView};
use super::{FlowError, NodeId, NodeKind, TrackerName};

impl<'t, H: HitSource> FlowView<'t, H> {
    pub(super) fn rescue_child_entry(&self, id: NodeId, child: NodeId) -> Result<u64, FlowError> {
        let node = self.tree.node(child);
        if node.index == 0 {
            return self.entry_count(id);
        }
        let body = self.require_child(id, 0, "guarded body")?;
        if node.kind != NodeKind::Resbody {
            return self.completion_count(body);
        }
        match self.tree.previous_sibling(child) {
            Some(previous) if self.tree.node(previous).kind == NodeKind::Resbody => sub(
                previous,
                "unhandled exceptions",
                self.resbody_test_completion(previous)?,
                self.tracker_hits(previous, TrackerName::HandlerEntry)?,
            ),
            _ => self.interrupt_count(body),
        }
    }

    pub(super) fn rescue_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        let node = self.tree.node(id);
        let mut total = 0;
        for index in 1..node.children.len() {
            if let Some(completion) = self.child_completion(id, index)? {
                total += completion;
            }
        }
        Ok(total)
    }

    pub(super) fn rescue_execution(&self, id: NodeId) -> Result<u64, FlowError> {
        let body = self.require_child(id, 0, "guarded body")?;
        self.completion_count(body)
    }

    /// Entry of a handler's children: the exception list runs whenever the
    /// handler is reached, the variable and body only when it matched.
    pub(super) fn resbody_child_entry(&self, id: NodeId, index: usize) -> Result<u64, FlowError> {
        match index {
            0 => self.entry_count(id),
            _ => self.tracker_hits(id, TrackerName::HandlerEntry),
        }
    }

    pub(super) fn resbody_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        match self.tree.child_at(id, 2) {
            Some(body) => self.completion_count(body),
            None => self.tracker_hits(id, TrackerName::HandlerEntry),
        }
    }

    /// Times the handler finished testing the exception, matched or not.
    /// A bare `rescue` tests nothing and so completes whenever reached.
    fn resbody_test_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        match self.tree.child_at(id, 0) {
            Some(exceptions) => self.completion_count(exceptions),
            None => self.entry_count(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::{CoverTree, FlowError, TrackerName};
    use crate::syntax::parse_sexp;
    use crate::tracker::{HitCounts, TrackerAllocator};

    const GUARDED: &str = "(kwbegin (rescue (send nil :work) \
        (resbody (array (const nil :ArgumentError)) (lvasgn :e) (send nil :handle)) \
        (resbody nil nil (int 0)) \
        (send nil :celebrate)))";

    fn tree() -> CoverTree {
        CoverTree::build(&parse_sexp(GUARDED).unwrap(), TrackerAllocator::new(0)).unwrap()
    }

    fn set(t: &CoverTree, hits: &mut HitCounts, path: &[usize], name: TrackerName, n: u64) {
        hits.set(t.tracker_slot(t.at(path).unwrap(), name).unwrap(), n);
    }

    fn base_hits(t: &CoverTree) -> HitCounts {
        let mut hits = HitCounts::new();
        hits.set(t.tracker_slot(t.root(), TrackerName::Root).unwrap(), 1);
        hits
    }

    #[test]
    fn test_handler_triggered() {
        let t = tree();
        let mut hits = base_hits(&t);
        set(&t, &mut hits, &[0, 1, 0, 0], TrackerName::Completion, 1);
        set(&t, &mut hits, &[0, 1], TrackerName::HandlerEntry, 1);
        set(&t, &mut hits, &[0, 1, 2], TrackerName::Completion, 1);
        let flow = t.flow(&hits);

        let body = t.at(&[0, 0]).unwrap();
        assert_eq!(flow.entry_count(body).unwrap(), 1);
        assert_eq!(flow.completion_count(body).unwrap(), 0);
        assert_eq!(flow.entry_count(t.at(&[0, 1]).unwrap()).unwrap(), 1);
        assert_eq!(flow.entry_count(t.at(&[0, 1, 2]).unwrap()).unwrap(), 1);
        assert_eq!(flow.entry_count(t.at(&[0, 1, 1]).unwrap()).unwrap(), 1);
        assert_eq!(flow.entry_count(t.at(&[0, 2]).unwrap()).unwrap(), 0);
        assert_eq!(flow.entry_count(t.at(&[0, 3]).unwrap()).unwrap(), 0);
        assert_eq!(flow.completion_count(t.program()).unwrap(), 1);
    }

    #[test]
    fn test_no_exception_runs_else() {
        let t = tree();
        let mut hits = base_hits(&t);
        set(&t, &mut hits, &[0, 0], TrackerName::Completion, 1);
        set(&t, &mut hits, &[0, 3], TrackerName::Completion, 1);
        let flow = t.flow(&hits);

        let body = t.at(&[0, 0]).unwrap();
        assert_eq!(flow.counts(body).unwrap().full_runs, 1);
        assert_eq!(flow.entry_count(t.at(&[0, 1, 2]).unwrap()).unwrap(), 0);
        assert_eq!(flow.entry_count(t.at(&[0, 3]).unwrap()).unwrap(), 1);
        assert_eq!(flow.was_executed(t.at(&[0, 1]).unwrap()).unwrap(), Some(false));
        assert_eq!(flow.interrupt_count(t.program()).unwrap(), 0);
    }

    #[test]
    fn test_unmatched_exception_reaches_bare_rescue() {
        let t = tree();
        let mut hits = base_hits(&t);
        set(&t, &mut hits, &[0, 1, 0, 0], TrackerName::Completion, 1);
        set(&t, &mut hits, &[0, 2], TrackerName::HandlerEntry, 1);
        let flow = t.flow(&hits);

        let bare = t.at(&[0, 2]).unwrap();
        assert_eq!(flow.entry_count(bare).unwrap(), 1);
        assert_eq!(flow.entry_count(t.at(&[0, 2, 2]).unwrap()).unwrap(), 1);
        assert_eq!(flow.completion_count(t.program()).unwrap(), 1);
    }

    #[test]
    fn test_handler_hits_above_tests_fail_loudly() {
        let t = tree();
        let mut hits = base_hits(&t);
        set(&t, &mut hits, &[0, 1], TrackerName::HandlerEntry, 1);
        let flow = t.flow(&hits);
        assert!(matches!(
            flow.entry_count(t.at(&[0, 2]).unwrap()),
            Err(FlowError::NegativeCount { .. })
        ));
    }
}
