//! Conditional flow: `if`, `&&`/`||` and `case`/`when`.

use crate::tracker::HitSource;

use super::flow::{sub, FlowView};
use super::{FlowError, NodeId, NodeKind, TrackerName};

impl<'t, H: HitSource> FlowView<'t, H> {
    pub(super) fn if_child_entry(&self, id: NodeId, index: usize) -> Result<u64, FlowError> {
        if index == 0 {
            return self.entry_count(id);
        }
        let condition = self.require_child(id, 0, "condition")?;
        let reached = self.completion_count(condition)?;
        match self.tree.node(id).tracked_child {
            Some(tracked) if tracked == index => self.tracker_hits(id, TrackerName::Branch),
            Some(_) => sub(
                id,
                "untracked branch entry",
                reached,
                self.tracker_hits(id, TrackerName::Branch)?,
            ),
            // Both branches empty: the "then" side absorbs every pass.
            None if index == 1 => Ok(reached),
            None => Ok(0),
        }
    }

    pub(super) fn if_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        let then = self.child_completion(id, 1)?.unwrap_or(0);
        let otherwise = self.child_completion(id, 2)?.unwrap_or(0);
        Ok(then + otherwise)
    }

    pub(super) fn if_execution(&self, id: NodeId) -> Result<u64, FlowError> {
        let condition = self.require_child(id, 0, "condition")?;
        self.completion_count(condition)
    }

    pub(super) fn short_circuit_child_entry(
        &self,
        id: NodeId,
        index: usize,
    ) -> Result<u64, FlowError> {
        match index {
            0 => self.entry_count(id),
            _ => self.tracker_hits(id, TrackerName::RightOperand),
        }
    }

    /// Left completions that skipped the right operand, plus the right
    /// operand's own completions.
    pub(super) fn short_circuit_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        let left = self.require_child(id, 0, "left operand")?;
        let right = self.require_child(id, 1, "right operand")?;
        let skipped = sub(
            id,
            "short-circuited completion",
            self.completion_count(left)?,
            self.entry_count(right)?,
        )?;
        Ok(skipped + self.completion_count(right)?)
    }

    pub(super) fn short_circuit_execution(&self, id: NodeId) -> Result<u64, FlowError> {
        let left = self.require_child(id, 0, "left operand")?;
        self.completion_count(left)
    }

    /// Entry of a `case` child: the subject, a `when`, or the trailing else.
    pub(super) fn case_child_entry(&self, id: NodeId, child: NodeId) -> Result<u64, FlowError> {
        if self.tree.node(child).index == 0 {
            return self.entry_count(id);
        }
        match self.tree.previous_sibling(child) {
            Some(previous) if self.tree.node(previous).kind == NodeKind::When => {
                self.when_fallthrough(previous)
            }
            Some(subject) => self.completion_count(subject),
            None => self.entry_count(id),
        }
    }

    pub(super) fn case_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        let node = self.tree.node(id);
        let mut total = 0;
        for index in 1..node.children.len() {
            if let Some(completion) = self.child_completion(id, index)? {
                total += completion;
            }
        }
        Ok(total)
    }

    pub(super) fn case_execution(&self, id: NodeId) -> Result<u64, FlowError> {
        match self.tree.child_at(id, 0) {
            Some(subject) => self.completion_count(subject),
            None => self.entry_count(id),
        }
    }

    /// Entry of a `when` child. Each matcher runs only when the one before
    /// it missed; the body runs once per match.
    pub(super) fn when_child_entry(&self, id: NodeId, child: NodeId) -> Result<u64, FlowError> {
        let index = self.tree.node(child).index;
        let body_index = self.tree.node(id).children.len() - 1;
        if index == body_index {
            return self.when_body_entry(id);
        }
        match index.checked_sub(1) {
            None => self.entry_count(id),
            Some(previous) => {
                let matcher = self.require_child(id, previous, "matcher")?;
                self.tracker_hits(matcher, TrackerName::Missed)
            }
        }
    }

    pub(super) fn when_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        let body_index = self.tree.node(id).children.len() - 1;
        Ok(self.child_completion(id, body_index)?.unwrap_or(0))
    }

    /// Number of times the `when` finished testing: every match plus the
    /// misses of its last matcher.
    pub(super) fn when_test_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        let matched = self.when_body_entry(id)?;
        let missed = match self.matchers(id).last() {
            Some(&last) => self.tracker_hits(last, TrackerName::Missed)?,
            None => 0,
        };
        Ok(matched + missed)
    }

    pub(super) fn matcher_completion(&self, id: NodeId) -> Result<u64, FlowError> {
        Ok(self.tracker_hits(id, TrackerName::Matched)?
            + self.tracker_hits(id, TrackerName::Missed)?)
    }

    fn when_body_entry(&self, id: NodeId) -> Result<u64, FlowError> {
        self.matchers(id)
            .iter()
            .map(|&m| self.tracker_hits(m, TrackerName::Matched))
            .sum()
    }

    /// Control leaving a `when` towards the next `when` or the else body.
    fn when_fallthrough(&self, id: NodeId) -> Result<u64, FlowError> {
        sub(
            id,
            "when fall-through",
            self.when_test_completion(id)?,
            self.when_body_entry(id)?,
        )
    }

    fn matchers(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .children(id)
            .filter(|&c| self.tree.node(c).kind.is_matcher())
            .collect()
    }
}
