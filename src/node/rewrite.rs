//! Source rewriting.
//!
//! Every node's output is its own source span with its children's outputs
//! spliced in, wrapped first by the node's own template and then by the
//! template its parent imposes on that child position. Nodes without a span
//! (empty bodies) only contribute the wrapping, inserted at their anchor.

use std::ops::Range;

use tracing::debug;

use super::{Anchor, Bindings, CoverTree, NodeId, NodeKind, RewriteError, Template};

/// Default prefix for temporaries introduced by completion checks.
pub const DEFAULT_LOCAL_PREFIX: &str = "_dc_l";

/// Text spliced immediately around one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewritePlan {
    pub prefix: String,
    pub suffix: String,
}

impl RewritePlan {
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.suffix.is_empty()
    }
}

pub struct Rewriter<'t> {
    tree: &'t CoverTree,
    local_prefix: String,
}

impl<'t> Rewriter<'t> {
    pub fn new(tree: &'t CoverTree) -> Self {
        Self {
            tree,
            local_prefix: DEFAULT_LOCAL_PREFIX.to_string(),
        }
    }

    /// Prefix for temporaries introduced by completion checks.
    pub fn with_local_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.local_prefix = prefix.into();
        self
    }

    /// Name of the temporary owned by `id`.
    pub fn local_name(&self, id: NodeId) -> String {
        format!("{}{}", self.local_prefix, self.tree.node(id).nb)
    }

    /// Prefix and suffix for `id`: its own template inside its parent's.
    pub fn plan(&self, id: NodeId) -> Result<RewritePlan, RewriteError> {
        let node = self.tree.node(id);
        let mut plan = RewritePlan::default();

        let has_subject = node.kind.is_matcher() && self.tree.case_has_subject(id);
        if let Some(source) = node.kind.own_template(has_subject) {
            let (prefix, suffix) = self.render(id, id, source)?;
            plan.prefix = prefix;
            plan.suffix = suffix;
        }

        if let Some(parent) = node.parent {
            let owner = self.tree.node(parent);
            let template = owner.kind.child_template(
                node.index,
                owner.children.len(),
                owner.tracked_child,
                node.kind == NodeKind::EmptyBody,
            );
            if let Some(source) = template {
                let (prefix, suffix) = self.render(parent, id, source)?;
                plan.prefix.insert_str(0, &prefix);
                plan.suffix.push_str(&suffix);
            }
        }
        Ok(plan)
    }

    /// Rewrite the whole program.
    pub fn rewrite(&self, source: &str) -> Result<String, RewriteError> {
        let root = self.tree.root();
        let output = match self.tree.node(root).span {
            Some(_) => self.render_node(root, source)?,
            None => self.render_within(root, 0..source.len(), source)?,
        };
        debug!(
            bytes_in = source.len(),
            bytes_out = output.len(),
            "rewrote source"
        );
        Ok(output)
    }

    /// Render `template` with the trackers of `owner` and the local of `target`.
    fn render(
        &self,
        owner: NodeId,
        target: NodeId,
        source: &str,
    ) -> Result<(String, String), RewriteError> {
        let kind = self.tree.node(owner).kind;
        let template = Template::parse(source, kind.trackers())?;
        let local = self.local_name(target);
        let allocator = self.tree.allocator();
        let tracker_source = |name| {
            self.tree
                .tracker_slot(owner, name)
                .map(|slot| allocator.probe_source(slot))
        };
        let bindings = Bindings {
            local: &local,
            tracker_source: &tracker_source,
        };
        template
            .render(&bindings)
            .ok_or(RewriteError::MissingTracker { node: owner })
    }

    fn render_node(&self, id: NodeId, source: &str) -> Result<String, RewriteError> {
        let plan = self.plan(id)?;
        let inner = match self.tree.node(id).span {
            Some(span) => self.render_within(id, span.start_byte..span.end_byte, source)?,
            None => String::new(),
        };
        Ok(format!("{}{}{}", plan.prefix, inner, plan.suffix))
    }

    /// `range` of the source with every child's output spliced in.
    fn render_within(
        &self,
        id: NodeId,
        range: Range<usize>,
        source: &str,
    ) -> Result<String, RewriteError> {
        self.check_range(id, &range, source)?;

        let mut edits: Vec<(Range<usize>, NodeId, String)> = Vec::new();
        for child in self.tree.children(id) {
            let node = self.tree.node(child);
            let output = self.render_node(child, source)?;
            match (node.span, node.anchor) {
                (Some(span), _) => edits.push((span.start_byte..span.end_byte, child, output)),
                _ if output.is_empty() => {}
                (None, Some(anchor)) => {
                    let at = resolve_anchor(anchor, source);
                    edits.push((at..at, child, output));
                }
                (None, None) => return Err(RewriteError::MissingAnchor { node: child }),
            }
        }
        edits.sort_by_key(|(r, _, _)| (r.start, r.end));

        let mut out = String::new();
        let mut cursor = range.start;
        for (edit, child, output) in edits {
            if edit.start < cursor || edit.end > range.end {
                return Err(RewriteError::Overlap { node: id, child });
            }
            self.check_range(child, &edit, source)?;
            out.push_str(&source[cursor..edit.start]);
            out.push_str(&output);
            cursor = edit.end;
        }
        out.push_str(&source[cursor..range.end]);
        Ok(out)
    }

    fn check_range(
        &self,
        id: NodeId,
        range: &Range<usize>,
        source: &str,
    ) -> Result<(), RewriteError> {
        if range.start > range.end || range.end > source.len() {
            return Err(RewriteError::OutOfBounds {
                node: id,
                start: range.start,
                end: range.end,
                len: source.len(),
            });
        }
        if !source.is_char_boundary(range.start) || !source.is_char_boundary(range.end) {
            return Err(RewriteError::CharBoundary {
                node: id,
                start: range.start,
                end: range.end,
            });
        }
        Ok(())
    }
}

fn resolve_anchor(anchor: Anchor, source: &str) -> usize {
    match anchor {
        Anchor::At(offset) => offset.min(source.len()),
        Anchor::AfterBlockOpener(from) => {
            let rest = source.get(from..).unwrap_or("");
            let brace = rest.find('{').map(|i| i + 1);
            let keyword = find_keyword(rest, "do").map(|i| i + 2);
            let found = match (brace, keyword) {
                (Some(b), Some(k)) => Some(b.min(k)),
                (b, k) => b.or(k),
            };
            from + found.unwrap_or(0)
        }
        Anchor::AfterDefName(from) => {
            let rest = source.get(from..).unwrap_or("");
            let after_def = rest.strip_prefix("def").unwrap_or(rest);
            let name_start = after_def.len() - after_def.trim_start().len();
            let name_len = after_def[name_start..]
                .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '?' | '!' | '=')))
                .unwrap_or(after_def.len() - name_start);
            from + (rest.len() - after_def.len()) + name_start + name_len
        }
    }
}

/// Offset of `word` in `text` as a whole word.
fn find_keyword(text: &str, word: &str) -> Option<usize> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before = text[..i].chars().next_back().map_or(true, |c| !is_ident(c));
        let after = text[i + word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_ident(c));
        before && after
    })
}
