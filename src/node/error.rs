//! Errors raised while building, rewriting or reading a cover tree.
//!
//! None of these describe the covered program. They mean the tree is not
//! something we can cover faithfully, and analysis must stop.

use thiserror::Error;

use super::NodeId;

/// Structural problem found while building the tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("no coverage strategy for grammar shape `{tag}`")]
    UnknownShape { tag: String },
    #[error("`{shape}` expects {expected} children, found {found}")]
    Arity {
        shape: String,
        expected: String,
        found: usize,
    },
    #[error("`{parent}` cannot hold a `{shape}` at child {index}")]
    UnexpectedChild {
        parent: String,
        index: usize,
        shape: String,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A rewrite template that cannot be instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder `%{{{name}}}` in template {template:?}")]
    UnknownPlaceholder { name: String, template: String },
    #[error("unterminated placeholder in template {template:?}")]
    UnterminatedPlaceholder { template: String },
    #[error("template {template:?} must reference %{{node}} exactly once")]
    NodePlaceholder { template: String },
}

/// Internal-consistency failure while deriving flow counts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("negative {what} for node {node}: {minuend} - {subtrahend}")]
    NegativeCount {
        node: NodeId,
        what: &'static str,
        minuend: u64,
        subtrahend: u64,
    },
    #[error("node {node} completed {completion} times but was entered only {entry} times")]
    CompletionExceedsEntry {
        node: NodeId,
        entry: u64,
        completion: u64,
    },
    #[error("no entry count supplied for root node {node}")]
    MissingEntryCount { node: NodeId },
    #[error("node {node} has no `{tracker}` tracker")]
    MissingTracker { node: NodeId, tracker: &'static str },
    #[error("node {node} is missing its {role}")]
    MissingChild { node: NodeId, role: &'static str },
}

/// The tree's spans do not fit the source being rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("span {start}..{end} of node {node} is outside the {len}-byte source")]
    OutOfBounds {
        node: NodeId,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("child {child} of node {node} overlaps a previous sibling")]
    Overlap { node: NodeId, child: NodeId },
    #[error("node {node} has no location to splice its probes at")]
    MissingAnchor { node: NodeId },
    #[error("node {node} names a tracker it never reserved")]
    MissingTracker { node: NodeId },
    #[error("span {start}..{end} of node {node} does not fall on character boundaries")]
    CharBoundary {
        node: NodeId,
        start: usize,
        end: usize,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
}
