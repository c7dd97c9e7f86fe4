//! deepcover - fine-grained execution coverage through source rewriting.
//!
//! deepcover covers Ruby programs below the line level. It takes the syntax
//! tree an external parser produced for each file, inserts counting probes
//! at a handful of points per node, and after the instrumented program ran
//! derives, for every node, how often it was entered, how often it completed
//! normally and how often it was interrupted by a raise, throw or jump.
//!
//! # Architecture
//!
//! - `syntax`: Raw parser trees (JSON with spans, or s-expressions)
//! - `node`: Cover trees, node kinds, rewrite templates, flow derivation
//! - `tracker`: Probe slot allocation and hit-count reading
//! - `coverage`: Per-file coverage (nodes, lines, characters) and summaries
//! - `config`: YAML configuration
//! - `report`: Output formatting (pretty, JSON)
//! - `cli`: Command-line interface
//!
//! # Adding a Grammar Shape
//!
//! Add the tag to `syntax::Shape`, pick its `NodeKind` in
//! `node::kind::classify`, and give that kind trackers, templates and
//! strategies in `node/kind.rs`.

pub mod cli;
pub mod config;
pub mod coverage;
pub mod node;
pub mod report;
pub mod syntax;
pub mod tracker;

pub use config::Config;
pub use coverage::{CharCover, Coverage, CoverageSummary, CoveredFile, FileCoverage, NodeCoverage};
pub use node::{
    BuildError, CoverTree, FlowCounts, FlowError, FlowView, NodeId, NodeKind, RewriteError,
    Rewriter, TrackerName,
};
pub use syntax::{parse_sexp, Shape, Span, SyntaxNode};
pub use tracker::{HitCounts, HitSource, TrackerAllocator};
