//! One covered source file and the coverage derived for it.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::node::{BuildError, CoverTree, FlowError, NodeId, NodeKind, RewriteError};
use crate::syntax::{Span, SyntaxNode};
use crate::tracker::{HitSource, TrackerAllocator};

use super::CoverageSummary;

/// Suffix of the parser's JSON dump next to a source file.
pub const AST_SUFFIX: &str = "ast.json";
/// Suffix of the hit counts dumped after running the instrumented file.
pub const HITS_SUFFIX: &str = "hits.json";

/// `foo.rb` + `ast.json` gives `foo.rb.ast.json`.
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// A source file with its cover tree.
#[derive(Debug)]
pub struct CoveredFile {
    path: PathBuf,
    source: String,
    tree: CoverTree,
}

impl CoveredFile {
    /// Build the tree for `source`. `None` stands for an empty program.
    pub fn new(
        path: impl Into<PathBuf>,
        source: impl Into<String>,
        syntax: Option<&SyntaxNode>,
        allocator: TrackerAllocator,
    ) -> Result<Self, BuildError> {
        let tree = match syntax {
            Some(program) => CoverTree::build(program, allocator)?,
            None => CoverTree::build_empty(allocator),
        };
        Ok(Self {
            path: path.into(),
            source: source.into(),
            tree,
        })
    }

    /// Read `path` and the syntax tree dumped next to it.
    pub fn load(path: &Path, allocator: TrackerAllocator) -> anyhow::Result<Self> {
        let source = fs::read_to_string(path)?;
        let ast_path = sidecar_path(path, AST_SUFFIX);
        let content = fs::read_to_string(&ast_path).map_err(|e| {
            anyhow::anyhow!("cannot read syntax tree {}: {}", ast_path.display(), e)
        })?;
        let syntax: Option<SyntaxNode> = serde_json::from_str(&content)?;
        Ok(Self::new(path, source, syntax.as_ref(), allocator)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &CoverTree {
        &self.tree
    }

    /// The rewritten file, preceded on its first line by the probe storage setup.
    pub fn instrumented_source(&self, local_prefix: &str) -> Result<String, RewriteError> {
        let body = self
            .tree
            .rewriter()
            .with_local_prefix(local_prefix)
            .rewrite(&self.source)?;
        Ok(format!("{};{}", self.tree.allocator().setup_source(), body))
    }

    /// Derive coverage from hit counts collected after execution.
    pub fn analyze<H: HitSource>(&self, hits: H, config: &Config) -> Result<FileCoverage, FlowError> {
        let flow = self.tree.flow(hits);
        let mut ignored = vec![false; self.tree.len()];
        let mut nodes = Vec::with_capacity(self.tree.len());
        let mut lines: Vec<Option<u64>> = vec![None; line_count(&self.source)];

        for id in self.tree.ids() {
            let node = self.tree.node(id);
            let inherited = node.parent.map_or(false, |p| ignored[p.index()]);
            ignored[id.index()] = inherited || self.is_ignored_call(id, config);

            let counts = flow.counts(id)?;
            let was_executed = if ignored[id.index()] {
                None
            } else {
                flow.was_executed(id)?
            };
            if let (Some(_), Some(span)) = (was_executed, node.span) {
                let executions = flow.execution_count(id)?;
                if let Some(line) = lines.get_mut(span.start_line.saturating_sub(1)) {
                    *line = Some(line.map_or(executions, |l| l.max(executions)));
                }
            }
            nodes.push(NodeCoverage {
                nb: node.nb,
                tag: node.tag(),
                span: node.span,
                executable: node.kind.is_executable(),
                was_executed,
                runs: counts.runs,
                full_runs: counts.full_runs,
                interrupts: counts.interrupts,
                proper_range: self.tree.proper_range(id),
            });
        }

        let chars = char_cover(&self.source, &nodes);
        if !config.allow_partial {
            for line in partial_lines(&self.source, &chars) {
                lines[line] = Some(0);
            }
        }
        let summary = CoverageSummary::from_nodes(&nodes, config.threshold);
        debug!(
            path = %self.path.display(),
            executed = summary.executed,
            executable = summary.executable,
            "analyzed file"
        );

        Ok(FileCoverage {
            path: self.path.to_string_lossy().to_string(),
            nodes,
            lines,
            chars,
            summary,
        })
    }

    fn is_ignored_call(&self, id: NodeId, config: &Config) -> bool {
        let node = self.tree.node(id);
        matches!(node.kind, NodeKind::Call | NodeKind::BlockCall)
            && node.atom_text(1).map_or(false, |m| config.ignores_method(m))
    }
}

/// Coverage of a single node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeCoverage {
    pub nb: usize,
    pub tag: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    pub executable: bool,
    /// `None` for syntactic nodes and ignored calls.
    pub was_executed: Option<bool>,
    pub runs: u64,
    pub full_runs: u64,
    pub interrupts: u64,
    pub proper_range: Vec<Range<usize>>,
}

/// Coverage state of one source byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CharCover {
    /// Whitespace, comments or purely syntactic text.
    Ignored,
    Executed,
    NotExecuted,
}

/// Coverage of one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileCoverage {
    pub path: String,
    pub nodes: Vec<NodeCoverage>,
    /// Execution count per line (index 0 is line 1); `None` where nothing executable starts.
    pub lines: Vec<Option<u64>>,
    #[serde(skip)]
    pub chars: Vec<CharCover>,
    pub summary: CoverageSummary,
}

impl FileCoverage {
    /// 1-based numbers of lines whose code never ran.
    pub fn uncovered_lines(&self) -> Vec<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == Some(0))
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Nodes that are executable but never ran.
    pub fn unexecuted_nodes(&self) -> impl Iterator<Item = &NodeCoverage> {
        self.nodes.iter().filter(|n| n.was_executed == Some(false))
    }
}

fn line_count(source: &str) -> usize {
    source.split('\n').count()
}

fn char_cover(source: &str, nodes: &[NodeCoverage]) -> Vec<CharCover> {
    let bytes = source.as_bytes();
    let mut chars = vec![CharCover::Ignored; bytes.len()];
    for node in nodes {
        let state = match node.was_executed {
            Some(true) => CharCover::Executed,
            Some(false) => CharCover::NotExecuted,
            None => continue,
        };
        for range in &node.proper_range {
            for offset in range.clone() {
                if offset < bytes.len() && !bytes[offset].is_ascii_whitespace() {
                    chars[offset] = state;
                }
            }
        }
    }
    chars
}

/// 0-based indices of lines holding at least one never-executed byte.
fn partial_lines(source: &str, chars: &[CharCover]) -> Vec<usize> {
    let mut lines = Vec::new();
    let mut line = 0;
    for (offset, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            line += 1;
            continue;
        }
        if chars[offset] == CharCover::NotExecuted && lines.last() != Some(&line) {
            lines.push(line);
        }
    }
    lines
}
