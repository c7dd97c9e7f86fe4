//! Coverage sessions over many files.
//!
//! The `Coverage` registry provides:
//! - Caching of covered files so each tree is built once
//! - File indices fixed by each file's position among the project's files
//! - Parallel analysis of files once their hit counts are available
//!
//! Every instrumented file writes to its own row of the tracker global, so
//! two files loaded into one process must never share an index. Indices
//! come from the sorted project file list when one is given, so instrumenting
//! files one at a time still yields distinct rows. Files outside that list
//! are numbered after it in registration order.

mod file;
mod summary;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::config::Config;
use crate::syntax::SyntaxNode;
use crate::tracker::{HitCounts, TrackerAllocator};

pub use file::{
    sidecar_path, CharCover, CoveredFile, FileCoverage, NodeCoverage, AST_SUFFIX, HITS_SUFFIX,
};
pub use summary::{grades, CoverageSummary, TagCount};

/// Registry of covered files for one run.
pub struct Coverage {
    config: Config,
    /// Sorted files of the whole project; fixes file indices.
    project_files: Vec<PathBuf>,
    /// Covered files keyed by path, plus their registration order.
    files: RwLock<Registry>,
}

#[derive(Default)]
struct Registry {
    by_path: HashMap<PathBuf, Arc<CoveredFile>>,
    order: Vec<PathBuf>,
    /// Registered files missing from the project file list.
    unlisted: usize,
}

impl Coverage {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            project_files: Vec::new(),
            files: RwLock::new(Registry::default()),
        }
    }

    /// Number files by their position in `files` instead of by registration.
    pub fn with_project_files(mut self, mut files: Vec<PathBuf>) -> Self {
        files.sort();
        files.dedup();
        self.project_files = files;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cover a file on disk, reading its syntax tree from the sidecar dump.
    ///
    /// Returns the cached file if it was covered before.
    pub fn cover_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<Arc<CoveredFile>> {
        let path = path.as_ref();
        if let Some(file) = self.file(path)? {
            return Ok(file);
        }
        self.register(path, |allocator| CoveredFile::load(path, allocator))
    }

    /// Cover in-memory source with an already parsed tree.
    pub fn cover_source<P: AsRef<Path>>(
        &self,
        path: P,
        source: &str,
        syntax: Option<&SyntaxNode>,
    ) -> anyhow::Result<Arc<CoveredFile>> {
        let path = path.as_ref();
        if let Some(file) = self.file(path)? {
            return Ok(file);
        }
        self.register(path, |allocator| {
            Ok(CoveredFile::new(path, source, syntax, allocator)?)
        })
    }

    fn register<F>(&self, path: &Path, build: F) -> anyhow::Result<Arc<CoveredFile>>
    where
        F: FnOnce(TrackerAllocator) -> anyhow::Result<CoveredFile>,
    {
        let mut registry = self
            .files
            .write()
            .map_err(|_| anyhow::anyhow!("coverage registry lock poisoned"))?;
        // Another caller may have registered it meanwhile.
        if let Some(file) = registry.by_path.get(path) {
            return Ok(Arc::clone(file));
        }

        let index = match self.project_files.binary_search_by(|p| p.as_path().cmp(path)) {
            Ok(position) => position,
            Err(_) => {
                registry.unlisted += 1;
                self.project_files.len() + registry.unlisted - 1
            }
        };
        let allocator = TrackerAllocator::with_global(self.config.tracker_global.clone(), index);
        let file = Arc::new(build(allocator)?);
        info!(
            path = %path.display(),
            index,
            nodes = file.tree().len(),
            "covered file"
        );
        registry.order.push(path.to_path_buf());
        registry.by_path.insert(path.to_path_buf(), Arc::clone(&file));
        Ok(file)
    }

    /// Get a covered file. Returns None if it hasn't been covered yet.
    pub fn file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<Option<Arc<CoveredFile>>> {
        let registry = self
            .files
            .read()
            .map_err(|_| anyhow::anyhow!("coverage registry lock poisoned"))?;
        Ok(registry.by_path.get(path.as_ref()).cloned())
    }

    /// Covered paths in registration order.
    pub fn covered_files(&self) -> Vec<PathBuf> {
        self.files
            .read()
            .map(|r| r.order.clone())
            .unwrap_or_default()
    }

    /// Instrumented source of a covered file.
    pub fn instrument<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<String> {
        let file = self.cover_file(path)?;
        Ok(file.instrumented_source(&self.config.local_prefix)?)
    }

    /// Analyze one file against the hit counts dumped next to it.
    ///
    /// A missing hits file means the instrumented file never ran.
    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<FileCoverage> {
        let path = path.as_ref();
        let file = self.cover_file(path)?;
        let hits_path = sidecar_path(path, HITS_SUFFIX);
        let hits = if hits_path.exists() {
            HitCounts::load(&hits_path)?
        } else {
            warn!(path = %hits_path.display(), "no hit counts, treating file as never run");
            HitCounts::new()
        };
        file.analyze(&hits, &self.config).map_err(|e| {
            anyhow::anyhow!("internal error analyzing {}: {}", path.display(), e)
        })
    }

    /// Analyze several files in parallel.
    ///
    /// Files are registered first, in the given order, so file indices
    /// stay stable. Results keep the input order.
    pub fn analyze_files_parallel(
        &self,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, anyhow::Result<FileCoverage>)> {
        use rayon::prelude::*;

        let registered: Vec<_> = paths.iter().map(|p| self.cover_file(p)).collect();
        paths
            .par_iter()
            .zip(registered.into_par_iter())
            .map(|(path, covered)| {
                let result = covered.and_then(|_| self.analyze_file(path));
                (path.clone(), result)
            })
            .collect()
    }

    /// Forget every covered file.
    pub fn clear(&self) {
        if let Ok(mut registry) = self.files.write() {
            *registry = Registry::default();
        }
    }
}
