//! Command-line interface for deepcover.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::coverage::{sidecar_path, Coverage, CoverageSummary, AST_SUFFIX};
use crate::report::{self, ReportEntry};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Extension of the source files deepcover covers.
const SOURCE_EXTENSION: &str = "rb";

/// Fine-grained execution coverage through source rewriting.
///
/// deepcover reads a parsed syntax tree dumped next to every source file
/// (`foo.rb.ast.json`), rewrites the source with counting probes, and after
/// the instrumented program has run turns the hit counts it left
/// (`foo.rb.hits.json`) into per-node, per-line and per-character coverage.
#[derive(Parser)]
#[command(name = "deepcover")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log debug details to stderr (DEEPCOVER_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rewrite source files with coverage probes
    Instrument(InstrumentArgs),
    /// Report coverage from collected hit counts
    #[command(visible_alias = "check")]
    Report(ReportArgs),
}

/// Arguments for the instrument command.
#[derive(Parser)]
pub struct InstrumentArgs {
    /// Path to instrument (file or directory)
    pub path: PathBuf,

    /// Directory for instrumented files (default: stdout for a single file)
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Project root whose file list fixes every file's tracker row
    /// (default: current directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the report command.
#[derive(Parser)]
pub struct ReportArgs {
    /// Path to report on (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Minimum executed percentage (exit non-zero below it)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Print every file's source annotated with coverage
    #[arg(long)]
    pub show_source: bool,
}

/// Collect source files that have a dumped syntax tree.
pub fn collect_files(root: &Path, config: &Config) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            // Skip hidden directories
            !(e.depth() > 0 && e.file_type().is_dir() && name.starts_with('.'))
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != SOURCE_EXTENSION {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if config.is_path_excluded(relative) {
            continue;
        }
        if !sidecar_path(path, AST_SUFFIX).exists() {
            info!(path = %path.display(), "skipping file without syntax tree");
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Config, resolved path and the files under it.
fn prepare(path: &Path, config: Option<&Path>) -> anyhow::Result<(Config, PathBuf, Vec<PathBuf>)> {
    let config = Config::load(config, Path::new("."))?;
    let abs_path = path
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("cannot access path {:?}: {}", path, e))?;
    let files = if fs::metadata(&abs_path)?.is_dir() {
        collect_files(&abs_path, &config)?
    } else {
        vec![abs_path.clone()]
    };
    Ok((config, abs_path, files))
}

/// Every covered file under the project root, in index order.
///
/// Falls back to `files` when `target` lies outside the root.
fn project_files(
    root: Option<&Path>,
    target: &Path,
    files: &[PathBuf],
    config: &Config,
) -> anyhow::Result<Vec<PathBuf>> {
    let root = root.unwrap_or(Path::new("."));
    let root = root
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("cannot access project root {:?}: {}", root, e))?;
    if !target.starts_with(&root) {
        warn!(
            root = %root.display(),
            target = %target.display(),
            "target outside project root, numbering its files on their own"
        );
        return Ok(files.to_vec());
    }
    collect_files(&root, config)
}

/// Run the instrument command.
pub fn run_instrument(args: &InstrumentArgs) -> anyhow::Result<i32> {
    let (config, abs_path, files) = match prepare(&args.path, args.config.as_deref()) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    if files.is_empty() {
        eprintln!("Warning: no files to instrument");
        return Ok(EXIT_SUCCESS);
    }
    if args.out_dir.is_none() && files.len() > 1 {
        eprintln!("Error: --out-dir is required when instrumenting a directory");
        return Ok(EXIT_ERROR);
    }

    let project = match project_files(args.root.as_deref(), &abs_path, &files, &config) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    let coverage = Coverage::new(config).with_project_files(project);
    for file in &files {
        let instrumented = match coverage.instrument(file) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error: {}: {}", file.display(), e);
                return Ok(EXIT_ERROR);
            }
        };

        match &args.out_dir {
            Some(out_dir) => {
                let base = if abs_path.is_dir() {
                    abs_path.as_path()
                } else {
                    abs_path.parent().unwrap_or(Path::new(""))
                };
                let target = out_dir.join(file.strip_prefix(base).unwrap_or(file));
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, instrumented)?;
                info!(source = %file.display(), target = %target.display(), "instrumented");
            }
            None => println!("{}", instrumented),
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Run the report command.
pub fn run_report(args: &ReportArgs) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let (config, _, files) = match prepare(&args.path, args.config.as_deref()) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    if files.is_empty() {
        eprintln!("Warning: no files to report");
        return Ok(EXIT_SUCCESS);
    }

    let threshold = args.threshold.or(config.threshold);
    let coverage = Coverage::new(config);
    let mut results = Vec::with_capacity(files.len());
    for (path, result) in coverage.analyze_files_parallel(&files) {
        match result {
            Ok(file_coverage) => results.push(file_coverage),
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    let sources: Vec<_> = files
        .iter()
        .map(|p| coverage.file(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let entries: Vec<ReportEntry<'_>> = sources
        .iter()
        .zip(&results)
        .filter_map(|(file, result)| {
            file.as_ref().map(|f| ReportEntry {
                source: f.source(),
                coverage: result,
            })
        })
        .collect();
    let summary = CoverageSummary::merge(results.iter().map(|r| &r.summary), threshold);

    let path_str = args.path.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_json(&path_str, &entries, &summary)?,
        _ => report::write_pretty(&path_str, &entries, &summary, args.show_source),
    }

    if summary.passed {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_files_needs_syntax_tree() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path().join("lib");
        let vendor = temp.path().join("vendor");
        fs::create_dir_all(&lib).unwrap();
        fs::create_dir_all(&vendor).unwrap();
        for dir in [&lib, &vendor] {
            let path = dir.join("a.rb");
            fs::write(&path, "").unwrap();
            fs::write(sidecar_path(&path, AST_SUFFIX), "null").unwrap();
        }
        fs::write(lib.join("b.rb"), "").unwrap();
        fs::write(lib.join("c.py"), "").unwrap();

        let config = Config {
            excluded_paths: vec!["vendor/**".to_string()],
            ..Config::default()
        };
        let files = collect_files(temp.path(), &config).unwrap();
        assert_eq!(files, vec![lib.join("a.rb")]);

        let files = collect_files(temp.path(), &Config::default()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["deepcover", "report", "lib", "--format", "json", "-t", "80"]);
        match cli.command {
            Commands::Report(args) => {
                assert_eq!(args.format, "json");
                assert_eq!(args.threshold, Some(80.0));
            }
            _ => panic!("expected report"),
        }
        let cli = Cli::parse_from(["deepcover", "-v", "instrument", "a.rb"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Instrument(_)));
    }
}
