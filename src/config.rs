//! Configuration for deepcover.
//!
//! Read from `deepcover.yaml` (or `.deepcover.yaml`) in the working
//! directory, or from an explicit path. Every field is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::node::DEFAULT_LOCAL_PREFIX;
use crate::tracker::DEFAULT_TRACKER_GLOBAL;

/// Default config file names to search for.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["deepcover.yaml", ".deepcover.yaml"];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global array the inserted probes increment.
    #[serde(default = "default_tracker_global")]
    pub tracker_global: String,
    /// Prefix for temporaries introduced by completion checks.
    #[serde(default = "default_local_prefix")]
    pub local_prefix: String,
    /// When false, a line holding any never-executed character is uncovered.
    #[serde(default = "default_true")]
    pub allow_partial: bool,
    /// Method names whose call sites never count as uncovered (e.g. "raise").
    #[serde(default)]
    pub ignore_uncovered: Vec<String>,
    /// Glob patterns for paths to skip when scanning directories.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    /// Minimum executed-node percentage for a passing report.
    #[serde(default)]
    pub threshold: Option<f64>,
}

fn default_tracker_global() -> String {
    DEFAULT_TRACKER_GLOBAL.to_string()
}

fn default_local_prefix() -> String {
    DEFAULT_LOCAL_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker_global: default_tracker_global(),
            local_prefix: default_local_prefix(),
            allow_partial: true,
            ignore_uncovered: Vec::new(),
            excluded_paths: Vec::new(),
            threshold: None,
        }
    }
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Find a config file in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Load the explicit config, else a discovered one, else the defaults.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        let config = match explicit.map(Path::to_path_buf).or_else(|| Self::discover(dir)) {
            Some(path) => Self::parse_file(&path)
                .map_err(|e| anyhow::anyhow!("error parsing {}: {}", path.display(), e))?,
            None => Self::default(),
        };
        validate(&config)?;
        Ok(config)
    }

    /// Check if a path should be excluded based on excluded_paths patterns.
    /// Uses globset for matching, which supports `**` for recursive directory matching.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy();

        for pattern in &self.excluded_paths {
            if let Ok(glob) = globset::Glob::new(pattern) {
                let matcher = glob.compile_matcher();
                if matcher.is_match(&*path_str) {
                    return true;
                }
            }
        }
        false
    }

    /// Whether calls to `method` are never reported as uncovered.
    pub fn ignores_method(&self, method: &str) -> bool {
        self.ignore_uncovered.iter().any(|m| m == method)
    }
}

/// Validate a config for correctness.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    let global = config.tracker_global.strip_prefix('$').unwrap_or("");
    if !is_identifier(global) {
        anyhow::bail!(
            "invalid tracker_global {:?}, must be a global variable like $_dc_cov",
            config.tracker_global
        );
    }

    if !is_identifier(&config.local_prefix)
        || config.local_prefix.starts_with(|c: char| c.is_ascii_uppercase())
    {
        anyhow::bail!(
            "invalid local_prefix {:?}, must be a lowercase identifier",
            config.local_prefix
        );
    }

    // Validate excluded_paths glob patterns compile
    for pattern in &config.excluded_paths {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    if let Some(threshold) = config.threshold {
        if !(0.0..=100.0).contains(&threshold) {
            anyhow::bail!("invalid threshold {}, must be between 0 and 100", threshold);
        }
    }

    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
