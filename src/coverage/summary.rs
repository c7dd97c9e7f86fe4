//! Coverage summaries and grading.
//!
//! A summary counts executable nodes and how many of them ran, per file
//! or across a whole run, and decides pass/fail against a threshold.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::NodeCoverage;

/// Grade thresholds, as minimum executed percentages.
pub mod grades {
    pub const A_MIN: f64 = 90.0;
    pub const B_MIN: f64 = 75.0;
    pub const C_MIN: f64 = 50.0;
    pub const D_MIN: f64 = 25.0;
}

/// Executed and executable node counts for one grammar shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub executed: usize,
    pub executable: usize,
}

/// Aggregated node coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub executable: usize,
    pub executed: usize,
    /// Executed share of executable nodes, 0-100. 100 when nothing is executable.
    pub percent: f64,
    /// Letter grade: "A" (90+), "B" (75+), "C" (50+), "D" (25+), "F"
    pub grade: String,
    /// Counts by node tag
    pub breakdown: BTreeMap<String, TagCount>,
    /// Whether percent >= threshold (always true without a threshold)
    pub passed: bool,
    pub threshold: Option<f64>,
}

impl CoverageSummary {
    /// Summarize the nodes of one file.
    pub fn from_nodes<'a>(
        nodes: impl IntoIterator<Item = &'a NodeCoverage>,
        threshold: Option<f64>,
    ) -> Self {
        let mut breakdown: BTreeMap<String, TagCount> = BTreeMap::new();
        for node in nodes {
            let Some(executed) = node.was_executed else {
                continue;
            };
            let entry = breakdown.entry(node.tag.to_string()).or_default();
            entry.executable += 1;
            if executed {
                entry.executed += 1;
            }
        }
        Self::from_breakdown(breakdown, threshold)
    }

    /// Combine several summaries, judged against `threshold`.
    pub fn merge<'a>(
        summaries: impl IntoIterator<Item = &'a CoverageSummary>,
        threshold: Option<f64>,
    ) -> Self {
        let mut breakdown: BTreeMap<String, TagCount> = BTreeMap::new();
        for summary in summaries {
            for (tag, count) in &summary.breakdown {
                let entry = breakdown.entry(tag.clone()).or_default();
                entry.executed += count.executed;
                entry.executable += count.executable;
            }
        }
        Self::from_breakdown(breakdown, threshold)
    }

    fn from_breakdown(breakdown: BTreeMap<String, TagCount>, threshold: Option<f64>) -> Self {
        let executable = breakdown.values().map(|c| c.executable).sum();
        let executed = breakdown.values().map(|c| c.executed).sum();
        let percent = calculate_percent(executed, executable);
        Self {
            executable,
            executed,
            percent,
            grade: calculate_grade(percent),
            breakdown,
            passed: threshold.map_or(true, |t| percent >= t),
            threshold,
        }
    }

    /// Number of executable nodes that never ran.
    pub fn missed(&self) -> usize {
        self.executable - self.executed
    }
}

fn calculate_percent(executed: usize, executable: usize) -> f64 {
    if executable == 0 {
        return 100.0;
    }
    executed as f64 * 100.0 / executable as f64
}

/// Determine the letter grade from an executed percentage.
fn calculate_grade(percent: f64) -> String {
    match percent {
        p if p >= grades::A_MIN => "A".to_string(),
        p if p >= grades::B_MIN => "B".to_string(),
        p if p >= grades::C_MIN => "C".to_string(),
        p if p >= grades::D_MIN => "D".to_string(),
        _ => "F".to_string(),
    }
}
