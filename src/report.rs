//! Output formatting for coverage results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output with annotated source
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::Serialize;

use crate::coverage::{CharCover, CoverageSummary, FileCoverage};

/// Label in front of the reported path in the pretty header.
const HEADER_LABEL: &str = "Coverage for: ";

/// One file to report: its source text and derived coverage.
#[derive(Clone, Copy)]
pub struct ReportEntry<'a> {
    pub source: &'a str,
    pub coverage: &'a FileCoverage,
}

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: String,
    pub path: String,
    pub files: Vec<JsonFile<'a>>,
    pub summary: &'a CoverageSummary,
}

#[derive(Serialize)]
pub struct JsonFile<'a> {
    #[serde(flatten)]
    pub coverage: &'a FileCoverage,
    pub uncovered_lines: Vec<usize>,
}

/// Build the JSON report structure.
pub fn json_report<'a>(
    path: &str,
    entries: &[ReportEntry<'a>],
    summary: &'a CoverageSummary,
) -> JsonReport<'a> {
    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: path.to_string(),
        files: entries
            .iter()
            .map(|e| JsonFile {
                coverage: e.coverage,
                uncovered_lines: e.coverage.uncovered_lines(),
            })
            .collect(),
        summary,
    }
}

/// Write results in JSON format.
pub fn write_json(
    path: &str,
    entries: &[ReportEntry<'_>],
    summary: &CoverageSummary,
) -> anyhow::Result<()> {
    let report = json_report(path, entries, summary);
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Annotated source
// =============================================================================

/// Gutter of an annotated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gutter {
    /// Nothing executable starts on the line.
    Blank,
    /// The line's code never ran.
    Missed,
    Count(u64),
}

/// A source line with its coverage marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedLine<'s> {
    pub gutter: Gutter,
    pub text: &'s str,
    /// `x` under every never-executed byte, when the line ran only partly.
    pub markers: Option<String>,
}

pub fn annotate<'s>(source: &'s str, coverage: &FileCoverage) -> Vec<AnnotatedLine<'s>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for (i, text) in source.split('\n').enumerate() {
        let gutter = match coverage.lines.get(i).copied().flatten() {
            None => Gutter::Blank,
            Some(0) => Gutter::Missed,
            Some(n) => Gutter::Count(n),
        };
        let marks: String = (0..text.len())
            .map(|col| match coverage.chars.get(offset + col) {
                Some(CharCover::NotExecuted) => 'x',
                _ => ' ',
            })
            .collect();
        let markers = (gutter != Gutter::Missed && marks.contains('x'))
            .then(|| marks.trim_end().to_string());
        lines.push(AnnotatedLine {
            gutter,
            text,
            markers,
        });
        offset += text.len() + 1;
    }
    lines
}

fn gutter_text(gutter: &Gutter) -> String {
    match gutter {
        Gutter::Blank => String::new(),
        Gutter::Missed => "#>X".to_string(),
        Gutter::Count(n) => n.to_string(),
    }
}

/// Plain-text annotated source.
pub fn render_annotated(source: &str, coverage: &FileCoverage) -> String {
    let mut out = String::new();
    for line in annotate(source, coverage) {
        out.push_str(&format!("{:>5} | {}\n", gutter_text(&line.gutter), line.text));
        if let Some(markers) = &line.markers {
            out.push_str(&format!("{:>5} | {}\n", "", markers));
        }
    }
    out
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty(
    path: &str,
    entries: &[ReportEntry<'_>],
    summary: &CoverageSummary,
    show_source: bool,
) {
    // Header
    println!();
    print!("  ");
    print!("{}", "deepcover".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", HEADER_LABEL.dimmed());
    println!("{}", path);
    println!();

    write_result_summary(summary);
    println!();

    if !entries.is_empty() {
        write_files(entries, show_source);
    }

    if !summary.breakdown.is_empty() {
        write_breakdown(summary);
        println!();
    }

    write_final_status(summary);
    println!();
}

fn write_result_summary(summary: &CoverageSummary) {
    if summary.passed {
        print!("  {}", "✓ PASS".green());
    } else {
        print!("  {}", "✗ FAIL".red());
    }

    print!("  Coverage: ");
    write_colored_percent(summary.percent);
    print!("%  Grade: ");
    write_colored_grade(&summary.grade);
    print!(
        "  {}",
        format!("({}/{} nodes)", summary.executed, summary.executable).dimmed()
    );
    println!();
}

fn write_colored_percent(p: f64) {
    let s = format!("{:.1}", p);
    match p {
        p if p >= 90.0 => print!("{}", s.green().bold()),
        p if p >= 75.0 => print!("{}", s.green()),
        p if p >= 50.0 => print!("{}", s.yellow()),
        p if p >= 25.0 => print!("{}", s.yellow().bold()),
        _ => print!("{}", s.red()),
    }
}

fn write_colored_grade(grade: &str) {
    match grade {
        "A" => print!("{}", grade.green().bold()),
        "B" => print!("{}", grade.green()),
        "C" => print!("{}", grade.yellow()),
        "D" => print!("{}", grade.yellow().bold()),
        _ => print!("{}", grade.red()),
    }
}

fn write_files(entries: &[ReportEntry<'_>], show_source: bool) {
    println!("  {} ({}):", "Files".bold(), entries.len());
    println!();

    for entry in entries {
        let coverage = entry.coverage;
        print!("    ");
        write_colored_percent(coverage.summary.percent);
        print!("%  {}", coverage.path.blue());
        let uncovered = coverage.uncovered_lines();
        if !uncovered.is_empty() {
            let listed: Vec<String> = uncovered.iter().map(|l| l.to_string()).collect();
            print!("  {}", format!("uncovered: {}", listed.join(",")).dimmed());
        }
        println!();

        if show_source {
            println!();
            write_annotated(entry.source, coverage);
        }
        println!();
    }
}

fn write_annotated(source: &str, coverage: &FileCoverage) {
    for line in annotate(source, coverage) {
        let gutter = format!("{:>5}", gutter_text(&line.gutter));
        let gutter = match line.gutter {
            Gutter::Blank => gutter.normal(),
            Gutter::Missed => gutter.red().bold(),
            Gutter::Count(_) => gutter.green(),
        };
        println!("    {} {} {}", gutter, "|".dimmed(), line.text);
        if let Some(markers) = &line.markers {
            println!("    {:>5} {} {}", "", "|".dimmed(), markers.red());
        }
    }
}

fn write_breakdown(summary: &CoverageSummary) {
    println!("  {}", "Breakdown:".bold());

    // Most missed first
    let mut tags: Vec<_> = summary.breakdown.iter().collect();
    tags.sort_by(|a, b| {
        let missed_a = a.1.executable - a.1.executed;
        let missed_b = b.1.executable - b.1.executed;
        missed_b.cmp(&missed_a).then_with(|| a.0.cmp(b.0))
    });

    for (tag, count) in tags {
        println!(
            "    {:<20} {:>5}/{:<5} executed",
            tag, count.executed, count.executable
        );
    }
}

fn write_final_status(summary: &CoverageSummary) {
    match summary.threshold {
        Some(t) => print!("  {}", format!("Threshold: {}", t).dimmed()),
        None => print!("  {}", "Threshold: none".dimmed()),
    }
    print!("  Missed: {}", summary.missed());
    print!("  ");

    if summary.passed {
        print!("{}", "PASSED".green());
    } else {
        print!("{}", "FAILED".red());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn coverage(lines: Vec<Option<u64>>, chars: Vec<CharCover>) -> FileCoverage {
        FileCoverage {
            path: "a.rb".to_string(),
            nodes: Vec::new(),
            lines,
            chars,
            summary: CoverageSummary {
                executable: 0,
                executed: 0,
                percent: 100.0,
                grade: "A".to_string(),
                breakdown: BTreeMap::new(),
                passed: true,
                threshold: None,
            },
        }
    }

    #[test]
    fn test_header_names_the_covered_path() {
        assert_eq!(HEADER_LABEL.trim_end(), "Coverage for:");
    }

    #[test]
    fn test_render_annotated() {
        use CharCover::*;
        let source = "x = 1\ny if z\nw";
        let mut chars = vec![Executed; source.len()];
        chars[1] = Ignored;
        chars[3] = Ignored;
        chars[5] = Ignored;
        chars[6] = NotExecuted;
        chars[7] = Ignored;
        chars[10] = Ignored;
        let cov = coverage(vec![Some(1), Some(1), Some(0)], chars);

        assert_eq!(
            render_annotated(source, &cov),
            "    1 | x = 1\n    1 | y if z\n      | x\n  #>X | w\n"
        );
    }

    #[test]
    fn test_blank_gutter_for_non_executable_lines() {
        let cov = coverage(vec![None, Some(2)], vec![CharCover::Ignored; 4]);
        let lines = annotate("end\n", &cov);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].gutter, Gutter::Blank);
        assert_eq!(lines[1].gutter, Gutter::Count(2));
        assert!(lines[0].markers.is_none());
    }

    #[test]
    fn test_json_report_lists_uncovered_lines() {
        let cov = coverage(vec![Some(1), Some(0)], vec![]);
        let entries = [ReportEntry {
            source: "a\nb",
            coverage: &cov,
        }];
        let report = json_report("lib", &entries, &cov.summary);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["path"], "lib");
        assert_eq!(value["files"][0]["path"], "a.rb");
        assert_eq!(value["files"][0]["uncovered_lines"][0], 2);
        assert_eq!(value["summary"]["grade"], "A");
    }
}
