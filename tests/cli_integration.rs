//! Integration tests for the instrument and report commands.

use std::fs;
use std::path::{Path, PathBuf};

use deepcover::cli::{
    run_instrument, run_report, InstrumentArgs, ReportArgs, EXIT_ERROR, EXIT_FAILED, EXIT_SUCCESS,
};
use deepcover::coverage::{sidecar_path, AST_SUFFIX, HITS_SUFFIX};
use deepcover::syntax::{Atom, Child, Span, SyntaxNode};
use tempfile::TempDir;

const SOURCE: &str = "foo(1)\nbar\n";

fn send(name: &str, args: Vec<Child>, start: usize, end: usize) -> SyntaxNode {
    let mut children = vec![
        Child::Atom(Atom::Nil),
        Child::Atom(Atom::Text(name.to_string())),
    ];
    children.extend(args);
    SyntaxNode::new("send", children).with_location(Span::from_source(SOURCE, start, end))
}

/// foo(1)
/// bar
fn program() -> SyntaxNode {
    let one = SyntaxNode::new("int", vec![Child::Atom(Atom::Int(1))])
        .with_location(Span::from_source(SOURCE, 4, 5));
    SyntaxNode::new(
        "begin",
        vec![
            Child::Node(send("foo", vec![Child::Node(one)], 0, 6)),
            Child::Node(send("bar", vec![], 7, 10)),
        ],
    )
    .with_location(Span::from_source(SOURCE, 0, 10))
}

/// Write `lib/app.rb` with its syntax tree and, if given, its hit counts.
fn project(hits: Option<&str>) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let lib = temp.path().join("lib");
    fs::create_dir_all(&lib).unwrap();
    let path = lib.join("app.rb");
    fs::write(&path, SOURCE).unwrap();
    fs::write(
        sidecar_path(&path, AST_SUFFIX),
        serde_json::to_string(&program()).unwrap(),
    )
    .unwrap();
    if let Some(hits) = hits {
        fs::write(sidecar_path(&path, HITS_SUFFIX), hits).unwrap();
    }
    (temp, lib)
}

fn report(path: &Path, format: &str, threshold: Option<f64>) -> i32 {
    let args = ReportArgs {
        path: path.to_path_buf(),
        config: None,
        format: format.to_string(),
        threshold,
        show_source: true,
    };
    run_report(&args).expect("report should run")
}

#[test]
fn test_instrument_writes_out_dir() {
    let (temp, lib) = project(None);
    let out_dir = temp.path().join("out");
    let args = InstrumentArgs {
        path: lib,
        out_dir: Some(out_dir.clone()),
        root: None,
        config: None,
    };
    assert_eq!(run_instrument(&args).unwrap(), EXIT_SUCCESS);

    let written = fs::read_to_string(out_dir.join("app.rb")).unwrap();
    assert_eq!(
        written,
        "($_dc_cov||=[])[0]||=Array.new(3,0);\
         $_dc_cov[0][0]+=1;(_dc_l2=(foo(1));$_dc_cov[0][1]+=1;_dc_l2=_dc_l2)\n\
         (_dc_l4=(bar);$_dc_cov[0][2]+=1;_dc_l4=_dc_l4)\n"
    );
}

#[test]
fn test_single_file_keeps_its_project_index() {
    let (temp, lib) = project(None);
    let second = lib.join("zz.rb");
    fs::write(&second, SOURCE).unwrap();
    fs::write(
        sidecar_path(&second, AST_SUFFIX),
        serde_json::to_string(&program()).unwrap(),
    )
    .unwrap();

    let out_dir = temp.path().join("out");
    let args = InstrumentArgs {
        path: second,
        out_dir: Some(out_dir.clone()),
        root: Some(temp.path().to_path_buf()),
        config: None,
    };
    assert_eq!(run_instrument(&args).unwrap(), EXIT_SUCCESS);

    // lib/app.rb holds row 0, so lib/zz.rb gets row 1 even when instrumented alone.
    let written = fs::read_to_string(out_dir.join("zz.rb")).unwrap();
    assert!(written.starts_with("($_dc_cov||=[])[1]||=Array.new(3,0);$_dc_cov[1][0]+=1;"));
    assert!(!written.contains("$_dc_cov[0]"));
}

#[test]
fn test_report_passes_when_everything_ran() {
    let (_temp, lib) = project(Some("[1, 1, 1]"));
    assert_eq!(report(&lib, "pretty", Some(100.0)), EXIT_SUCCESS);
    assert_eq!(report(&lib, "json", None), EXIT_SUCCESS);
}

#[test]
fn test_report_fails_below_threshold() {
    // foo raised, so bar never ran: 2 of 3 nodes executed.
    let (_temp, lib) = project(Some("[1, 0, 0]"));
    assert_eq!(report(&lib, "json", Some(80.0)), EXIT_FAILED);
    assert_eq!(report(&lib, "json", Some(60.0)), EXIT_SUCCESS);
}

#[test]
fn test_report_without_hits_counts_nothing_as_run() {
    let (_temp, lib) = project(None);
    assert_eq!(report(&lib, "pretty", Some(1.0)), EXIT_FAILED);
}

#[test]
fn test_inconsistent_hits_are_an_internal_error() {
    // bar completed more often than it was entered.
    let (_temp, lib) = project(Some("[1, 0, 1]"));
    assert_eq!(report(&lib, "json", None), EXIT_ERROR);
}

#[test]
fn test_invalid_format() {
    let (_temp, lib) = project(Some("[1, 1, 1]"));
    assert_eq!(report(&lib, "sarif", None), EXIT_ERROR);
}
