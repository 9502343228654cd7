use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const DESIGN: &str = "\
module counter #(parameter W = 4) (
  input  logic         clk,
  input  logic         en,
  input  logic [W-1:0] d,
  output logic [W-1:0] q
);
  logic [W-1:0] next;
  assign next = en ? d : q;
  always_ff @(posedge clk) begin
    if (en) q <= next;
  end
endmodule
";

fn get_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_papercut"))
}

fn write_design(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("counter.sv");
    fs::write(&path, contents).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(get_binary_path())
        .args(args)
        .output()
        .expect("Failed to execute papercut")
}

#[test]
fn test_generates_candidates_without_verification() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_design(dir.path(), DESIGN);
    let out = dir.path().join("outputs");

    let output = run(&[
        input.to_str().unwrap(),
        "-s",
        "-i",
        "-t",
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    for file in [
        "counter_concretized.sv",
        "counter_bitshrink0.sv",
        "counter_if1.sv",
        "counter_if2.sv",
        "counter_ternary3.sv",
        "counter_ternary4.sv",
        "counter_muxed.sv",
    ] {
        assert!(out.join(file).exists(), "missing {}", file);
    }
    let muxed = fs::read_to_string(out.join("counter_muxed.sv")).unwrap();
    assert!(muxed.contains("module counter_muxed"));
    assert!(muxed.contains("(input logic pc_sel0, pc_sel1, pc_sel2, pc_sel3, pc_sel4, "));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Candidates: 5"));
}

#[test]
fn test_failing_prover_keeps_the_design() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_design(dir.path(), DESIGN);
    let out = dir.path().join("outputs");

    let prover = "echo checking {wrapper}; exit 1";
    let output = run(&[
        input.to_str().unwrap(),
        "-t",
        "-e",
        "-j",
        "2",
        "--prover-cmd",
        prover,
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let results = fs::read_to_string(out.join("equivalence_results.txt")).unwrap();
    assert_eq!(
        results,
        "counter_ternary0_wrapper: FAIL\ncounter_ternary1_wrapper: FAIL\ncounter_muxed_wrapper: FAIL\n"
    );
    assert!(out.join("counter_ternary0_wrapper.sv").exists());
    assert!(out.join("counter_ternary0_wrapper.tcl").exists());
    let log = fs::read_to_string(out.join("counter_ternary1_wrapper_output.log")).unwrap();
    assert_eq!(log, "checking counter_ternary1_wrapper\n");

    let consolidated = fs::read_to_string(out.join("counter_consolidated.sv")).unwrap();
    assert!(consolidated.contains("assign next = en ? d : q;"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("equivalence_results.json")).unwrap())
            .unwrap();
    assert_eq!(report["module"], "counter");
    assert_eq!(report["runs"].as_array().unwrap().len(), 3);
}

#[test]
fn test_passing_branch_is_consolidated() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_design(dir.path(), DESIGN);
    let out = dir.path().join("outputs");

    let prover = "case {wrapper} in counter_ternary0_wrapper|counter_consolidated_wrapper) exit 0;; *) exit 1;; esac";
    let output = run(&[
        input.to_str().unwrap(),
        "-t",
        "-e",
        "-a",
        "--prover-cmd",
        prover,
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let consolidated = fs::read_to_string(out.join("counter_consolidated.sv")).unwrap();
    assert!(consolidated.contains("module counter_consolidated"));
    assert!(consolidated.contains("assign next = d;"));
    let results = fs::read_to_string(out.join("equivalence_results.txt")).unwrap();
    assert!(results.ends_with("counter_consolidated_wrapper: PASS\n"));
}

#[test]
fn test_parse_error_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_design(dir.path(), "module broken(input logic a)\n  assign a = ;\nendmodule\n");
    let out = dir.path().join("outputs");
    let output = run(&[input.to_str().unwrap(), "-t", "-o", out.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line"), "stderr: {}", stderr);
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&[dir.path().join("absent.sv").to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read"));
}
