use std::path::Path;
use std::process::Command;

use fluxaudit_contracts::{
    FLUXAUDIT_AUDIT_REPORT_SCHEMA_VERSION, FLUXAUDIT_COMPARE_REPORT_SCHEMA_VERSION,
    FLUXAUDIT_PATCH_REPORT_SCHEMA_VERSION, FLUXAUDIT_REPAIR_REPORT_SCHEMA_VERSION,
};
use serde_json::Value;

fn run_fluxaudit(args: &[&str]) -> std::process::Output {
    let exe = env!("CARGO_BIN_EXE_fluxaudit");
    Command::new(exe)
        .args(args)
        .env_remove("FLUXAUDIT_LOG")
        .output()
        .expect("run fluxaudit")
}

fn parse_json_stdout(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).expect("parse stdout JSON")
}

fn write_bytes(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, bytes).expect("write file");
}

fn write_run(root: &Path, generated_at: &str, summary_seed: u64, mark_seed: u64) {
    write_bytes(
        &root.join("full/fluxguard_summary.json"),
        format!(
            r#"{{"generated_at_utc":"{generated_at}","full_chain":{{"voidmark":{{"seed_effective":{summary_seed}}}}},"drift":0.5}}"#
        )
        .as_bytes(),
    );
    write_bytes(
        &root.join("full/step2_voidmark/vault/voidmark_mark.json"),
        format!(r#"{{"seed":{mark_seed}}}"#).as_bytes(),
    );
}

fn p(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn compare_identical_runs_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write_run(&a, "2024-05-01T10:00:00Z", 42, 42);
    write_run(&b, "2024-05-01T10:00:00Z", 42, 42);

    let out = run_fluxaudit(&["compare", p(&a), p(&b)]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(String::from_utf8_lossy(&out.stdout).contains("result: identical"));
}

#[test]
fn compare_reports_numeric_drift_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write_bytes(&a.join("metrics.json"), br#"{"x": 1.000000000001, "y": 3}"#);
    write_bytes(&b.join("metrics.json"), br#"{"x": 1.0, "y": 3}"#);

    let out = run_fluxaudit(&["compare", p(&a), p(&b), "--json"]);
    assert_eq!(out.status.code(), Some(1));
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], FLUXAUDIT_COMPARE_REPORT_SCHEMA_VERSION);
    let changed = v["changed"].as_array().expect("changed[]");
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0]["path"], "metrics.json");
    let entries = changed[0]["detail"]["entries"].as_array().expect("entries[]");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["kind"], "numeric");
    assert_eq!(entries[0]["path"], "/x");
    let abs = entries[0]["abs_diff"].as_f64().expect("abs_diff");
    assert!((abs - 1e-12).abs() < 1e-15);

    let out = run_fluxaudit(&["compare", p(&a), p(&b), "--json", "--atol", "1e-9"]);
    assert_eq!(out.status.code(), Some(1));
    let v = parse_json_stdout(&out);
    assert_eq!(v["changed"][0]["detail"]["entries"], serde_json::json!([]));

    let out = run_fluxaudit(&["compare", p(&a), p(&b), "--json", "--numeric", "all"]);
    let v = parse_json_stdout(&out);
    assert_eq!(
        v["changed"][0]["detail"]["entries"].as_array().map(Vec::len),
        Some(2)
    );
}

#[test]
fn compare_text_output_caps_listings() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    std::fs::create_dir_all(&b).unwrap();
    for i in 0..5 {
        write_bytes(&a.join(format!("f{i}.txt")), b"x");
    }

    let out = run_fluxaudit(&["compare", p(&a), p(&b), "--max-listed", "2"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("  f0.txt"));
    assert!(stdout.contains("  f1.txt"));
    assert!(!stdout.contains("  f2.txt"));
    assert!(stdout.contains("... (3 more)"), "{stdout}");
}

#[test]
fn compare_exclude_drops_matching_paths() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write_bytes(&a.join("stable.json"), b"{}");
    write_bytes(&b.join("stable.json"), b"{}");
    write_bytes(&a.join("logs/run.log"), b"one");
    write_bytes(&b.join("logs/run.log"), b"two");

    let out = run_fluxaudit(&["compare", p(&a), p(&b), "--exclude", "logs/**"]);
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn compare_missing_archive_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    std::fs::create_dir_all(&a).unwrap();
    let out = run_fluxaudit(&["compare", p(&a), p(&dir.path().join("missing"))]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("archive not found"));
}

#[test]
fn audit_exit_code_tracks_violations() {
    let dir = tempfile::tempdir().unwrap();
    let clean = dir.path().join("clean");
    let bad = dir.path().join("bad");
    write_run(&clean, "2024-05-01T10:00:00Z", 42, 42);
    write_run(&bad, "1970-01-01T00:00:00Z", 42, 43);

    let out = run_fluxaudit(&["audit", p(&clean)]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stdout:\n{}",
        String::from_utf8_lossy(&out.stdout)
    );

    let out = run_fluxaudit(&["audit", p(&bad), "--json"]);
    assert_eq!(out.status.code(), Some(1));
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], FLUXAUDIT_AUDIT_REPORT_SCHEMA_VERSION);
    let kinds: Vec<&str> = v["violations"]
        .as_array()
        .expect("violations[]")
        .iter()
        .map(|x| x["kind"].as_str().expect("kind"))
        .collect();
    assert_eq!(kinds, vec!["default-epoch-timestamp", "seed-mismatch"]);
}

#[test]
fn audit_of_directory_without_artifacts_fails() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("wrong");
    write_bytes(&run.join("unrelated.txt"), b"hello");

    let out = run_fluxaudit(&["audit", p(&run)]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("summary: not found"), "{stdout}");
    assert!(!stdout.contains("result: clean"), "{stdout}");
}

#[test]
fn audit_fail_on_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("run");
    write_bytes(
        &run.join("full/fluxguard_summary.json"),
        br#"{"generated_at_utc":"2024-05-01T10:00:00Z","seed_effective":1}"#,
    );
    let cfg = dir.path().join("fluxaudit.json");
    write_bytes(
        &cfg,
        br#"{"schema_version":"fluxaudit.config@0.1.0","audit":{"seed_required":["summary"]}}"#,
    );

    let out = run_fluxaudit(&["audit", p(&run), "--config", p(&cfg)]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("UNKNOWN"));

    let out = run_fluxaudit(&["audit", p(&run), "--config", p(&cfg), "--fail-on-unknown"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn audit_rejects_foreign_config() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("run");
    write_run(&run, "2024-05-01T10:00:00Z", 1, 1);
    let cfg = dir.path().join("cfg.json");
    write_bytes(&cfg, br#"{"schema_version":"other@9"}"#);

    let out = run_fluxaudit(&["audit", p(&run), "--config", p(&cfg)]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("schema_version mismatch"));
}

#[test]
fn patch_then_patch_again_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write_bytes(
        &src.join("producer.py"),
        b"import json\n\nsummary = {\"generated_at_utc\": \"1970-01-01T00:00:00Z\"}\nprint(json.dumps(summary))\n",
    );

    let out = run_fluxaudit(&["patch", p(&src), "--json"]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], FLUXAUDIT_PATCH_REPORT_SCHEMA_VERSION);
    assert_eq!(v["files_patched"], serde_json::json!(["producer.py"]));
    assert!(src.join("producer.py.bak").is_file());

    let out = run_fluxaudit(&["patch", p(&src), "--json"]);
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    assert_eq!(v["files_patched"], serde_json::json!([]));
    for a in v["actions"].as_array().expect("actions[]") {
        assert_eq!(a["applied"], false);
    }
}

#[test]
fn repair_then_audit_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("_ci_out");
    write_run(&run, "1970-01-01T00:00:00Z", 1, 42);

    let out = run_fluxaudit(&["repair", p(&run.join("full")), "--json"]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], FLUXAUDIT_REPAIR_REPORT_SCHEMA_VERSION);
    assert_eq!(v["actions"][0]["seed_effective"], 42);

    let out = run_fluxaudit(&["audit", p(&run)]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stdout:\n{}",
        String::from_utf8_lossy(&out.stdout)
    );
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let out = run_fluxaudit(&["frobnicate"]);
    assert_eq!(out.status.code(), Some(2));
}
