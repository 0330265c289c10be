use fluxaudit_core::audit::CheckStatus;
use fluxaudit_core::{audit_archive, Archive, AuditConfig, ViolationKind};
use serde_json::{json, Value};

const SUMMARY: &str = "full/fluxguard_summary.json";
const MARK: &str = "full/step2_voidmark/vault/voidmark_mark.json";

fn run(summary: Value, mark: Value) -> Archive {
    Archive::from_entries(
        "run",
        [
            (SUMMARY.to_string(), serde_json::to_vec(&summary).unwrap()),
            (MARK.to_string(), serde_json::to_vec(&mark).unwrap()),
        ],
    )
}

fn good_summary() -> Value {
    json!({
        "generated_at_utc": "2024-05-01T10:00:00Z",
        "dataset_rows": 1200,
        "full_chain": {"voidmark": {"seed_effective": 42, "mark": "_ci_out/full/step2_voidmark/vault/voidmark_mark.json"}}
    })
}

fn cfg_expecting_rows() -> AuditConfig {
    AuditConfig {
        expected_keys: vec!["generated_at_utc".to_string(), "dataset_rows".to_string()],
        ..AuditConfig::default()
    }
}

#[test]
fn consistent_run_is_clean() {
    let report = audit_archive(&run(good_summary(), json!({"seed": 42})), &cfg_expecting_rows()).unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
    assert!(!report.has_unknown());
    assert_eq!(report.artifacts[0].path.as_deref(), Some(SUMMARY));
    assert_eq!(report.artifacts[1].path.as_deref(), Some(MARK));
}

#[test]
fn epoch_timestamp_is_exactly_one_violation() {
    let mut summary = good_summary();
    summary["generated_at_utc"] = json!("1970-01-01T00:00:00Z");
    let report = audit_archive(&run(summary, json!({"seed": 42})), &cfg_expecting_rows()).unwrap();
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    let v = &report.violations[0];
    assert_eq!(v.kind, ViolationKind::DefaultEpochTimestamp);
    assert_eq!(v.paths, vec![format!("{SUMMARY}#/generated_at_utc")]);
}

#[test]
fn seed_mismatch_names_both_locations() {
    let report = audit_archive(&run(good_summary(), json!({"seed": 43})), &cfg_expecting_rows()).unwrap();
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    assert_eq!(report.count(ViolationKind::SeedMismatch), 1);
    assert_eq!(
        report.violations[0].paths,
        vec![
            format!("{SUMMARY}#/full_chain/voidmark/seed_effective"),
            format!("{MARK}#/seed"),
        ]
    );
}

#[test]
fn seed_spelled_as_string_still_matches() {
    let report = audit_archive(&run(good_summary(), json!({"seed_effective": "42"})), &cfg_expecting_rows()).unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
}

#[test]
fn missing_expected_key_is_one_violation() {
    let mut summary = good_summary();
    summary.as_object_mut().unwrap().remove("dataset_rows");
    let report = audit_archive(&run(summary, json!({"seed": 42})), &cfg_expecting_rows()).unwrap();
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    assert_eq!(report.violations[0].kind, ViolationKind::MissingKey);
    assert_eq!(report.violations[0].paths, vec![format!("{SUMMARY}#/dataset_rows")]);
}

#[test]
fn absent_seed_is_a_missing_seed_field() {
    let mut summary = good_summary();
    summary["full_chain"]["voidmark"]
        .as_object_mut()
        .unwrap()
        .remove("seed_effective");
    let report = audit_archive(&run(summary, json!({"seed": 42})), &cfg_expecting_rows()).unwrap();
    assert_eq!(report.count(ViolationKind::MissingSeedField), 1);
    assert_eq!(report.count(ViolationKind::SeedMismatch), 0);
    assert_eq!(report.violations[0].paths, vec![SUMMARY.to_string()]);
}

#[test]
fn independent_defects_are_all_reported() {
    let summary = json!({
        "generated_at_utc": "1970-01-01T00:00:00Z",
        "seed_effective": 1,
    });
    let report = audit_archive(&run(summary, json!({"seed": 2})), &cfg_expecting_rows()).unwrap();
    assert_eq!(report.count(ViolationKind::DefaultEpochTimestamp), 1);
    assert_eq!(report.count(ViolationKind::SeedMismatch), 1);
    assert_eq!(report.count(ViolationKind::MissingKey), 1);
    assert_eq!(report.violations.len(), 3);
}

#[test]
fn unparsable_summary_yields_unknown_checks_not_an_error() {
    let archive = Archive::from_entries(
        "run",
        [
            (SUMMARY.to_string(), b"{\"generated_at_utc\": ".to_vec()),
            (MARK.to_string(), br#"{"seed": 42}"#.to_vec()),
        ],
    );
    let report = audit_archive(&archive, &AuditConfig::default()).unwrap();
    assert!(report.is_clean());
    assert!(report.has_unknown());
    assert!(report.artifacts[0].parse_error.is_some());
    assert!(report
        .checks
        .iter()
        .all(|c| c.status == CheckStatus::Unknown));
}

#[test]
fn audit_reads_zip_archives() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("run.zip");
    let f = std::fs::File::create(&zip_path).unwrap();
    let mut z = zip::ZipWriter::new(f);
    let opts = zip::write::SimpleFileOptions::default();
    z.start_file(SUMMARY, opts).unwrap();
    z.write_all(&serde_json::to_vec(&good_summary()).unwrap()).unwrap();
    z.start_file(MARK, opts).unwrap();
    z.write_all(br#"{"seed": 43}"#).unwrap();
    z.finish().unwrap();

    let archive = Archive::open(&zip_path).unwrap();
    let report = audit_archive(&archive, &AuditConfig::default()).unwrap();
    assert_eq!(report.count(ViolationKind::SeedMismatch), 1);
}

#[test]
fn archive_without_artifacts_is_not_clean() {
    let archive = Archive::from_entries("run", [("unrelated.txt".to_string(), b"hi".to_vec())]);
    let report = audit_archive(&archive, &AuditConfig::default()).unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.count(ViolationKind::MissingSeedField), 2);
    assert_eq!(report.count(ViolationKind::MissingKey), 1);
    assert_eq!(
        report.violations[0].paths,
        vec!["**/fluxguard_summary.json".to_string()]
    );
    assert!(report.artifacts.iter().all(|a| a.path.is_none()));
}

#[test]
fn legacy_void_seed_spelling_is_accepted() {
    let summary = json!({
        "generated_at_utc": "2024-05-01T10:00:00Z",
        "full_chain": {"voidmark": {"void_seed": 11}}
    });
    let report = audit_archive(&run(summary, json!({"void_seed": 11})), &AuditConfig::default()).unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
}
