//! Invariant checks over a single run archive.
//!
//! Every check runs regardless of earlier failures. An artifact that is absent
//! from the archive fails the presence checks that need it. One that is present
//! but does not parse makes its checks [`CheckStatus::Unknown`] instead of
//! aborting the audit.

use anyhow::Result;
use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

use fluxaudit_contracts::EPOCH_TIMESTAMP;

use crate::archive::Archive;
use crate::config::{ArtifactRole, AuditConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    DefaultEpochTimestamp,
    SeedMismatch,
    MissingKey,
    MissingSeedField,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::DefaultEpochTimestamp => "default-epoch-timestamp",
            ViolationKind::SeedMismatch => "seed-mismatch",
            ViolationKind::MissingKey => "missing-key",
            ViolationKind::MissingSeedField => "missing-seed-field",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    pub kind: ViolationKind,
    /// `<artifact path>#<json pointer>` for each offending location.
    pub paths: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckId {
    Timestamp,
    SeedConsistency,
    SeedPresence,
    KeyCompleteness,
}

impl CheckId {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckId::Timestamp => "timestamp",
            CheckId::SeedConsistency => "seed-consistency",
            CheckId::SeedPresence => "seed-presence",
            CheckId::KeyCompleteness => "key-completeness",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub check: CheckId,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocatedArtifact {
    pub role: ArtifactRole,
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub archive: String,
    pub artifacts: Vec<LocatedArtifact>,
    pub checks: Vec<CheckOutcome>,
    pub violations: Vec<InvariantViolation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_unknown(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Unknown)
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

/// A located artifact whose JSON may or may not be usable.
enum Doc<'a> {
    /// No archive path matched the role's glob.
    Missing(String),
    Unparsed(String),
    Parsed { path: &'a str, json: &'a Value },
}

impl Doc<'_> {
    fn why_unknown(&self, role: ArtifactRole) -> String {
        match self {
            Doc::Missing(glob) => format!("{} artifact not found ({glob})", role.as_str()),
            Doc::Unparsed(err) => format!("{} artifact does not parse: {err}", role.as_str()),
            Doc::Parsed { .. } => String::new(),
        }
    }
}

struct Located<'a> {
    located: LocatedArtifact,
    doc: Doc<'a>,
}

fn locate<'a>(archive: &'a Archive, cfg: &AuditConfig, role: ArtifactRole) -> Result<Located<'a>> {
    let matcher = cfg.artifact_matcher(role)?;
    let Some((path, rec)) = archive.iter().find(|(p, _)| matcher.is_match(p)) else {
        return Ok(Located {
            located: LocatedArtifact {
                role,
                path: None,
                parse_error: None,
            },
            doc: Doc::Missing(matcher.glob().glob().to_string()),
        });
    };
    let doc = match &rec.json {
        Some(json) => Doc::Parsed { path, json },
        None => Doc::Unparsed(
            rec.json_error
                .clone()
                .unwrap_or_else(|| "not a JSON document".to_string()),
        ),
    };
    let parse_error = match &doc {
        Doc::Unparsed(e) => Some(e.clone()),
        _ => None,
    };
    Ok(Located {
        located: LocatedArtifact {
            role,
            path: Some(path.to_string()),
            parse_error,
        },
        doc,
    })
}

fn first_pointer<'v>(json: &'v Value, pointers: &[String]) -> Option<(&'v Value, String)> {
    pointers
        .iter()
        .find_map(|p| json.pointer(p).filter(|v| !v.is_null()).map(|v| (v, p.clone())))
}

/// Runs every check against `archive`.
///
/// Errors only on invalid configuration (for example a malformed glob).
pub fn audit_archive(archive: &Archive, cfg: &AuditConfig) -> Result<AuditReport> {
    let summary = locate(archive, cfg, ArtifactRole::Summary)?;
    let mark = locate(archive, cfg, ArtifactRole::Mark)?;

    let mut checks = Vec::new();
    let mut violations = Vec::new();

    checks.push(check_timestamp(&summary.doc, cfg, &mut violations));
    checks.push(check_seed_consistency(&summary.doc, &mark.doc, cfg, &mut violations));
    checks.push(check_seed_presence(&summary.doc, &mark.doc, cfg, &mut violations));
    checks.push(check_key_completeness(&summary.doc, cfg, &mut violations));

    for v in &violations {
        tracing::info!(kind = v.kind.as_str(), paths = ?v.paths, "invariant violation");
    }

    Ok(AuditReport {
        archive: archive.label.clone(),
        artifacts: vec![summary.located, mark.located],
        checks,
        violations,
    })
}

fn outcome(check: CheckId, status: CheckStatus, note: Option<String>) -> CheckOutcome {
    CheckOutcome {
        check,
        status,
        note,
    }
}

fn check_timestamp(
    summary: &Doc<'_>,
    cfg: &AuditConfig,
    out: &mut Vec<InvariantViolation>,
) -> CheckOutcome {
    let Doc::Parsed { path, json } = summary else {
        return outcome(
            CheckId::Timestamp,
            CheckStatus::Unknown,
            Some(summary.why_unknown(ArtifactRole::Summary)),
        );
    };
    let Some((value, ptr)) = first_pointer(json, &cfg.generated_at_pointers) else {
        return outcome(
            CheckId::Timestamp,
            CheckStatus::Unknown,
            Some("generated-at field not present".to_string()),
        );
    };
    let Some(ts) = value.as_str() else {
        return outcome(
            CheckId::Timestamp,
            CheckStatus::Unknown,
            Some(format!("generated-at field is not a string: {value}")),
        );
    };
    if !is_epoch(ts) {
        return outcome(CheckId::Timestamp, CheckStatus::Pass, None);
    }
    out.push(InvariantViolation {
        kind: ViolationKind::DefaultEpochTimestamp,
        paths: vec![format!("{path}#{ptr}")],
        message: format!("{ptr} is the Unix epoch ({ts}); the capture time was never set"),
    });
    outcome(CheckId::Timestamp, CheckStatus::Fail, None)
}

fn is_epoch(ts: &str) -> bool {
    if ts == EPOCH_TIMESTAMP {
        return true;
    }
    DateTime::parse_from_rfc3339(ts).is_ok_and(|t| t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0)
}

fn seed_of<'v>(doc: &Doc<'v>, cfg: &AuditConfig, role: ArtifactRole) -> Option<(&'v str, &'v Value, String)> {
    let Doc::Parsed { path, json } = *doc else {
        return None;
    };
    first_pointer(json, cfg.seed_pointers(role)).map(|(v, ptr)| (path, v, ptr))
}

/// Seeds compare by scalar text, so `42` and `"42"` agree.
fn seed_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn check_seed_consistency(
    summary: &Doc<'_>,
    mark: &Doc<'_>,
    cfg: &AuditConfig,
    out: &mut Vec<InvariantViolation>,
) -> CheckOutcome {
    for (doc, role) in [(summary, ArtifactRole::Summary), (mark, ArtifactRole::Mark)] {
        if !matches!(doc, Doc::Parsed { .. }) {
            return outcome(
                CheckId::SeedConsistency,
                CheckStatus::Unknown,
                Some(doc.why_unknown(role)),
            );
        }
    }
    let (Some((s_path, s_val, s_ptr)), Some((m_path, m_val, m_ptr))) = (
        seed_of(summary, cfg, ArtifactRole::Summary),
        seed_of(mark, cfg, ArtifactRole::Mark),
    ) else {
        return outcome(
            CheckId::SeedConsistency,
            CheckStatus::Unknown,
            Some("effective seed not present in both artifacts".to_string()),
        );
    };
    if seed_text(s_val) == seed_text(m_val) {
        return outcome(CheckId::SeedConsistency, CheckStatus::Pass, None);
    }
    out.push(InvariantViolation {
        kind: ViolationKind::SeedMismatch,
        paths: vec![format!("{s_path}#{s_ptr}"), format!("{m_path}#{m_ptr}")],
        message: format!("summary seed {s_val} does not match mark seed {m_val}"),
    });
    outcome(CheckId::SeedConsistency, CheckStatus::Fail, None)
}

fn check_seed_presence(
    summary: &Doc<'_>,
    mark: &Doc<'_>,
    cfg: &AuditConfig,
    out: &mut Vec<InvariantViolation>,
) -> CheckOutcome {
    let mut failed = false;
    let mut unknown = Vec::new();
    for role in &cfg.seed_required {
        let doc = match role {
            ArtifactRole::Summary => summary,
            ArtifactRole::Mark => mark,
        };
        let path = match doc {
            Doc::Parsed { path, .. } => *path,
            Doc::Missing(glob) => {
                failed = true;
                out.push(InvariantViolation {
                    kind: ViolationKind::MissingSeedField,
                    paths: vec![glob.clone()],
                    message: format!(
                        "{} artifact not found (no archive path matches {glob}), so it carries no seed",
                        role.as_str()
                    ),
                });
                continue;
            }
            Doc::Unparsed(_) => {
                unknown.push(doc.why_unknown(*role));
                continue;
            }
        };
        if seed_of(doc, cfg, *role).is_none() {
            failed = true;
            out.push(InvariantViolation {
                kind: ViolationKind::MissingSeedField,
                paths: vec![path.to_string()],
                message: format!(
                    "{} artifact has no effective seed (looked at {})",
                    role.as_str(),
                    cfg.seed_pointers(*role).join(", ")
                ),
            });
        }
    }
    let note = (!unknown.is_empty()).then(|| unknown.join("; "));
    let status = if failed {
        CheckStatus::Fail
    } else if note.is_some() {
        CheckStatus::Unknown
    } else {
        CheckStatus::Pass
    };
    outcome(CheckId::SeedPresence, status, note)
}

fn check_key_completeness(
    summary: &Doc<'_>,
    cfg: &AuditConfig,
    out: &mut Vec<InvariantViolation>,
) -> CheckOutcome {
    if let Doc::Missing(glob) = summary {
        for key in &cfg.expected_keys {
            out.push(InvariantViolation {
                kind: ViolationKind::MissingKey,
                paths: vec![format!("{glob}#/{}", crate::util::escape_json_pointer(key))],
                message: format!("summary artifact not found, so expected key {key:?} is missing"),
            });
        }
        let status = if cfg.expected_keys.is_empty() {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        };
        return outcome(
            CheckId::KeyCompleteness,
            status,
            Some(summary.why_unknown(ArtifactRole::Summary)),
        );
    }
    let Doc::Parsed { path, json } = summary else {
        return outcome(
            CheckId::KeyCompleteness,
            CheckStatus::Unknown,
            Some(summary.why_unknown(ArtifactRole::Summary)),
        );
    };
    let Some(obj) = json.as_object() else {
        return outcome(
            CheckId::KeyCompleteness,
            CheckStatus::Unknown,
            Some("summary is not a JSON object".to_string()),
        );
    };
    let before = out.len();
    for key in &cfg.expected_keys {
        if !obj.contains_key(key) {
            out.push(InvariantViolation {
                kind: ViolationKind::MissingKey,
                paths: vec![format!("{path}#/{}", crate::util::escape_json_pointer(key))],
                message: format!("summary is missing expected key {key:?}"),
            });
        }
    }
    let status = if out.len() > before {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    };
    outcome(CheckId::KeyCompleteness, status, None)
}
