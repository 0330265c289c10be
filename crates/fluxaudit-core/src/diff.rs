//! Three-tier comparison of two run archives: manifest, content hash, and a
//! lock-step walk of JSON documents whose hashes differ.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::archive::{Archive, ArtifactRecord};
use crate::util;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location inside a JSON tree; displays as a JSON pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPath(Vec<PathSegment>);

impl KeyPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    fn child_key(&self, key: &str) -> Self {
        let mut segs = self.0.clone();
        segs.push(PathSegment::Key(key.to_string()));
        Self(segs)
    }

    fn child_index(&self, idx: usize) -> Self {
        let mut segs = self.0.clone();
        segs.push(PathSegment::Index(idx));
        Self(segs)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            match seg {
                PathSegment::Key(k) => write!(f, "/{}", util::escape_json_pointer(k))?,
                PathSegment::Index(i) => write!(f, "/{i}")?,
            }
        }
        Ok(())
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumericReportPolicy {
    /// Emit an entry only when the values differ by more than the tolerance.
    #[default]
    Unequal,
    /// Emit an entry for every numeric leaf compared.
    All,
}

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub numeric_policy: NumericReportPolicy,
    /// Absolute tolerance under [`NumericReportPolicy::Unequal`].
    pub atol: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericDiffEntry {
    pub path: KeyPath,
    pub a: f64,
    pub b: f64,
    pub abs_diff: f64,
    pub rel_diff: f64,
}

impl NumericDiffEntry {
    fn new(path: KeyPath, a: f64, b: f64) -> Self {
        let abs_diff = (a - b).abs();
        let scale = a.abs().max(b.abs());
        let rel_diff = if scale == 0.0 { 0.0 } else { abs_diff / scale };
        Self {
            path,
            a,
            b,
            abs_diff,
            rel_diff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructuralKind {
    OnlyInA,
    OnlyInB,
    TypeMismatch,
}

impl StructuralKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StructuralKind::OnlyInA => "only-in-a",
            StructuralKind::OnlyInB => "only-in-b",
            StructuralKind::TypeMismatch => "type-mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ContentDiffEntry {
    Numeric(NumericDiffEntry),
    Structural {
        path: KeyPath,
        mismatch: StructuralKind,
        a_type: Option<&'static str>,
        b_type: Option<&'static str>,
    },
    Value {
        path: KeyPath,
        a: Value,
        b: Value,
    },
}

impl ContentDiffEntry {
    pub fn path(&self) -> &KeyPath {
        match self {
            ContentDiffEntry::Numeric(n) => &n.path,
            ContentDiffEntry::Structural { path, .. } | ContentDiffEntry::Value { path, .. } => {
                path
            }
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericDiffEntry> {
        match self {
            ContentDiffEntry::Numeric(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChangeDetail {
    Json { entries: Vec<ContentDiffEntry> },
    Opaque { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedFile {
    pub path: String,
    pub a_sha256_hex: String,
    pub b_sha256_hex: String,
    pub detail: ChangeDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub a: String,
    pub b: String,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub common: Vec<String>,
    pub changed: Vec<ChangedFile>,
}

impl DiffReport {
    /// True when both archives hold the same paths with the same hashes.
    pub fn is_identical(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.changed.is_empty()
    }

    pub fn numeric_entry_count(&self) -> usize {
        self.changed
            .iter()
            .map(|c| match &c.detail {
                ChangeDetail::Json { entries } => {
                    entries.iter().filter(|e| e.as_numeric().is_some()).count()
                }
                ChangeDetail::Opaque { .. } => 0,
            })
            .sum()
    }
}

pub fn diff_archives(a: &Archive, b: &Archive, opts: &DiffOptions) -> DiffReport {
    let a_paths: BTreeSet<&str> = a.paths().collect();
    let b_paths: BTreeSet<&str> = b.paths().collect();

    let only_in_a: Vec<String> = a_paths.difference(&b_paths).map(|s| s.to_string()).collect();
    let only_in_b: Vec<String> = b_paths.difference(&a_paths).map(|s| s.to_string()).collect();
    let common: Vec<String> = a_paths
        .intersection(&b_paths)
        .map(|s| s.to_string())
        .collect();

    let mut changed = Vec::new();
    for path in &common {
        let (Some(ra), Some(rb)) = (a.get(path), b.get(path)) else {
            continue;
        };
        if ra.sha256_hex == rb.sha256_hex {
            continue;
        }
        changed.push(ChangedFile {
            path: path.clone(),
            a_sha256_hex: ra.sha256_hex.clone(),
            b_sha256_hex: rb.sha256_hex.clone(),
            detail: change_detail(path, ra, rb, opts),
        });
    }

    tracing::debug!(
        only_in_a = only_in_a.len(),
        only_in_b = only_in_b.len(),
        common = common.len(),
        changed = changed.len(),
        "archive diff complete"
    );

    DiffReport {
        a: a.label.clone(),
        b: b.label.clone(),
        only_in_a,
        only_in_b,
        common,
        changed,
    }
}

fn change_detail(
    path: &str,
    ra: &ArtifactRecord,
    rb: &ArtifactRecord,
    opts: &DiffOptions,
) -> ChangeDetail {
    match (&ra.json, &rb.json) {
        (Some(ja), Some(jb)) => ChangeDetail::Json {
            entries: diff_json(ja, jb, opts),
        },
        _ => {
            let reason = match (&ra.json_error, &rb.json_error) {
                (Some(e), _) => format!("A does not parse as JSON: {e}"),
                (None, Some(e)) => format!("B does not parse as JSON: {e}"),
                (None, None) => "binary".to_string(),
            };
            if ra.json_error.is_some() || rb.json_error.is_some() {
                tracing::warn!(path, %reason, "content diff downgraded to opaque");
            }
            ChangeDetail::Opaque { reason }
        }
    }
}

/// Walks both trees in lock-step and returns every difference found.
pub fn diff_json(a: &Value, b: &Value, opts: &DiffOptions) -> Vec<ContentDiffEntry> {
    let mut out = Vec::new();
    walk(&KeyPath::root(), a, b, opts, &mut out);
    out
}

fn walk(path: &KeyPath, a: &Value, b: &Value, opts: &DiffOptions, out: &mut Vec<ContentDiffEntry>) {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            let keys: BTreeSet<&String> = ma.keys().chain(mb.keys()).collect();
            for k in keys {
                let child = path.child_key(k);
                match (ma.get(k), mb.get(k)) {
                    (Some(va), Some(vb)) => walk(&child, va, vb, opts, out),
                    (Some(va), None) => out.push(only_in(child, StructuralKind::OnlyInA, va)),
                    (None, Some(vb)) => out.push(only_in(child, StructuralKind::OnlyInB, vb)),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(xa), Value::Array(xb)) => {
            for idx in 0..xa.len().max(xb.len()) {
                let child = path.child_index(idx);
                match (xa.get(idx), xb.get(idx)) {
                    (Some(va), Some(vb)) => walk(&child, va, vb, opts, out),
                    (Some(va), None) => out.push(only_in(child, StructuralKind::OnlyInA, va)),
                    (None, Some(vb)) => out.push(only_in(child, StructuralKind::OnlyInB, vb)),
                    (None, None) => {}
                }
            }
        }
        (Value::Number(na), Value::Number(nb)) => {
            let (Some(fa), Some(fb)) = (na.as_f64(), nb.as_f64()) else {
                return;
            };
            // Integers past 2^53 can differ while their f64 images are equal.
            if fa == fb && !na.is_f64() && !nb.is_f64() && na != nb {
                out.push(ContentDiffEntry::Value {
                    path: path.clone(),
                    a: a.clone(),
                    b: b.clone(),
                });
                return;
            }
            let entry = NumericDiffEntry::new(path.clone(), fa, fb);
            let emit = match opts.numeric_policy {
                NumericReportPolicy::All => true,
                NumericReportPolicy::Unequal => fa != fb && entry.abs_diff > opts.atol,
            };
            if emit {
                out.push(ContentDiffEntry::Numeric(entry));
            }
        }
        _ if type_name(a) != type_name(b) => out.push(ContentDiffEntry::Structural {
            path: path.clone(),
            mismatch: StructuralKind::TypeMismatch,
            a_type: Some(type_name(a)),
            b_type: Some(type_name(b)),
        }),
        _ => {
            if a != b {
                out.push(ContentDiffEntry::Value {
                    path: path.clone(),
                    a: a.clone(),
                    b: b.clone(),
                });
            }
        }
    }
}

fn only_in(path: KeyPath, mismatch: StructuralKind, present: &Value) -> ContentDiffEntry {
    let (a_type, b_type) = match mismatch {
        StructuralKind::OnlyInA => (Some(type_name(present)), None),
        _ => (None, Some(type_name(present))),
    };
    ContentDiffEntry::Structural {
        path,
        mismatch,
        a_type,
        b_type,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_numbers_are_silent_by_default() {
        let v = json!({"x": 1.5, "y": [1, 2]});
        assert!(diff_json(&v, &v, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn all_policy_reports_equal_leaves() {
        let v = json!({"x": 1.5, "y": [1, 2]});
        let opts = DiffOptions {
            numeric_policy: NumericReportPolicy::All,
            atol: 0.0,
        };
        let entries = diff_json(&v, &v, &opts);
        assert_eq!(entries.len(), 3);
        assert!(entries
            .iter()
            .all(|e| e.as_numeric().is_some_and(|n| n.abs_diff == 0.0)));
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        let entries = diff_json(&json!({"n": 2}), &json!({"n": 2.5}), &DiffOptions::default());
        assert_eq!(entries.len(), 1);
        let n = entries[0].as_numeric().unwrap();
        assert_eq!(n.path.to_string(), "/n");
        assert_eq!(n.abs_diff, 0.5);
        assert_eq!(n.rel_diff, 0.2);
    }

    #[test]
    fn large_integers_differing_below_f64_precision_are_reported() {
        let a = json!({"seed": 9007199254740993u64});
        let b = json!({"seed": 9007199254740992u64});
        let entries = diff_json(&a, &b, &DiffOptions::default());
        assert_eq!(
            entries,
            vec![ContentDiffEntry::Value {
                path: KeyPath::root().child_key("seed"),
                a: json!(9007199254740993u64),
                b: json!(9007199254740992u64),
            }]
        );
    }

    #[test]
    fn integer_and_equal_float_stay_silent() {
        assert!(diff_json(&json!([1]), &json!([1.0]), &DiffOptions::default()).is_empty());
    }

    #[test]
    fn tolerance_suppresses_small_differences() {
        let opts = DiffOptions {
            numeric_policy: NumericReportPolicy::Unequal,
            atol: 1e-9,
        };
        let entries = diff_json(&json!([1.0]), &json!([1.0000000001]), &opts);
        assert!(entries.is_empty());
    }

    #[test]
    fn structural_and_value_mismatches_are_distinct() {
        let a = json!({"only_a": 1, "t": "x", "s": "same", "flag": true, "arr": [1]});
        let b = json!({"only_b": null, "t": 3, "s": "other", "flag": true, "arr": [1, 2]});
        let entries = diff_json(&a, &b, &DiffOptions::default());

        let by_path = |p: &str| {
            entries
                .iter()
                .find(|e| e.path().to_string() == p)
                .unwrap_or_else(|| panic!("no entry for {p}"))
        };
        assert!(matches!(
            by_path("/only_a"),
            ContentDiffEntry::Structural {
                mismatch: StructuralKind::OnlyInA,
                ..
            }
        ));
        assert!(matches!(
            by_path("/only_b"),
            ContentDiffEntry::Structural {
                mismatch: StructuralKind::OnlyInB,
                ..
            }
        ));
        assert!(matches!(
            by_path("/t"),
            ContentDiffEntry::Structural {
                mismatch: StructuralKind::TypeMismatch,
                a_type: Some("string"),
                b_type: Some("number"),
                ..
            }
        ));
        assert!(matches!(by_path("/s"), ContentDiffEntry::Value { .. }));
        assert!(matches!(
            by_path("/arr/1"),
            ContentDiffEntry::Structural {
                mismatch: StructuralKind::OnlyInB,
                ..
            }
        ));
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn key_paths_escape_pointer_characters() {
        let entries = diff_json(
            &json!({"a/b": {"c~d": "x"}}),
            &json!({"a/b": {"c~d": "y"}}),
            &DiffOptions::default(),
        );
        assert_eq!(entries[0].path().to_string(), "/a~1b/c~0d");
    }

    #[test]
    fn bool_vs_null_is_a_type_mismatch() {
        let entries = diff_json(&json!(true), &json!(null), &DiffOptions::default());
        assert!(matches!(
            entries.as_slice(),
            [ContentDiffEntry::Structural {
                mismatch: StructuralKind::TypeMismatch,
                ..
            }]
        ));
    }
}
