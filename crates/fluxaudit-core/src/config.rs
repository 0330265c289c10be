//! Artifact naming conventions and field locations.
//!
//! The target tool's schema drifts between releases, so none of the names the
//! auditor, patcher, or repairer look for are hardcoded at the call sites. A
//! `fluxaudit.config@0.1.0` document can override any subset of them.

use std::path::Path;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use fluxaudit_contracts::{
    FLUXAUDIT_CONFIG_SCHEMA_VERSION, GENERATED_AT_KEY, MARK_FILE_NAME, QUANTIZE_DIGITS,
    SEED_EFFECTIVE_KEY, SUMMARY_FILE_NAME,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactRole {
    Summary,
    Mark,
}

impl ArtifactRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactRole::Summary => "summary",
            ArtifactRole::Mark => "mark",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: Option<String>,
    pub audit: AuditConfig,
    pub patch: PatchConfig,
    pub repair: RepairConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read config: {}", path.display()))?;
        let cfg: Config = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config JSON: {}", path.display()))?;
        if let Some(v) = &cfg.schema_version {
            if v.trim() != FLUXAUDIT_CONFIG_SCHEMA_VERSION {
                bail!(
                    "config schema_version mismatch: expected {} got {:?}",
                    FLUXAUDIT_CONFIG_SCHEMA_VERSION,
                    v
                );
            }
        }
        Ok(cfg)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Glob (matched against archive-relative paths) naming the summary artifact.
    pub summary_glob: String,
    pub mark_glob: String,
    /// JSON pointers tried in order; the first one that resolves wins.
    pub generated_at_pointers: Vec<String>,
    pub summary_seed_pointers: Vec<String>,
    pub mark_seed_pointers: Vec<String>,
    pub seed_required: Vec<ArtifactRole>,
    /// Top-level keys the summary must carry.
    pub expected_keys: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            summary_glob: format!("**/{SUMMARY_FILE_NAME}"),
            mark_glob: "**/*_mark.json".to_string(),
            generated_at_pointers: vec![format!("/{GENERATED_AT_KEY}")],
            summary_seed_pointers: vec![
                format!("/{SEED_EFFECTIVE_KEY}"),
                format!("/full_chain/voidmark/{SEED_EFFECTIVE_KEY}"),
                "/full_chain/voidmark/seed".to_string(),
                "/full_chain/voidmark/void_seed".to_string(),
            ],
            mark_seed_pointers: vec![
                format!("/{SEED_EFFECTIVE_KEY}"),
                "/seed".to_string(),
                "/void_seed".to_string(),
            ],
            seed_required: vec![ArtifactRole::Summary, ArtifactRole::Mark],
            expected_keys: vec![GENERATED_AT_KEY.to_string()],
        }
    }
}

impl AuditConfig {
    pub fn artifact_matcher(&self, role: ArtifactRole) -> Result<GlobMatcher> {
        let pat = match role {
            ArtifactRole::Summary => &self.summary_glob,
            ArtifactRole::Mark => &self.mark_glob,
        };
        let glob = Glob::new(pat).with_context(|| format!("invalid {} glob: {pat:?}", role.as_str()))?;
        Ok(glob.compile_matcher())
    }

    pub fn seed_pointers(&self, role: ArtifactRole) -> &[String] {
        match role {
            ArtifactRole::Summary => &self.summary_seed_pointers,
            ArtifactRole::Mark => &self.mark_seed_pointers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub include_globs: Vec<String>,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
    /// A file is only considered when its text contains one of these.
    pub trigger_tokens: Vec<String>,
    pub generated_at_key: String,
    pub seed_key: String,
    /// Variables that hold an already-derived effective seed.
    pub seed_derivation_names: Vec<String>,
    /// Dict-literal openers for payloads that must carry the seed.
    pub seed_payload_openers: Vec<String>,
    pub quantize_digits: u32,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            include_globs: vec!["**/*.py".to_string()],
            skip_dirs: [".git", ".venv", "venv", "__pycache__", "node_modules", "target"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trigger_tokens: vec![
                GENERATED_AT_KEY.to_string(),
                SEED_EFFECTIVE_KEY.to_string(),
                "voidmark".to_string(),
                "fluxguard".to_string(),
            ],
            generated_at_key: GENERATED_AT_KEY.to_string(),
            seed_key: SEED_EFFECTIVE_KEY.to_string(),
            seed_derivation_names: vec![
                SEED_EFFECTIVE_KEY.to_string(),
                "effective_seed".to_string(),
            ],
            seed_payload_openers: vec![
                r#""voidmark": {"#.to_string(),
                "summary = {".to_string(),
                "mark = {".to_string(),
            ],
            quantize_digits: QUANTIZE_DIGITS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub summary_file_name: String,
    pub mark_file_name: String,
    pub generated_at_key: String,
    /// Pointer inside the summary holding the mark's relative path.
    pub mark_ref_pointer: String,
    /// Ancestor directory that `_ci_out/`-prefixed mark references resolve against.
    pub output_root_name: String,
    pub mark_seed_keys: Vec<String>,
    pub summary_seed_pointer: String,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            summary_file_name: SUMMARY_FILE_NAME.to_string(),
            mark_file_name: MARK_FILE_NAME.to_string(),
            generated_at_key: GENERATED_AT_KEY.to_string(),
            mark_ref_pointer: "/full_chain/voidmark/mark".to_string(),
            output_root_name: "_ci_out".to_string(),
            mark_seed_keys: vec![
                SEED_EFFECTIVE_KEY.to_string(),
                "seed".to_string(),
                "void_seed".to_string(),
            ],
            summary_seed_pointer: format!("/full_chain/voidmark/{SEED_EFFECTIVE_KEY}"),
        }
    }
}
