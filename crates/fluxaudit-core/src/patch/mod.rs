//! Best-effort, idempotent source rewrites for known determinism defects.
//!
//! Per file: scanned with no match (nothing written), or matched, backed up to
//! `<name>.bak`, and replaced in one write. The replacement text is computed in
//! full before anything touches the file.

mod patterns;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;

pub use patterns::PatternId;

use crate::config::PatchConfig;
use crate::util;
use patterns::{Matchers, PATTERNS};

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    pub quantize_floats: bool,
    /// Compute and report rewrites without touching any file.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchAction {
    pub file: String,
    pub pattern: PatternId,
    pub description: &'static str,
    pub rewrites: usize,
    pub applied: bool,
    pub backup_written: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub root: String,
    pub dry_run: bool,
    pub files_scanned: usize,
    pub files_patched: Vec<String>,
    pub actions: Vec<PatchAction>,
}

impl PatchReport {
    pub fn applied_count(&self) -> usize {
        self.actions.iter().filter(|a| a.applied).count()
    }
}

pub fn patch_tree(root: &Path, cfg: &PatchConfig, opts: &PatchOptions) -> Result<PatchReport> {
    if !root.is_dir() {
        bail!("source root is not a directory: {}", root.display());
    }
    let matchers = Matchers::new(cfg)?;
    let files = candidate_files(root, cfg)?;

    let mut report = PatchReport {
        root: root.display().to_string(),
        dry_run: opts.dry_run,
        files_scanned: files.len(),
        files_patched: Vec::new(),
        actions: Vec::new(),
    };

    for path in files {
        let rel = util::rel_path_string(path.strip_prefix(root).unwrap_or(&path));
        let bytes = std::fs::read(&path).with_context(|| format!("read: {}", path.display()))?;
        let Ok(text) = String::from_utf8(bytes) else {
            tracing::debug!(file = %rel, "skipping non-UTF-8 file");
            continue;
        };
        if !cfg.trigger_tokens.iter().any(|t| text.contains(t.as_str())) {
            continue;
        }

        let (new_text, mut actions) = rewrite_file(&rel, &text, &matchers, opts);
        if new_text != text {
            let mut backup_written = false;
            if !opts.dry_run {
                backup_written = util::backup_once(&path)?;
                util::write_atomic(&path, new_text.as_bytes())
                    .with_context(|| format!("write patched: {}", path.display()))?;
            }
            for a in actions.iter_mut().filter(|a| a.applied) {
                a.backup_written = backup_written;
            }
            tracing::info!(file = %rel, dry_run = opts.dry_run, "patched");
            report.files_patched.push(rel);
        }
        report.actions.append(&mut actions);
    }

    Ok(report)
}

/// Applies every enabled pattern in table order to `text`.
fn rewrite_file(
    rel: &str,
    text: &str,
    matchers: &Matchers,
    opts: &PatchOptions,
) -> (String, Vec<PatchAction>) {
    let mut current = text.to_string();
    let mut actions = Vec::new();
    for pattern in PATTERNS {
        if !(pattern.enabled)(opts) {
            continue;
        }
        let rw = (pattern.rewrite)(&current, matchers);
        let applied = rw.count > 0 && rw.text != current;
        if applied {
            tracing::debug!(file = rel, pattern = pattern.id.as_str(), rewrites = rw.count, "pattern matched");
            current = rw.text;
        }
        actions.push(PatchAction {
            file: rel.to_string(),
            pattern: pattern.id,
            description: pattern.description,
            rewrites: if applied { rw.count } else { 0 },
            applied,
            backup_written: false,
        });
    }
    (current, actions)
}

fn candidate_files(root: &Path, cfg: &PatchConfig) -> Result<Vec<PathBuf>> {
    let include = build_globset(&cfg.include_globs)?;
    let mut out = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !cfg
                    .skip_dirs
                    .iter()
                    .any(|d| e.file_name().to_str() == Some(d.as_str()))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk source tree: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let p = entry.path();
        let rel = util::rel_path_string(p.strip_prefix(root).unwrap_or(p));
        if include.is_match(&rel) {
            out.push(p.to_path_buf());
        }
    }
    Ok(out)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for pat in patterns {
        b.add(Glob::new(pat).with_context(|| format!("invalid include glob: {pat:?}"))?);
    }
    b.build().context("build include globset")
}
