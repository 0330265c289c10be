//! In-place repair of already-written run artifacts: stamp a real capture
//! time, copy the mark's seed into the summary, optionally quantize floats.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::RepairConfig;
use crate::quantize::quantize_value;
use crate::util;

#[derive(Debug, Clone, Copy)]
pub struct RepairOptions {
    pub recursive: bool,
    pub write_mark: bool,
    pub quantize_floats: bool,
    pub ndigits: u32,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            write_mark: false,
            quantize_floats: false,
            ndigits: fluxaudit_contracts::QUANTIZE_DIGITS,
        }
    }
}

/// Values fixed once per invocation and threaded through every repair.
#[derive(Debug, Clone)]
pub struct RepairContext {
    pub now: DateTime<Utc>,
}

impl RepairContext {
    pub fn now() -> Self {
        Self { now: Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairAction {
    pub summary: String,
    pub mark: Option<String>,
    pub generated_at: String,
    pub seed_effective: Option<Value>,
    pub quantized: bool,
    pub summary_written: bool,
    pub mark_written: bool,
    pub backups_written: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub root: String,
    pub actions: Vec<RepairAction>,
}

pub fn repair_tree(
    root: &Path,
    cfg: &RepairConfig,
    opts: &RepairOptions,
    ctx: &RepairContext,
) -> Result<RepairReport> {
    if !root.exists() {
        bail!("root not found: {}", root.display());
    }
    let targets = find_summaries(root, cfg, opts.recursive)?;
    if targets.is_empty() {
        bail!("no {} found under {}", cfg.summary_file_name, root.display());
    }

    let mut actions = Vec::new();
    for summary_path in targets {
        let action = repair_one(&summary_path, cfg, opts, ctx)
            .with_context(|| format!("repair: {}", summary_path.display()))?;
        tracing::info!(summary = %action.summary, seed = ?action.seed_effective, "repaired");
        actions.push(action);
    }
    Ok(RepairReport {
        root: root.display().to_string(),
        actions,
    })
}

fn find_summaries(root: &Path, cfg: &RepairConfig, recursive: bool) -> Result<Vec<PathBuf>> {
    if !recursive {
        let p = root.join(&cfg.summary_file_name);
        return Ok(if p.is_file() { vec![p] } else { Vec::new() });
    }
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk: {}", root.display()))?;
        if entry.file_type().is_file()
            && entry.file_name().to_str() == Some(cfg.summary_file_name.as_str())
        {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

fn read_json(path: &Path) -> Result<Value> {
    let bytes = std::fs::read(path).with_context(|| format!("read: {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse JSON: {}", path.display()))
}

fn repair_one(
    summary_path: &Path,
    cfg: &RepairConfig,
    opts: &RepairOptions,
    ctx: &RepairContext,
) -> Result<RepairAction> {
    let original = read_json(summary_path)?;
    let mut summary = original.clone();
    let Some(obj) = summary.as_object_mut() else {
        bail!("summary is not a JSON object: {}", summary_path.display());
    };
    let generated_at = util::utc_iso(ctx.now);
    obj.insert(cfg.generated_at_key.clone(), Value::String(generated_at.clone()));

    let mark_path = locate_mark(summary_path, &original, cfg);
    let mut mark = match &mark_path {
        Some(p) => match read_json(p) {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!(mark = %p.display(), "mark unreadable, seed not propagated: {err:#}");
                None
            }
        },
        None => None,
    };

    let seed = mark.as_ref().and_then(|m| mark_seed(m, cfg));
    if let Some(seed) = &seed {
        set_pointer(&mut summary, &cfg.summary_seed_pointer, seed.clone())?;
    }

    if opts.quantize_floats {
        quantize_value(&mut summary, opts.ndigits);
        if let Some(m) = mark.as_mut() {
            quantize_value(m, opts.ndigits);
        }
    }

    let mut backups_written = Vec::new();
    let summary_written = write_if_changed(summary_path, &summary, &mut backups_written)?;

    let mut mark_written = false;
    if opts.write_mark {
        if let Some(Value::Object(m)) = mark.as_mut() {
            m.entry(cfg.generated_at_key.clone())
                .or_insert_with(|| Value::String(generated_at.clone()));
        }
        if let (Some(path), Some(m)) = (&mark_path, &mark) {
            mark_written = write_if_changed(path, m, &mut backups_written)?;
        }
    }

    Ok(RepairAction {
        summary: summary_path.display().to_string(),
        mark: mark_path.map(|p| p.display().to_string()),
        generated_at,
        seed_effective: seed,
        quantized: opts.quantize_floats,
        summary_written,
        mark_written,
        backups_written,
    })
}

fn write_if_changed(path: &Path, doc: &Value, backups: &mut Vec<String>) -> Result<bool> {
    let bytes = util::pretty_json_bytes(doc)?;
    let current = std::fs::read(path).with_context(|| format!("read: {}", path.display()))?;
    if current == bytes {
        return Ok(false);
    }
    if util::backup_once(path)? {
        backups.push(util::backup_path(path).display().to_string());
    }
    util::write_atomic(path, &bytes).with_context(|| format!("write: {}", path.display()))?;
    Ok(true)
}

fn mark_seed(mark: &Value, cfg: &RepairConfig) -> Option<Value> {
    cfg.mark_seed_keys
        .iter()
        .find_map(|k| mark.get(k).filter(|v| !v.is_null()).cloned())
}

/// Resolves the mark document for a summary: first through the reference the
/// summary carries, then by file name under the summary's directory.
fn locate_mark(summary_path: &Path, summary: &Value, cfg: &RepairConfig) -> Option<PathBuf> {
    let summary_dir = summary_path.parent().unwrap_or(Path::new("."));

    if let Some(rel) = summary.pointer(&cfg.mark_ref_pointer).and_then(Value::as_str) {
        let prefix = format!("{}/", cfg.output_root_name);
        let base = summary_dir
            .ancestors()
            .find(|a| a.file_name().and_then(|n| n.to_str()) == Some(cfg.output_root_name.as_str()));
        let candidate = match (rel.strip_prefix(&prefix), base) {
            (Some(rest), Some(base)) => base.join(rest),
            _ => summary_dir.join(rel),
        };
        if candidate.is_file() {
            return Some(candidate);
        }
        tracing::debug!(reference = rel, candidate = %candidate.display(), "mark reference does not resolve");
    }

    walkdir::WalkDir::new(summary_dir)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .find(|e| {
            e.file_type().is_file() && e.file_name().to_str() == Some(cfg.mark_file_name.as_str())
        })
        .map(|e| e.into_path())
}

/// Writes `value` at `pointer`, creating (or replacing non-object) parents.
fn set_pointer(doc: &mut Value, pointer: &str, value: Value) -> Result<()> {
    let Some(rest) = pointer.strip_prefix('/') else {
        bail!("invalid JSON pointer {pointer:?}");
    };
    let tokens: Vec<String> = rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    let Some((last, parents)) = tokens.split_last() else {
        bail!("invalid JSON pointer {pointer:?}");
    };
    let mut cur = doc;
    for key in parents {
        cur = object_mut(cur)?
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(cur)?.insert(last.clone(), value);
    Ok(())
}

fn object_mut(v: &mut Value) -> Result<&mut Map<String, Value>> {
    if !v.is_object() {
        *v = Value::Object(Map::new());
    }
    v.as_object_mut()
        .context("internal error: pointer parent must be an object")
}
