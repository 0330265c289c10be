use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_lower(&hasher.finalize())
}

pub fn hex_lower(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    bytes
        .iter()
        .flat_map(|b| [DIGITS[usize::from(b >> 4)], DIGITS[usize::from(b & 0x0f)]])
        .map(char::from)
        .collect()
}

/// `2024-05-01T12:00:00Z`: second precision, `Z` suffix.
pub fn utc_iso(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn escape_json_pointer(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

/// Normalizes an archive entry name, rejecting absolute paths and `..`.
pub fn sanitize_rel_path(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Prefix(_) | Component::RootDir => {
                bail!("invalid archive path (absolute): {}", path.display())
            }
            Component::ParentDir => bail!("invalid archive path (..): {}", path.display()),
            Component::CurDir => {}
            Component::Normal(p) => out.push(p),
        }
    }
    Ok(out)
}

pub fn rel_path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// Copies `path` to `<name>.bak` unless a backup already exists.
///
/// Returns whether a backup was written.
pub fn backup_once(path: &Path) -> Result<bool> {
    let bak = backup_path(path);
    if bak.exists() {
        return Ok(false);
    }
    std::fs::copy(path, &bak)
        .with_context(|| format!("write backup: {} -> {}", path.display(), bak.display()))?;
    Ok(true)
}

/// Replaces `path` with `contents` via a sibling temp file and a rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;

    let name = path
        .file_name()
        .with_context(|| format!("not a file path: {}", path.display()))?
        .to_string_lossy();
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = dir.join(format!(".{name}.fluxaudit-{}-{seq}.tmp", std::process::id()));

    std::fs::write(&tmp, contents).with_context(|| format!("write temp: {}", tmp.display()))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        std::fs::remove_file(&tmp).ok();
        return Err(err).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()));
    }
    Ok(())
}

/// Pretty JSON with a trailing newline. Object keys come out sorted because
/// `serde_json::Map` is ordered by key.
pub fn pretty_json_bytes(v: &serde_json::Value) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(v)?;
    if out.last() != Some(&b'\n') {
        out.push(b'\n');
    }
    Ok(out)
}
