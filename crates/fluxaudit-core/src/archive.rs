//! Run archives: a directory tree or a zip container, loaded eagerly into an
//! immutable path -> artifact map.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::GlobSet;
use serde::Serialize;
use serde_json::Value;

use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    Directory,
    Zip,
}

impl ArchiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveKind::Directory => "directory",
            ArchiveKind::Zip => "zip",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub bytes: Vec<u8>,
    pub sha256_hex: String,
    pub json: Option<Value>,
    /// Set when the path looks like JSON but its bytes do not parse.
    pub json_error: Option<String>,
}

impl ArtifactRecord {
    pub fn new(path: &str, bytes: Vec<u8>) -> Self {
        let sha256_hex = util::sha256_hex(&bytes);
        let (json, json_error) = if looks_like_json(path) {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(v) => (Some(v), None),
                Err(err) => (None, Some(err.to_string())),
            }
        } else if starts_like_json(&bytes) {
            (serde_json::from_slice::<Value>(&bytes).ok(), None)
        } else {
            (None, None)
        };
        Self {
            bytes,
            sha256_hex,
            json,
            json_error,
        }
    }
}

pub fn looks_like_json(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".json")
}

fn starts_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{' || *b == b'[')
}

#[derive(Debug, Clone)]
pub struct Archive {
    pub label: String,
    pub kind: ArchiveKind,
    entries: BTreeMap<String, ArtifactRecord>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_filtered(path, None)
    }

    /// Loads every file under `path`. Paths matching `exclude` are dropped.
    pub fn open_filtered(path: &Path, exclude: Option<&GlobSet>) -> Result<Self> {
        if !path.exists() {
            bail!("archive not found: {}", path.display());
        }
        let label = path.display().to_string();
        let mut entries = if path.is_dir() {
            load_dir(path)?
        } else {
            load_zip(path)?
        };
        if let Some(exclude) = exclude {
            entries.retain(|rel, _| !exclude.is_match(rel));
        }
        let kind = if path.is_dir() {
            ArchiveKind::Directory
        } else {
            ArchiveKind::Zip
        };
        tracing::debug!(archive = %label, kind = kind.as_str(), entries = entries.len(), "loaded archive");
        Ok(Self {
            label,
            kind,
            entries,
        })
    }

    pub fn from_entries(label: &str, files: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        let entries = files
            .into_iter()
            .map(|(path, bytes)| {
                let rec = ArtifactRecord::new(&path, bytes);
                (path, rec)
            })
            .collect();
        Self {
            label: label.to_string(),
            kind: ArchiveKind::Directory,
            entries,
        }
    }

    pub fn get(&self, path: &str) -> Option<&ArtifactRecord> {
        self.entries.get(path)
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArtifactRecord)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn load_dir(root: &Path) -> Result<BTreeMap<String, ArtifactRecord>> {
    let mut out = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk archive dir: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let p = entry.path();
        let rel = util::rel_path_string(p.strip_prefix(root).unwrap_or(p));
        let bytes = std::fs::read(p)
            .with_context(|| format!("read: {} (archive {})", p.display(), root.display()))?;
        out.insert(rel.clone(), ArtifactRecord::new(&rel, bytes));
    }
    Ok(out)
}

fn load_zip(path: &Path) -> Result<BTreeMap<String, ArtifactRecord>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut z = zip::ZipArchive::new(f).with_context(|| format!("open zip: {}", path.display()))?;
    let mut out = BTreeMap::new();
    for i in 0..z.len() {
        let mut file = z
            .by_index(i)
            .with_context(|| format!("zip entry #{i}: {}", path.display()))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let rel: PathBuf = util::sanitize_rel_path(Path::new(&name))
            .with_context(|| format!("zip: {}", path.display()))?;
        let rel = util::rel_path_string(&rel);
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)
            .with_context(|| format!("read zip entry {name}: {}", path.display()))?;
        if out.contains_key(&rel) {
            bail!("duplicate entry {rel:?} in zip: {}", path.display());
        }
        out.insert(rel.clone(), ArtifactRecord::new(&rel, bytes));
    }
    Ok(out)
}
