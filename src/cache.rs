use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Cross-session string hints. Never load-bearing: a missing or stale
/// value only changes what gets logged or warned about.
pub trait HintCache {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
}

/// TOML-backed hints, usually under the data directory.
#[derive(Debug)]
pub struct FileHints {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileHints {
    /// Open (or start) the hint file at `path`. Unreadable or corrupt
    /// files begin a fresh map.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| toml::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, values }
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::warn!("cannot create hint dir {}: {err}", parent.display());
                return;
            }
        }
        match toml::to_string(&self.values) {
            Ok(raw) => {
                if let Err(err) = fs::write(&self.path, raw) {
                    tracing::warn!("cannot write hints to {}: {err}", self.path.display());
                }
            }
            Err(err) => tracing::warn!("cannot serialize hints: {err}"),
        }
    }
}

impl HintCache for FileHints {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        self.persist();
    }
}

/// Hints that live only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryHints {
    values: BTreeMap<String, String>,
}

impl MemoryHints {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HintCache for MemoryHints {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

/// Per-file mtime digest of a directory's `*.toml` files. Equal digests
/// mean nothing changed; the comparison is advisory only.
pub fn dir_digest(dir: &Path) -> String {
    let Ok(entries) = fs::read_dir(dir) else {
        return String::new();
    };

    let mut lines: Vec<String> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "toml") {
            continue;
        }
        let mtime = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_nanos())
            .unwrap_or(0);
        let name = entry.file_name().to_string_lossy().into_owned();
        lines.push(format!("{name}:{mtime}"));
    }
    lines.sort();
    lines.join("\n")
}
