use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::model::spec::{PluginSpec, SpecFile};

/// Scan a directory for `*.toml` spec files, path-sorted, and collect
/// their `[[plugin]]` entries in order. A file that fails to parse is
/// logged and skipped; the rest of the directory still loads.
pub fn scan_spec_dir(dir: &Path) -> Vec<PluginSpec> {
    if !dir.is_dir() {
        tracing::warn!("spec directory {} does not exist", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(false)
        .build()
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let is_toml = path.extension().is_some_and(|ext| ext == "toml");
            let is_file = entry.metadata().is_ok_and(|meta| meta.is_file());
            (is_toml && is_file).then(|| path.to_path_buf())
        })
        .collect();
    files.sort();

    let mut specs = Vec::new();
    for path in files {
        match read_spec_file(&path) {
            Ok(mut parsed) => {
                tracing::debug!("{}: {} plugin specs", path.display(), parsed.len());
                specs.append(&mut parsed);
            }
            Err(err) => {
                tracing::warn!("skipping spec file {}: {err}", path.display());
            }
        }
    }
    specs
}

fn read_spec_file(path: &Path) -> anyhow::Result<Vec<PluginSpec>> {
    let raw = fs::read_to_string(path)?;
    let file: SpecFile = toml::from_str(&raw)?;
    Ok(file.plugin)
}
