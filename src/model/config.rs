use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::spec;

#[derive(Debug, Deserialize)]
pub struct ManagerConfig {
    pub general: GeneralConfig,
    /// Signal name -> trailing-edge debounce window in milliseconds.
    #[serde(default)]
    pub debounce: HashMap<String, u64>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub spec_dir: String,
    pub pack_root: String,
    pub lazy_timeout_ms: u64,
    pub history_capacity: usize,
}

impl ManagerConfig {
    /// Load configuration with layering: built-in defaults, then the user
    /// file deep-merged over them.
    pub fn load() -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut table: toml::value::Table = toml::from_str(defaults)?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "patchbay") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                let user_str = fs::read_to_string(&config_path)
                    .with_context(|| format!("reading {}", config_path.display()))?;
                let user_table: toml::value::Table = toml::from_str(&user_str)
                    .with_context(|| format!("parsing {}", config_path.display()))?;
                spec::deep_merge(&mut table, &user_table);
            }
        }

        let mut config: ManagerConfig = toml::Value::Table(table).try_into()?;
        config.general.spec_dir = expand_tilde(&config.general.spec_dir);
        config.general.pack_root = expand_tilde(&config.general.pack_root);
        Ok(config)
    }

    pub fn spec_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.spec_dir)
    }

    pub fn pack_root(&self) -> PathBuf {
        PathBuf::from(&self.general.pack_root)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                spec_dir: "~/.config/patchbay/plugins".to_string(),
                pack_root: "~/.local/share/patchbay/site".to_string(),
                lazy_timeout_ms: 15_000,
                history_capacity: 64,
            },
            debounce: HashMap::new(),
        }
    }
}

fn expand_tilde(path: &str) -> String {
    if !path.starts_with('~') {
        return path.to_string();
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        let home = base_dirs.home_dir().to_string_lossy();
        return path.replacen('~', &home, 1);
    }

    path.to_string()
}
