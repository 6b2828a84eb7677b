use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::plugin::entity::Plugin;

/// Deterministic two-partition pack tree:
/// `<root>/pack/patchbay/start/<name>` for bootstrap plugins,
/// `<root>/pack/patchbay/opt/<name>` for everything else.
#[derive(Debug, Clone)]
pub struct PackLayout {
    root: PathBuf,
}

impl PackLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn start_dir(&self) -> PathBuf {
        self.root.join("pack/patchbay/start")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.root.join("pack/patchbay/opt")
    }

    pub fn plugin_dir(&self, name: &str, bootstrap: bool) -> PathBuf {
        let partition = if bootstrap {
            self.start_dir()
        } else {
            self.opt_dir()
        };
        partition.join(name)
    }
}

/// Where plugin code comes from. Presence checks and on-demand installs
/// both go through here, so the manager itself never touches the network.
pub trait PackSource {
    /// Make the plugin's code present at `dir`. True on success.
    fn install(&mut self, plugin: &Plugin, dir: &Path) -> bool;

    /// Is plugin code present at `dir`?
    fn is_present(&self, dir: &Path) -> bool;
}

/// Disk-backed pack source. Presence is a directory check; installation
/// is delegated to an external sync tool, so absent plugins stay absent.
#[derive(Debug, Default)]
pub struct LocalPacks;

impl PackSource for LocalPacks {
    fn install(&mut self, plugin: &Plugin, dir: &Path) -> bool {
        tracing::warn!(
            "plugin {} is not present at {}; run your pack sync tool",
            plugin.name(),
            dir.display()
        );
        false
    }

    fn is_present(&self, dir: &Path) -> bool {
        dir.is_dir()
    }
}

/// In-memory pack source. Nothing starts present; installs succeed on
/// demand except for names listed in `fail_installs`.
#[derive(Debug, Default)]
pub struct MemoryPacks {
    present: HashSet<PathBuf>,
    pub fail_installs: HashSet<String>,
    pub installs: Vec<String>,
}

impl MemoryPacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_install(mut self, name: &str) -> Self {
        self.fail_installs.insert(name.to_string());
        self
    }

    pub fn mark_present(&mut self, dir: impl Into<PathBuf>) {
        self.present.insert(dir.into());
    }
}

impl PackSource for MemoryPacks {
    fn install(&mut self, plugin: &Plugin, dir: &Path) -> bool {
        if self.fail_installs.contains(plugin.name()) {
            return false;
        }
        self.installs.push(plugin.name().to_string());
        self.present.insert(dir.to_path_buf());
        true
    }

    fn is_present(&self, dir: &Path) -> bool {
        self.present.contains(dir)
    }
}
