use std::time::Duration;

use indexmap::IndexMap;

use crate::error::SpecError;
use crate::model::spec::PluginSpec;
use crate::plugin::entity::Plugin;

/// Insertion-ordered collection of managed plugins, keyed by name.
/// Iteration order is registration order, which the loader's immediate
/// bucket relies on.
#[derive(Debug, Default)]
pub struct Registry {
    plugins: IndexMap<String, Plugin>,
}

/// Snapshot counts for dashboards and the startup summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub total: usize,
    pub loaded: usize,
    pub lazy: usize,
    pub disabled: usize,
    pub errors: usize,
    pub total_load_time: Duration,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one spec. The first entry wins a name; a collision reports
    /// `DuplicateName` and leaves the existing plugin untouched.
    pub fn insert(&mut self, spec: PluginSpec) -> Result<&Plugin, SpecError> {
        let plugin = Plugin::from_spec(spec)?;
        if self.plugins.contains_key(plugin.name()) {
            return Err(SpecError::DuplicateName {
                name: plugin.name().to_string(),
            });
        }
        let name = plugin.name().to_string();
        Ok(self.plugins.entry(name).or_insert(plugin))
    }

    /// Insert every spec, collecting per-spec errors without aborting.
    pub fn insert_all(&mut self, specs: Vec<PluginSpec>) -> Vec<SpecError> {
        let mut errors = Vec::new();
        for spec in specs {
            if let Err(err) = self.insert(spec) {
                errors.push(err);
            }
        }
        errors
    }

    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Plugin> {
        self.plugins.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Plugin> {
        self.plugins.values_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn stats(&self) -> ManagerStats {
        let mut stats = ManagerStats {
            total: self.plugins.len(),
            ..ManagerStats::default()
        };
        for plugin in self.plugins.values() {
            if plugin.error().is_some() {
                stats.errors += 1;
            }
            if plugin.is_loaded() {
                stats.loaded += 1;
            } else if plugin.is_lazy() {
                stats.lazy += 1;
            }
            if !plugin.is_enabled() {
                stats.disabled += 1;
            }
            if let Some(duration) = plugin.load_duration() {
                stats.total_load_time += duration;
            }
        }
        stats
    }
}
