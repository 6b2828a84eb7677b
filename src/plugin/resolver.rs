use std::collections::{HashMap, HashSet};

use crate::bridge::EditorBridge;
use crate::error::ResolveError;
use crate::model::spec;
use crate::plugin::entity::Plugin;
use crate::plugin::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Resolved,
}

/// Dependency resolution over the whole registry. Holds no state between
/// passes; the graph is rebuilt from `Plugin::depends` every call.
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Safe load order for the whole registry: dependencies strictly
    /// before dependents, unconstrained plugins by priority descending
    /// then name ascending. Any missing dependency or cycle fails the
    /// pass with every diagnostic aggregated.
    pub fn resolve_all(
        &self,
        bridge: &dyn EditorBridge,
    ) -> Result<Vec<&'a Plugin>, Vec<ResolveError>> {
        let missing = self.missing_dependencies(bridge);
        if !missing.is_empty() {
            return Err(missing);
        }

        let mut errors = Vec::new();
        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(self.registry.len());

        for plugin in self.roots() {
            self.visit(plugin, &mut marks, &mut stack, &mut order, &mut errors);
        }

        if errors.is_empty() { Ok(order) } else { Err(errors) }
    }

    /// Every graph diagnostic, missing dependencies and cycles alike,
    /// without failing. Callers decide what is fatal.
    pub fn validate(&self, bridge: &dyn EditorBridge) -> Vec<ResolveError> {
        let mut errors = self.missing_dependencies(bridge);
        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        let mut order = Vec::new();

        for plugin in self.roots() {
            self.visit(plugin, &mut marks, &mut stack, &mut order, &mut errors);
        }
        errors
    }

    /// Names of plugins that list `name` as a dependency.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.registry
            .iter()
            .filter(|plugin| plugin.depends().iter().any(|dep| dep == name))
            .map(|plugin| plugin.name().to_string())
            .collect()
    }

    /// A plugin can go away only when no enabled plugin still needs it.
    pub fn can_remove(&self, name: &str) -> bool {
        !self.registry.iter().any(|plugin| {
            plugin.is_enabled() && plugin.depends().iter().any(|dep| dep == name)
        })
    }

    /// Longest dependency chain under `name`. Cycles do not recurse.
    pub fn depth_of(&self, name: &str) -> usize {
        let mut on_path = HashSet::new();
        self.depth_walk(name, &mut on_path)
    }

    fn depth_walk(&self, name: &str, on_path: &mut HashSet<String>) -> usize {
        if !on_path.insert(name.to_string()) {
            return 0;
        }
        let depth = match self.registry.get(name) {
            Some(plugin) => plugin
                .depends()
                .iter()
                .map(|dep| 1 + self.depth_walk(dep, on_path))
                .max()
                .unwrap_or(0),
            None => 0,
        };
        on_path.remove(name);
        depth
    }

    fn missing_dependencies(&self, bridge: &dyn EditorBridge) -> Vec<ResolveError> {
        let mut missing = Vec::new();
        for plugin in self.registry.iter() {
            for dep in plugin.depends() {
                if self.registry.contains(dep) {
                    continue;
                }
                // The editor runtime may ship the module itself.
                if bridge.has_runtime_module(&spec::derive_module(dep)) {
                    continue;
                }
                missing.push(ResolveError::MissingDependency {
                    plugin: plugin.name().to_string(),
                    dependency: dep.clone(),
                });
            }
        }
        missing
    }

    fn roots(&self) -> Vec<&'a Plugin> {
        let mut roots: Vec<&Plugin> = self.registry.iter().collect();
        roots.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        roots
    }

    fn visit(
        &self,
        plugin: &'a Plugin,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<&'a Plugin>,
        errors: &mut Vec<ResolveError>,
    ) {
        match marks.get(plugin.name()).copied() {
            Some(Mark::Resolved) => return,
            Some(Mark::Visiting) => {
                report_cycle(plugin.name(), stack, errors);
                return;
            }
            None => {}
        }

        marks.insert(plugin.name(), Mark::Visiting);
        stack.push(plugin.name());

        for dep in plugin.depends() {
            // Unregistered deps were handled by the missing pass.
            if let Some(dep_plugin) = self.registry.get(dep) {
                self.visit(dep_plugin, marks, stack, order, errors);
            }
        }

        stack.pop();
        marks.insert(plugin.name(), Mark::Resolved);
        order.push(plugin);
    }
}

/// Everything on the stack from the first occurrence of `target` is on
/// the cycle; each member gets its own diagnostic, reported once.
fn report_cycle(target: &str, stack: &[&str], errors: &mut Vec<ResolveError>) {
    let Some(start) = stack.iter().position(|name| *name == target) else {
        return;
    };
    for name in &stack[start..] {
        let error = ResolveError::CircularDependency {
            plugin: name.to_string(),
        };
        if !errors.contains(&error) {
            errors.push(error);
        }
    }
}
