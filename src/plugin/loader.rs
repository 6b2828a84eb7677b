use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::bridge::EditorBridge;
use crate::error::{ActivationError, ResolveError};
use crate::model::spec;
use crate::notice::{Notice, NoticeSink};
use crate::plugin::registry::Registry;
use crate::plugin::resolver::Resolver;
use crate::plugin::source::{PackLayout, PackSource};
use crate::schedule::{ScheduledAction, Scheduler};

/// Plugins above this priority load ahead of the immediate bucket.
const PRIORITY_THRESHOLD: i32 = 50;

/// Everything a load pass needs from the outside world, borrowed.
pub struct LoadCx<'a> {
    pub bridge: &'a mut dyn EditorBridge,
    pub packs: &'a mut dyn PackSource,
    pub layout: &'a PackLayout,
    pub notices: &'a mut dyn NoticeSink,
    pub scheduler: &'a mut Scheduler,
    pub now: Instant,
}

/// Outcome of a whole-registry load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names that became loaded, in activation order.
    pub loaded: Vec<String>,
    /// Lazy names whose triggers were armed instead.
    pub deferred: Vec<String>,
    /// Disabled names, left alone.
    pub skipped: Vec<String>,
    pub errors: Vec<ActivationError>,
    pub diagnostics: Vec<ResolveError>,
}

/// Drives activation: eager buckets at startup, armed triggers after.
/// Owns the lazy-trigger tables and the global load sequence.
#[derive(Debug, Default)]
pub struct Loader {
    seq: u32,
    visiting: HashSet<String>,
    armed_events: HashMap<String, Vec<String>>,
    armed_commands: HashMap<String, String>,
    armed_filetypes: HashMap<String, Vec<String>>,
    armed_keys: HashMap<(String, String), String>,
    lazy_timeout: Duration,
}

impl Loader {
    pub fn new(lazy_timeout: Duration) -> Self {
        Self {
            lazy_timeout,
            ..Self::default()
        }
    }

    /// Load every eligible plugin: graph diagnostics first, then the
    /// high-priority bucket (descending), then the immediate bucket in
    /// registration order, then lazy trigger arming. Per-plugin failures
    /// are collected; the pass never aborts.
    pub fn load_all(&mut self, registry: &mut Registry, cx: &mut LoadCx) -> LoadReport {
        let mut report = LoadReport::default();
        let watermark = self.seq;

        let diagnostics = Resolver::new(registry).validate(cx.bridge);
        for diagnostic in &diagnostics {
            if let Some(plugin) = registry.get_mut(diagnostic.plugin()) {
                plugin.mark_error(diagnostic.to_string());
            }
            cx.notices.notify(Notice::Warning {
                message: diagnostic.to_string(),
            });
        }
        report.diagnostics = diagnostics;

        let mut high: Vec<(i32, String)> = Vec::new();
        let mut immediate: Vec<String> = Vec::new();
        let mut lazy: Vec<String> = Vec::new();

        for plugin in registry.iter() {
            if plugin.error().is_some() {
                continue;
            }
            if !plugin.is_enabled() {
                report.skipped.push(plugin.name().to_string());
                continue;
            }
            if plugin.is_lazy() {
                lazy.push(plugin.name().to_string());
            } else if plugin.priority() > PRIORITY_THRESHOLD {
                high.push((plugin.priority(), plugin.name().to_string()));
            } else {
                immediate.push(plugin.name().to_string());
            }
        }

        high.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        for (_, name) in high {
            self.drive(&name, registry, cx, &mut report);
        }
        for name in immediate {
            self.drive(&name, registry, cx, &mut report);
        }
        for name in lazy {
            self.arm_lazy(&name, registry, cx, &mut report);
        }

        let mut loaded: Vec<(u32, String)> = registry
            .iter()
            .filter_map(|plugin| {
                plugin
                    .load_order()
                    .filter(|order| *order > watermark)
                    .map(|order| (order, plugin.name().to_string()))
            })
            .collect();
        loaded.sort_by_key(|(order, _)| *order);
        report.loaded = loaded.into_iter().map(|(_, name)| name).collect();

        tracing::info!(
            "load pass: {} loaded, {} deferred, {} skipped, {} errors",
            report.loaded.len(),
            report.deferred.len(),
            report.skipped.len(),
            report.errors.len() + report.diagnostics.len()
        );
        report
    }

    /// Activate one plugin, loading unloaded dependencies first. A name
    /// already on the visiting path is a cycle, reported not recursed.
    /// Calling this on an errored plugin is an explicit retry.
    pub fn load_plugin(
        &mut self,
        name: &str,
        registry: &mut Registry,
        cx: &mut LoadCx,
    ) -> Result<(), ActivationError> {
        if registry.get(name).is_none() {
            return Err(ActivationError::UnknownPlugin {
                name: name.to_string(),
            });
        }
        if registry.get(name).is_some_and(|plugin| plugin.is_loaded()) {
            return Ok(());
        }
        if !self.visiting.insert(name.to_string()) {
            return Err(ActivationError::DependencyCycle {
                plugin: name.to_string(),
            });
        }

        let result = self.load_inner(name, registry, cx);
        self.visiting.remove(name);

        if let Err(err) = &result {
            if !matches!(err, ActivationError::Disabled { .. }) {
                if let Some(plugin) = registry.get_mut(name) {
                    plugin.mark_error(err.to_string());
                }
                cx.notices.notify(Notice::LoadFailed {
                    plugin: name.to_string(),
                    message: err.to_string(),
                });
            }
        }
        result
    }

    /// Trigger-path entry: load `name` right now. Loaded plugins are a
    /// quiet no-op; unknown names are logged and ignored.
    pub fn load_lazy_plugin(&mut self, name: &str, registry: &mut Registry, cx: &mut LoadCx) {
        if registry.get(name).is_some_and(|plugin| plugin.is_loaded()) {
            return;
        }
        if registry.get(name).is_none() {
            tracing::error!("lazy trigger fired for unknown plugin {name}");
            return;
        }
        if let Err(err) = self.load_plugin(name, registry, cx) {
            tracing::warn!("lazy load of {name} failed: {err}");
        }
    }

    /// Lazy plugins armed on this signal, in arming order. Consumed.
    pub fn take_event_triggers(&mut self, signal: &str) -> Vec<String> {
        self.armed_events.remove(signal).unwrap_or_default()
    }

    pub fn has_event_trigger(&self, signal: &str) -> bool {
        self.armed_events.contains_key(signal)
    }

    /// The lazy plugin claiming this command, if any. Consumed.
    pub fn take_command_trigger(&mut self, command: &str) -> Option<String> {
        self.armed_commands.remove(command)
    }

    /// Lazy plugins waiting on this filetype. One-shot, self-clearing.
    pub fn take_filetype_triggers(&mut self, filetype: &str) -> Vec<String> {
        self.armed_filetypes.remove(filetype).unwrap_or_default()
    }

    /// The lazy plugin bound to this placeholder mapping, if any. Consumed.
    pub fn take_key_trigger(&mut self, mode: &str, lhs: &str) -> Option<String> {
        self.armed_keys.remove(&(mode.to_string(), lhs.to_string()))
    }

    fn drive(&mut self, name: &str, registry: &mut Registry, cx: &mut LoadCx, report: &mut LoadReport) {
        let Some(plugin) = registry.get(name) else {
            return;
        };
        // A dependency edge may have pulled it in, or failed it, already.
        if plugin.is_loaded() || plugin.error().is_some() {
            return;
        }
        match self.load_plugin(name, registry, cx) {
            Ok(()) => {}
            Err(ActivationError::Disabled { .. }) => report.skipped.push(name.to_string()),
            Err(err) => report.errors.push(err),
        }
    }

    fn load_inner(
        &mut self,
        name: &str,
        registry: &mut Registry,
        cx: &mut LoadCx,
    ) -> Result<(), ActivationError> {
        let depends: Vec<String> = registry
            .get(name)
            .map(|plugin| plugin.depends().to_vec())
            .unwrap_or_default();

        for dep in depends {
            let loaded = registry.get(&dep).is_some_and(|plugin| plugin.is_loaded());
            if loaded {
                continue;
            }
            if registry.get(&dep).is_none() {
                // Direct loads may arrive without a resolver pass, so the
                // runtime-module fallback is re-checked here.
                if cx.bridge.has_runtime_module(&spec::derive_module(&dep)) {
                    continue;
                }
                return Err(ActivationError::DependencyFailed {
                    plugin: name.to_string(),
                    dependency: dep,
                });
            }
            let failed_before = registry
                .get(&dep)
                .is_some_and(|plugin| plugin.error().is_some());
            if failed_before || self.load_plugin(&dep, registry, cx).is_err() {
                return Err(ActivationError::DependencyFailed {
                    plugin: name.to_string(),
                    dependency: dep,
                });
            }
        }

        let Some(plugin) = registry.get_mut(name) else {
            return Err(ActivationError::UnknownPlugin {
                name: name.to_string(),
            });
        };
        if !plugin.should_activate() {
            if !plugin.is_enabled() {
                return Err(ActivationError::Disabled {
                    plugin: name.to_string(),
                });
            }
            return Ok(());
        }

        cx.notices.notify(Notice::LoadingStarted {
            plugin: name.to_string(),
        });

        let plugin = registry
            .get_mut(name)
            .ok_or_else(|| ActivationError::UnknownPlugin {
                name: name.to_string(),
            })?;
        let dir = cx.layout.plugin_dir(plugin.name(), plugin.is_bootstrap());
        if !cx.packs.is_present(&dir) {
            tracing::info!("installing plugin {name} into {}", dir.display());
            if !cx.packs.install(plugin, &dir) || !cx.packs.is_present(&dir) {
                return Err(ActivationError::InstallFailed {
                    plugin: name.to_string(),
                });
            }
        }
        plugin.set_installed(true);

        self.seq += 1;
        plugin.activate(self.seq, cx.bridge)?;

        cx.notices.notify(Notice::Loaded {
            plugin: name.to_string(),
        });
        tracing::info!("loaded plugin {name} (order {})", self.seq);
        Ok(())
    }

    fn arm_lazy(&mut self, name: &str, registry: &Registry, cx: &mut LoadCx, report: &mut LoadReport) {
        let Some(plugin) = registry.get(name) else {
            return;
        };
        // Already pulled in as someone's dependency.
        if plugin.is_loaded() {
            return;
        }

        for event in plugin.events() {
            self.armed_events
                .entry(event.clone())
                .or_default()
                .push(name.to_string());
        }
        for command in plugin.commands() {
            if let Some(prior) = self
                .armed_commands
                .insert(command.clone(), name.to_string())
            {
                tracing::warn!("command {command} lazily claimed by both {prior} and {name}");
            }
        }
        for filetype in plugin.filetypes() {
            self.armed_filetypes
                .entry(filetype.clone())
                .or_default()
                .push(name.to_string());
        }
        for key in plugin.keys() {
            self.armed_keys
                .insert((key.mode.clone(), key.lhs.clone()), name.to_string());
        }

        // Guarantees eventual load; checked against `loaded` at fire time.
        cx.scheduler.schedule_after(
            cx.now,
            self.lazy_timeout,
            ScheduledAction::LazyTimeout {
                plugin: name.to_string(),
            },
        );

        report.deferred.push(name.to_string());
        tracing::debug!("armed lazy triggers for {name}");
    }
}
