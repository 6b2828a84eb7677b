use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use toml::Value;

use crate::bridge::EditorBridge;
use crate::cache::{self, HintCache};
use crate::dispatch::{Emission, EventDispatch, HandlerId};
use crate::error::{ActivationError, ResolveError, SpecError};
use crate::model::config::ManagerConfig;
use crate::model::spec::PluginSpec;
use crate::notice::{Notice, NoticeSink};
use crate::plugin::entity::{Plugin, PluginStatus};
use crate::plugin::loader::{LoadCx, LoadReport, Loader};
use crate::plugin::registry::{ManagerStats, Registry};
use crate::plugin::resolver::Resolver;
use crate::plugin::source::{PackLayout, PackSource};
use crate::schedule::{ScheduledAction, Scheduler};

const RECENT_NOTICES: usize = 8;
const SPEC_DIGEST_KEY: &str = "spec_digest";

/// The embedding editor's handle to the whole manager. Owns the registry,
/// loader, dispatcher and scheduler plus the collaborator handles; every
/// editor-facing entry point funnels through here. No global state.
pub struct Host {
    registry: Registry,
    loader: Loader,
    dispatch: EventDispatch,
    scheduler: Scheduler,
    layout: PackLayout,
    bridge: Box<dyn EditorBridge>,
    packs: Box<dyn PackSource>,
    hints: Box<dyn HintCache>,
    notices: HostSink,
}

impl Host {
    pub fn new(
        config: &ManagerConfig,
        bridge: Box<dyn EditorBridge>,
        packs: Box<dyn PackSource>,
        hints: Box<dyn HintCache>,
        sink: Box<dyn NoticeSink>,
    ) -> Self {
        let mut dispatch = EventDispatch::new(config.general.history_capacity);
        for (signal, window_ms) in &config.debounce {
            dispatch.set_debounce(signal, Duration::from_millis(*window_ms));
        }

        Self {
            registry: Registry::new(),
            loader: Loader::new(Duration::from_millis(config.general.lazy_timeout_ms)),
            dispatch,
            scheduler: Scheduler::new(),
            layout: PackLayout::new(config.pack_root()),
            bridge,
            packs,
            hints,
            notices: HostSink::new(sink),
        }
    }

    /// Feed parsed specs into the registry. Per-spec failures surface as
    /// warnings; the rest register normally.
    pub fn register(&mut self, specs: Vec<PluginSpec>) -> Vec<SpecError> {
        let errors = self.registry.insert_all(specs);
        for err in &errors {
            self.notices.notify(Notice::Warning {
                message: err.to_string(),
            });
        }
        errors
    }

    /// Cross-session hint: warn when the spec directory changed since the
    /// recorded digest. Never load-bearing; the first sighting only sets
    /// the baseline.
    pub fn check_spec_changes(&mut self, spec_dir: &Path) -> bool {
        let digest = cache::dir_digest(spec_dir);
        let changed = self
            .hints
            .get(SPEC_DIGEST_KEY)
            .is_some_and(|prior| prior != digest);
        if changed {
            self.notices.notify(Notice::Warning {
                message: "plugin specs changed since last session".to_string(),
            });
        }
        self.hints.set(SPEC_DIGEST_KEY, &digest);
        changed
    }

    /// Run the full load pass: graph diagnostics, priority bucket,
    /// immediate bucket, lazy trigger arming.
    pub fn startup(&mut self) -> LoadReport {
        self.with_cx(|loader, registry, cx| loader.load_all(registry, cx))
    }

    /// Load one plugin now, dependencies first. Also the explicit retry
    /// path for errored plugins.
    pub fn load_plugin(&mut self, name: &str) -> Result<(), ActivationError> {
        self.with_cx(|loader, registry, cx| loader.load_plugin(name, registry, cx))
    }

    /// Emit an editor signal. Plugins lazily armed on it come up first so
    /// their handlers can see this very emission. Debounce windows are
    /// measured against `now`, the same clock later `tick` calls drain
    /// with; command, key and filetype triggers schedule nothing and so
    /// take no clock.
    pub fn emit(&mut self, signal: &str, payload: Option<Value>, now: Instant) {
        let armed = self.loader.take_event_triggers(signal);
        if !armed.is_empty() {
            self.with_cx(|loader, registry, cx| {
                for name in &armed {
                    loader.load_lazy_plugin(name, registry, cx);
                }
            });
        }
        self.dispatch.emit(signal, payload, now, &mut self.scheduler);
    }

    /// Editor command entry. A lazily claimed command loads its plugin and
    /// replays the invocation with its original arguments. True when a
    /// claim was consumed.
    pub fn command_invoked(&mut self, command: &str, args: &[String]) -> bool {
        let Some(name) = self.loader.take_command_trigger(command) else {
            return false;
        };
        self.with_cx(|loader, registry, cx| loader.load_lazy_plugin(&name, registry, cx));
        if let Err(err) = self.bridge.invoke_command(command, args) {
            tracing::warn!("replaying command {command} failed: {err}");
        }
        true
    }

    /// Placeholder-binding entry. Loads the owning plugin, then re-sends
    /// the keys so the real mapping handles them.
    pub fn key_pressed(&mut self, mode: &str, lhs: &str) -> bool {
        let Some(name) = self.loader.take_key_trigger(mode, lhs) else {
            return false;
        };
        self.with_cx(|loader, registry, cx| loader.load_lazy_plugin(&name, registry, cx));
        if let Err(err) = self.bridge.feed_keys(mode, lhs) {
            tracing::warn!("replaying keys {lhs} failed: {err}");
        }
        true
    }

    /// First buffer of a filetype. One-shot triggers load and clear.
    pub fn filetype_opened(&mut self, filetype: &str) {
        let armed = self.loader.take_filetype_triggers(filetype);
        if armed.is_empty() {
            return;
        }
        self.with_cx(|loader, registry, cx| {
            for name in &armed {
                loader.load_lazy_plugin(name, registry, cx);
            }
        });
    }

    /// Drain due scheduled work. The editor calls this from its main loop.
    pub fn tick(&mut self, now: Instant) {
        for action in self.scheduler.take_due(now) {
            match action {
                ScheduledAction::FlushSignal { signal } => self.dispatch.flush(&signal),
                ScheduledAction::LazyTimeout { plugin } => {
                    self.with_cx(|loader, registry, cx| {
                        loader.load_lazy_plugin(&plugin, registry, cx);
                    });
                }
            }
        }
    }

    pub fn on(
        &mut self,
        signal: &str,
        priority: i32,
        handler: impl FnMut(Option<&Value>) -> anyhow::Result<()> + 'static,
    ) -> HandlerId {
        self.dispatch.on(signal, priority, handler)
    }

    pub fn off(&mut self, signal: &str, id: HandlerId) -> bool {
        self.dispatch.off(signal, id)
    }

    // ── Read-only surfaces ──

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> ManagerStats {
        self.registry.stats()
    }

    pub fn plugin_status(&self, name: &str) -> Option<PluginStatus> {
        self.registry.get(name).map(Plugin::status)
    }

    pub fn is_installed(&self, name: &str) -> Option<bool> {
        self.registry
            .get(name)
            .map(|plugin| plugin.is_installed(&*self.packs, &self.layout))
    }

    pub fn recent_notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.recent.iter()
    }

    pub fn history(&self) -> impl Iterator<Item = &Emission> {
        self.dispatch.history()
    }

    pub fn resolve_order(&self) -> Result<Vec<String>, Vec<ResolveError>> {
        Resolver::new(&self.registry)
            .resolve_all(&*self.bridge)
            .map(|order| {
                order
                    .into_iter()
                    .map(|plugin| plugin.name().to_string())
                    .collect()
            })
    }

    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        Resolver::new(&self.registry).dependents_of(name)
    }

    pub fn can_remove(&self, name: &str) -> bool {
        Resolver::new(&self.registry).can_remove(name)
    }

    /// Flip a plugin's enabled flag. False for unknown names. Enabling
    /// does not load; disabling does not unload.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(plugin) = self.registry.get_mut(name) else {
            return false;
        };
        plugin.set_enabled(enabled);
        true
    }

    fn with_cx<R>(
        &mut self,
        f: impl FnOnce(&mut Loader, &mut Registry, &mut LoadCx<'_>) -> R,
    ) -> R {
        let mut cx = LoadCx {
            bridge: &mut *self.bridge,
            packs: &mut *self.packs,
            layout: &self.layout,
            notices: &mut self.notices,
            scheduler: &mut self.scheduler,
            now: Instant::now(),
        };
        f(&mut self.loader, &mut self.registry, &mut cx)
    }
}

/// Fan-out sink: forwards every notice to the configured sink and keeps a
/// short tail for status surfaces.
struct HostSink {
    inner: Box<dyn NoticeSink>,
    recent: VecDeque<Notice>,
}

impl HostSink {
    fn new(inner: Box<dyn NoticeSink>) -> Self {
        Self {
            inner,
            recent: VecDeque::new(),
        }
    }
}

impl NoticeSink for HostSink {
    fn notify(&mut self, notice: Notice) {
        self.recent.push_back(notice.clone());
        while self.recent.len() > RECENT_NOTICES {
            self.recent.pop_front();
        }
        self.inner.notify(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::bridge::LoggingBridge;
    use crate::cache::MemoryHints;
    use crate::notice::CollectSink;
    use crate::plugin::source::MemoryPacks;

    fn host_with(config: ManagerConfig) -> Host {
        Host::new(
            &config,
            Box::new(LoggingBridge),
            Box::new(MemoryPacks::new()),
            Box::new(MemoryHints::new()),
            Box::new(CollectSink::default()),
        )
    }

    fn host() -> Host {
        host_with(ManagerConfig::default())
    }

    #[test]
    fn test_debounce_windows_come_from_config() {
        let mut config = ManagerConfig::default();
        config.debounce.insert("cursor:moved".to_string(), 50);
        let mut host = host_with(config);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        host.on("cursor:moved", 0, move |_| {
            sink.borrow_mut().push(());
            Ok(())
        });

        let start = Instant::now();
        host.emit("cursor:moved", None, start);
        host.emit("cursor:moved", None, start + Duration::from_millis(20));
        assert!(log.borrow().is_empty(), "still inside the window");

        host.tick(start + Duration::from_millis(200));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_emit_debounce_follows_the_caller_clock() {
        let mut config = ManagerConfig::default();
        config.debounce.insert("sig".to_string(), 100);
        let mut host = host_with(config);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        host.on("sig", 0, move |_| {
            sink.borrow_mut().push(());
            Ok(())
        });

        // A clock well ahead of wall time: the window must still be
        // measured from the emit instant, not from scheduling time.
        let start = Instant::now() + Duration::from_secs(60);
        host.emit("sig", None, start);

        host.tick(start + Duration::from_millis(50));
        assert!(log.borrow().is_empty(), "window not elapsed on this clock");

        host.tick(start + Duration::from_millis(100));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_command_trigger_loads_lazily() {
        let mut host = host();
        let mut lazy = PluginSpec::new("user/sleepy");
        lazy.commands = vec!["Sleepy".to_string()];
        assert!(host.register(vec![lazy]).is_empty());

        let report = host.startup();
        assert_eq!(report.deferred, ["sleepy"]);
        assert!(!host.registry().get("sleepy").unwrap().is_loaded());

        assert!(host.command_invoked("Sleepy", &[]));
        assert!(host.registry().get("sleepy").unwrap().is_loaded());
        assert!(!host.command_invoked("Sleepy", &[]), "claim is consumed");
    }

    #[test]
    fn test_event_trigger_loads_before_handlers_run() {
        let mut host = host();
        let mut lazy = PluginSpec::new("user/watcher");
        lazy.events = vec!["buffer:open".to_string()];
        host.register(vec![lazy]);
        host.startup();

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        host.on("buffer:open", 0, move |_| {
            sink.borrow_mut().push(());
            Ok(())
        });

        host.emit("buffer:open", None, Instant::now());
        assert!(host.registry().get("watcher").unwrap().is_loaded());
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(host.history().count(), 1);
    }

    #[test]
    fn test_lazy_timeout_forces_load() {
        let mut config = ManagerConfig::default();
        config.general.lazy_timeout_ms = 100;
        let mut host = host_with(config);
        let mut lazy = PluginSpec::new("user/slow");
        lazy.events = vec!["never".to_string()];
        host.register(vec![lazy]);
        host.startup();

        assert!(!host.registry().get("slow").unwrap().is_loaded());
        host.tick(Instant::now() + Duration::from_secs(1));
        assert!(host.registry().get("slow").unwrap().is_loaded());
    }

    #[test]
    fn test_spec_change_hint_across_checks() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("plugins.toml"), "[[plugin]]\n").unwrap();

        let mut host = host();
        assert!(!host.check_spec_changes(tmp.path()), "first sight is a baseline");
        assert!(!host.check_spec_changes(tmp.path()));

        std::fs::write(tmp.path().join("extra.toml"), "[[plugin]]\n").unwrap();
        assert!(host.check_spec_changes(tmp.path()));
        assert!(!host.check_spec_changes(tmp.path()), "digest refreshed");
    }

    #[test]
    fn test_recent_notices_keep_a_short_tail() {
        let mut host = host();
        let specs: Vec<PluginSpec> = (0..12).map(|_| PluginSpec::new("user/same")).collect();
        let errors = host.register(specs);
        assert_eq!(errors.len(), 11);
        assert_eq!(host.recent_notices().count(), 8);
    }

    #[test]
    fn test_enable_disable_round_trip() {
        let mut host = host();
        let mut off = PluginSpec::new("user/off");
        off.enabled = false;
        host.register(vec![off]);
        let report = host.startup();
        assert_eq!(report.skipped, ["off"]);

        assert!(host.set_enabled("off", true));
        host.load_plugin("off").unwrap();
        assert!(host.registry().get("off").unwrap().is_loaded());
        assert!(!host.set_enabled("ghost", true));
    }

    #[test]
    fn test_load_plugin_without_startup_rejects_missing_dependency() {
        let mut host = host();
        let mut needy = PluginSpec::new("user/needy");
        needy.depends = vec!["user/ghost".to_string()];
        host.register(vec![needy]);

        let err = host.load_plugin("needy").unwrap_err();
        assert!(matches!(
            err,
            ActivationError::DependencyFailed { ref plugin, ref dependency }
                if plugin == "needy" && dependency == "ghost"
        ));
        assert!(!host.registry().get("needy").unwrap().is_loaded());
    }

    #[test]
    fn test_graph_queries() {
        let mut host = host();
        let mut top = PluginSpec::new("user/top");
        top.depends = vec!["user/base".to_string()];
        host.register(vec![PluginSpec::new("user/base"), top]);

        assert_eq!(host.resolve_order().unwrap(), ["base", "top"]);
        assert_eq!(host.dependents_of("base"), ["top"]);
        assert!(!host.can_remove("base"));
        assert!(host.can_remove("top"));
    }
}
