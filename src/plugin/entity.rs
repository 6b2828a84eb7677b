use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use smallvec::SmallVec;
use toml::value::Table;

use crate::bridge::EditorBridge;
use crate::error::{ActivationError, SpecError};
use crate::model::spec::{self, ConfigAction, Hook, KeymapSpec, PluginSpec};
use crate::plugin::source::{PackLayout, PackSource};

static KEY_NOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(<[^<>\s]+>|[^<>\s])+$").expect("valid key notation regex"));

/// Lifecycle summary, highest-signal state first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    Error(String),
    Loaded,
    Disabled,
    NotLoaded,
}

/// One managed plugin. Built from a `PluginSpec`, owned by the registry,
/// addressed everywhere else by name.
#[derive(Debug)]
pub struct Plugin {
    name: String,
    source: String,
    depends: SmallVec<[String; 2]>,
    events: SmallVec<[String; 2]>,
    commands: SmallVec<[String; 2]>,
    filetypes: SmallVec<[String; 2]>,
    keys: Vec<KeymapSpec>,
    priority: i32,
    lazy: bool,
    bootstrap: bool,
    enabled: bool,
    installed: bool,
    loaded: bool,
    error: Option<String>,
    opts: Option<Table>,
    config: ConfigAction,
    init: Option<Hook>,
    post: Option<Hook>,
    load_order: Option<u32>,
    load_duration: Option<Duration>,
}

impl Plugin {
    /// Derive a managed plugin from its spec. Dependency identifiers are
    /// reduced to plugin names here; unset `lazy` becomes true iff any
    /// trigger list is non-empty.
    pub fn from_spec(spec: PluginSpec) -> Result<Self, SpecError> {
        let Some(source) = spec.source.filter(|s| !s.trim().is_empty()) else {
            return Err(SpecError::MissingSource);
        };

        let name = match spec.name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => spec::derive_name(&source).ok_or_else(|| SpecError::EmptyName {
                locator: source.clone(),
            })?,
        };

        let lazy = spec.lazy.unwrap_or_else(|| {
            !spec.events.is_empty()
                || !spec.commands.is_empty()
                || !spec.filetypes.is_empty()
                || !spec.keys.is_empty()
        });

        let depends = spec
            .depends
            .iter()
            .map(|dep| spec::derive_name(dep).unwrap_or_else(|| dep.clone()))
            .collect();

        Ok(Self {
            name,
            source,
            depends,
            events: SmallVec::from_vec(spec.events),
            commands: SmallVec::from_vec(spec.commands),
            filetypes: SmallVec::from_vec(spec.filetypes),
            keys: spec.keys,
            priority: spec.priority,
            lazy,
            bootstrap: spec.bootstrap,
            enabled: spec.enabled,
            installed: false,
            loaded: false,
            error: None,
            opts: spec.opts,
            config: spec.config,
            init: spec.init,
            post: spec.post,
            load_order: None,
            load_duration: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn filetypes(&self) -> &[String] {
        &self.filetypes
    }

    pub fn keys(&self) -> &[KeymapSpec] {
        &self.keys
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn installed(&self) -> bool {
        self.installed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn load_order(&self) -> Option<u32> {
        self.load_order
    }

    pub fn load_duration(&self) -> Option<Duration> {
        self.load_duration
    }

    /// Disabling keeps the entry visible but inert; re-enabling makes the
    /// plugin loadable again.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_installed(&mut self, installed: bool) {
        self.installed = installed;
    }

    /// Record a failure. The first message sticks until a retry clears it.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    pub fn should_activate(&self) -> bool {
        self.enabled && !self.loaded
    }

    pub fn status(&self) -> PluginStatus {
        if let Some(message) = &self.error {
            return PluginStatus::Error(message.clone());
        }
        if self.loaded {
            return PluginStatus::Loaded;
        }
        if !self.enabled {
            return PluginStatus::Disabled;
        }
        PluginStatus::NotLoaded
    }

    /// Runtime module this plugin configures: explicit override first,
    /// else the sanitized plugin name.
    pub fn module_name(&self) -> String {
        match &self.config {
            ConfigAction::Module {
                name: Some(name), ..
            } => name.clone(),
            _ => spec::derive_module(&self.name),
        }
    }

    /// Static opts deep-merged with the config payload. Payload wins.
    pub fn merged_opts(&self) -> Table {
        let mut merged = self.opts.clone().unwrap_or_default();
        if let ConfigAction::Module {
            opts: Some(payload),
            ..
        } = &self.config
        {
            spec::deep_merge(&mut merged, payload);
        }
        merged
    }

    /// On-disk presence at the deterministic pack path.
    pub fn is_installed(&self, packs: &dyn PackSource, layout: &PackLayout) -> bool {
        self.installed || packs.is_present(&layout.plugin_dir(&self.name, self.bootstrap))
    }

    /// Drive the activation sequence: init hook, option merge, config
    /// action, keymaps, post hook. Idempotent once loaded; a stage failure
    /// records the error and skips every later stage.
    pub fn activate(
        &mut self,
        seq: u32,
        bridge: &mut dyn EditorBridge,
    ) -> Result<(), ActivationError> {
        if self.loaded {
            return Ok(());
        }
        if !self.enabled {
            return Err(ActivationError::Disabled {
                plugin: self.name.clone(),
            });
        }

        let started = Instant::now();
        self.error = None;

        if let Err(err) = self.run_stages(bridge) {
            self.error = Some(err.to_string());
            return Err(err);
        }

        self.loaded = true;
        self.load_order = Some(seq);
        self.load_duration = Some(started.elapsed());
        tracing::debug!("activated plugin {} (order {seq})", self.name);
        Ok(())
    }

    fn run_stages(&mut self, bridge: &mut dyn EditorBridge) -> Result<(), ActivationError> {
        if let Some(hook) = self.init.as_mut() {
            hook.run(bridge).map_err(|err| ActivationError::InitHook {
                plugin: self.name.clone(),
                message: format!("{err:#}"),
            })?;
        }

        let merged = self.merged_opts();
        let module = self.module_name();

        match &mut self.config {
            ConfigAction::Run(callable) => {
                callable
                    .run(bridge, &merged)
                    .map_err(|err| ActivationError::Configuration {
                        plugin: self.name.clone(),
                        message: format!("{err:#}"),
                    })?;
            }
            // The plugin configures itself either way.
            ConfigAction::Literal(_) => {}
            ConfigAction::Command(command) => {
                bridge
                    .run_command(command)
                    .map_err(|err| ActivationError::Configuration {
                        plugin: self.name.clone(),
                        message: format!("{err:#}"),
                    })?;
            }
            ConfigAction::Module { .. } => {
                bridge
                    .setup_module(&module, &merged)
                    .map_err(|err| ActivationError::Configuration {
                        plugin: self.name.clone(),
                        message: format!("{err:#}"),
                    })?;
            }
        }

        for key in &self.keys {
            validate_keymap(key).map_err(|message| ActivationError::Keymap {
                plugin: self.name.clone(),
                message,
            })?;
            bridge
                .set_keymap(&key.mode, &key.lhs, &key.rhs)
                .map_err(|err| ActivationError::Keymap {
                    plugin: self.name.clone(),
                    message: format!("{err:#}"),
                })?;
        }

        if let Some(hook) = self.post.as_mut() {
            hook.run(bridge).map_err(|err| ActivationError::PostHook {
                plugin: self.name.clone(),
                message: format!("{err:#}"),
            })?;
        }

        Ok(())
    }
}

fn validate_keymap(key: &KeymapSpec) -> Result<(), String> {
    if key.lhs.trim().is_empty() {
        return Err("keymap lhs is empty".to_string());
    }
    if !KEY_NOTATION_RE.is_match(&key.lhs) {
        return Err(format!("keymap lhs `{}` is not valid key notation", key.lhs));
    }
    if key.rhs.trim().is_empty() {
        return Err(format!("keymap `{}` has an empty rhs", key.lhs));
    }
    Ok(())
}
