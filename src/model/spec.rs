use std::fmt;

use anyhow::Result;
use serde::Deserialize;
use serde::de::{self, Deserializer};
use toml::Value;
use toml::value::Table;

use crate::bridge::EditorBridge;

/// Declarative plugin specification, one `[[plugin]]` table per entry.
/// Hooks cannot come from TOML; they are attached programmatically.
#[derive(Debug, Deserialize)]
pub struct PluginSpec {
    #[serde(default)]
    pub source: Option<String>,
    /// Overrides the name derived from `source`.
    #[serde(default)]
    pub name: Option<String>,
    /// Dependency source identifiers, resolved to names at registration.
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub filetypes: Vec<String>,
    #[serde(default)]
    pub keys: Vec<KeymapSpec>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Unset means: lazy iff any trigger list is non-empty.
    #[serde(default)]
    pub lazy: Option<bool>,
    /// Bootstrap plugins land in the always-on pack partition.
    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub opts: Option<Table>,
    #[serde(default)]
    pub config: ConfigAction,
    #[serde(skip)]
    pub init: Option<Hook>,
    #[serde(skip)]
    pub post: Option<Hook>,
}

impl PluginSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }
}

impl Default for PluginSpec {
    fn default() -> Self {
        Self {
            source: None,
            name: None,
            depends: Vec::new(),
            events: Vec::new(),
            commands: Vec::new(),
            filetypes: Vec::new(),
            keys: Vec::new(),
            priority: default_priority(),
            enabled: true,
            lazy: None,
            bootstrap: false,
            opts: None,
            config: ConfigAction::default(),
            init: None,
            post: None,
        }
    }
}

/// One key binding request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeymapSpec {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub lhs: String,
    #[serde(default)]
    pub rhs: String,
}

/// On-disk container: any number of `[[plugin]]` tables.
#[derive(Debug, Default, Deserialize)]
pub struct SpecFile {
    #[serde(default)]
    pub plugin: Vec<PluginSpec>,
}

/// How a plugin gets configured once its code is on the runtime path.
/// Exactly one form, picked when the spec is parsed.
#[derive(Debug)]
pub enum ConfigAction {
    /// Call the module's setup entry point with the merged options.
    /// `name: None` falls back to the plugin's derived module name.
    Module {
        name: Option<String>,
        opts: Option<Table>,
    },
    /// Plugin configures itself; the configuration stage is skipped.
    Literal(bool),
    /// Execute an editor command string.
    Command(String),
    /// Run an attached closure with the merged options.
    Run(ConfigFn),
}

impl Default for ConfigAction {
    fn default() -> Self {
        Self::Module {
            name: None,
            opts: None,
        }
    }
}

impl<'de> Deserialize<'de> for ConfigAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Boolean(flag) => Ok(Self::Literal(flag)),
            Value::String(command) => Ok(Self::Command(command)),
            Value::Table(mut table) => {
                let name = match table.remove("module") {
                    Some(Value::String(name)) => Some(name),
                    Some(other) => {
                        return Err(de::Error::custom(format!(
                            "config.module must be a string, got {}",
                            other.type_str()
                        )));
                    }
                    None => None,
                };
                let opts = match table.remove("opts") {
                    Some(Value::Table(opts)) => Some(opts),
                    Some(other) => {
                        return Err(de::Error::custom(format!(
                            "config.opts must be a table, got {}",
                            other.type_str()
                        )));
                    }
                    None => None,
                };
                Ok(Self::Module { name, opts })
            }
            other => Err(de::Error::custom(format!(
                "config must be a boolean, command string, or module table, got {}",
                other.type_str()
            ))),
        }
    }
}

/// Programmatic activation hook. Runs against the editor bridge.
pub struct Hook(Box<dyn FnMut(&mut dyn EditorBridge) -> Result<()>>);

impl Hook {
    pub fn new(hook: impl FnMut(&mut dyn EditorBridge) -> Result<()> + 'static) -> Self {
        Self(Box::new(hook))
    }

    pub fn run(&mut self, bridge: &mut dyn EditorBridge) -> Result<()> {
        (self.0)(bridge)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Programmatic configuration closure. Receives the merged options.
pub struct ConfigFn(Box<dyn FnMut(&mut dyn EditorBridge, &Table) -> Result<()>>);

impl ConfigFn {
    pub fn new(config: impl FnMut(&mut dyn EditorBridge, &Table) -> Result<()> + 'static) -> Self {
        Self(Box::new(config))
    }

    pub fn run(&mut self, bridge: &mut dyn EditorBridge, opts: &Table) -> Result<()> {
        (self.0)(bridge, opts)
    }
}

impl fmt::Debug for ConfigFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfigFn(..)")
    }
}

fn default_priority() -> i32 {
    50
}

fn default_enabled() -> bool {
    true
}

fn default_mode() -> String {
    "n".to_string()
}

/// Last path segment of a source locator, `.git` suffix stripped.
pub fn derive_name(source: &str) -> Option<String> {
    let trimmed = source.trim_end_matches('/').trim_end_matches(".git");
    trimmed
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Runtime module name for a plugin: lowercase, editor suffix stripped,
/// dashes mapped to underscores.
pub fn derive_module(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    lowered
        .trim_end_matches(".nvim")
        .trim_end_matches(".vim")
        .replace('-', "_")
}

/// Merge `overlay` into `base`, recursing through tables. Overlay wins.
pub fn deep_merge(base: &mut Table, overlay: &Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_name_strips_git_suffix() {
        assert_eq!(
            derive_name("https://github.com/user/fuzzy-finder.git"),
            Some("fuzzy-finder".to_string())
        );
        assert_eq!(
            derive_name("user/statusline.nvim"),
            Some("statusline.nvim".to_string())
        );
        assert_eq!(derive_name("user/trailing/"), Some("trailing".to_string()));
        assert_eq!(derive_name(""), None);
        assert_eq!(derive_name("///"), None);
    }

    #[test]
    fn test_derive_module_sanitizes() {
        assert_eq!(derive_module("Statusline.nvim"), "statusline");
        assert_eq!(derive_module("fuzzy-finder"), "fuzzy_finder");
        assert_eq!(derive_module("commenter.vim"), "commenter");
    }

    #[test]
    fn test_spec_defaults() {
        let spec: PluginSpec = toml::from_str(r#"source = "user/thing""#).unwrap();
        assert_eq!(spec.priority, 50);
        assert!(spec.enabled);
        assert!(spec.lazy.is_none());
        assert!(!spec.bootstrap);
        assert!(matches!(
            spec.config,
            ConfigAction::Module {
                name: None,
                opts: None
            }
        ));
    }

    #[test]
    fn test_config_action_forms() {
        let spec: PluginSpec = toml::from_str(
            r#"
            source = "user/thing"
            config = true
            "#,
        )
        .unwrap();
        assert!(matches!(spec.config, ConfigAction::Literal(true)));

        let spec: PluginSpec = toml::from_str(
            r#"
            source = "user/thing"
            config = "colorscheme gruvbox"
            "#,
        )
        .unwrap();
        assert!(matches!(spec.config, ConfigAction::Command(ref c) if c == "colorscheme gruvbox"));

        let spec: PluginSpec = toml::from_str(
            r#"
            source = "user/thing"
            config = { module = "thing_setup", opts = { width = 30 } }
            "#,
        )
        .unwrap();
        let ConfigAction::Module { name, opts } = spec.config else {
            panic!("expected module form");
        };
        assert_eq!(name.as_deref(), Some("thing_setup"));
        assert_eq!(
            opts.unwrap().get("width"),
            Some(&Value::Integer(30))
        );
    }

    #[test]
    fn test_config_action_rejects_wrong_types() {
        let result = toml::from_str::<PluginSpec>(
            r#"
            source = "user/thing"
            config = 42
            "#,
        );
        assert!(result.is_err());

        let result = toml::from_str::<PluginSpec>(
            r#"
            source = "user/thing"
            config = { module = 3 }
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_spec_file_parses_multiple_entries() {
        let file: SpecFile = toml::from_str(
            r#"
            [[plugin]]
            source = "user/one"

            [[plugin]]
            source = "user/two"
            priority = 80

            [[plugin.keys]]
            mode = "n"
            lhs = "<leader>t"
            rhs = "TwoToggle"
            "#,
        )
        .unwrap();
        assert_eq!(file.plugin.len(), 2);
        assert_eq!(file.plugin[1].priority, 80);
        assert_eq!(file.plugin[1].keys.len(), 1);
        assert_eq!(file.plugin[1].keys[0].lhs, "<leader>t");
    }

    #[test]
    fn test_deep_merge_overlay_wins() {
        let mut base: Table = toml::from_str(
            r#"
            width = 20
            [colors]
            fg = "white"
            bg = "black"
            "#,
        )
        .unwrap();
        let overlay: Table = toml::from_str(
            r#"
            width = 30
            [colors]
            fg = "green"
            "#,
        )
        .unwrap();

        deep_merge(&mut base, &overlay);
        assert_eq!(base.get("width"), Some(&Value::Integer(30)));
        let colors = base.get("colors").and_then(Value::as_table).unwrap();
        assert_eq!(colors.get("fg"), Some(&Value::String("green".into())));
        assert_eq!(colors.get("bg"), Some(&Value::String("black".into())));
    }

    #[test]
    fn test_deep_merge_replaces_non_table_with_table() {
        let mut base: Table = toml::from_str(r#"layout = "wide""#).unwrap();
        let overlay: Table = toml::from_str(
            r#"
            [layout]
            kind = "split"
            "#,
        )
        .unwrap();

        deep_merge(&mut base, &overlay);
        assert!(base.get("layout").is_some_and(Value::is_table));
    }
}
