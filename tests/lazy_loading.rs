//! End-to-end flows through the public `Host` surface: spec discovery,
//! startup buckets, every lazy trigger kind, debounce, and the timeout
//! fallback.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use toml::value::Table;

use patchbay::model::config::ManagerConfig;
use patchbay::plugin::discover::scan_spec_dir;
use patchbay::{
    CollectSink, EditorBridge, Host, KeymapSpec, MemoryHints, MemoryPacks, Notice, PluginSpec,
    RecordingBridge,
};

/// Hands the host an owned bridge while the test keeps eyes on the
/// recording underneath.
#[derive(Clone, Default)]
struct SharedBridge(Rc<RefCell<RecordingBridge>>);

impl SharedBridge {
    fn new() -> Self {
        Self::default()
    }
}

impl EditorBridge for SharedBridge {
    fn setup_module(&mut self, module: &str, opts: &Table) -> anyhow::Result<()> {
        self.0.borrow_mut().setup_module(module, opts)
    }

    fn run_command(&mut self, command: &str) -> anyhow::Result<()> {
        self.0.borrow_mut().run_command(command)
    }

    fn set_keymap(&mut self, mode: &str, lhs: &str, rhs: &str) -> anyhow::Result<()> {
        self.0.borrow_mut().set_keymap(mode, lhs, rhs)
    }

    fn invoke_command(&mut self, command: &str, args: &[String]) -> anyhow::Result<()> {
        self.0.borrow_mut().invoke_command(command, args)
    }

    fn feed_keys(&mut self, mode: &str, keys: &str) -> anyhow::Result<()> {
        self.0.borrow_mut().feed_keys(mode, keys)
    }

    fn has_runtime_module(&self, module: &str) -> bool {
        self.0.borrow().has_runtime_module(module)
    }
}

fn host_with_bridge(config: ManagerConfig) -> (Host, SharedBridge) {
    let bridge = SharedBridge::new();
    let host = Host::new(
        &config,
        Box::new(bridge.clone()),
        Box::new(MemoryPacks::new()),
        Box::new(MemoryHints::new()),
        Box::new(CollectSink::default()),
    );
    (host, bridge)
}

#[test]
fn spec_files_drive_a_full_startup() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("10-core.toml"),
        r#"
[[plugin]]
source = "user/boot"
priority = 90
bootstrap = true

[[plugin]]
source = "user/editor-extras"
"#,
    )
    .unwrap();
    std::fs::write(
        tmp.path().join("20-lang.toml"),
        r#"
[[plugin]]
source = "user/linter.nvim"
filetypes = ["rust"]

[[plugin]]
source = "user/formatter"
commands = ["Format"]
"#,
    )
    .unwrap();

    let (mut host, bridge) = host_with_bridge(ManagerConfig::default());
    assert!(host.register(scan_spec_dir(tmp.path())).is_empty());
    let report = host.startup();

    assert_eq!(report.loaded, ["boot", "editor-extras"]);
    assert_eq!(report.deferred, ["linter.nvim", "formatter"]);
    assert_eq!(bridge.0.borrow().setup_names(), ["boot", "editor_extras"]);

    host.filetype_opened("rust");
    assert!(host.registry().get("linter.nvim").unwrap().is_loaded());

    assert!(host.command_invoked("Format", &["--all".to_string()]));
    let rec = bridge.0.borrow();
    assert_eq!(
        rec.setup_names(),
        ["boot", "editor_extras", "linter", "formatter"]
    );
    assert_eq!(
        rec.invocations,
        [("Format".to_string(), vec!["--all".to_string()])]
    );
    drop(rec);

    let stats = host.stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.loaded, 4);
    assert_eq!(stats.lazy, 0);
    assert_eq!(stats.errors, 0);
}

#[test]
fn key_trigger_loads_and_replays() {
    let (mut host, bridge) = host_with_bridge(ManagerConfig::default());
    let mut lazy = PluginSpec::new("user/jumper");
    lazy.keys = vec![KeymapSpec {
        mode: "n".to_string(),
        lhs: "<leader>j".to_string(),
        rhs: ":Jump<CR>".to_string(),
    }];
    host.register(vec![lazy]);
    host.startup();

    assert!(host.key_pressed("n", "<leader>j"));
    assert!(host.registry().get("jumper").unwrap().is_loaded());

    let rec = bridge.0.borrow();
    // Real mapping registered during activation, then the keys re-sent.
    assert_eq!(
        rec.calls,
        ["setup:jumper", "keymap:<leader>j", "keys:<leader>j"]
    );
    drop(rec);

    assert!(!host.key_pressed("n", "<leader>j"), "placeholder consumed");
}

#[test]
fn trigger_load_pulls_dependencies_first() {
    let (mut host, bridge) = host_with_bridge(ManagerConfig::default());
    let mut base = PluginSpec::new("user/base");
    base.events = vec!["ui:never".to_string()];
    let mut mid = PluginSpec::new("user/mid");
    mid.depends = vec!["user/base".to_string()];
    mid.events = vec!["ui:enter".to_string()];
    host.register(vec![base, mid]);

    let report = host.startup();
    assert_eq!(report.deferred, ["base", "mid"]);
    assert!(bridge.0.borrow().setups.is_empty());

    host.emit("ui:enter", None, Instant::now());
    assert_eq!(bridge.0.borrow().setup_names(), ["base", "mid"]);
    assert_eq!(host.registry().get("base").unwrap().load_order(), Some(1));
    assert_eq!(host.registry().get("mid").unwrap().load_order(), Some(2));
}

#[test]
fn debounced_signal_fires_once_with_last_payload() {
    let mut config = ManagerConfig::default();
    config.debounce.insert("buffer:modified".to_string(), 100);
    let (mut host, _bridge) = host_with_bridge(config);

    let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    host.on("buffer:modified", 0, move |payload| {
        let text = payload
            .and_then(|value| value.as_str())
            .unwrap_or("<none>")
            .to_string();
        sink.borrow_mut().push(text);
        Ok(())
    });

    let start = Instant::now();
    host.emit(
        "buffer:modified",
        Some(toml::Value::String("one".to_string())),
        start,
    );
    host.emit(
        "buffer:modified",
        Some(toml::Value::String("two".to_string())),
        start + Duration::from_millis(30),
    );
    host.tick(start + Duration::from_millis(50));
    assert!(seen.borrow().is_empty(), "inside the window");

    host.tick(start + Duration::from_millis(500));
    assert_eq!(*seen.borrow(), ["two"]);
    assert_eq!(host.history().count(), 1, "superseded emission never ran");
}

#[test]
fn lazy_timeout_is_superseded_by_a_trigger_load() {
    let mut config = ManagerConfig::default();
    config.general.lazy_timeout_ms = 100;
    let (mut host, bridge) = host_with_bridge(config);

    let mut quick = PluginSpec::new("user/quick");
    quick.commands = vec!["Quick".to_string()];
    let mut slow = PluginSpec::new("user/slow");
    slow.events = vec!["never".to_string()];
    host.register(vec![quick, slow]);
    host.startup();

    assert!(host.command_invoked("Quick", &[]));
    assert_eq!(bridge.0.borrow().setup_names(), ["quick"]);

    host.tick(Instant::now() + Duration::from_secs(5));
    assert_eq!(
        bridge.0.borrow().setup_names(),
        ["quick", "slow"],
        "one setup each, no timeout double-fire"
    );
    assert!(host.registry().get("quick").unwrap().is_loaded());
    assert!(host.registry().get("slow").unwrap().is_loaded());
}

#[test]
fn stats_and_notices_reflect_the_pass() {
    let (mut host, _bridge) = host_with_bridge(ManagerConfig::default());
    let mut dead = PluginSpec::new("user/dead");
    dead.depends = vec!["user/ghost".to_string()];
    let mut off = PluginSpec::new("user/off");
    off.enabled = false;
    let mut lazy = PluginSpec::new("user/lazy");
    lazy.events = vec!["never".to_string()];
    host.register(vec![PluginSpec::new("user/fine"), dead, off, lazy]);

    let report = host.startup();
    assert_eq!(report.loaded, ["fine"]);
    assert_eq!(report.skipped, ["off"]);
    assert_eq!(report.deferred, ["lazy"]);
    assert_eq!(report.diagnostics.len(), 1);

    let stats = host.stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.loaded, 1);
    assert_eq!(stats.lazy, 1);
    assert_eq!(stats.disabled, 1);
    assert_eq!(stats.errors, 1);

    assert!(
        host.recent_notices()
            .any(|notice| matches!(notice, Notice::Warning { .. }))
    );
}
