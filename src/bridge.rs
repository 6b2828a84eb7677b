use std::collections::HashSet;

use anyhow::{Result, bail};
use toml::value::Table;

/// Editor capabilities a plugin touches during activation. The embedding
/// editor implements this once; headless runs use `LoggingBridge`.
pub trait EditorBridge {
    /// Call a runtime module's setup entry point with merged options.
    fn setup_module(&mut self, module: &str, opts: &Table) -> Result<()>;

    /// Execute an editor command string.
    fn run_command(&mut self, command: &str) -> Result<()>;

    /// Register a key binding.
    fn set_keymap(&mut self, mode: &str, lhs: &str, rhs: &str) -> Result<()>;

    /// Invoke a named command with arguments. Used to replay the original
    /// invocation after a lazy trigger loads its plugin.
    fn invoke_command(&mut self, command: &str, args: &[String]) -> Result<()>;

    /// Re-send keys through the editor input pipeline after a lazy key
    /// trigger loads its plugin.
    fn feed_keys(&mut self, mode: &str, keys: &str) -> Result<()>;

    /// Does the runtime already provide this module without any plugin?
    fn has_runtime_module(&self, module: &str) -> bool;
}

/// Bridge for headless runs: everything logs and succeeds, except the
/// runtime-module check, which always says no.
#[derive(Debug, Default)]
pub struct LoggingBridge;

impl EditorBridge for LoggingBridge {
    fn setup_module(&mut self, module: &str, opts: &Table) -> Result<()> {
        tracing::info!("setup {module} ({} option keys)", opts.len());
        Ok(())
    }

    fn run_command(&mut self, command: &str) -> Result<()> {
        tracing::info!("run command: {command}");
        Ok(())
    }

    fn set_keymap(&mut self, mode: &str, lhs: &str, rhs: &str) -> Result<()> {
        tracing::info!("keymap [{mode}] {lhs} -> {rhs}");
        Ok(())
    }

    fn invoke_command(&mut self, command: &str, args: &[String]) -> Result<()> {
        tracing::info!("invoke {command} {args:?}");
        Ok(())
    }

    fn feed_keys(&mut self, mode: &str, keys: &str) -> Result<()> {
        tracing::info!("feed keys [{mode}] {keys}");
        Ok(())
    }

    fn has_runtime_module(&self, _module: &str) -> bool {
        false
    }
}

/// Records every call for assertions. `calls` keeps the interleaved order
/// across call kinds; failures are injected per module or command name.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    pub calls: Vec<String>,
    pub setups: Vec<(String, Table)>,
    pub commands: Vec<String>,
    pub keymaps: Vec<(String, String, String)>,
    pub invocations: Vec<(String, Vec<String>)>,
    pub fed_keys: Vec<(String, String)>,
    pub runtime_modules: HashSet<String>,
    pub fail_modules: HashSet<String>,
    pub fail_commands: HashSet<String>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_module(mut self, module: &str) -> Self {
        self.fail_modules.insert(module.to_string());
        self
    }

    pub fn with_runtime_module(mut self, module: &str) -> Self {
        self.runtime_modules.insert(module.to_string());
        self
    }

    pub fn setup_names(&self) -> Vec<&str> {
        self.setups.iter().map(|(module, _)| module.as_str()).collect()
    }
}

impl EditorBridge for RecordingBridge {
    fn setup_module(&mut self, module: &str, opts: &Table) -> Result<()> {
        if self.fail_modules.contains(module) {
            bail!("setup of {module} refused");
        }
        self.calls.push(format!("setup:{module}"));
        self.setups.push((module.to_string(), opts.clone()));
        Ok(())
    }

    fn run_command(&mut self, command: &str) -> Result<()> {
        if self.fail_commands.contains(command) {
            bail!("command {command} refused");
        }
        self.calls.push(format!("command:{command}"));
        self.commands.push(command.to_string());
        Ok(())
    }

    fn set_keymap(&mut self, mode: &str, lhs: &str, rhs: &str) -> Result<()> {
        self.calls.push(format!("keymap:{lhs}"));
        self.keymaps
            .push((mode.to_string(), lhs.to_string(), rhs.to_string()));
        Ok(())
    }

    fn invoke_command(&mut self, command: &str, args: &[String]) -> Result<()> {
        self.calls.push(format!("invoke:{command}"));
        self.invocations.push((command.to_string(), args.to_vec()));
        Ok(())
    }

    fn feed_keys(&mut self, mode: &str, keys: &str) -> Result<()> {
        self.calls.push(format!("keys:{keys}"));
        self.fed_keys.push((mode.to_string(), keys.to_string()));
        Ok(())
    }

    fn has_runtime_module(&self, module: &str) -> bool {
        self.runtime_modules.contains(module)
    }
}
