use thiserror::Error;

/// Rejections raised while turning a declarative spec into a managed
/// plugin. Reported per spec; one bad entry never blocks the rest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("plugin spec has no source")]
    MissingSource,
    #[error("cannot derive a plugin name from source `{locator}`")]
    EmptyName { locator: String },
    #[error("duplicate plugin name `{name}`")]
    DuplicateName { name: String },
}

/// Dependency-graph diagnostics. Fatal only for the plugins they name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("plugin `{plugin}` depends on `{dependency}`, which is not registered")]
    MissingDependency { plugin: String, dependency: String },
    #[error("plugin `{plugin}` is part of a dependency cycle")]
    CircularDependency { plugin: String },
}

impl ResolveError {
    /// Name of the plugin the diagnostic is recorded against.
    pub fn plugin(&self) -> &str {
        match self {
            Self::MissingDependency { plugin, .. } => plugin,
            Self::CircularDependency { plugin } => plugin,
        }
    }
}

/// Failures during a single plugin activation. Recorded on the plugin,
/// surfaced to the notice stream; the batch keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("no plugin named `{name}` is registered")]
    UnknownPlugin { name: String },
    #[error("plugin `{plugin}` is disabled")]
    Disabled { plugin: String },
    #[error("plugin `{plugin}` could not be installed")]
    InstallFailed { plugin: String },
    #[error("plugin `{plugin}` init hook failed: {message}")]
    InitHook { plugin: String, message: String },
    #[error("plugin `{plugin}` configuration failed: {message}")]
    Configuration { plugin: String, message: String },
    #[error("plugin `{plugin}` keymap rejected: {message}")]
    Keymap { plugin: String, message: String },
    #[error("plugin `{plugin}` post hook failed: {message}")]
    PostHook { plugin: String, message: String },
    #[error("plugin `{plugin}` requires `{dependency}`, which failed to load")]
    DependencyFailed { plugin: String, dependency: String },
    #[error("plugin `{plugin}` depends on itself through a cycle")]
    DependencyCycle { plugin: String },
}

impl ActivationError {
    pub fn plugin(&self) -> &str {
        match self {
            Self::UnknownPlugin { name } => name,
            Self::Disabled { plugin }
            | Self::InstallFailed { plugin }
            | Self::InitHook { plugin, .. }
            | Self::Configuration { plugin, .. }
            | Self::Keymap { plugin, .. }
            | Self::PostHook { plugin, .. }
            | Self::DependencyFailed { plugin, .. }
            | Self::DependencyCycle { plugin } => plugin,
        }
    }
}
