//! patchbay - lazy-loading plugin manager core for modal text editors.
//!
//! Plugins are declared in TOML spec files, held in an insertion-ordered
//! registry, dependency-resolved, and activated either eagerly (priority
//! then immediate buckets) or lazily on their first event, command,
//! filetype or keypress trigger. A [`Host`] owns all the moving parts and
//! talks to the embedding editor through the [`EditorBridge`] trait, so
//! the core never assumes a particular editor runtime.

pub mod bridge;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod model;
pub mod notice;
pub mod plugin;
pub mod schedule;

// Re-export the surface an embedding editor touches.
pub use bridge::{EditorBridge, LoggingBridge, RecordingBridge};
pub use cache::{FileHints, HintCache, MemoryHints};
pub use dispatch::{Emission, EventDispatch, HandlerId};
pub use error::{ActivationError, ResolveError, SpecError};
pub use host::Host;
pub use model::config::ManagerConfig;
pub use model::spec::{ConfigAction, ConfigFn, Hook, KeymapSpec, PluginSpec};
pub use notice::{CollectSink, LogSink, Notice, NoticeSink};
pub use plugin::discover::scan_spec_dir;
pub use plugin::entity::{Plugin, PluginStatus};
pub use plugin::loader::{LoadReport, Loader};
pub use plugin::registry::{ManagerStats, Registry};
pub use plugin::resolver::Resolver;
pub use plugin::source::{LocalPacks, MemoryPacks, PackLayout, PackSource};
pub use schedule::{ScheduledAction, Scheduler, TaskKey};
