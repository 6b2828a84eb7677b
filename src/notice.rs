use std::fmt;

/// Load-progress events for whatever surface the editor renders them on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LoadingStarted { plugin: String },
    Loaded { plugin: String },
    LoadFailed { plugin: String, message: String },
    Warning { message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadingStarted { plugin } => write!(f, "loading {plugin}..."),
            Self::Loaded { plugin } => write!(f, "{plugin} loaded"),
            Self::LoadFailed { plugin, message } => write!(f, "{plugin} failed: {message}"),
            Self::Warning { message } => write!(f, "warning: {message}"),
        }
    }
}

/// Receives notices as they happen. Implemented by the embedding editor's
/// status surface; the host binary routes them to the log.
pub trait NoticeSink {
    fn notify(&mut self, notice: Notice);
}

/// Sink that writes notices to the tracing log.
#[derive(Debug, Default)]
pub struct LogSink;

impl NoticeSink for LogSink {
    fn notify(&mut self, notice: Notice) {
        match &notice {
            Notice::LoadFailed { .. } => tracing::error!("{notice}"),
            Notice::Warning { .. } => tracing::warn!("{notice}"),
            _ => tracing::info!("{notice}"),
        }
    }
}

/// Sink that keeps every notice, for assertions and dry runs.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub notices: Vec<Notice>,
}

impl NoticeSink for CollectSink {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

impl CollectSink {
    pub fn failures(&self) -> Vec<&Notice> {
        self.notices
            .iter()
            .filter(|notice| matches!(notice, Notice::LoadFailed { .. }))
            .collect()
    }
}
