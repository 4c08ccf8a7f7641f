use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Topology label '{0}' must not be empty")]
    EmptyLabel(&'static str),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to remove directory '{path}': {source}")]
    RemoveDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write rules file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk template directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to render rule group '{identifier}': {message}")]
    Serialize { identifier: String, message: String },

    #[error("Rule sync task failed: {0}")]
    Task(String),
}

/// Raised once the reload endpoint has exhausted its retry budget.
///
/// The running agent may still be serving the previous configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not reload configuration: {message}")]
pub struct ReloadError {
    pub message: String,
}

impl ReloadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failures reported by an [`AgentHost`](crate::host::AgentHost) implementation.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent unreachable: {0}")]
    Unreachable(String),

    #[error("Agent operation timed out: {0}")]
    Timeout(String),

    #[error("Service operation failed: {0}")]
    Service(String),
}

impl HostError {
    /// Returns true if the failure is a transport hiccup rather than something
    /// an operator has to fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, HostError::Unreachable(_) | HostError::Timeout(_))
    }

    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => HostError::NotFound(path),
            std::io::ErrorKind::TimedOut => HostError::Timeout(err.to_string()),
            _ => HostError::Io { path, source: err },
        }
    }
}

/// Errors surfaced by the rule and dashboard reconciliation path.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Rule sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
