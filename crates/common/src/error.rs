use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the registry, the supervisor and the layout manager.
#[derive(Debug, Error)]
pub enum HostError {
    /// A registry entry with this name already exists.
    #[error("Server `{name}` already exists")]
    DuplicateName { name: String },

    /// No registry entry carries this name.
    #[error("Server `{name}` not found")]
    NotFound { name: String },

    /// The supervisor tracks no live instance for this name.
    #[error("Server `{name}` is not running")]
    NotRunning { name: String },

    /// The supervisor already tracks a live instance for this name.
    #[error("Server `{name}` is already running")]
    AlreadyRunning { name: String },

    /// The instance address could not be bound.
    #[error("Cannot bind {addr} for `{name}`: {source}")]
    BindConflict {
        name: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The persisted registry exists but cannot be parsed.
    #[error("Registry file {} is corrupt: {source}", path.display())]
    CorruptRegistry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The name cannot be used as a server directory.
    #[error("Invalid server name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Genuine filesystem or process failure.
    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type HostResult<T> = std::result::Result<T, HostError>;

impl HostError {
    pub fn duplicate(name: impl Into<String>) -> Self {
        HostError::DuplicateName { name: name.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        HostError::NotFound { name: name.into() }
    }

    pub fn not_running(name: impl Into<String>) -> Self {
        HostError::NotRunning { name: name.into() }
    }

    pub fn already_running(name: impl Into<String>) -> Self {
        HostError::AlreadyRunning { name: name.into() }
    }

    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        HostError::InvalidName {
            name: name.into(),
            reason,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HostError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_running(&self) -> bool {
        matches!(self, HostError::NotRunning { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound { .. })
    }
}
