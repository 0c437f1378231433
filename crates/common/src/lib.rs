use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod error;
pub mod layout;
pub mod net;

pub use error::{HostError, HostResult};
pub use layout::{ensure_layout, LayoutPaths};

/// Port used when a caller does not supply one.
pub const DEFAULT_PORT: u16 = 5000;

/// Quota hint used when a caller does not supply one. Accepted and persisted,
/// never enforced by a running instance.
pub const DEFAULT_MAX_GB: f64 = 1.0;

fn default_max_gb() -> f64 {
    DEFAULT_MAX_GB
}

/// Which handler set a managed instance exposes on `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Site,
    Storage,
    Neuro,
}

impl ServerMode {
    pub const ALL: [ServerMode; 3] = [ServerMode::Site, ServerMode::Storage, ServerMode::Neuro];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Site => "site",
            ServerMode::Storage => "storage",
            ServerMode::Neuro => "neuro",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "site" => Ok(ServerMode::Site),
            "storage" => Ok(ServerMode::Storage),
            "neuro" => Ok(ServerMode::Neuro),
            other => Err(format!(
                "unknown mode `{}` (expected site, storage or neuro)",
                other
            )),
        }
    }
}

/// One row of the registry: a defined (not necessarily running) server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub mode: ServerMode,
    pub port: u16,
    /// Local address resolved at creation time; never recomputed on restart.
    pub host: String,
    // Older registry files carry no quota field.
    #[serde(default = "default_max_gb")]
    pub max_gb: f64,
}

impl ServerEntry {
    pub fn new(
        name: impl Into<String>,
        mode: ServerMode,
        host: impl Into<String>,
        port: u16,
        max_gb: f64,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            port,
            host: host.into(),
            max_gb,
        }
    }

    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Overwrite the fields present in `fields`. The name is immutable.
    pub fn apply(&mut self, fields: &ServerFields) {
        if let Some(mode) = fields.mode {
            self.mode = mode;
        }
        if let Some(port) = fields.port {
            self.port = port;
        }
        if let Some(host) = &fields.host {
            self.host = host.clone();
        }
        if let Some(max_gb) = fields.max_gb {
            self.max_gb = max_gb;
        }
    }
}

impl fmt::Display for ServerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.name, self.mode, self.url())
    }
}

/// Partial update applied by an edit. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ServerMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gb: Option<f64>,
}

impl ServerFields {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.port.is_none() && self.host.is_none() && self.max_gb.is_none()
    }
}

/// Server names double as directory names under the root, so anything that
/// could escape or alias a directory is refused.
pub fn validate_name(name: &str) -> HostResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name != name.trim() {
        Some("name has leading or trailing whitespace")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(HostError::invalid_name(name, reason)),
        None => Ok(()),
    }
}
