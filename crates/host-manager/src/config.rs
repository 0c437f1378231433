//! Manager configuration.
//!
//! Values come from defaults, then `WEBHOST_*` environment variables; the CLI
//! layers its flags on top.

use common::{DEFAULT_MAX_GB, DEFAULT_PORT};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use supervisor::DEFAULT_STOP_TIMEOUT;
use tracing::warn;

pub const ENV_ROOT: &str = "WEBHOST_ROOT";
pub const ENV_REGISTRY: &str = "WEBHOST_REGISTRY";
pub const ENV_STOP_TIMEOUT: &str = "WEBHOST_STOP_TIMEOUT_SECS";
pub const ENV_DEFAULT_PORT: &str = "WEBHOST_DEFAULT_PORT";
pub const ENV_HOST: &str = "WEBHOST_HOST";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Parent of every `<name>/storage` and `<name>/site`.
    pub root: PathBuf,
    pub registry_path: PathBuf,
    pub stop_timeout: Duration,
    pub default_port: u16,
    pub default_max_gb: f64,
    /// Address stored in new entries. `None` resolves the LAN address.
    pub host: Option<String>,
    /// Binary run with `serve` for each instance. `None` uses the current one.
    pub instance_program: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("webhost/servers"),
            registry_path: PathBuf::from("webhost/servers.json"),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            default_port: DEFAULT_PORT,
            default_max_gb: DEFAULT_MAX_GB,
            host: None,
            instance_program: None,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = env::var(ENV_ROOT) {
            config.root = PathBuf::from(root);
        }
        if let Ok(registry) = env::var(ENV_REGISTRY) {
            config.registry_path = PathBuf::from(registry);
        }
        if let Some(secs) = parse_var::<u64>(ENV_STOP_TIMEOUT) {
            config.stop_timeout = Duration::from_secs(secs);
        }
        if let Some(port) = parse_var::<u16>(ENV_DEFAULT_PORT) {
            config.default_port = port;
        }
        if let Ok(host) = env::var(ENV_HOST) {
            config.host = Some(host);
        }
        config
    }

    /// Everything under one directory: `<dir>/servers` and `<dir>/servers.json`.
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            root: dir.join("servers"),
            registry_path: dir.join("servers.json"),
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_webhost_folder() {
        let config = HostConfig::default();
        assert_eq!(config.default_port, 5000);
        assert_eq!(config.default_max_gb, 1.0);
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rooted_at_keeps_registry_beside_servers() {
        let config = HostConfig::rooted_at("/srv/webhost");
        assert_eq!(config.root, PathBuf::from("/srv/webhost/servers"));
        assert_eq!(config.registry_path, PathBuf::from("/srv/webhost/servers.json"));
    }
}
