//! Control surface for the managed servers.
//!
//! [`Manager`] ties the registry to the supervisor. Registration and launch
//! are separate steps: a failed launch leaves the entry registered and the
//! caller is told which step failed so it can retry just that one. Nothing
//! here deletes a server's directories.

use common::{
    ensure_layout, net, validate_name, HostError, ServerEntry, ServerFields, ServerMode,
};
use serde::Serialize;
use server_registry::RegistryStore;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use supervisor::{InstanceLauncher, ProcessLauncher, Supervisor};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

pub mod api;
pub mod config;

pub use config::HostConfig;
pub use supervisor::StopOutcome;

#[derive(Debug, Error)]
pub enum ControlError {
    /// The entry is registered but its instance did not launch.
    #[error("Server `{}` is registered but did not start: {source}", entry.name)]
    Start {
        entry: ServerEntry,
        #[source]
        source: HostError,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl ControlError {
    /// The registry or supervisor error underneath.
    pub fn host_error(&self) -> &HostError {
        match self {
            ControlError::Start { source, .. } => source,
            ControlError::Host(err) => err,
        }
    }
}

pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// One registry entry together with its live state.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    #[serde(flatten)]
    pub entry: ServerEntry,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.running { "running" } else { "stopped" };
        write!(f, "{} ({})", self.entry, state)
    }
}

pub struct Manager {
    config: HostConfig,
    registry: RegistryStore,
    supervisor: Supervisor,
    // One lock per server name; held across every start/stop/delete so a
    // start cannot slip in while a stop is still waiting on the child.
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Manager {
    /// Open the registry and launch instances through the configured program.
    pub fn open(config: HostConfig) -> ControlResult<Self> {
        let launcher = match &config.instance_program {
            Some(program) => ProcessLauncher::new(program, &config.root),
            None => ProcessLauncher::current_exe(&config.root)
                .map_err(|e| HostError::io("locating the current executable", e))?,
        };
        Self::with_launcher(config, Arc::new(launcher))
    }

    pub fn with_launcher(
        config: HostConfig,
        launcher: Arc<dyn InstanceLauncher>,
    ) -> ControlResult<Self> {
        fs::create_dir_all(&config.root)
            .map_err(|e| HostError::io(format!("creating {}", config.root.display()), e))?;
        let registry = RegistryStore::open(&config.registry_path)?;
        let supervisor =
            Supervisor::new(&config.root, launcher).with_stop_timeout(config.stop_timeout);
        Ok(Self::new(config, registry, supervisor))
    }

    pub fn new(config: HostConfig, registry: RegistryStore, supervisor: Supervisor) -> Self {
        Self {
            config,
            registry,
            supervisor,
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.name_locks.lock().await;
            locks.entry(name.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Create a new server's directories and record it without starting it.
    /// The directories come first so a registered entry always has them.
    pub fn register_server(
        &self,
        name: &str,
        mode: ServerMode,
        port: Option<u16>,
        max_gb: Option<f64>,
    ) -> ControlResult<ServerEntry> {
        validate_name(name)?;
        let host = self
            .config
            .host
            .clone()
            .unwrap_or_else(net::resolve_local_host);
        let entry = ServerEntry::new(
            name,
            mode,
            host,
            port.unwrap_or(self.config.default_port),
            max_gb.unwrap_or(self.config.default_max_gb),
        );

        ensure_layout(&self.config.root, &entry.name)?;
        let entry = self.registry.create(entry)?;

        let sharing = self.registry.port_users(entry.port, &entry.name);
        if !sharing.is_empty() {
            warn!(name = %entry.name, port = entry.port, others = ?sharing,
                "port already assigned to other servers; only one can run at a time");
        }
        Ok(entry)
    }

    /// Register and start. A start failure keeps the registration.
    pub async fn create_server(
        &self,
        name: &str,
        mode: ServerMode,
        port: Option<u16>,
        max_gb: Option<f64>,
    ) -> ControlResult<ServerEntry> {
        let _guard = self.lock_name(name).await;
        let entry = self.register_server(name, mode, port, max_gb)?;
        match self.supervisor.start(&entry).await {
            Ok(_) => {
                info!(name = %entry.name, url = %entry.url(), "server created");
                Ok(entry)
            }
            Err(source) => {
                warn!(name = %entry.name, error = %source, "registered but not started");
                Err(ControlError::Start { entry, source })
            }
        }
    }

    pub async fn start_server(&self, name: &str) -> ControlResult<ServerEntry> {
        let _guard = self.lock_name(name).await;
        let entry = self.registry.get(name)?;
        self.supervisor.start(&entry).await?;
        Ok(entry)
    }

    /// Stop the live instance; the registry row stays.
    pub async fn stop_server(&self, name: &str) -> ControlResult<StopOutcome> {
        let _guard = self.lock_name(name).await;
        if !self.registry.contains(name) {
            return Err(HostError::not_found(name).into());
        }
        Ok(self.supervisor.stop(name).await?)
    }

    /// Stop (if running) then unregister. Directories are kept.
    pub async fn delete_server(&self, name: &str) -> ControlResult<ServerEntry> {
        let _guard = self.lock_name(name).await;
        match self.supervisor.stop(name).await {
            Ok(_) => {}
            Err(err) if err.is_not_running() => {}
            Err(err) => return Err(err.into()),
        }
        let entry = self.registry.remove(name)?;
        info!(name, "server deleted; its directories were kept");
        Ok(entry)
    }

    /// Rewrite the registry entry only. A running instance keeps serving with
    /// its old settings until it is restarted.
    pub async fn edit_server(&self, name: &str, fields: &ServerFields) -> ControlResult<ServerEntry> {
        let entry = self.registry.edit(name, fields)?;
        if self.supervisor.is_running(name).await {
            info!(name, "entry updated; running instance keeps its old settings until restarted");
        }
        Ok(entry)
    }

    pub fn list_servers(&self) -> Vec<ServerEntry> {
        self.registry.list()
    }

    pub async fn status(&self) -> Vec<ServerStatus> {
        let running = self.supervisor.running().await;
        self.registry
            .list()
            .into_iter()
            .map(|entry| {
                let live = running.iter().find(|info| info.name == entry.name);
                ServerStatus {
                    running: live.is_some(),
                    pid: live.and_then(|info| info.pid),
                    entry,
                }
            })
            .collect()
    }

    /// Stop every live instance. Called when the manager exits.
    pub async fn shutdown(&self) {
        let results = self.supervisor.stop_all().await;
        let failed = results.iter().filter(|(_, outcome)| outcome.is_err()).count();
        info!(stopped = results.len() - failed, failed, "manager shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_names_the_registered_entry() {
        let entry = ServerEntry::new("blog", ServerMode::Site, "127.0.0.1", 8080, 1.0);
        let err = ControlError::Start {
            entry,
            source: HostError::already_running("blog"),
        };
        assert_eq!(
            err.to_string(),
            "Server `blog` is registered but did not start: Server `blog` is already running"
        );
        assert!(matches!(err.host_error(), HostError::AlreadyRunning { .. }));
    }

    #[test]
    fn status_line_shows_state() {
        let status = ServerStatus {
            entry: ServerEntry::new("files", ServerMode::Storage, "10.0.0.2", 5000, 1.0),
            running: false,
            pid: None,
        };
        assert_eq!(status.to_string(), "files [storage] http://10.0.0.2:5000 (stopped)");
    }
}
