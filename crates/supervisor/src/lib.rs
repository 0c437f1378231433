//! Live-instance supervision.
//!
//! Each managed server runs in its own OS process so a crashing or stuck
//! instance cannot take the manager down with it. The table of live children
//! is in-memory only: a fresh [`Supervisor`] always starts empty, whatever the
//! registry says was running before.

use common::{ensure_layout, HostError, HostResult, ServerEntry};
use futures::future::join_all;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub mod launcher;

pub use launcher::{InstanceLauncher, ProcessLauncher};

/// Grace period between the shutdown request and a forced kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of a tracked instance, keyed by server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    pub addr: String,
    pub pid: Option<u32>,
}

/// How a stopped instance went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period after the shutdown request.
    Graceful,
    /// Ignored the request and was killed.
    Killed,
}

struct InstanceHandle {
    info: InstanceInfo,
    child: Child,
    started_at: Instant,
}

impl InstanceHandle {
    /// `Some(status)` once the child has exited on its own.
    fn exited(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(err) => {
                warn!(name = %self.info.name, error = %err, "cannot poll child, assuming alive");
                None
            }
        }
    }
}

pub struct Supervisor {
    root: PathBuf,
    launcher: Arc<dyn InstanceLauncher>,
    stop_timeout: Duration,
    kill_on_drop: bool,
    live: Mutex<HashMap<String, InstanceHandle>>,
}

impl Supervisor {
    pub fn new(root: impl Into<PathBuf>, launcher: Arc<dyn InstanceLauncher>) -> Self {
        Self {
            root: root.into(),
            launcher,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            kill_on_drop: false,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Kill children when their handle is dropped. Off by default so that
    /// instances outlive a crashed manager.
    pub fn with_kill_on_drop(mut self, kill_on_drop: bool) -> Self {
        self.kill_on_drop = kill_on_drop;
        self
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Launch the instance for `entry` on `entry.host:entry.port`.
    pub async fn start(&self, entry: &ServerEntry) -> HostResult<InstanceInfo> {
        let mut live = self.live.lock().await;

        match live.get_mut(&entry.name).map(|handle| handle.exited()) {
            Some(None) => return Err(HostError::already_running(&entry.name)),
            Some(Some(status)) => {
                warn!(name = %entry.name, %status, "previous instance exited on its own");
                live.remove(&entry.name);
            }
            None => {}
        }

        let layout = ensure_layout(&self.root, &entry.name)?;
        probe_bind(entry)?;

        let mut command = self.launcher.command(entry, &layout);
        command
            .stdin(Stdio::null())
            .kill_on_drop(self.kill_on_drop);

        let child = command
            .spawn()
            .map_err(|e| HostError::io(format!("spawning instance `{}`", entry.name), e))?;

        let info = InstanceInfo {
            name: entry.name.clone(),
            addr: entry.bind_addr(),
            pid: child.id(),
        };
        info!(name = %info.name, addr = %info.addr, pid = ?info.pid, mode = %entry.mode, "instance started");

        live.insert(
            entry.name.clone(),
            InstanceHandle {
                info: info.clone(),
                child,
                started_at: Instant::now(),
            },
        );
        Ok(info)
    }

    /// Terminate the instance tracked for `name`.
    pub async fn stop(&self, name: &str) -> HostResult<StopOutcome> {
        let handle = {
            let mut live = self.live.lock().await;
            let mut handle = live.remove(name).ok_or_else(|| HostError::not_running(name))?;
            if let Some(status) = handle.exited() {
                debug!(name, %status, "instance had already exited");
                return Err(HostError::not_running(name));
            }
            handle
        };

        terminate(handle, self.stop_timeout).await
    }

    /// Best-effort termination of every tracked instance. Never waits longer
    /// than one stop timeout plus the kill.
    pub async fn stop_all(&self) -> Vec<(String, HostResult<StopOutcome>)> {
        let handles: Vec<InstanceHandle> = {
            let mut live = self.live.lock().await;
            live.drain().map(|(_, handle)| handle).collect()
        };

        if handles.is_empty() {
            return Vec::new();
        }
        info!(count = handles.len(), "stopping all instances");

        let grace = self.stop_timeout;
        join_all(handles.into_iter().map(|handle| async move {
            let name = handle.info.name.clone();
            let outcome = terminate(handle, grace).await;
            if let Err(err) = &outcome {
                error!(name = %name, error = %err, "failed to stop instance");
            }
            (name, outcome)
        }))
        .await
    }

    pub async fn is_running(&self, name: &str) -> bool {
        let mut live = self.live.lock().await;
        let alive = match live.get_mut(name) {
            Some(handle) => handle.exited().is_none(),
            None => return false,
        };
        if !alive {
            live.remove(name);
        }
        alive
    }

    /// Instances whose process is still alive; exited ones are pruned.
    pub async fn running(&self) -> Vec<InstanceInfo> {
        let mut live = self.live.lock().await;
        live.retain(|_, handle| handle.exited().is_none());
        let mut infos: Vec<InstanceInfo> = live.values().map(|h| h.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

/// Fail fast with `BindConflict` if something already listens on the address.
/// Any other bind failure (unknown host, foreign address) is plain IO.
fn probe_bind(entry: &ServerEntry) -> HostResult<()> {
    let addr = entry.bind_addr();
    match TcpListener::bind(&addr) {
        Ok(_) => Ok(()),
        Err(source) if source.kind() == ErrorKind::AddrInUse => Err(HostError::BindConflict {
            name: entry.name.clone(),
            addr,
            source,
        }),
        Err(source) => Err(HostError::io(format!("binding {addr} for `{}`", entry.name), source)),
    }
}

async fn terminate(mut handle: InstanceHandle, grace: Duration) -> HostResult<StopOutcome> {
    let name = handle.info.name.clone();
    let uptime = handle.started_at.elapsed();

    request_shutdown(&mut handle.child, &name);

    match tokio::time::timeout(grace, handle.child.wait()).await {
        Ok(Ok(status)) => {
            info!(name = %name, %status, uptime_secs = uptime.as_secs(), "instance stopped");
            Ok(StopOutcome::Graceful)
        }
        Ok(Err(err)) => Err(HostError::io(format!("waiting for `{}`", name), err)),
        Err(_) => {
            warn!(name = %name, grace_ms = grace.as_millis() as u64, "instance ignored shutdown, killing");
            handle
                .child
                .kill()
                .await
                .map_err(|e| HostError::io(format!("killing `{}`", name), e))?;
            Ok(StopOutcome::Killed)
        }
    }
}

#[cfg(unix)]
fn request_shutdown(child: &mut Child, name: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(errno) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(name, pid, %errno, "SIGTERM failed, killing");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn request_shutdown(child: &mut Child, name: &str) {
    if let Err(err) = child.start_kill() {
        warn!(name, error = %err, "kill request failed");
    }
}
