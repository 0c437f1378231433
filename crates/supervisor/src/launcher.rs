use common::{LayoutPaths, ServerEntry};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Builds the command that runs one managed instance in its own process.
pub trait InstanceLauncher: Send + Sync {
    fn command(&self, entry: &ServerEntry, layout: &LayoutPaths) -> Command;
}

impl<F> InstanceLauncher for F
where
    F: Fn(&ServerEntry, &LayoutPaths) -> Command + Send + Sync,
{
    fn command(&self, entry: &ServerEntry, layout: &LayoutPaths) -> Command {
        self(entry, layout)
    }
}

/// Re-runs a host binary with its `serve` subcommand.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    root: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
        }
    }

    /// Launch instances through the binary that is currently executing.
    pub fn current_exe(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, root))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments understood by `webhostctl serve`.
    pub fn serve_args(&self, entry: &ServerEntry) -> Vec<String> {
        vec![
            "serve".to_string(),
            "--name".to_string(),
            entry.name.clone(),
            "--mode".to_string(),
            entry.mode.to_string(),
            "--host".to_string(),
            entry.host.clone(),
            "--port".to_string(),
            entry.port.to_string(),
            "--max-gb".to_string(),
            entry.max_gb.to_string(),
            "--root".to_string(),
            self.root.display().to_string(),
        ]
    }
}

impl InstanceLauncher for ProcessLauncher {
    fn command(&self, entry: &ServerEntry, _layout: &LayoutPaths) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.serve_args(entry));
        command
    }
}
