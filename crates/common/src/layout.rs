//! Per-server directory layout.
//!
//! Everything a managed instance reads or writes lives under
//! `<root>/<name>/storage` and `<root>/<name>/site`. The paths are a pure
//! function of the root and the name; creation is idempotent and nothing here
//! ever removes a directory, so deleting a registry entry keeps its data.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{HostError, HostResult};

pub const STORAGE_DIR: &str = "storage";
pub const SITE_DIR: &str = "site";
pub const SITE_CONF: &str = "site.conf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPaths {
    pub server_dir: PathBuf,
    pub storage: PathBuf,
    pub site: PathBuf,
}

impl LayoutPaths {
    /// Derive the paths without touching the filesystem.
    pub fn derive(root: &Path, name: &str) -> Self {
        let server_dir = root.join(name);
        Self {
            storage: server_dir.join(STORAGE_DIR),
            site: server_dir.join(SITE_DIR),
            server_dir,
        }
    }

    pub fn site_conf(&self) -> PathBuf {
        self.site.join(SITE_CONF)
    }
}

/// Create `storage/` and `site/` for `name` if missing and return their paths.
pub fn ensure_layout(root: &Path, name: &str) -> HostResult<LayoutPaths> {
    crate::validate_name(name)?;
    let paths = LayoutPaths::derive(root, name);

    for dir in [&paths.storage, &paths.site] {
        fs::create_dir_all(dir)
            .map_err(|e| HostError::io(format!("creating {}", dir.display()), e))?;
    }

    debug!(name, dir = %paths.server_dir.display(), "layout ready");
    Ok(paths)
}
