//! Landing-page behaviour, one implementation per [`ServerMode`].
//!
//! The view is picked once when the instance is built; handlers never branch
//! on the mode themselves.

use common::ServerMode;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{InstanceError, InstanceResult};
use crate::InstanceState;

pub trait ModeView: Send + Sync {
    fn mode(&self) -> ServerMode;

    /// Body of `GET /`.
    fn landing(&self, state: &InstanceState) -> InstanceResult<String>;
}

pub fn view_for(mode: ServerMode) -> Box<dyn ModeView> {
    match mode {
        ServerMode::Site => Box::new(SiteView),
        ServerMode::Storage => Box::new(StorageView),
        ServerMode::Neuro => Box::new(NeuroView),
    }
}

/// Serves `site/index.html`, prefixing its `<title>` with the configured one.
pub struct SiteView;

impl ModeView for SiteView {
    fn mode(&self) -> ServerMode {
        ServerMode::Site
    }

    fn landing(&self, state: &InstanceState) -> InstanceResult<String> {
        let conf = state.site_conf()?;
        let index = state.config.layout.site.join("index.html");

        match fs::read_to_string(&index) {
            Ok(content) => {
                let title = minijinja::HtmlEscape(&conf.title).to_string();
                Ok(content.replace("<title>", &format!("<title>{} | ", title)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => state.pages.render(
                "site_fallback.html",
                minijinja::context! {
                    title => conf.title,
                    description => conf.description,
                },
            ),
            Err(err) => Err(InstanceError::io(format!("reading {}", index.display()), err)),
        }
    }
}

/// Upload form plus a listing of `storage/`.
pub struct StorageView;

impl ModeView for StorageView {
    fn mode(&self) -> ServerMode {
        ServerMode::Storage
    }

    fn landing(&self, state: &InstanceState) -> InstanceResult<String> {
        let files = list_dir(&state.config.layout.storage)?;
        state.pages.storage(&state.config.name, &files)
    }
}

/// Message form posting to the chat stub.
pub struct NeuroView;

impl ModeView for NeuroView {
    fn mode(&self) -> ServerMode {
        ServerMode::Neuro
    }

    fn landing(&self, state: &InstanceState) -> InstanceResult<String> {
        state.pages.render("neuro.html", minijinja::context! {})
    }
}

/// Sorted entry names of `dir`.
pub fn list_dir(dir: &Path) -> InstanceResult<Vec<String>> {
    let read = fs::read_dir(dir).map_err(|e| InstanceError::io(format!("listing {}", dir.display()), e))?;
    let mut names = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| InstanceError::io(format!("listing {}", dir.display()), e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_mode_gets_its_view() {
        for mode in ServerMode::ALL {
            assert_eq!(view_for(mode).mode(), mode);
        }
    }

    #[test]
    fn list_dir_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(list_dir(dir.path()).unwrap(), vec!["a.txt", "b.txt", "c.txt"]);
    }
}
