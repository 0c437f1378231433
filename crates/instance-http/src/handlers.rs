use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use std::path::{Component, Path as FsPath};
use std::sync::Arc;
use tracing::info;

use crate::error::{InstanceError, InstanceResult};
use crate::mode::list_dir;
use crate::site_conf::SettingsUpdate;
use crate::upload::receive_files;
use crate::InstanceState;

pub type AppState = Arc<InstanceState>;

#[derive(Debug, Default, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub msg: String,
}

/// GET /
pub async fn home(State(state): State<AppState>) -> InstanceResult<Html<String>> {
    let body = tokio::task::spawn_blocking(move || state.view.landing(&state)).await??;
    Ok(Html(body))
}

/// GET /settings
pub async fn settings_page(State(state): State<AppState>) -> InstanceResult<Html<String>> {
    let conf = state.site_conf()?;
    state
        .pages
        .render("settings.html", minijinja::Value::from_serialize(&conf))
        .map(Html)
}

/// POST /settings
pub async fn save_settings(
    State(state): State<AppState>,
    Form(update): Form<SettingsUpdate>,
) -> InstanceResult<Redirect> {
    let path = state.config.layout.site_conf();
    let mut conf = state.site_conf()?;
    conf.merge(update);
    conf.save(&path)
        .map_err(|e| InstanceError::io(format!("writing {}", path.display()), e))?;
    info!(server = %state.config.name, title = %conf.title, "site settings saved");
    Ok(Redirect::to("/settings"))
}

/// POST /upload
pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> InstanceResult<Html<String>> {
    let count = receive_files(multipart, &state.config.layout.storage).await?;
    state.pages.uploaded(count).map(Html)
}

/// GET /files/*path
pub async fn get_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> InstanceResult<Response> {
    let relative = FsPath::new(&path);
    let contained = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if path.is_empty() || !contained {
        return Err(InstanceError::NotFound(path));
    }

    let storage = &state.config.layout.storage;
    let full = storage.join(relative);
    // Symlinks may only resolve to somewhere inside storage/.
    let resolved = match (
        tokio::fs::canonicalize(&full).await,
        tokio::fs::canonicalize(storage).await,
    ) {
        (Ok(resolved), Ok(root)) if resolved.starts_with(&root) => resolved,
        (Ok(resolved), Ok(_)) => {
            tracing::warn!(requested = %path, resolved = %resolved.display(), "refusing file outside storage");
            return Err(InstanceError::NotFound(path));
        }
        (Err(err), _) | (_, Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(InstanceError::NotFound(path))
        }
        (Err(err), _) | (_, Err(err)) => {
            return Err(InstanceError::io(format!("resolving {}", full.display()), err))
        }
    };

    let data = match tokio::fs::read(&resolved).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(InstanceError::NotFound(path))
        }
        // Directories and the like are not served.
        Err(err) if resolved.is_dir() => {
            tracing::debug!(error = %err, "refusing to serve a directory");
            return Err(InstanceError::NotFound(path));
        }
        Err(err) => return Err(InstanceError::io(format!("reading {}", resolved.display()), err)),
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, detect_content_type(&path))],
        data,
    )
        .into_response())
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Form(form): Form<ChatForm>,
) -> InstanceResult<Html<String>> {
    state.pages.chat(&form.msg).map(Html)
}

/// GET /site-manager
pub async fn site_manager(State(state): State<AppState>) -> InstanceResult<Html<String>> {
    let files = list_dir(&state.config.layout.site)?;
    state
        .pages
        .render("site_manager.html", minijinja::context! { files })
        .map(Html)
}

/// POST /upload-site
pub async fn upload_site(
    State(state): State<AppState>,
    multipart: Multipart,
) -> InstanceResult<Redirect> {
    receive_files(multipart, &state.config.layout.site).await?;
    Ok(Redirect::to("/site-manager"))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "server": state.config.name,
        "mode": state.view.mode(),
    }))
    .into_response()
}

/// Simple content-type detection based on file extension
fn detect_content_type(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    let ext = lower.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "txt" | "conf" => "text/plain; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(detect_content_type("notes.TXT"), "text/plain; charset=utf-8");
        assert_eq!(detect_content_type("img/photo.jpeg"), "image/jpeg");
        assert_eq!(detect_content_type("noext"), "application/octet-stream");
    }
}
