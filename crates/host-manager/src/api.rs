//! JSON management API over the [`Manager`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use common::{HostError, ServerFields, ServerMode};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{ControlError, Manager};

pub type ManagerState = Arc<Manager>;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub mode: ServerMode,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub max_gb: Option<f64>,
    /// `false` registers without launching.
    #[serde(default = "default_start")]
    pub start: bool,
}

fn default_start() -> bool {
    true
}

/// Error body: `{"error": "...", "registered": bool}`.
pub struct ApiError(ControlError);

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        ApiError(err)
    }
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        ApiError(err.into())
    }
}

pub fn status_for(err: &HostError) -> StatusCode {
    match err {
        HostError::NotFound { .. } => StatusCode::NOT_FOUND,
        HostError::DuplicateName { .. }
        | HostError::AlreadyRunning { .. }
        | HostError::NotRunning { .. }
        | HostError::BindConflict { .. } => StatusCode::CONFLICT,
        HostError::InvalidName { .. } => StatusCode::BAD_REQUEST,
        HostError::CorruptRegistry { .. } | HostError::Io { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.host_error());
        if status.is_server_error() {
            error!(error = %self.0, "management request failed");
        }
        let registered = matches!(self.0, ControlError::Start { .. });
        (
            status,
            Json(serde_json::json!({
                "error": self.0.to_string(),
                "registered": registered,
            })),
        )
            .into_response()
    }
}

/// GET /servers
pub async fn list_servers(State(manager): State<ManagerState>) -> Response {
    Json(manager.status().await).into_response()
}

/// POST /servers
pub async fn create_server(
    State(manager): State<ManagerState>,
    Json(request): Json<CreateRequest>,
) -> Result<Response, ApiError> {
    let entry = if request.start {
        manager
            .create_server(&request.name, request.mode, request.port, request.max_gb)
            .await?
    } else {
        manager.register_server(&request.name, request.mode, request.port, request.max_gb)?
    };
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

/// PATCH /servers/:name
pub async fn edit_server(
    State(manager): State<ManagerState>,
    Path(name): Path<String>,
    Json(fields): Json<ServerFields>,
) -> Result<Response, ApiError> {
    let entry = manager.edit_server(&name, &fields).await?;
    Ok(Json(entry).into_response())
}

/// DELETE /servers/:name
pub async fn delete_server(
    State(manager): State<ManagerState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    manager.delete_server(&name).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /servers/:name/start
pub async fn start_server(
    State(manager): State<ManagerState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let entry = manager.start_server(&name).await?;
    Ok(Json(entry).into_response())
}

/// POST /servers/:name/stop
pub async fn stop_server(
    State(manager): State<ManagerState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = manager.stop_server(&name).await?;
    Ok(Json(serde_json::json!({
        "name": name,
        "forced": outcome == supervisor::StopOutcome::Killed,
    }))
    .into_response())
}

/// Health check endpoint
pub async fn health_check() -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "webhost manager"
    }))
    .into_response()
}

pub fn router(manager: ManagerState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/servers", get(list_servers).post(create_server))
        .route("/servers/:name", patch(edit_server).delete(delete_server))
        .route("/servers/:name/start", post(start_server))
        .route("/servers/:name/stop", post(stop_server))
        .with_state(manager)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve the management API until `shutdown` resolves.
pub async fn serve(
    manager: ManagerState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("management API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
