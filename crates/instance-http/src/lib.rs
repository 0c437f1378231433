//! One managed web server: the listener bound to a single registry entry.
//!
//! Every instance exposes the same route table; only `GET /` differs by mode,
//! through the [`ModeView`] chosen when the state is built. The instance owns
//! nothing but its bound address and the `storage/`/`site/` directories it
//! reads at request time.

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use common::{ensure_layout, HostResult, LayoutPaths, ServerMode};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod handlers;
pub mod mode;
pub mod pages;
pub mod site_conf;
pub mod upload;

pub use error::{InstanceError, InstanceResult};
pub use mode::{view_for, ModeView};
pub use site_conf::SiteConf;

use handlers::*;
use pages::Pages;

#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub name: String,
    pub mode: ServerMode,
    pub host: String,
    pub port: u16,
    /// Carried for display only; uploads are not limited by it.
    pub max_gb: f64,
    pub layout: LayoutPaths,
}

impl InstanceConfig {
    /// Build the config and create the server's directories if needed.
    pub fn prepare(
        root: &Path,
        name: &str,
        mode: ServerMode,
        host: &str,
        port: u16,
        max_gb: f64,
    ) -> HostResult<Self> {
        let layout = ensure_layout(root, name)?;
        Ok(Self {
            name: name.to_string(),
            mode,
            host: host.to_string(),
            port,
            max_gb,
            layout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct InstanceState {
    pub config: InstanceConfig,
    pub view: Box<dyn ModeView>,
    pub pages: Pages,
}

impl InstanceState {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            view: view_for(config.mode),
            pages: Pages::new(),
            config,
        }
    }

    pub fn site_conf(&self) -> InstanceResult<SiteConf> {
        let path = self.config.layout.site_conf();
        SiteConf::load(&path).map_err(|e| InstanceError::io(format!("reading {}", path.display()), e))
    }
}

/// Route table shared by every mode.
pub fn router(state: Arc<InstanceState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .route("/settings", get(settings_page).post(save_settings))
        .route("/upload", post(upload))
        .route("/files/*path", get(get_file))
        .route("/chat", post(chat))
        .route("/site-manager", get(site_manager))
        .route("/upload-site", post(upload_site))
        .with_state(state)
        // max_gb is a hint, not a limit.
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub struct InstanceServer {
    state: Arc<InstanceState>,
}

impl InstanceServer {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            state: Arc::new(InstanceState::new(config)),
        }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Serve until SIGTERM or Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let config = &self.state.config;
        let addr = config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(
            server = %config.name,
            mode = %config.mode,
            storage = %config.layout.storage.display(),
            "listening on http://{}",
            listener.local_addr()?
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!(server = %self.state.config.name, "instance shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
