use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Request-local failures. They end the request, never the instance.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// Requested file is absent or the path escapes its directory.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed multipart body.
    #[error("Upload rejected: {0}")]
    Upload(String),

    /// Uploaded `.zip` could not be read or extracted.
    #[error("Cannot extract {name}: {source}")]
    Archive {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type InstanceResult<T> = std::result::Result<T, InstanceError>;

impl InstanceError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        InstanceError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            InstanceError::NotFound(_) => StatusCode::NOT_FOUND,
            InstanceError::Upload(_) | InstanceError::Archive { .. } => StatusCode::BAD_REQUEST,
            InstanceError::Template(_) | InstanceError::Io { .. } | InstanceError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for InstanceError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        InstanceError::Upload(err.body_text())
    }
}

impl IntoResponse for InstanceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
