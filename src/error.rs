use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::authentication::SqliteAuthBackend;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("environment variable {var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Failures of the credential and task stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("username already exists")]
    DuplicateUsername,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Hashing(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database unavailable after {attempts} attempts")]
    DatabaseUnavailable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("schema migration failed")]
    Migration(#[source] StoreError),

    #[error("admin bootstrap failed")]
    Bootstrap(#[source] StoreError),

    #[error("session store setup failed")]
    Session(#[source] sqlx::Error),
}

/// Handler-level error. The response never carries the underlying detail.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] axum_login::Error<SqliteAuthBackend>),

    #[error("template rendering failed")]
    Render(#[from] askama::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}
