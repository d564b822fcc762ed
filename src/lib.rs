pub mod authentication;
pub mod config;
pub mod crud_ops;
pub mod db;
pub mod entities;
pub mod error;
pub mod routes;
pub mod templates;

use axum::Router;
use axum_login::AuthManagerLayerBuilder;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::Key, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;

use crate::{
    authentication::SqliteAuthBackend,
    config::Config,
    error::{ConfigError, StartupError},
};

/// Builds the full application on an already migrated pool.
pub async fn build_app(sqlite_pool: SqlitePool, session_secret: &[u8]) -> Result<Router, StartupError> {
    let key = Key::try_from(session_secret).map_err(|e| {
        StartupError::Config(ConfigError::Invalid {
            var: "SESSION_SECRET",
            reason: e.to_string(),
        })
    })?;

    let session_store = SqliteStore::new(sqlite_pool.clone());
    session_store.migrate().await.map_err(StartupError::Session)?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(1)))
        .with_signed(key);

    let backend = SqliteAuthBackend::new(sqlite_pool);
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();

    Ok(routes::router()
        .layer(auth_layer)
        .layer(TraceLayer::new_for_http()))
}

/// Connects, migrates, bootstraps the admin account and returns the app.
pub async fn boot(config: &Config) -> Result<Router, StartupError> {
    let sqlite_pool = db::connect_with_retry(config).await?;
    db::migrate(&sqlite_pool).await.map_err(StartupError::Migration)?;
    db::ensure_admin(&sqlite_pool, config)
        .await
        .map_err(StartupError::Bootstrap)?;
    tracing::info!("database initialized");

    build_app(sqlite_pool, &config.session_secret).await
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
