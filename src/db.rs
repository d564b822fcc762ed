use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};

use crate::{
    authentication,
    config::{Config, RetryPolicy},
    error::{ConfigError, StartupError, StoreError},
};

/// Opens the pool, retrying with exponential backoff while the database
/// is not reachable yet.
pub async fn connect_with_retry(config: &Config) -> Result<SqlitePool, StartupError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| ConfigError::Invalid {
            var: "DATABASE_URL",
            reason: e.to_string(),
        })?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

    let pool_options = SqlitePoolOptions::new().acquire_timeout(config.busy_timeout);
    connect_options_with_retry(pool_options, options, config.retry).await
}

pub async fn connect_options_with_retry(
    pool_options: SqlitePoolOptions,
    options: SqliteConnectOptions,
    retry: RetryPolicy,
) -> Result<SqlitePool, StartupError> {
    let mut attempt = 1;
    loop {
        match pool_options.clone().connect_with(options.clone()).await {
            Ok(pool) => {
                tracing::info!(attempt, "connected to database");
                return Ok(pool);
            }
            Err(source) if attempt >= retry.max_attempts => {
                return Err(StartupError::DatabaseUnavailable {
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                let delay = retry.delay_after(attempt);
                tracing::warn!(attempt, ?delay, error = %e, "database not ready, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Creates the tables and adds columns introduced after the first schema.
/// Safe to run on every start.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE CHECK (username <> ''),
            password_hash TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            content TEXT NOT NULL,
            done BOOLEAN NOT NULL DEFAULT FALSE
        )",
    )
    .execute(pool)
    .await?;

    add_column_if_missing(pool, "todos", "order_index", "INTEGER NOT NULL DEFAULT 0").await?;
    add_column_if_missing(pool, "todos", "due_date", "DATE").await?;
    add_column_if_missing(pool, "todos", "status", "TEXT NOT NULL DEFAULT 'Ongoing'").await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS todos_user_id ON todos (user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<(), StoreError> {
    let columns = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await?;
    let exists = columns
        .iter()
        .any(|row| row.get::<String, _>("name") == column);

    if !exists {
        tracing::info!(table, column, "adding column");
        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Makes sure an `admin` account exists.
pub async fn ensure_admin(pool: &SqlitePool, config: &Config) -> Result<(), StoreError> {
    if authentication::find_user(pool, "admin").await?.is_some() {
        return Ok(());
    }

    if config.uses_default_admin_password() {
        tracing::warn!("creating admin user with the built-in default password; set ADMIN_PASSWORD");
    }

    match authentication::register(pool, "admin", &config.admin_password).await {
        // lost a race with another process
        Ok(()) | Err(StoreError::DuplicateUsername) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // a single connection, since every in-memory connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
