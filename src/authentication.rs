use askama::Template;
use axum::{
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use sqlx::SqlitePool;

use crate::{
    entities::{AuthRequest, User},
    error::{AppError, StoreError},
    templates::{LoginTemplate, RegisterTemplate},
};

pub type AuthSession = axum_login::AuthSession<SqliteAuthBackend>;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SqliteAuthBackend {
    pub sqlite_pool: SqlitePool,
}

impl SqliteAuthBackend {
    pub fn new(sqlite_pool: SqlitePool) -> Self {
        Self { sqlite_pool }
    }
}

#[async_trait::async_trait]
impl axum_login::AuthnBackend for SqliteAuthBackend {
    type User = User;
    type Credentials = self::Credentials;
    type Error = self::Error;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        Ok(authenticate(&self.sqlite_pool, &creds.username, &creds.password).await?)
    }

    async fn get_user(
        &self,
        user_id: &axum_login::UserId<Self>,
    ) -> Result<Option<Self::User>, Self::Error> {
        let user = sqlx::query_as("SELECT id, username, password_hash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.sqlite_pool)
            .await?;

        Ok(user)
    }
}

pub async fn find_user(pool: &SqlitePool, username: &str) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as("SELECT id, username, password_hash FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Stores a new user with an argon2 hash of `password`.
pub async fn register(pool: &SqlitePool, username: &str, password: &str) -> Result<(), StoreError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(StoreError::Validation("Both fields are required."));
    }

    // `password_auth::generate_hash()` is blocking
    let password = password.to_owned();
    let password_hash =
        tokio::task::spawn_blocking(move || password_auth::generate_hash(password)).await?;

    match sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
        .bind(username)
        .bind(password_hash)
        .execute(pool)
        .await
    {
        Ok(_) => {
            tracing::info!(username, "registered user");
            Ok(())
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(StoreError::DuplicateUsername)
        }
        Err(e) => Err(e.into()),
    }
}

/// Returns the user only when the name exists and the password matches.
/// Both failure causes look the same to the caller. The name is trimmed the
/// same way `register` trims it.
pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<Option<User>, StoreError> {
    let user = find_user(pool, username.trim()).await?;

    // `password_auth::verify_password()` is blocking, hence using `tokio::task::spawn_blocking()`
    let password = password.to_owned();
    let user = tokio::task::spawn_blocking(move || {
        user.filter(|user| password_auth::verify_password(password, &user.password_hash).is_ok())
    })
    .await?;

    Ok(user)
}

fn render(template: impl Template) -> Result<Response, AppError> {
    Ok(Html(template.render()?).into_response())
}

pub async fn register_page() -> Result<Response, AppError> {
    render(RegisterTemplate::default())
}

pub async fn sign_up(
    auth_session: AuthSession,
    Form(auth_request): Form<AuthRequest>,
) -> Result<Response, AppError> {
    let mut page = RegisterTemplate {
        username: auth_request.username.clone(),
        ..Default::default()
    };

    match register(
        &auth_session.backend.sqlite_pool,
        &auth_request.username,
        &auth_request.password,
    )
    .await
    {
        Ok(()) => page.success = Some("Registration successful. You can now log in."),
        Err(StoreError::Validation(msg)) => page.error = Some(msg),
        Err(StoreError::DuplicateUsername) => page.error = Some("Username already exists."),
        Err(e) => return Err(e.into()),
    }

    render(page)
}

pub async fn login_page() -> Result<Response, AppError> {
    render(LoginTemplate::default())
}

pub async fn sign_in(
    mut auth_session: AuthSession,
    Form(auth_request): Form<AuthRequest>,
) -> Result<Response, AppError> {
    let creds = Credentials {
        username: auth_request.username.clone(),
        password: auth_request.password,
    };

    let user = match auth_session.authenticate(creds).await? {
        Some(user) => user,
        None => {
            tracing::debug!(username = %auth_request.username, "login rejected");
            return render(LoginTemplate {
                username: auth_request.username,
                error: Some("Invalid username or password."),
            });
        }
    };

    auth_session.login(&user).await?;
    tracing::info!(user_id = user.id, "logged in");
    Ok(Redirect::to("/todos").into_response())
}

pub async fn sign_out(mut auth_session: AuthSession) -> Result<Response, AppError> {
    if let Some(user) = auth_session.logout().await? {
        tracing::info!(user_id = user.id, "logged out");
    }
    Ok(Redirect::to("/login").into_response())
}
