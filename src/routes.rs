use askama::Template;
use axum::{
    extract::{Path, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    authentication::{self, AuthSession},
    crud_ops,
    entities::{MoveRequest, NewTodo, Position, Status, TodoId, User},
    error::{AppError, StoreError},
    templates::TodosTemplate,
};

pub fn router() -> Router {
    let pages = Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}/delete", get(delete_todo))
        .route("/todos/{id}/toggle", get(toggle_todo))
        .route_layer(middleware::from_fn(require_page_login));

    let api = Router::new()
        .route("/todos/{id}/move", post(move_todo))
        .route("/reorder", post(reorder))
        .route_layer(middleware::from_fn(require_api_login));

    Router::new()
        .route("/", get(|| async { Redirect::to("/login") }))
        .route(
            "/login",
            get(authentication::login_page).post(authentication::sign_in),
        )
        .route(
            "/register",
            get(authentication::register_page).post(authentication::sign_up),
        )
        .route("/logout", get(authentication::sign_out))
        .merge(pages)
        .merge(api)
}

fn login_redirect() -> Response {
    Redirect::to("/login").into_response()
}

// Session checks run as route layers so they happen before any body is parsed.

async fn require_page_login(auth_session: AuthSession, request: Request, next: Next) -> Response {
    if auth_session.user.is_none() {
        return login_redirect();
    }
    next.run(request).await
}

async fn require_api_login(auth_session: AuthSession, request: Request, next: Next) -> Response {
    if auth_session.user.is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

#[derive(Debug, Deserialize)]
pub struct TodoForm {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub status: String,
}

impl TodoForm {
    fn parse(&self) -> Result<NewTodo, StoreError> {
        let due_date = match self.due_date.trim() {
            "" => None,
            raw => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| StoreError::Validation("Due date must be YYYY-MM-DD."))?,
            ),
        };
        let status = match self.status.trim() {
            "" => Status::default(),
            raw => raw
                .parse()
                .map_err(|_| StoreError::Validation("Unknown status."))?,
        };
        Ok(NewTodo {
            content: self.task.clone(),
            due_date,
            status,
        })
    }
}

async fn render_listing(
    auth_session: &AuthSession,
    user: User,
    form: Option<(TodoForm, &'static str)>,
) -> Result<Response, AppError> {
    let grouped = crud_ops::list_grouped(&auth_session.backend.sqlite_pool, user.id).await?;
    let mut page = TodosTemplate::new(user.username, grouped);

    if let Some((form, error)) = form {
        page.error = Some(error);
        page.task = form.task;
        page.due_date = form.due_date;
        if !form.status.is_empty() {
            page.status = form.status;
        }
    }

    Ok(Html(page.render()?).into_response())
}

pub async fn list_todos(auth_session: AuthSession) -> Result<Response, AppError> {
    let user = match auth_session.user.clone() {
        Some(user) => user,
        None => return Ok(login_redirect()),
    };

    render_listing(&auth_session, user, None).await
}

pub async fn create_todo(
    auth_session: AuthSession,
    Form(form): Form<TodoForm>,
) -> Result<Response, AppError> {
    let user = match auth_session.user.clone() {
        Some(user) => user,
        None => return Ok(login_redirect()),
    };

    let result = match form.parse() {
        Ok(new_todo) => {
            crud_ops::create_todo(&auth_session.backend.sqlite_pool, user.id, new_todo).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => render_listing(&auth_session, user, None).await,
        Err(StoreError::Validation(msg)) => render_listing(&auth_session, user, Some((form, msg))).await,
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_todo(
    auth_session: AuthSession,
    Path(id): Path<TodoId>,
) -> Result<Response, AppError> {
    let user_id = match auth_session.user {
        Some(ref user) => user.id,
        None => return Ok(login_redirect()),
    };

    crud_ops::delete_todo(&auth_session.backend.sqlite_pool, id, user_id).await?;
    Ok(Redirect::to("/todos").into_response())
}

pub async fn toggle_todo(
    auth_session: AuthSession,
    Path(id): Path<TodoId>,
) -> Result<Response, AppError> {
    let user_id = match auth_session.user {
        Some(ref user) => user.id,
        None => return Ok(login_redirect()),
    };

    crud_ops::toggle_done(&auth_session.backend.sqlite_pool, id, user_id).await?;
    Ok(Redirect::to("/todos").into_response())
}

pub async fn move_todo(
    auth_session: AuthSession,
    Path(id): Path<TodoId>,
    Json(request): Json<MoveRequest>,
) -> Result<Response, AppError> {
    let user_id = match auth_session.user {
        Some(ref user) => user.id,
        None => return Ok(StatusCode::FORBIDDEN.into_response()),
    };

    crud_ops::set_status(&auth_session.backend.sqlite_pool, id, user_id, request.status).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn reorder(
    auth_session: AuthSession,
    Json(positions): Json<Vec<Position>>,
) -> Result<Response, AppError> {
    let user_id = match auth_session.user {
        Some(ref user) => user.id,
        None => return Ok(StatusCode::FORBIDDEN.into_response()),
    };

    crud_ops::set_order(&auth_session.backend.sqlite_pool, user_id, &positions).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
