use reqwest::{header::LOCATION, redirect::Policy, Client, Response, StatusCode};
use serde_json::json;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::net::TcpListener;

use todo_board::{config::Config, db};

const SECRET: &str = "test-secret-test-secret-test-secret-test-secret-test-secret-0000";

struct TestApp {
    base: String,
    pool: SqlitePool,
}

impl TestApp {
    async fn spawn() -> Self {
        // one connection, since every in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::migrate(&pool).await.unwrap();

        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".into()),
            "SESSION_SECRET" => Some(SECRET.into()),
            _ => None,
        })
        .unwrap();
        db::ensure_admin(&pool, &config).await.unwrap();

        let app = todo_board::build_app(pool.clone(), SECRET.as_bytes())
            .await
            .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            if let Err(e) = todo_board::serve(listener, app).await {
                eprintln!("run server error: {:?}", e);
            }
        });

        TestApp { base, pool }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .unwrap()
    }

    async fn register(&self, client: &Client, username: &str, password: &str) -> String {
        client
            .post(self.url("/register"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }

    async fn login(&self, client: &Client, username: &str, password: &str) -> Response {
        client
            .post(self.url("/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .unwrap()
    }

    async fn user_with_session(&self, username: &str) -> Client {
        let client = Self::client();
        self.register(&client, username, "pw").await;
        let response = self.login(&client, username, "pw").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        client
    }

    async fn add_task(&self, client: &Client, task: &str, due_date: &str, status: &str) -> String {
        client
            .post(self.url("/todos"))
            .form(&[("task", task), ("due_date", due_date), ("status", status)])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }

    async fn listing(&self, client: &Client) -> String {
        let response = client.get(self.url("/todos")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.text().await.unwrap()
    }

    async fn task_id(&self, content: &str) -> i64 {
        sqlx::query_scalar("SELECT id FROM todos WHERE content = ?")
            .bind(content)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn task_row(&self, id: i64) -> (bool, String, i64) {
        sqlx::query_as("SELECT done, status, order_index FROM todos WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn location(response: &Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

#[tokio::test]
async fn anonymous_requests_are_turned_away() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    for path in ["/todos", "/todos/1/delete", "/todos/1/toggle"] {
        let response = client.get(app.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&response), "/login");
    }

    let response = client
        .post(app.url("/todos/1/move"))
        .json(&json!({ "status": "Completed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(app.url("/reorder"))
        .json(&json!([{ "id": 1, "position": 0 }]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bad_credentials_get_a_generic_message() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    for (username, password) in [("wronguser", "wrongpass"), ("admin", "wrongpass")] {
        let response = app.login(&client, username, password).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.text().await.unwrap().contains("Invalid username or password."));
    }
}

#[tokio::test]
async fn admin_logs_in_with_bootstrap_password() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let response = app.login(&client, "admin", "password123").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/todos");
    assert!(app.listing(&client).await.contains("Tasks for admin"));
}

#[tokio::test]
async fn registration_reports_errors_inline_and_does_not_log_in() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let page = app.register(&client, "alice", "pw").await;
    assert!(page.contains("Registration successful"));

    let page = app.register(&client, "alice", "other").await;
    assert!(page.contains("Username already exists."));
    assert!(page.contains(r#"value="alice""#));

    let page = app.register(&client, "carol", "").await;
    assert!(page.contains("Both fields are required."));
    assert!(page.contains(r#"value="carol""#));

    let response = client.get(app.url("/todos")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn duplicate_tasks_are_suppressed() {
    let app = TestApp::spawn().await;
    let alice = app.user_with_session("alice").await;

    app.add_task(&alice, "Buy milk", "2024-01-01", "").await;
    let page = app.add_task(&alice, "Buy milk", "2024-01-01", "").await;
    assert_eq!(page.matches("Buy milk</span>").count(), 1);

    let page = app.add_task(&alice, "Buy milk", "", "").await;
    assert_eq!(page.matches("Buy milk</span>").count(), 2);
}

#[tokio::test]
async fn invalid_task_form_keeps_input() {
    let app = TestApp::spawn().await;
    let alice = app.user_with_session("alice").await;

    let page = app.add_task(&alice, "Call mom", "tomorrow", "Planned").await;
    assert!(page.contains("Due date must be YYYY-MM-DD."));
    assert!(page.contains(r#"value="Call mom""#));

    let page = app.add_task(&alice, "   ", "", "").await;
    assert!(page.contains("Task content is required."));
}

#[tokio::test]
async fn other_users_tasks_are_untouchable() {
    let app = TestApp::spawn().await;
    let alice = app.user_with_session("alice").await;
    let bob = app.user_with_session("bob").await;

    app.add_task(&alice, "alice secret", "", "Planned").await;
    let id = app.task_id("alice secret").await;

    assert!(!app.listing(&bob).await.contains("alice secret"));

    for action in ["toggle", "delete"] {
        let response = bob
            .get(app.url(&format!("/todos/{id}/{action}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/todos");
    }

    let response = bob
        .post(app.url(&format!("/todos/{id}/move")))
        .json(&json!({ "status": "Completed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = bob
        .post(app.url("/reorder"))
        .json(&json!([{ "id": id, "position": 7 }]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(app.task_row(id).await, (false, "Planned".to_string(), 0));
    assert!(app.listing(&alice).await.contains("alice secret"));
}

#[tokio::test]
async fn owner_can_move_toggle_reorder_and_delete() {
    let app = TestApp::spawn().await;
    let alice = app.user_with_session("alice").await;

    for task in ["first", "second", "third"] {
        app.add_task(&alice, task, "", "Planned").await;
    }
    let first = app.task_id("first").await;
    let second = app.task_id("second").await;
    let third = app.task_id("third").await;

    let response = alice
        .post(app.url("/reorder"))
        .json(&json!([
            { "id": first, "position": 0 },
            { "id": second, "position": 1 },
            { "id": third, "position": 2 },
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.text().await.unwrap().is_empty());

    let page = app.listing(&alice).await;
    let at = |needle: &str| page.find(&format!(">{needle}</span>")).unwrap();
    assert!(at("first") < at("second"));
    assert!(at("second") < at("third"));

    let response = alice
        .post(app.url(&format!("/todos/{second}/move")))
        .json(&json!({ "status": "Completed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.listing(&alice).await.contains("Completed (1)"));

    let response = alice
        .post(app.url(&format!("/todos/{third}/move")))
        .json(&json!({ "status": "Someday" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.task_row(third).await.1, "Planned");

    alice
        .get(app.url(&format!("/todos/{first}/toggle")))
        .send()
        .await
        .unwrap();
    assert!(app.task_row(first).await.0);

    alice
        .get(app.url(&format!("/todos/{first}/delete")))
        .send()
        .await
        .unwrap();
    assert!(!app.listing(&alice).await.contains(">first</span>"));
}

#[tokio::test]
async fn logout_clears_the_session() {
    let app = TestApp::spawn().await;
    let alice = app.user_with_session("alice").await;
    app.listing(&alice).await;

    let response = alice.get(app.url("/logout")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = alice.get(app.url("/todos")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn session_is_checked_before_the_body_is_parsed() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let response = client
        .post(app.url("/todos/1/move"))
        .body("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(app.url("/reorder"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(app.url("/todos"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn padded_username_can_log_in_as_registered() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    assert!(app.register(&client, "bob ", "pw").await.contains("Registration successful"));
    let response = app.login(&client, "bob ", "pw").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/todos");
}
