use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type UserId = i64;
pub type TodoId = i64;

#[derive(Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

// the hash never reaches logs
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}

impl axum_login::AuthUser for User {
    type Id = UserId;

    fn id(&self) -> Self::Id {
        self.id
    }

    // when user changes password, auth session becomes invalid
    fn session_auth_hash(&self) -> &[u8] {
        self.password_hash.as_bytes()
    }
}

/// Grouping key of the task listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Planned,
    #[default]
    Ongoing,
    Completed,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Planned, Status::Ongoing, Status::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Planned => "Planned",
            Status::Ongoing => "Ongoing",
            Status::Completed => "Completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Planned" => Ok(Status::Planned),
            "Ongoing" => Ok(Status::Ongoing),
            "Completed" => Ok(Status::Completed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// A task row. `status` stays a raw string so that rows written outside
/// this application still load.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub user_id: UserId,
    pub content: String,
    pub done: bool,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub order_index: i64,
}

impl Todo {
    pub fn status(&self) -> Option<Status> {
        self.status.parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct NewTodo {
    pub content: String,
    pub due_date: Option<NaiveDate>,
    pub status: Status,
}

/// Tasks of one user partitioned by status, each group keeping the order of
/// the flat listing.
#[derive(Debug, Default)]
pub struct GroupedTodos {
    pub planned: Vec<Todo>,
    pub ongoing: Vec<Todo>,
    pub completed: Vec<Todo>,
    /// Rows whose status is none of the known values.
    pub dropped: usize,
}

impl GroupedTodos {
    pub fn from_ordered(todos: Vec<Todo>) -> Self {
        let mut grouped = GroupedTodos::default();
        for todo in todos {
            match todo.status() {
                Some(Status::Planned) => grouped.planned.push(todo),
                Some(Status::Ongoing) => grouped.ongoing.push(todo),
                Some(Status::Completed) => grouped.completed.push(todo),
                None => grouped.dropped += 1,
            }
        }
        grouped
    }

    pub fn group(&self, status: Status) -> &[Todo] {
        match status {
            Status::Planned => &self.planned,
            Status::Ongoing => &self.ongoing,
            Status::Completed => &self.completed,
        }
    }

    pub fn len(&self) -> usize {
        self.planned.len() + self.ongoing.len() + self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of an owner-scoped mutation. Targets that are missing or belong
/// to someone else are skipped, never reported as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveRequest {
    pub status: Status,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Position {
    pub id: TodoId,
    pub position: i64,
}
