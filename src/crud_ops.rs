use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{
    entities::{GroupedTodos, Mutation, NewTodo, Position, Status, Todo, TodoId, UserId},
    error::StoreError,
};

/// Inserts a task unless the owner already has one with the same content
/// and due date. Returns the new id, or `None` for the duplicate case.
pub async fn create_todo(
    pool: &SqlitePool,
    owner: UserId,
    new_todo: NewTodo,
) -> Result<Option<TodoId>, StoreError> {
    let content = new_todo.content.trim();
    if content.is_empty() {
        return Err(StoreError::Validation("Task content is required."));
    }

    // `IS` makes two missing due dates compare equal
    let id: Option<TodoId> = sqlx::query_scalar(
        "INSERT INTO todos (user_id, content, due_date, status)
         SELECT ?1, ?2, ?3, ?4
         WHERE NOT EXISTS (
             SELECT 1 FROM todos WHERE user_id = ?1 AND content = ?2 AND due_date IS ?3
         )
         RETURNING id",
    )
    .bind(owner)
    .bind(content)
    .bind(new_todo.due_date)
    .bind(new_todo.status.as_str())
    .fetch_optional(pool)
    .await?;

    match id {
        Some(id) => tracing::debug!(owner, id, "created todo"),
        None => tracing::debug!(owner, content, "duplicate todo ignored"),
    }
    Ok(id)
}

/// All tasks of `owner`, manual order first, then due date (missing dates
/// last), newest first.
pub async fn list_todos(pool: &SqlitePool, owner: UserId) -> Result<Vec<Todo>, StoreError> {
    let todos = sqlx::query_as(
        "SELECT id, user_id, content, done, due_date, status, order_index
         FROM todos
         WHERE user_id = ?
         ORDER BY order_index ASC, due_date IS NULL, due_date ASC, id DESC",
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;
    Ok(todos)
}

pub async fn list_grouped(pool: &SqlitePool, owner: UserId) -> Result<GroupedTodos, StoreError> {
    let grouped = GroupedTodos::from_ordered(list_todos(pool, owner).await?);
    if grouped.dropped > 0 {
        tracing::debug!(owner, dropped = grouped.dropped, "todos with unknown status hidden");
    }
    Ok(grouped)
}

async fn is_owned(
    tx: &mut Transaction<'_, Sqlite>,
    id: TodoId,
    owner: UserId,
) -> Result<bool, StoreError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM todos WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

/// Runs `statement` (bound to `?1` = id, `?2` = owner, then `extra`) only
/// after confirming that `owner` holds the task.
async fn mutate_owned(
    pool: &SqlitePool,
    id: TodoId,
    owner: UserId,
    statement: &'static str,
    extra: Option<&str>,
) -> Result<Mutation, StoreError> {
    let mut tx = pool.begin().await?;

    if !is_owned(&mut tx, id, owner).await? {
        tracing::debug!(owner, id, "todo missing or not owned, skipping");
        return Ok(Mutation::Skipped);
    }

    let mut query = sqlx::query(statement).bind(id).bind(owner);
    if let Some(extra) = extra {
        query = query.bind(extra);
    }
    query.execute(&mut *tx).await?;
    tx.commit().await?;

    Ok(Mutation::Applied)
}

pub async fn set_status(
    pool: &SqlitePool,
    id: TodoId,
    owner: UserId,
    status: Status,
) -> Result<Mutation, StoreError> {
    mutate_owned(
        pool,
        id,
        owner,
        "UPDATE todos SET status = ?3 WHERE id = ?1 AND user_id = ?2",
        Some(status.as_str()),
    )
    .await
}

pub async fn toggle_done(pool: &SqlitePool, id: TodoId, owner: UserId) -> Result<Mutation, StoreError> {
    mutate_owned(
        pool,
        id,
        owner,
        "UPDATE todos SET done = NOT done WHERE id = ?1 AND user_id = ?2",
        None,
    )
    .await
}

pub async fn delete_todo(pool: &SqlitePool, id: TodoId, owner: UserId) -> Result<Mutation, StoreError> {
    mutate_owned(
        pool,
        id,
        owner,
        "DELETE FROM todos WHERE id = ?1 AND user_id = ?2",
        None,
    )
    .await
}

/// Applies every position in one transaction. Entries for tasks the owner
/// does not hold are skipped; any database error rolls back the whole batch.
/// Returns how many rows were updated.
pub async fn set_order(
    pool: &SqlitePool,
    owner: UserId,
    positions: &[Position],
) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;
    let mut updated = 0;

    for entry in positions {
        if !is_owned(&mut tx, entry.id, owner).await? {
            continue;
        }
        updated += sqlx::query("UPDATE todos SET order_index = ? WHERE id = ? AND user_id = ?")
            .bind(entry.position)
            .bind(entry.id)
            .bind(owner)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;
    tracing::debug!(owner, requested = positions.len(), updated, "reordered todos");
    Ok(updated)
}
