//! Range-shift primitives that keep each column's task positions a dense
//! 1..=count sequence. Every function expects the connection of an open
//! transaction; the caller commits or rolls back the whole move.

use sqlx::SqliteConnection;

use crate::error::DbResult;

/// Next append slot for a column: max position + 1, or 1 when empty.
pub(crate) async fn next_position(conn: &mut SqliteConnection, column_id: i64) -> DbResult<i64> {
    let next: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) + 1 FROM tasks WHERE column_id = ?")
            .bind(column_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(next)
}

pub(crate) async fn column_count(conn: &mut SqliteConnection, column_id: i64) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE column_id = ?")
        .bind(column_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}

/// Shift the tasks between a move's endpoints, leaving `new_position` free
/// for the moved task. Caller has already ruled out old == new.
pub(crate) async fn shift_within(
    conn: &mut SqliteConnection,
    column_id: i64,
    old_position: i64,
    new_position: i64,
) -> DbResult<()> {
    if new_position > old_position {
        // Moving later: pull the tasks in between one slot earlier.
        sqlx::query(
            "UPDATE tasks SET position = position - 1
             WHERE column_id = ? AND position > ? AND position <= ?",
        )
        .bind(column_id)
        .bind(old_position)
        .bind(new_position)
        .execute(&mut *conn)
        .await?;
    } else {
        // Moving earlier: push the tasks in between one slot later.
        sqlx::query(
            "UPDATE tasks SET position = position + 1
             WHERE column_id = ? AND position >= ? AND position < ?",
        )
        .bind(column_id)
        .bind(new_position)
        .bind(old_position)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Close the gap left behind by a task that sat at `position`.
pub(crate) async fn close_gap(
    conn: &mut SqliteConnection,
    column_id: i64,
    position: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE tasks SET position = position - 1 WHERE column_id = ? AND position > ?")
        .bind(column_id)
        .bind(position)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Open a slot at `position` for an incoming task.
pub(crate) async fn open_slot(
    conn: &mut SqliteConnection,
    column_id: i64,
    position: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE tasks SET position = position + 1 WHERE column_id = ? AND position >= ?")
        .bind(column_id)
        .bind(position)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
