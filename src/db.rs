use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::models::{Column, Project, ProjectDetail, Task, TaskPatch};
use crate::position;

/// Columns every new project starts with, in board order.
const DEFAULT_COLUMNS: [&str; 3] = ["To Do", "In Progress", "Done"];

pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (or create) the database at the default on-disk location and
    /// bring the schema up to date.
    pub async fn connect() -> DbResult<Self> {
        let state_dir = dirs::state_dir()
            .or_else(dirs::config_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
            .ok_or_else(|| DbError::Config("could not determine a state directory".into()))?;

        let db_path = state_dir.join("kanban").join("data");
        std::fs::create_dir_all(&db_path)
            .map_err(|e| DbError::Config(format!("create {}: {e}", db_path.display())))?;

        let db_file = db_path.join("kanban.db");
        let database_url = format!("sqlite:{}?mode=rwc", db_file.display());

        Self::connect_to(&database_url).await
    }

    /// Open the database at an explicit sqlx URL.
    pub async fn connect_to(database_url: &str) -> DbResult<Self> {
        let pool = SqlitePool::connect(database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(database_url, "database ready");

        Ok(Db { pool })
    }

    /// In-memory database for tests and ephemeral use. Capped at one
    /// connection: each pooled connection would otherwise see its own
    /// empty in-memory database.
    pub async fn connect_in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Db { pool })
    }

    pub async fn list_projects(&self) -> DbResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, Project>(
            "SELECT id, name, description, created_at FROM projects ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Create a project together with its default columns.
    pub async fn create_project(&self, name: &str, description: &str) -> DbResult<Project> {
        if name.trim().is_empty() {
            return Err(DbError::InvalidInput("project name is required".into()));
        }

        let mut tx = self.pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(
            "INSERT INTO projects (name, description, created_at) VALUES (?, ?, ?)
             RETURNING id, name, description, created_at",
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        for (i, column_name) in DEFAULT_COLUMNS.iter().enumerate() {
            sqlx::query("INSERT INTO columns (project_id, name, position) VALUES (?, ?, ?)")
                .bind(project.id)
                .bind(column_name)
                .bind(i as i64 + 1)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(project_id = project.id, "created project with default columns");

        Ok(project)
    }

    pub async fn get_project(&self, project_id: i64) -> DbResult<ProjectDetail> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, description, created_at FROM projects WHERE id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("project {project_id}")))?;

        let columns = sqlx::query_as::<_, Column>(
            "SELECT id, project_id, name, position FROM columns
             WHERE project_id = ? ORDER BY position",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let tasks = sqlx::query_as::<_, Task>(
            "SELECT id, project_id, column_id, title, description, position, created_at, updated_at
             FROM tasks WHERE project_id = ? ORDER BY column_id, position",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ProjectDetail {
            project,
            columns,
            tasks,
        })
    }

    pub async fn update_project(
        &self,
        project_id: i64,
        name: &str,
        description: &str,
    ) -> DbResult<Project> {
        if name.trim().is_empty() {
            return Err(DbError::InvalidInput("project name is required".into()));
        }

        sqlx::query_as::<_, Project>(
            "UPDATE projects SET name = ?, description = ? WHERE id = ?
             RETURNING id, name, description, created_at",
        )
        .bind(name)
        .bind(description)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("project {project_id}")))
    }

    /// Delete a project and everything on its board.
    pub async fn delete_project(&self, project_id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tasks WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM columns WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("project {project_id}")));
        }

        tx.commit().await?;
        debug!(project_id, "deleted project");

        Ok(())
    }

    pub async fn get_task(&self, task_id: i64) -> DbResult<Task> {
        sqlx::query_as::<_, Task>(
            "SELECT id, project_id, column_id, title, description, position, created_at, updated_at
             FROM tasks WHERE id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("task {task_id}")))
    }

    pub async fn tasks_in_column(&self, column_id: i64) -> DbResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            "SELECT id, project_id, column_id, title, description, position, created_at, updated_at
             FROM tasks WHERE column_id = ? ORDER BY position",
        )
        .bind(column_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Create a task at the end of a column.
    pub async fn create_task(
        &self,
        project_id: i64,
        column_id: i64,
        title: &str,
        description: &str,
    ) -> DbResult<Task> {
        if title.trim().is_empty() {
            return Err(DbError::InvalidInput("task title is required".into()));
        }

        let mut tx = self.pool.begin().await?;

        let column_project: Option<(i64,)> =
            sqlx::query_as("SELECT project_id FROM columns WHERE id = ?")
                .bind(column_id)
                .fetch_optional(&mut *tx)
                .await?;
        match column_project {
            None => return Err(DbError::NotFound(format!("column {column_id}"))),
            Some((owner,)) if owner != project_id => {
                return Err(DbError::InvalidInput(format!(
                    "column {column_id} does not belong to project {project_id}"
                )));
            }
            Some(_) => {}
        }

        // The append read and the insert share one transaction, so two
        // concurrent creates cannot observe the same max position.
        let next = position::next_position(&mut tx, column_id).await?;

        let now = Utc::now();
        let task = sqlx::query_as::<_, Task>(
            "INSERT INTO tasks (project_id, column_id, title, description, position, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, project_id, column_id, title, description, position, created_at, updated_at",
        )
        .bind(project_id)
        .bind(column_id)
        .bind(title)
        .bind(description)
        .bind(next)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(task_id = task.id, column_id, position = next, "created task");

        Ok(task)
    }

    /// Update a task's title and/or description.
    pub async fn update_task(&self, task_id: i64, patch: TaskPatch) -> DbResult<Task> {
        if patch.is_empty() {
            return Err(DbError::InvalidInput("no fields to update".into()));
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(DbError::InvalidInput("task title is required".into()));
            }
        }

        sqlx::query_as::<_, Task>(
            "UPDATE tasks
             SET title = COALESCE(?, title),
                 description = COALESCE(?, description),
                 updated_at = ?
             WHERE id = ?
             RETURNING id, project_id, column_id, title, description, position, created_at, updated_at",
        )
        .bind(patch.title)
        .bind(patch.description)
        .bind(Utc::now())
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("task {task_id}")))
    }

    /// Delete a task and close the gap it leaves in its column.
    pub async fn delete_task(&self, task_id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let removed: Option<(i64, i64)> =
            sqlx::query_as("DELETE FROM tasks WHERE id = ? RETURNING column_id, position")
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (column_id, old_position) =
            removed.ok_or_else(|| DbError::NotFound(format!("task {task_id}")))?;

        position::close_gap(&mut tx, column_id, old_position).await?;

        tx.commit().await?;
        debug!(task_id, column_id, "deleted task");

        Ok(())
    }

    /// Move a task to a new position, in its own column or another column
    /// of the same project. Both columns stay dense.
    pub async fn move_task(
        &self,
        task_id: i64,
        new_column_id: i64,
        new_position: i64,
    ) -> DbResult<Task> {
        if new_position < 1 {
            return Err(DbError::InvalidInput("position must be at least 1".into()));
        }

        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, i64, i64)> =
            sqlx::query_as("SELECT project_id, column_id, position FROM tasks WHERE id = ?")
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (project_id, old_column_id, old_position) =
            current.ok_or_else(|| DbError::NotFound(format!("task {task_id}")))?;

        if new_column_id == old_column_id {
            if new_position == old_position {
                // Target placement equals current placement.
                drop(tx);
                return self.get_task(task_id).await;
            }

            let count = position::column_count(&mut tx, new_column_id).await?;
            if new_position > count {
                return Err(DbError::InvalidInput(format!(
                    "position {new_position} out of range for column {new_column_id}"
                )));
            }

            position::shift_within(&mut tx, new_column_id, old_position, new_position).await?;
        } else {
            let destination: Option<(i64,)> =
                sqlx::query_as("SELECT project_id FROM columns WHERE id = ?")
                    .bind(new_column_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            match destination {
                None => return Err(DbError::NotFound(format!("column {new_column_id}"))),
                Some((owner,)) if owner != project_id => {
                    return Err(DbError::InvalidInput(format!(
                        "column {new_column_id} does not belong to project {project_id}"
                    )));
                }
                Some(_) => {}
            }

            let destination_count = position::column_count(&mut tx, new_column_id).await?;
            if new_position > destination_count + 1 {
                return Err(DbError::InvalidInput(format!(
                    "position {new_position} out of range for column {new_column_id}"
                )));
            }

            position::close_gap(&mut tx, old_column_id, old_position).await?;
            position::open_slot(&mut tx, new_column_id, new_position).await?;
        }

        let task = sqlx::query_as::<_, Task>(
            "UPDATE tasks SET column_id = ?, position = ?, updated_at = ? WHERE id = ?
             RETURNING id, project_id, column_id, title, description, position, created_at, updated_at",
        )
        .bind(new_column_id)
        .bind(new_position)
        .bind(Utc::now())
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("task {task_id}")))?;

        tx.commit().await?;
        debug!(
            task_id,
            old_column_id, old_position, new_column_id, new_position, "moved task"
        );

        Ok(task)
    }
}
