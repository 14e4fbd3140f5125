use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{format_date, parse_date, Task, TaskId, UserId};

const TASK_COLUMNS: &str = "id, user_id, task, date, created_at";

/// Task table on SQLite. Every call is one self-contained statement (or one
/// transaction) against a shared pool.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.init().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Creates the `tasks` table and its lookup index when missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL,
                task       TEXT NOT NULL,
                date       TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure tasks table exists")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_user_date ON tasks (user_id, date)")
            .execute(&self.pool)
            .await
            .context("failed to ensure tasks index exists")?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert(&self, user_id: UserId, text: &str, date: NaiveDate) -> Result<TaskId> {
        if text.trim().is_empty() {
            bail!("task text must not be empty");
        }

        let rec = sqlx::query("INSERT INTO tasks (user_id, task, date) VALUES (?, ?, ?) RETURNING id")
            .bind(user_id.0)
            .bind(text)
            .bind(format_date(date))
            .fetch_one(&self.pool)
            .await
            .context("failed to insert task")?;
        Ok(TaskId(rec.get::<i64, _>(0)))
    }

    pub async fn list_all(&self, user_id: UserId) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? ORDER BY date, id"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to list tasks")?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn list_for_date(&self, user_id: UserId, date: NaiveDate) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND date = ? ORDER BY id"
        ))
        .bind(user_id.0)
        .bind(format_date(date))
        .fetch_all(&self.pool)
        .await
        .context("failed to list tasks for date")?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn get(&self, task_id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(task_id.0)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load task")?;
        row.as_ref().map(task_from_row).transpose()
    }

    pub async fn delete(&self, task_id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id.0)
            .execute(&self.pool)
            .await
            .context("failed to delete task")?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetches and deletes a task owned by `user_id` in one transaction.
    ///
    /// Returns `None` when the task is gone or belongs to someone else.
    pub async fn remove_for_user(&self, user_id: UserId, task_id: TaskId) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?"
        ))
        .bind(task_id.0)
        .bind(user_id.0)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to load task for removal")?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let task = task_from_row(&row)?;

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id.0)
            .execute(&mut *tx)
            .await
            .context("failed to delete task")?;
        tx.commit().await?;

        Ok(Some(task))
    }
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let raw_date: String = row.try_get("date")?;
    let date = parse_date(&raw_date)
        .with_context(|| format!("stored task has invalid date '{raw_date}'"))?;
    Ok(Task {
        id: TaskId(row.try_get::<i64, _>("id")?),
        user_id: UserId(row.try_get::<i64, _>("user_id")?),
        text: row.try_get::<String, _>("task")?,
        date,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
