use crate::errors::{AppError, AppResult};
use crate::gateway::{decode_document, encode_document, storage_key, GatewayFuture, PersistenceGateway};
use crate::models::Task;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStats {
    pub task_count: i64,
    pub write_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn read_document(&self, user_id: &str) -> AppResult<Option<Vec<Task>>> {
        storage_key(user_id)?;
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw = conn
            .query_row(
                "SELECT body_json FROM task_documents WHERE user_id = ?1",
                [user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        raw.map(|raw| decode_document(raw.as_bytes())).transpose()
    }

    pub fn write_document(&self, user_id: &str, tasks: &[Task]) -> AppResult<()> {
        let key = storage_key(user_id)?;
        let body = String::from_utf8(encode_document(tasks)?)
            .map_err(|error| AppError::Internal(error.to_string()))?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO task_documents (user_id, storage_key, body_json, task_count, write_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
               body_json = excluded.body_json,
               task_count = excluded.task_count,
               write_count = task_documents.write_count + 1,
               updated_at = excluded.updated_at",
            params![user_id, key, body, tasks.len() as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn document_stats(&self, user_id: &str) -> AppResult<Option<DocumentStats>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let row = conn
            .query_row(
                "SELECT task_count, write_count, updated_at FROM task_documents WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(task_count, write_count, updated_at)| {
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|error| AppError::Internal(error.to_string()))?
                .with_timezone(&Utc);
            Ok(DocumentStats {
                task_count,
                write_count,
                updated_at,
            })
        })
        .transpose()
    }
}

impl PersistenceGateway for Database {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load<'a>(&'a self, user_id: &'a str) -> GatewayFuture<'a, Vec<Task>> {
        Box::pin(async move {
            self.read_document(user_id)?
                .ok_or_else(|| AppError::NotFound(format!("No task document for user {}", user_id)))
        })
    }

    fn save<'a>(&'a self, user_id: &'a str, tasks: &'a [Task]) -> GatewayFuture<'a, ()> {
        Box::pin(async move { self.write_document(user_id, tasks) })
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::gateway::PersistenceGateway;
    use crate::models::{Repetition, Task};
    use chrono::{TimeZone, Utc};

    fn task(id: u64, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            status: false,
            due_date: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
            repetition: Repetition::Daily,
            last_notified_at: None,
        }
    }

    #[tokio::test]
    async fn database_can_write_and_read_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("tasks.sqlite")).expect("db");

        db.save("user-1", &[task(1, "Stretch")]).await.expect("save");
        let loaded = db.load("user-1").await.expect("load");
        assert_eq!(loaded, vec![task(1, "Stretch")]);
    }

    #[tokio::test]
    async fn repeated_saves_overwrite_and_count_writes() {
        let db = Database::in_memory().expect("db");
        db.save("user-1", &[task(1, "a")]).await.expect("first");
        db.save("user-1", &[task(1, "a"), task(2, "b")]).await.expect("second");

        let stats = db.document_stats("user-1").expect("stats").expect("row");
        assert_eq!(stats.task_count, 2);
        assert_eq!(stats.write_count, 2);
        assert_eq!(db.load("user-1").await.expect("load").len(), 2);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let db = Database::in_memory().expect("db");
        let error = db.load("user-9").await.expect_err("missing");
        assert!(error.is_not_found());
    }
}
