use super::{decode_document, encode_document, storage_key, GatewayFuture, PersistenceGateway};
use crate::errors::{AppError, AppResult};
use crate::models::Task;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct JsonFileGateway {
    root: PathBuf,
}

impl JsonFileGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn document_path(&self, user_id: &str) -> AppResult<PathBuf> {
        let path = self.root.join(storage_key(user_id)?);
        if !path.starts_with(&self.root) {
            return Err(AppError::Validation(
                "Resolved document path escaped storage root".to_string(),
            ));
        }
        Ok(path)
    }
}

impl PersistenceGateway for JsonFileGateway {
    fn name(&self) -> &'static str {
        "json-files"
    }

    fn load<'a>(&'a self, user_id: &'a str) -> GatewayFuture<'a, Vec<Task>> {
        Box::pin(async move {
            let path = self.document_path(user_id)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => decode_document(&bytes),
                Err(error) if error.kind() == ErrorKind::NotFound => Err(AppError::NotFound(format!(
                    "No task document for user {}",
                    user_id
                ))),
                Err(error) => Err(AppError::Transport(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    error
                ))),
            }
        })
    }

    fn save<'a>(&'a self, user_id: &'a str, tasks: &'a [Task]) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let path = self.document_path(user_id)?;
            let bytes = encode_document(tasks)?;
            write_atomically(&path, &bytes)
                .await
                .map_err(|error| AppError::Transport(format!("Failed to write {}: {}", path.display(), error)))
        })
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
    if let Err(error) = tokio::fs::write(&staging, bytes).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(error);
    }
    if let Err(error) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Repetition;
    use chrono::{TimeZone, Utc};

    fn sample_tasks() -> Vec<Task> {
        vec![Task {
            id: 1,
            title: "Renew passport".to_string(),
            status: false,
            due_date: Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap(),
            repetition: Repetition::None,
            last_notified_at: None,
        }]
    }

    #[tokio::test]
    async fn save_then_load_uses_user_tasks_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = JsonFileGateway::new(dir.path());
        gateway.save("user-1", &sample_tasks()).await.expect("save");

        assert!(dir.path().join("user-tasks").join("user-1.json").exists());
        let loaded = gateway.load("user-1").await.expect("load");
        assert_eq!(loaded, sample_tasks());
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = JsonFileGateway::new(dir.path());
        let error = gateway.load("user-2").await.expect_err("missing");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn overwrite_leaves_no_staging_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = JsonFileGateway::new(dir.path());
        gateway.save("user-1", &sample_tasks()).await.expect("first save");
        gateway.save("user-1", &[]).await.expect("second save");

        let entries = std::fs::read_dir(dir.path().join("user-tasks"))
            .expect("read dir")
            .count();
        assert_eq!(entries, 1);
        assert!(gateway.load("user-1").await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn unreadable_document_is_a_transport_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = JsonFileGateway::new(dir.path());
        let path = gateway.document_path("user-1").expect("path");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, b"[{\"id\":").expect("write corrupt");

        let error = gateway.load("user-1").await.expect_err("corrupt");
        assert!(matches!(error, AppError::Transport(_)));
    }
}
