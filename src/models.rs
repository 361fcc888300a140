use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repetition {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Repetition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn is_recurring(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::str::FromStr for Repetition {
    type Err = crate::errors::AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(crate::errors::AppError::Validation(format!(
                "Unknown repetition '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    // true means done
    pub status: bool,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub repetition: Repetition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status && self.due_date <= now
    }

    pub fn state(&self, now: DateTime<Utc>) -> TaskState {
        if self.status {
            TaskState::Done
        } else if self.due_date <= now {
            TaskState::PendingDue
        } else {
            TaskState::PendingNotDue
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    PendingNotDue,
    PendingDue,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskFilter {
    #[default]
    All,
    Pending,
    Done,
    Due,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskRequest {
    pub title: String,
    pub due_date: String,
    #[serde(default)]
    pub repetition: Repetition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub due_date: Option<String>,
    pub repetition: Option<Repetition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub task_id: TaskId,
    pub title: String,
    pub message: String,
    pub due_date: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
    pub skipped_occurrences: u32,
}

impl Notification {
    pub fn for_task(task: &Task, fired_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            title: task.title.clone(),
            message: format!("Task \"{}\" is due!", task.title),
            due_date: task.due_date,
            fired_at,
            skipped_occurrences: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user_id: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStatus {
    pub last_saved_revision: Option<u64>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub failed_attempts: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenotifyPolicy {
    #[default]
    Once,
    EveryTick,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalendarZone {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StorageSettings {
    JsonFiles {
        #[serde(default)]
        root: Option<PathBuf>,
    },
    Sqlite {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    Memory,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self::JsonFiles { root: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredential {
    pub username: String,
    pub password: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub tick_interval_secs: u64,
    pub renotify: RenotifyPolicy,
    pub calendar_zone: CalendarZone,
    pub storage: StorageSettings,
    pub data_dir: Option<PathBuf>,
    pub log_filter: String,
    pub token_ttl_minutes: i64,
    pub users: Vec<UserCredential>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            renotify: RenotifyPolicy::Once,
            calendar_zone: CalendarZone::Local,
            storage: StorageSettings::default(),
            data_dir: None,
            log_filter: "info".to_string(),
            token_ttl_minutes: 60,
            users: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn task_document_uses_legacy_field_names() {
        let task = Task {
            id: 1,
            title: "Pay rent".to_string(),
            status: false,
            due_date: Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap(),
            repetition: Repetition::Monthly,
            last_notified_at: None,
        };
        let value = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(value["id"], 1);
        assert_eq!(value["status"], false);
        assert_eq!(value["repetition"], "monthly");
        assert!(value["dueDate"].as_str().expect("due date string").starts_with("2025-01-31T09:00:00"));
        assert!(value.get("lastNotifiedAt").is_none());
    }

    #[test]
    fn legacy_documents_without_repetition_default_to_none() {
        let raw = r#"[{"id":3,"title":"Call bank","status":true,"dueDate":"2024-05-01T10:30:00.000Z"}]"#;
        let tasks: Vec<Task> = serde_json::from_str(raw).expect("parse legacy document");
        assert_eq!(tasks[0].repetition, Repetition::None);
        assert!(tasks[0].is_done());
    }

    #[test]
    fn repetition_parses_form_values() {
        assert_eq!("Weekly".parse::<Repetition>().expect("weekly"), Repetition::Weekly);
        assert_eq!("".parse::<Repetition>().expect("blank"), Repetition::None);
        assert!("yearly".parse::<Repetition>().is_err());
    }

    #[test]
    fn storage_settings_are_tagged_by_kind() {
        let settings: AppSettings =
            serde_yaml::from_str("storage:\n  kind: sqlite\n  path: /tmp/tasks.sqlite\nrenotify: every-tick\n")
                .expect("parse settings");
        assert_eq!(
            settings.storage,
            StorageSettings::Sqlite {
                path: Some(PathBuf::from("/tmp/tasks.sqlite"))
            }
        );
        assert_eq!(settings.renotify, RenotifyPolicy::EveryTick);
        assert_eq!(settings.tick_interval_secs, 60);
    }
}
