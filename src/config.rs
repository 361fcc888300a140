use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::gateway::{JsonFileGateway, MemoryGateway, PersistenceGateway};
use crate::models::{AppSettings, StorageSettings};
use crate::policy::validate_settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG_ENV: &str = "TODO_REMINDERS_CONFIG";
pub const HOME_ENV: &str = "TODO_REMINDERS_HOME";
pub const USER_ENV: &str = "TODO_REMINDERS_USER";
pub const PASSWORD_ENV: &str = "TODO_REMINDERS_PASSWORD";

const DEFAULT_DATA_DIR: &str = ".todo-reminders";
const SETTINGS_FILE: &str = "settings.yaml";

pub fn default_data_dir() -> PathBuf {
    std::env::var_os(HOME_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join(SETTINGS_FILE))
}

pub fn load_settings(path: &Path) -> AppResult<AppSettings> {
    let settings = match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => AppSettings::default(),
        Ok(raw) => serde_yaml::from_str::<AppSettings>(&raw)
            .map_err(|error| AppError::Config(format!("{}: {}", path.display(), error)))?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(error) => return Err(AppError::Io(format!("{}: {}", path.display(), error))),
    };
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn build_gateway(settings: &AppSettings, data_dir: &Path) -> AppResult<Arc<dyn PersistenceGateway>> {
    let gateway: Arc<dyn PersistenceGateway> = match &settings.storage {
        StorageSettings::JsonFiles { root } => Arc::new(JsonFileGateway::new(
            root.clone().unwrap_or_else(|| data_dir.join("documents")),
        )),
        StorageSettings::Sqlite { path } => {
            let path = path.clone().unwrap_or_else(|| data_dir.join("tasks.sqlite"));
            Arc::new(Database::new(&path)?)
        }
        StorageSettings::Memory => Arc::new(MemoryGateway::new()),
    };
    tracing::debug!(gateway = gateway.name(), "persistence gateway ready");
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalendarZone, RenotifyPolicy};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&dir.path().join("absent.yaml")).expect("defaults");
        assert_eq!(settings.tick_interval_secs, 60);
        assert_eq!(settings.renotify, RenotifyPolicy::Once);
    }

    #[test]
    fn yaml_overrides_are_applied_and_validated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.yaml");
        std::fs::write(
            &path,
            "tickIntervalSecs: 15\nrenotify: every-tick\ncalendarZone: utc\nusers:\n  - username: ada@example.com\n    password: pw\n    userId: ada-1\n",
        )
        .expect("write settings");

        let settings = load_settings(&path).expect("settings");
        assert_eq!(settings.tick_interval_secs, 15);
        assert_eq!(settings.renotify, RenotifyPolicy::EveryTick);
        assert_eq!(settings.calendar_zone, CalendarZone::Utc);
        assert_eq!(settings.users[0].user_id, "ada-1");

        std::fs::write(&path, "tickIntervalSecs: 0\n").expect("write invalid");
        assert!(matches!(load_settings(&path), Err(AppError::Config(_))));

        std::fs::write(&path, "tickIntervalSecs: [nope\n").expect("write malformed");
        assert!(matches!(load_settings(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn builds_each_storage_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = AppSettings::default();
        assert_eq!(build_gateway(&settings, dir.path()).expect("files").name(), "json-files");

        settings.storage = StorageSettings::Sqlite { path: None };
        assert_eq!(build_gateway(&settings, dir.path()).expect("sqlite").name(), "sqlite");
        assert!(dir.path().join("tasks.sqlite").exists());

        settings.storage = StorageSettings::Memory;
        assert_eq!(build_gateway(&settings, dir.path()).expect("memory").name(), "memory");
    }
}
