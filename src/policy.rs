use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, StorageSettings};
use std::collections::BTreeSet;

const MIN_TICK_INTERVAL_SECS: u64 = 1;
const MAX_TICK_INTERVAL_SECS: u64 = 3_600;
const MAX_TITLE_CHARS: usize = 500;
const MAX_USER_ID_CHARS: usize = 128;
const MIN_TOKEN_TTL_MINUTES: i64 = 1;
const MAX_TOKEN_TTL_MINUTES: i64 = 24 * 60;

pub fn validate_title(title: &str) -> AppResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Task title cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "Task title exceeds {} characters",
            MAX_TITLE_CHARS
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(AppError::Validation(
            "Task title cannot contain control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

// User ids become storage keys: a single safe path component.
pub fn validate_user_id(user_id: &str) -> AppResult<()> {
    if user_id.is_empty() {
        return Err(AppError::Validation("User id cannot be empty".to_string()));
    }
    if user_id.len() > MAX_USER_ID_CHARS {
        return Err(AppError::Validation(format!(
            "User id exceeds {} characters",
            MAX_USER_ID_CHARS
        )));
    }
    if user_id == "." || user_id == ".." {
        return Err(AppError::Validation(format!("User id '{}' is reserved", user_id)));
    }
    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '@')
    {
        return Err(AppError::Validation(format!(
            "User id '{}' contains characters not allowed in a storage key",
            user_id
        )));
    }
    Ok(())
}

pub fn validate_settings(settings: &AppSettings) -> AppResult<()> {
    if !(MIN_TICK_INTERVAL_SECS..=MAX_TICK_INTERVAL_SECS).contains(&settings.tick_interval_secs) {
        return Err(AppError::Config(format!(
            "Tick interval {}s is out of allowed range ({}..={})",
            settings.tick_interval_secs, MIN_TICK_INTERVAL_SECS, MAX_TICK_INTERVAL_SECS
        )));
    }

    if !(MIN_TOKEN_TTL_MINUTES..=MAX_TOKEN_TTL_MINUTES).contains(&settings.token_ttl_minutes) {
        return Err(AppError::Config(format!(
            "Token TTL {} minutes is out of allowed range ({}..={})",
            settings.token_ttl_minutes, MIN_TOKEN_TTL_MINUTES, MAX_TOKEN_TTL_MINUTES
        )));
    }

    match &settings.storage {
        StorageSettings::JsonFiles { root: Some(path) } | StorageSettings::Sqlite { path: Some(path) }
            if path.as_os_str().is_empty() =>
        {
            return Err(AppError::Config("Storage path cannot be empty".to_string()));
        }
        _ => {}
    }

    let mut usernames = BTreeSet::new();
    for user in &settings.users {
        if user.username.trim().is_empty() {
            return Err(AppError::Config("Configured usernames cannot be blank".to_string()));
        }
        if !usernames.insert(user.username.to_ascii_lowercase()) {
            return Err(AppError::Config(format!(
                "Username '{}' is configured more than once",
                user.username
            )));
        }
        validate_user_id(&user.user_id).map_err(|error| AppError::Config(error.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserCredential;

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(validate_title("  Pay rent ").expect("valid"), "Pay rent");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(501)).is_err());
        assert!(validate_title("line\nbreak").is_err());
    }

    #[test]
    fn user_ids_must_be_safe_key_components() {
        assert!(validate_user_id("us-east-1:4f1c0a2e-9d").is_err());
        assert!(validate_user_id("4f1c0a2e-9d7b-4e0f-8a55-1d2b3c4d5e6f").is_ok());
        assert!(validate_user_id("../etc").is_err());
        assert!(validate_user_id("..").is_err());
        assert!(validate_user_id("").is_err());
    }

    #[test]
    fn rejects_out_of_bounds_settings() {
        let mut settings = AppSettings::default();
        assert!(validate_settings(&settings).is_ok());

        settings.tick_interval_secs = 0;
        assert!(matches!(validate_settings(&settings), Err(AppError::Config(_))));

        settings.tick_interval_secs = 60;
        settings.token_ttl_minutes = 0;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn rejects_duplicate_usernames() {
        let settings = AppSettings {
            users: vec![
                UserCredential {
                    username: "ada@example.com".to_string(),
                    password: "one".to_string(),
                    user_id: "user-1".to_string(),
                },
                UserCredential {
                    username: "ADA@example.com".to_string(),
                    password: "two".to_string(),
                    user_id: "user-2".to_string(),
                },
            ],
            ..AppSettings::default()
        };
        let error = validate_settings(&settings).expect_err("duplicate usernames");
        assert!(error.to_string().contains("more than once"));
    }
}
