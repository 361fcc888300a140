pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod policy;
pub mod recurrence;
pub mod redaction;
pub mod scheduler;
pub mod session;
pub mod store;

use crate::auth::StaticAuthenticator;
use crate::errors::{AppError, AppResult};
use crate::notify::LogSink;
use crate::session::{SessionOptions, TaskSession};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

pub use crate::errors::AppError as Error;
pub use crate::models::{NewTaskRequest, Repetition, Task, TaskFilter, TaskPatch};
pub use crate::store::TaskStore;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub async fn run() -> AppResult<()> {
    let home = config::default_data_dir();
    let settings = config::load_settings(&config::settings_path(&home))?;
    let data_dir = settings.data_dir.clone().unwrap_or(home);
    std::fs::create_dir_all(&data_dir)?;
    init_tracing(&data_dir, &settings.log_filter)?;

    let gateway = config::build_gateway(&settings, &data_dir)?;
    let authenticator = StaticAuthenticator::new(settings.users.clone(), settings.token_ttl_minutes);
    let (username, password) = credentials_from_env()?;

    let session = TaskSession::open(
        &authenticator,
        gateway,
        Arc::new(LogSink),
        SessionOptions::from(&settings),
        &username,
        &password,
    )
    .await?;

    if session.is_empty().await {
        tracing::info!(user_id = %session.user_id(), "No Tasks...");
    }

    let scan = session.start_due_scan();
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    scan.stop().await;

    if session.save_status().await.last_error.is_some() && !session.flush().await {
        tracing::warn!(user_id = %session.user_id(), "final save failed; latest changes were not persisted");
    }
    Ok(())
}

fn credentials_from_env() -> AppResult<(String, String)> {
    let username = std::env::var(config::USER_ENV)
        .map_err(|_| AppError::Auth(format!("Set {} to sign in", config::USER_ENV)))?;
    let password = std::env::var(config::PASSWORD_ENV)
        .map_err(|_| AppError::Auth(format!("Set {} to sign in", config::PASSWORD_ENV)))?;
    Ok((username, password))
}

fn init_tracing(data_dir: &Path, default_filter: &str) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| AppError::Io(error.to_string()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "reminders.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
