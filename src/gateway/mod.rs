pub mod files;
pub mod memory;

use crate::errors::{AppError, AppResult};
use crate::models::Task;
use crate::policy::validate_user_id;
use std::future::Future;
use std::pin::Pin;

pub use files::JsonFileGateway;
pub use memory::MemoryGateway;

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

// `load` fails with NotFound when the user has no document yet and with
// Transport on I/O failure. `save` always writes the full collection.
pub trait PersistenceGateway: Send + Sync {
    fn name(&self) -> &'static str;
    fn load<'a>(&'a self, user_id: &'a str) -> GatewayFuture<'a, Vec<Task>>;
    fn save<'a>(&'a self, user_id: &'a str, tasks: &'a [Task]) -> GatewayFuture<'a, ()>;
}

pub fn storage_key(user_id: &str) -> AppResult<String> {
    validate_user_id(user_id)?;
    Ok(format!("user-tasks/{}.json", user_id))
}

pub fn encode_document(tasks: &[Task]) -> AppResult<Vec<u8>> {
    serde_json::to_vec(tasks).map_err(AppError::from)
}

pub fn decode_document(bytes: &[u8]) -> AppResult<Vec<Task>> {
    serde_json::from_slice(bytes)
        .map_err(|error| AppError::Transport(format!("Task document is not valid JSON: {}", error)))
}
