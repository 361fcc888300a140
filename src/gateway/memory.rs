use super::{decode_document, encode_document, storage_key, GatewayFuture, PersistenceGateway};
use crate::errors::{AppError, AppResult};
use crate::models::Task;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// Holds encoded bytes so reads go through the same serde path as other backends.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    documents: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_saves: Arc<AtomicBool>,
    fail_loads: Arc<AtomicBool>,
    save_count: Arc<AtomicUsize>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(user_id: &str, tasks: &[Task]) -> AppResult<Self> {
        let gateway = Self::new();
        gateway.put(user_id, tasks)?;
        Ok(gateway)
    }

    pub fn put(&self, user_id: &str, tasks: &[Task]) -> AppResult<()> {
        let key = storage_key(user_id)?;
        let bytes = encode_document(tasks)?;
        self.lock()?.insert(key, bytes);
        Ok(())
    }

    pub fn document(&self, user_id: &str) -> AppResult<Option<Vec<Task>>> {
        let key = storage_key(user_id)?;
        let bytes = self.lock()?.get(&key).cloned();
        bytes.map(|bytes| decode_document(&bytes)).transpose()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    // Failed saves count too.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.documents
            .lock()
            .map_err(|_| AppError::Internal("memory gateway mutex poisoned".to_string()))
    }
}

impl PersistenceGateway for MemoryGateway {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load<'a>(&'a self, user_id: &'a str) -> GatewayFuture<'a, Vec<Task>> {
        Box::pin(async move {
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(AppError::Transport("memory gateway load failure injected".to_string()));
            }
            self.document(user_id)?
                .ok_or_else(|| AppError::NotFound(format!("No task document for user {}", user_id)))
        })
    }

    fn save<'a>(&'a self, user_id: &'a str, tasks: &'a [Task]) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            self.save_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(AppError::Transport("memory gateway save failure injected".to_string()));
            }
            self.put(user_id, tasks)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let gateway = MemoryGateway::new();
        let error = gateway.load("nobody").await.expect_err("no document");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn injected_save_failure_keeps_previous_document() {
        let gateway = MemoryGateway::new();
        gateway.save("user-1", &[]).await.expect("first save");
        gateway.set_fail_saves(true);
        let error = gateway.save("user-1", &[]).await.expect_err("injected failure");
        assert!(matches!(error, AppError::Transport(_)));
        assert_eq!(gateway.save_count(), 2);
        assert_eq!(gateway.document("user-1").expect("read").map(|tasks| tasks.len()), Some(0));
    }
}
