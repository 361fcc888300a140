use crate::auth::Authenticator;
use crate::errors::{AppError, AppResult};
use crate::gateway::PersistenceGateway;
use crate::models::{
    AppSettings, AuthSession, CalendarZone, NewTaskRequest, RenotifyPolicy, SaveStatus, Task, TaskFilter, TaskId,
    TaskPatch,
};
use crate::notify::NotificationSink;
use crate::recurrence::parse_due_date;
use crate::redaction::Redactor;
use crate::scheduler::{scan_due_tasks, ScanHandle, ScanOptions, ScanReport, Scheduler, TickFuture};
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub tick_interval: Duration,
    pub renotify: RenotifyPolicy,
    pub zone: CalendarZone,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for SessionOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            tick_interval: Duration::from_secs(settings.tick_interval_secs),
            renotify: settings.renotify,
            zone: settings.calendar_zone,
        }
    }
}

/// One signed-in user's task list. Mutations apply under the store lock, then
/// the snapshot is saved in full. Save failures are recorded in [`SaveStatus`]
/// and never undo the in-memory change.
pub struct TaskSession {
    auth: AuthSession,
    store: Mutex<TaskStore>,
    gateway: Arc<dyn PersistenceGateway>,
    sink: Arc<dyn NotificationSink>,
    options: SessionOptions,
    save_status: Mutex<SaveStatus>,
    save_lock: Mutex<()>,
    load_error: Option<String>,
}

impl TaskSession {
    // No task data is touched on auth failure.
    pub async fn open(
        authenticator: &dyn Authenticator,
        gateway: Arc<dyn PersistenceGateway>,
        sink: Arc<dyn NotificationSink>,
        options: SessionOptions,
        username: &str,
        password: &str,
    ) -> AppResult<Arc<Self>> {
        let auth = match authenticator.authenticate(username, password).await {
            Ok(auth) => auth,
            Err(error) => {
                let redacted = Redactor::new().with_secret(password).redact(&error.to_string()).content;
                tracing::warn!(username = %username, error = %redacted, "authentication failed");
                return Err(match error {
                    AppError::Auth(_) => AppError::Auth(strip_code(&redacted)),
                    other => AppError::Auth(format!("Sign-in unavailable: {}", strip_code(&other.to_string()))),
                });
            }
        };
        Ok(Self::with_auth(auth, gateway, sink, options).await)
    }

    pub async fn with_auth(
        auth: AuthSession,
        gateway: Arc<dyn PersistenceGateway>,
        sink: Arc<dyn NotificationSink>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let loaded = gateway
            .load(&auth.user_id)
            .await
            .and_then(|tasks| TaskStore::from_tasks(tasks, options.zone));
        let (store, load_error) = match loaded {
            Ok(store) => {
                tracing::info!(user_id = %auth.user_id, count = store.len(), gateway = gateway.name(), "loaded tasks");
                (store, None)
            }
            Err(error) if error.is_not_found() => {
                tracing::info!(user_id = %auth.user_id, "no stored tasks; starting with an empty list");
                (TaskStore::new(options.zone), None)
            }
            Err(error) => {
                tracing::warn!(user_id = %auth.user_id, error = %error, "failed to load tasks; starting with an empty list");
                (TaskStore::new(options.zone), Some(error.to_string()))
            }
        };

        Arc::new(Self {
            auth,
            store: Mutex::new(store),
            gateway,
            sink,
            options,
            save_status: Mutex::new(SaveStatus::default()),
            save_lock: Mutex::new(()),
            load_error,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.auth.user_id
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub async fn save_status(&self) -> SaveStatus {
        self.save_status.lock().await.clone()
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.store.lock().await.snapshot()
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> Vec<Task> {
        self.store.lock().await.list(filter, Utc::now())
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.store.lock().await.get(id).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }

    pub async fn add_task(&self, request: NewTaskRequest) -> AppResult<Task> {
        let (task, tasks, revision) = {
            let mut store = self.store.lock().await;
            let task = store.add(&request.title, &request.due_date, request.repetition)?;
            (task, store.snapshot(), store.revision())
        };
        tracing::debug!(user_id = %self.user_id(), task_id = task.id, "task added");
        self.persist(tasks, revision).await;
        Ok(task)
    }

    // Removing an unknown id saves nothing.
    pub async fn remove_task(&self, id: TaskId) -> bool {
        let pending = {
            let mut store = self.store.lock().await;
            store.remove(id).then(|| (store.snapshot(), store.revision()))
        };
        match pending {
            Some((tasks, revision)) => {
                self.persist(tasks, revision).await;
                true
            }
            None => false,
        }
    }

    pub async fn toggle_done(&self, id: TaskId) -> bool {
        let pending = {
            let mut store = self.store.lock().await;
            store.toggle_done(id).then(|| (store.snapshot(), store.revision()))
        };
        match pending {
            Some((tasks, revision)) => {
                self.persist(tasks, revision).await;
                true
            }
            None => false,
        }
    }

    pub async fn replace_task(&self, id: TaskId, task: Task) -> AppResult<Task> {
        let (task, tasks, revision) = {
            let mut store = self.store.lock().await;
            let task = store.replace(id, task)?;
            (task, store.snapshot(), store.revision())
        };
        self.persist(tasks, revision).await;
        Ok(task)
    }

    pub async fn update_title(&self, id: TaskId, title: &str) -> AppResult<Task> {
        self.update_task(
            id,
            TaskPatch {
                title: Some(title.to_string()),
                ..TaskPatch::default()
            },
        )
        .await
    }

    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> AppResult<Task> {
        let (task, tasks, revision) = {
            let mut store = self.store.lock().await;
            let mut edited = store
                .get(id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;
            if let Some(title) = patch.title {
                edited.title = title;
            }
            if let Some(raw) = patch.due_date.as_deref() {
                edited.due_date = parse_due_date(raw, store.zone())?;
            }
            if let Some(repetition) = patch.repetition {
                edited.repetition = repetition;
            }
            let task = store.replace(id, edited)?;
            (task, store.snapshot(), store.revision())
        };
        self.persist(tasks, revision).await;
        Ok(task)
    }

    pub async fn reload(&self) -> AppResult<usize> {
        let tasks = match self.gateway.load(self.user_id()).await {
            Ok(tasks) => tasks,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error),
        };
        let (revision, count) = {
            let mut store = self.store.lock().await;
            store.replace_all(tasks)?;
            (store.revision(), store.len())
        };
        self.save_status.lock().await.last_saved_revision = Some(revision);
        tracing::info!(user_id = %self.user_id(), count, "reloaded tasks from storage");
        Ok(count)
    }

    // Retries after a failed save.
    pub async fn flush(&self) -> bool {
        let (tasks, revision) = {
            let store = self.store.lock().await;
            (store.snapshot(), store.revision())
        };
        self.save_status.lock().await.last_saved_revision = None;
        self.persist(tasks, revision).await
    }

    pub async fn run_tick(&self, now: DateTime<Utc>) -> AppResult<ScanReport> {
        let scan_options = ScanOptions {
            renotify: self.options.renotify,
            zone: self.options.zone,
        };
        let (mut report, pending) = {
            let mut store = self.store.lock().await;
            let report = scan_due_tasks(store.tasks_mut(), now, scan_options);
            let pending = if report.mutated {
                store.bump();
                Some((store.snapshot(), store.revision()))
            } else {
                None
            };
            (report, pending)
        };

        for notification in &report.notifications {
            self.sink.announce(notification);
        }

        if let Some((tasks, revision)) = pending {
            report.saved = self.persist(tasks, revision).await;
        }
        Ok(report)
    }

    pub fn start_due_scan(self: &Arc<Self>) -> ScanHandle {
        let scheduler = Scheduler::new(self.options.tick_interval);
        let weak = Arc::downgrade(self);
        scheduler.set_executor(Arc::new(move |now: DateTime<Utc>| -> TickFuture {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(session) => session.run_tick(now).await,
                    None => Ok(ScanReport::default()),
                }
            })
        }));
        tracing::info!(
            user_id = %self.user_id(),
            interval_secs = self.options.tick_interval.as_secs(),
            "due scan started"
        );
        scheduler.start()
    }

    // Saves run one at a time under `save_lock`; a snapshot older than one
    // already written is dropped. `save_status` is only held to read or record.
    async fn persist(&self, tasks: Vec<Task>, revision: u64) -> bool {
        let _save = self.save_lock.lock().await;
        let last_saved_revision = self.save_status.lock().await.last_saved_revision;
        if last_saved_revision.is_some_and(|saved| saved >= revision) {
            tracing::debug!(revision, "newer snapshot already saved; skipping");
            return true;
        }

        let outcome = self.gateway.save(self.user_id(), &tasks).await;
        let mut status = self.save_status.lock().await;
        match outcome {
            Ok(()) => {
                status.last_saved_revision = Some(status.last_saved_revision.map_or(revision, |saved| saved.max(revision)));
                status.last_saved_at = Some(Utc::now());
                status.last_error = None;
                true
            }
            Err(error) => {
                tracing::warn!(
                    user_id = %self.user_id(),
                    revision,
                    gateway = self.gateway.name(),
                    error = %error,
                    "failed to save tasks"
                );
                status.last_error = Some(error.to_string());
                status.failed_attempts += 1;
                false
            }
        }
    }
}

fn strip_code(message: &str) -> String {
    message
        .split_once(": ")
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_else(|| message.to_string())
}
