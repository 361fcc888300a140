use crate::errors::AppResult;
use crate::models::{CalendarZone, Notification, RenotifyPolicy, Task, TaskId, TaskState};
use crate::recurrence::advance_past;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub renotify: RenotifyPolicy,
    pub zone: CalendarZone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub notifications: Vec<Notification>,
    pub rescheduled: Vec<TaskId>,
    pub failed: Vec<(TaskId, String)>,
    pub mutated: bool,
    pub saved: bool,
}

impl ScanReport {
    pub fn is_noop(&self) -> bool {
        self.notifications.is_empty() && !self.mutated
    }
}

/// Announces due tasks and moves recurring ones strictly past `now`; missed
/// occurrences collapse into one notification. Under [`RenotifyPolicy::Once`]
/// a due date is announced once, tracked through `last_notified_at`.
pub fn scan_due_tasks(tasks: &mut [Task], now: DateTime<Utc>, options: ScanOptions) -> ScanReport {
    let mut report = ScanReport::default();

    for task in tasks.iter_mut() {
        match task.state(now) {
            TaskState::Done | TaskState::PendingNotDue => continue,
            TaskState::PendingDue => {}
        }

        let already_announced = task
            .last_notified_at
            .is_some_and(|notified_at| notified_at >= task.due_date);
        if options.renotify == RenotifyPolicy::Once && already_announced {
            continue;
        }

        let mut notification = Notification::for_task(task, now);
        if task.repetition.is_recurring() {
            match advance_past(task.due_date, task.repetition, now, options.zone) {
                Ok((next_due, skipped)) => {
                    notification.skipped_occurrences = skipped;
                    task.due_date = next_due;
                    task.last_notified_at = Some(now);
                    report.rescheduled.push(task.id);
                    report.mutated = true;
                }
                Err(error) => {
                    tracing::warn!(task_id = task.id, error = %error, "failed to advance recurring task");
                    report.failed.push((task.id, error.to_string()));
                    if options.renotify == RenotifyPolicy::Once {
                        task.last_notified_at = Some(now);
                        report.mutated = true;
                    }
                }
            }
        } else if options.renotify == RenotifyPolicy::Once {
            task.last_notified_at = Some(now);
            report.mutated = true;
        }
        report.notifications.push(notification);
    }

    report
}

pub type TickFuture = Pin<Box<dyn Future<Output = AppResult<ScanReport>> + Send>>;
pub type TickExecutor = Arc<dyn Fn(DateTime<Utc>) -> TickFuture + Send + Sync>;

// A tick is skipped while the previous one (scan plus save) is still running.
#[derive(Clone)]
pub struct Scheduler {
    interval: Duration,
    in_flight: Arc<AtomicBool>,
    executor: Arc<RwLock<Option<TickExecutor>>>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
            executor: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_executor(&self, executor: TickExecutor) {
        match self.executor.write() {
            Ok(mut writer) => *writer = Some(executor),
            Err(poisoned) => *poisoned.into_inner() = Some(executor),
        }
    }

    pub fn is_tick_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    // The first scan runs immediately.
    pub fn start(&self) -> ScanHandle {
        let (shutdown, receiver) = watch::channel(false);
        let scheduler = self.clone();
        let join = tokio::spawn(async move {
            scheduler.run_loop(receiver).await;
        });
        ScanHandle {
            shutdown,
            join: Some(join),
        }
    }

    async fn run_loop(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("due scan loop stopped");
                        return;
                    }
                    continue;
                }
            }
            self.spawn_tick(Utc::now());
        }
    }

    pub fn spawn_tick(&self, now: DateTime<Utc>) -> Option<JoinHandle<()>> {
        let Some(guard) = InFlightGuard::acquire(self.in_flight.clone()) else {
            tracing::debug!("previous due scan still in flight; skipping tick");
            return None;
        };
        let executor = self.current_executor()?;
        Some(tokio::spawn(async move {
            let _guard = guard;
            match executor(now).await {
                Ok(report) if !report.is_noop() => {
                    tracing::info!(
                        notified = report.notifications.len(),
                        rescheduled = report.rescheduled.len(),
                        saved = report.saved,
                        "due scan finished"
                    );
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(error = %error, "due scan failed"),
            }
        }))
    }

    fn current_executor(&self) -> Option<TickExecutor> {
        match self.executor.read() {
            Ok(reader) => reader.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct ScanHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl ScanHandle {
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(error) = join.await {
                tracing::warn!(error = %error, "due scan loop ended abnormally");
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
