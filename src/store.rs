use crate::errors::{AppError, AppResult};
use crate::models::{CalendarZone, Repetition, Task, TaskFilter, TaskId};
use crate::policy::validate_title;
use crate::recurrence::parse_due_date;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

// Every mutating call bumps the revision; callers persist `snapshot()` afterwards.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    highest_issued_id: TaskId,
    revision: u64,
    zone: CalendarZone,
}

impl TaskStore {
    pub fn new(zone: CalendarZone) -> Self {
        Self {
            zone,
            ..Self::default()
        }
    }

    // Later duplicates of an id get fresh ids.
    pub fn from_tasks(tasks: Vec<Task>, zone: CalendarZone) -> AppResult<Self> {
        let mut highest_issued_id = tasks.iter().map(|task| task.id).max().unwrap_or(0);
        let mut seen = HashSet::with_capacity(tasks.len());
        let mut deduped = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if !seen.insert(task.id) {
                highest_issued_id = following_id(highest_issued_id)?;
                tracing::warn!(
                    duplicate_id = task.id,
                    new_id = highest_issued_id,
                    "reassigned duplicate task id in loaded collection"
                );
                task.id = highest_issued_id;
                seen.insert(task.id);
            }
            deduped.push(task);
        }

        Ok(Self {
            tasks: deduped,
            highest_issued_id,
            revision: 0,
            zone,
        })
    }

    pub fn zone(&self) -> CalendarZone {
        self.zone
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn list(&self, filter: TaskFilter, now: DateTime<Utc>) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|task| match filter {
                TaskFilter::All => true,
                TaskFilter::Pending => !task.is_done(),
                TaskFilter::Done => task.is_done(),
                TaskFilter::Due => task.is_due(now),
            })
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    pub fn add(&mut self, title: &str, due_date: &str, repetition: Repetition) -> AppResult<Task> {
        let title = validate_title(title)?;
        let due_date = parse_due_date(due_date, self.zone)?;
        let task = Task {
            id: self.next_id()?,
            title,
            status: false,
            due_date,
            repetition,
            last_notified_at: None,
        };
        self.tasks.push(task.clone());
        self.bump();
        Ok(task)
    }

    fn next_id(&mut self) -> AppResult<TaskId> {
        let current_max = self.tasks.iter().map(|task| task.id).max().unwrap_or(0);
        self.highest_issued_id = following_id(self.highest_issued_id.max(current_max))?;
        Ok(self.highest_issued_id)
    }

    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            self.bump();
        }
        removed
    }

    // Reopening a task clears its notification marker.
    pub fn toggle_done(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            return false;
        };
        task.status = !task.status;
        if !task.status {
            task.last_notified_at = None;
        }
        self.bump();
        true
    }

    /// Swaps the task `id` for `new_task`, keeping its display position. A new
    /// due date or repetition re-arms the reminder.
    pub fn replace(&mut self, id: TaskId, mut new_task: Task) -> AppResult<Task> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;

        if new_task.id != id && self.tasks.iter().any(|task| task.id == new_task.id) {
            return Err(AppError::Validation(format!(
                "Task id {} is already used by another task",
                new_task.id
            )));
        }
        new_task.title = validate_title(&new_task.title)?;

        let previous = &self.tasks[index];
        if previous.due_date != new_task.due_date || previous.repetition != new_task.repetition {
            new_task.last_notified_at = None;
        }

        self.highest_issued_id = self.highest_issued_id.max(new_task.id);
        self.tasks[index] = new_task.clone();
        self.bump();
        Ok(new_task)
    }

    pub fn replace_all(&mut self, tasks: Vec<Task>) -> AppResult<()> {
        let rebuilt = Self::from_tasks(tasks, self.zone)?;
        self.tasks = rebuilt.tasks;
        self.highest_issued_id = self.highest_issued_id.max(rebuilt.highest_issued_id);
        self.bump();
        Ok(())
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub(crate) fn bump(&mut self) {
        self.revision += 1;
    }
}

fn following_id(id: TaskId) -> AppResult<TaskId> {
    id.checked_add(1)
        .ok_or_else(|| AppError::Validation("No task ids left; the highest id is already in use".to_string()))
}
