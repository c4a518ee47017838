//! In-memory implementation of the authoritative API.
//!
//! Simulates the server for tests and demos: it owns a task map, assigns
//! server-side identifiers, and can be told to fail upcoming calls so
//! the queue's retry behavior and the reconciler's fetch fallbacks can
//! be exercised deterministically.

use crate::api::{ApiError, Page, TaskApi, TaskPage};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;
use task_model::{Task, TaskDraft, TaskPatch, TaskStats, TaskStatus};

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<String, Task>,
    next_id: u64,
    /// Number of upcoming calls that fail with a network error.
    fail_next: u32,
    /// While set, every call fails with a network error.
    offline: bool,
    /// Total calls observed, failed or not.
    calls: u64,
}

/// In-memory authoritative API with programmable failures.
#[derive(Default)]
pub struct InMemoryApi {
    inner: Mutex<Inner>,
}

impl InMemoryApi {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a task directly into the server's collection.
    pub fn insert(&self, task: Task) {
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.insert(task.id.clone(), task);
    }

    /// Make the next `n` calls fail with a network error.
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().unwrap().fail_next = n;
    }

    /// Simulate the server being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// Look up a task as stored server-side.
    pub fn task(&self, id: &str) -> Option<Task> {
        self.inner.lock().unwrap().tasks.get(id).cloned()
    }

    /// Number of tasks stored server-side.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().tasks.len()
    }

    /// Check whether the server holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total calls observed, including failed ones.
    pub fn calls(&self) -> u64 {
        self.inner.lock().unwrap().calls
    }

    fn gate(inner: &mut Inner) -> Result<(), ApiError> {
        inner.calls += 1;
        if inner.offline {
            return Err(ApiError::Network("offline".to_string()));
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(ApiError::Network("injected failure".to_string()));
        }
        Ok(())
    }
}

impl TaskApi for InMemoryApi {
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        inner.next_id += 1;
        let id = format!("srv-{}", inner.next_id);
        let mut task = Task::new(id.clone(), draft.title.clone());
        task.description = draft.description.clone();
        task.priority = draft.priority;
        task.category = draft.category.clone();
        task.due_date = draft.due_date;
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        task.apply_patch(patch);
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        inner
            .tasks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn toggle_task(&self, id: &str) -> Result<Task, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        task.toggle();
        Ok(task.clone())
    }

    async fn move_task(&self, id: &str, to_state: TaskStatus) -> Result<Task, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        task.set_status(to_state);
        Ok(task.clone())
    }

    async fn fetch_task(&self, id: &str) -> Result<Task, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        inner
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn fetch_tasks(&self, page: Page) -> Result<TaskPage, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        let total = inner.tasks.len() as u64;
        let skip = (page.number.saturating_sub(1) as usize) * page.size as usize;
        let tasks: Vec<Task> = inner
            .tasks
            .values()
            .skip(skip)
            .take(page.size as usize)
            .cloned()
            .collect();
        Ok(TaskPage {
            tasks,
            page: page.number,
            per_page: page.size,
            total,
        })
    }

    async fn fetch_stats(&self) -> Result<TaskStats, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        Ok(TaskStats::compute(inner.tasks.values(), Utc::now()))
    }

    async fn bulk_update(&self, ids: &[String], patch: &TaskPatch) -> Result<usize, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        let mut updated = 0;
        for id in ids {
            if let Some(task) = inner.tasks.get_mut(id) {
                task.apply_patch(patch);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<usize, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        Self::gate(&mut inner)?;

        let mut deleted = 0;
        for id in ids {
            if inner.tasks.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
