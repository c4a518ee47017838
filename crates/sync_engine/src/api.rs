//! Authoritative REST API boundary.
//!
//! The engine never talks to a concrete HTTP client; it consumes this
//! trait. The server behind it is assumed authoritative and
//! single-writer per entity: whatever a call returns replaces the
//! optimistic local version of that entity.

use serde::{Deserialize, Serialize};
use task_model::{Task, TaskDraft, TaskPatch, TaskStats, TaskStatus};
use thiserror::Error;

/// Errors returned by the authoritative API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never reached the server.
    #[error("Network unreachable: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("Server returned status {status}")]
    Status { status: u16 },

    /// The target entity does not exist server-side.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether retrying the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status } => *status >= 500,
            ApiError::NotFound(_) | ApiError::Decode(_) => false,
        }
    }
}

/// Pagination parameters for collection fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Page size.
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 1, size: 50 }
    }
}

/// One page of the task collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    /// The tasks on this page.
    pub tasks: Vec<Task>,
    /// The page number served.
    pub page: u32,
    /// The page size the server applied.
    pub per_page: u32,
    /// Total number of tasks in the collection.
    pub total: u64,
}

impl TaskPage {
    /// Whether pages beyond this one exist.
    pub fn has_more(&self) -> bool {
        let seen = (self.page as u64).saturating_mul(self.per_page as u64);
        seen < self.total
    }
}

/// The task CRUD surface the engine consumes.
///
/// Futures from this trait are awaited on the host's single-threaded
/// event loop, so no `Send` bound is imposed.
#[allow(async_fn_in_trait)]
pub trait TaskApi {
    /// Create a task; the server assigns the final identifier.
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError>;

    /// Apply a partial update and return the authoritative entity.
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, ApiError>;

    /// Delete a task.
    async fn delete_task(&self, id: &str) -> Result<(), ApiError>;

    /// Toggle completion and return the authoritative entity.
    async fn toggle_task(&self, id: &str) -> Result<Task, ApiError>;

    /// Move a task to another lifecycle state.
    async fn move_task(&self, id: &str, to_state: TaskStatus) -> Result<Task, ApiError>;

    /// Fetch a single task.
    async fn fetch_task(&self, id: &str) -> Result<Task, ApiError>;

    /// Fetch one page of the collection.
    async fn fetch_tasks(&self, page: Page) -> Result<TaskPage, ApiError>;

    /// Fetch server-side statistics.
    async fn fetch_stats(&self) -> Result<TaskStats, ApiError>;

    /// Apply one patch to many tasks. Returns the number updated.
    async fn bulk_update(&self, ids: &[String], patch: &TaskPatch) -> Result<usize, ApiError>;

    /// Delete many tasks. Returns the number deleted.
    async fn bulk_delete(&self, ids: &[String]) -> Result<usize, ApiError>;
}

// Forwarding impl so callers can keep a handle on the API after moving
// it into the engine.
impl<A: TaskApi> TaskApi for std::sync::Arc<A> {
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        (**self).create_task(draft).await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, ApiError> {
        (**self).update_task(id, patch).await
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        (**self).delete_task(id).await
    }

    async fn toggle_task(&self, id: &str) -> Result<Task, ApiError> {
        (**self).toggle_task(id).await
    }

    async fn move_task(&self, id: &str, to_state: TaskStatus) -> Result<Task, ApiError> {
        (**self).move_task(id, to_state).await
    }

    async fn fetch_task(&self, id: &str) -> Result<Task, ApiError> {
        (**self).fetch_task(id).await
    }

    async fn fetch_tasks(&self, page: Page) -> Result<TaskPage, ApiError> {
        (**self).fetch_tasks(page).await
    }

    async fn fetch_stats(&self) -> Result<TaskStats, ApiError> {
        (**self).fetch_stats().await
    }

    async fn bulk_update(&self, ids: &[String], patch: &TaskPatch) -> Result<usize, ApiError> {
        (**self).bulk_update(ids, patch).await
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<usize, ApiError> {
        (**self).bulk_delete(ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Network("dns".to_string()).is_transient());
        assert!(ApiError::Status { status: 503 }.is_transient());
        assert!(!ApiError::Status { status: 422 }.is_transient());
        assert!(!ApiError::NotFound("1".to_string()).is_transient());
        assert!(!ApiError::Decode("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_page_default() {
        let page = Page::default();
        assert_eq!(page.number, 1);
        assert_eq!(page.size, 50);
    }

    #[test]
    fn test_task_page_has_more() {
        let page = TaskPage {
            tasks: vec![Task::new("1", "a"), Task::new("2", "b")],
            page: 1,
            per_page: 2,
            total: 5,
        };
        assert!(page.has_more());

        let last = TaskPage {
            tasks: vec![Task::new("5", "e")],
            page: 3,
            per_page: 2,
            total: 5,
        };
        assert!(!last.has_more());
    }
}
