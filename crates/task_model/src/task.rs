//! Core task entity, lifecycle status, and mutation shapes.

use crate::attachment::AttachmentSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority level of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Lifecycle status of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl TaskStatus {
    /// The status a completion toggle moves to from this one.
    ///
    /// Toggling a completed task reopens it as pending; toggling any
    /// other status completes it.
    pub fn toggled(self) -> TaskStatus {
        match self {
            TaskStatus::Completed => TaskStatus::Pending,
            _ => TaskStatus::Completed,
        }
    }
}

/// A task in the canonical collection.
///
/// Tasks created locally before server confirmation carry `optimistic =
/// true` and a temporary identifier; both are replaced when the server's
/// authoritative payload arrives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (server-assigned, or temporary while optimistic).
    pub id: String,
    /// Short title.
    pub title: String,
    /// Longer free-form description.
    #[serde(default)]
    pub description: String,
    /// Priority level.
    #[serde(default)]
    pub priority: Priority,
    /// Optional user-defined category.
    #[serde(default)]
    pub category: Option<String>,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Completion timestamp, set while status is `Completed`.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Attachment count and list.
    #[serde(default)]
    pub attachments: AttachmentSummary,
    /// True until the server confirms this task exists.
    #[serde(default)]
    pub optimistic: bool,
}

impl Task {
    /// Create a confirmed task with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            category: None,
            due_date: None,
            status: TaskStatus::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            attachments: AttachmentSummary::default(),
            optimistic: false,
        }
    }

    /// Check whether the task is overdue at the given instant.
    ///
    /// Completed tasks are never overdue.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.status == TaskStatus::Completed {
            return false;
        }
        self.due_date.map(|due| due < now).unwrap_or(false)
    }

    /// Set the lifecycle status, maintaining `completed_at` and
    /// `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = match status {
            TaskStatus::Completed => Some(now),
            _ => None,
        };
    }

    /// Toggle completion: completed tasks reopen, others complete.
    pub fn toggle(&mut self) -> TaskStatus {
        self.set_status(self.status.toggled());
        self.status
    }

    /// Apply a partial update in place, bumping `updated_at`.
    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = &patch.category {
            self.category = Some(category.clone());
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = Some(due_date);
        }
        if let Some(status) = patch.status {
            self.set_status(status);
        }
        self.updated_at = Utc::now();
    }
}

/// Fields for creating a new task.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    /// Create a draft with the given title and defaults elsewhere.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Materialize the draft as an optimistic task under a temporary id.
    pub fn into_optimistic(self, local_id: impl Into<String>) -> Task {
        let now = Utc::now();
        Task {
            id: local_id.into(),
            title: self.title,
            description: self.description,
            priority: self.priority,
            category: self.category,
            due_date: self.due_date,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            attachments: AttachmentSummary::default(),
            optimistic: true,
        }
    }
}

/// Partial update for an existing task. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    /// Check whether the patch changes anything.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // ========== Status Tests ==========

    #[test]
    fn test_status_toggled() {
        assert_eq!(TaskStatus::Pending.toggled(), TaskStatus::Completed);
        assert_eq!(TaskStatus::InProgress.toggled(), TaskStatus::Completed);
        assert_eq!(TaskStatus::Completed.toggled(), TaskStatus::Pending);
    }

    #[test]
    fn test_set_status_maintains_completed_at() {
        let mut task = Task::new("1", "Write report");
        assert!(task.completed_at.is_none());

        task.set_status(TaskStatus::Completed);
        assert!(task.completed_at.is_some());

        task.set_status(TaskStatus::Pending);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_toggle_round_trip() {
        let mut task = Task::new("1", "Write report");
        assert_eq!(task.toggle(), TaskStatus::Completed);
        assert_eq!(task.toggle(), TaskStatus::Pending);
    }

    // ========== Overdue Tests ==========

    #[test]
    fn test_is_overdue() {
        let now = Utc::now();
        let mut task = Task::new("1", "Pay invoice");

        // No due date
        assert!(!task.is_overdue(now));

        // Due in the future
        task.due_date = Some(now + Duration::hours(1));
        assert!(!task.is_overdue(now));

        // Due in the past
        task.due_date = Some(now - Duration::hours(1));
        assert!(task.is_overdue(now));

        // Completed tasks are never overdue
        task.set_status(TaskStatus::Completed);
        assert!(!task.is_overdue(now));
    }

    // ========== Draft and Patch Tests ==========

    #[test]
    fn test_draft_into_optimistic() {
        let draft = TaskDraft {
            title: "Buy milk".to_string(),
            priority: Priority::High,
            ..TaskDraft::default()
        };

        let task = draft.into_optimistic("local-1");

        assert_eq!(task.id, "local-1");
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.optimistic);
    }

    #[test]
    fn test_apply_patch_partial() {
        let mut task = Task::new("1", "Old title");
        task.description = "Old description".to_string();

        let patch = TaskPatch {
            title: Some("New title".to_string()),
            ..TaskPatch::default()
        };
        task.apply_patch(&patch);

        assert_eq!(task.title, "New title");
        assert_eq!(task.description, "Old description");
    }

    #[test]
    fn test_apply_patch_status_sets_completed_at() {
        let mut task = Task::new("1", "Ship release");
        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..TaskPatch::default()
        };
        task.apply_patch(&patch);

        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            priority: Some(Priority::Low),
            ..TaskPatch::default()
        };
        assert!(!patch.is_empty());
    }

    // ========== Serialization Tests ==========

    #[test]
    fn test_task_serialization_round_trip() {
        let mut task = Task::new("42", "Serialize me");
        task.priority = Priority::High;
        task.category = Some("work".to_string());

        let json = serde_json::to_string(&task).unwrap();
        let restored: Task = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, task);
    }

    #[test]
    fn test_status_wire_format_is_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_task_deserializes_with_missing_optional_fields() {
        let json = r#"{
            "id": "7",
            "title": "Sparse",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;

        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert!(!task.optimistic);
        assert_eq!(task.attachments.count, 0);
    }
}
